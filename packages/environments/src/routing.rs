// ABOUTME: Load balancer routing for project environments
// ABOUTME: Manages per-project target groups and host-header listener rules on the shared listener

use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::error::RoutingError;
use crate::priority::RulePriorityAllocator;
use crate::types::CONTROL_PORT;

/// Attempts made with fresh priorities before a collision is reported
const MAX_PRIORITY_ATTEMPTS: usize = 5;

type Result<T> = std::result::Result<T, RoutingError>;

/// IP-mode HTTP target group to create in the shared VPC
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetGroupSpec {
    pub name: String,
    pub port: u16,
    pub vpc_id: String,
    pub health_check_port: u16,
}

/// Forward rule matching one exact host header
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListenerRuleSpec {
    pub listener_arn: String,
    pub host_header: String,
    pub target_group_arn: String,
    pub priority: i32,
}

/// Routing control plane operations
#[async_trait]
pub trait LoadBalancerApi: Send + Sync {
    /// Create a target group and return its ARN
    async fn create_target_group(&self, spec: &TargetGroupSpec) -> Result<String>;

    async fn delete_target_group(&self, target_group_arn: &str) -> Result<()>;

    /// Create a listener rule and return its ARN
    async fn create_rule(&self, spec: &ListenerRuleSpec) -> Result<String>;

    async fn delete_rule(&self, rule_arn: &str) -> Result<()>;
}

/// Creates and removes the routing of project environments
pub struct RoutingManager {
    api: Arc<dyn LoadBalancerApi>,
    priorities: Arc<dyn RulePriorityAllocator>,
    vpc_id: String,
}

impl RoutingManager {
    pub fn new(
        api: Arc<dyn LoadBalancerApi>,
        priorities: Arc<dyn RulePriorityAllocator>,
        vpc_id: impl Into<String>,
    ) -> Self {
        Self {
            api,
            priorities,
            vpc_id: vpc_id.into(),
        }
    }

    /// Register a target group for one container port, health checked on the control port
    pub async fn create_target_group(&self, name: &str, port: u16) -> Result<String> {
        debug!("Creating target group {} for port {}", name, port);

        let spec = TargetGroupSpec {
            name: name.to_string(),
            port,
            vpc_id: self.vpc_id.clone(),
            health_check_port: CONTROL_PORT,
        };

        let arn = self.api.create_target_group(&spec).await.map_err(|e| {
            error!("Failed to create target group {}: {}", name, e);
            e
        })?;

        info!("Created target group {}", arn);
        Ok(arn)
    }

    /// Attach a forward rule for `host_header` on the shared listener
    ///
    /// A priority collision takes the next priority and tries again, up to
    /// `MAX_PRIORITY_ATTEMPTS` times.
    pub async fn create_listener_rule(
        &self,
        listener_arn: &str,
        host_header: &str,
        target_group_arn: &str,
    ) -> Result<String> {
        let mut last_error = None;

        for attempt in 1..=MAX_PRIORITY_ATTEMPTS {
            let priority = self.priorities.next_priority().await?;
            let spec = ListenerRuleSpec {
                listener_arn: listener_arn.to_string(),
                host_header: host_header.to_string(),
                target_group_arn: target_group_arn.to_string(),
                priority,
            };

            debug!(
                "Creating listener rule for {} at priority {} (attempt {})",
                host_header, priority, attempt
            );

            match self.api.create_rule(&spec).await {
                Ok(arn) => {
                    info!(
                        "Created listener rule {} for {} at priority {}",
                        arn, host_header, priority
                    );
                    return Ok(arn);
                }
                Err(RoutingError::PriorityInUse(taken)) => {
                    warn!(
                        "Priority {} already in use on listener, retrying for {}",
                        taken, host_header
                    );
                    last_error = Some(RoutingError::PriorityInUse(taken));
                }
                Err(e) => {
                    error!("Failed to create listener rule for {}: {}", host_header, e);
                    return Err(e);
                }
            }
        }

        Err(last_error.unwrap_or_else(|| {
            RoutingError::PriorityAllocation("no priority attempts were made".to_string())
        }))
    }

    /// Delete a listener rule; a rule that no longer exists counts as deleted
    pub async fn delete_listener_rule(&self, rule_arn: &str) -> Result<()> {
        match self.api.delete_rule(rule_arn).await {
            Ok(()) => {
                info!("Deleted listener rule {}", rule_arn);
                Ok(())
            }
            Err(e) if e.is_not_found() => {
                debug!("Listener rule {} already deleted", rule_arn);
                Ok(())
            }
            Err(e) => {
                warn!("Failed to delete listener rule {}: {}", rule_arn, e);
                Err(e)
            }
        }
    }

    /// Delete a target group; a target group that no longer exists counts as deleted
    pub async fn delete_target_group(&self, target_group_arn: &str) -> Result<()> {
        match self.api.delete_target_group(target_group_arn).await {
            Ok(()) => {
                info!("Deleted target group {}", target_group_arn);
                Ok(())
            }
            Err(e) if e.is_not_found() => {
                debug!("Target group {} already deleted", target_group_arn);
                Ok(())
            }
            Err(e) => {
                warn!("Failed to delete target group {}: {}", target_group_arn, e);
                Err(e)
            }
        }
    }
}
