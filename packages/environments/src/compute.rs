// ABOUTME: Container service lifecycle for project environments
// ABOUTME: Registers task definitions, runs the per-project service and stops its tasks on teardown

use async_trait::async_trait;
use futures::future::join_all;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::error::ComputeError;
use crate::naming::{service_group, ResourceNames};
use crate::types::{Template, TeardownStep, CONTROL_PORT, SERVING_PORT};

/// Memory of every environment task
pub const TASK_MEMORY: &str = "4 GB";

/// CPU of every environment task
pub const TASK_CPU: &str = "1 vCPU";

/// Maximum number of tasks the control plane describes per call
const DESCRIBE_BATCH_SIZE: usize = 100;

type Result<T> = std::result::Result<T, ComputeError>;

/// Single-container task definition
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskDefinitionSpec {
    pub family: String,
    pub container_name: String,
    pub image: String,
    pub execution_role_arn: String,
    pub memory: String,
    pub cpu: String,
    pub container_ports: Vec<u16>,
    pub environment: Vec<(String, String)>,
}

/// Target group a service registers its container port with
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceLoadBalancer {
    pub target_group_arn: String,
    pub container_name: String,
    pub container_port: u16,
}

/// Long-running service on serverless capacity
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceSpec {
    pub cluster: String,
    pub service_name: String,
    pub task_definition: String,
    pub desired_count: i32,
    pub subnets: Vec<String>,
    pub security_groups: Vec<String>,
    pub assign_public_ip: bool,
    pub load_balancers: Vec<ServiceLoadBalancer>,
}

/// A task as reported by the cluster
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskSummary {
    pub task_arn: String,
    pub group: Option<String>,
}

/// Compute control plane operations
#[async_trait]
pub trait ComputeApi: Send + Sync {
    async fn register_task_definition(&self, spec: &TaskDefinitionSpec) -> Result<String>;
    async fn deregister_task_definition(&self, task_definition_arn: &str) -> Result<()>;
    async fn delete_task_definition(&self, task_definition_arn: &str) -> Result<()>;
    async fn create_service(&self, spec: &ServiceSpec) -> Result<String>;
    async fn update_desired_count(&self, cluster: &str, service: &str, count: i32) -> Result<()>;
    async fn delete_service(&self, cluster: &str, service: &str, force: bool) -> Result<()>;
    async fn list_task_arns(&self, cluster: &str) -> Result<Vec<String>>;
    async fn describe_tasks(&self, cluster: &str, task_arns: &[String]) -> Result<Vec<TaskSummary>>;
    async fn stop_task(&self, cluster: &str, task_arn: &str, reason: &str) -> Result<()>;
}

/// Cluster placement shared by every environment
#[derive(Debug, Clone)]
pub struct ComputeSettings {
    pub cluster: String,
    pub image: String,
    pub execution_role_arn: String,
    pub subnets: Vec<String>,
    pub security_group: String,
}

/// Outcome of stopping the tasks of one service
#[derive(Debug, Default)]
pub struct TaskStopOutcome {
    pub stopped: Vec<String>,
    pub failed: Vec<(String, ComputeError)>,
    /// Describe batches that failed; their tasks could not be matched
    pub undescribed: Vec<ComputeError>,
}

pub struct ComputeManager {
    api: Arc<dyn ComputeApi>,
    settings: ComputeSettings,
}

impl ComputeManager {
    pub fn new(api: Arc<dyn ComputeApi>, settings: ComputeSettings) -> Self {
        Self { api, settings }
    }

    pub fn cluster(&self) -> &str {
        &self.settings.cluster
    }

    /// Register the environment's task definition and return its ARN
    pub async fn register_task_definition(
        &self,
        names: &ResourceNames,
        user_id: &str,
        project_id: &str,
        template: Template,
    ) -> Result<String> {
        debug!(
            "Registering task definition {} for project {}",
            names.task_family, project_id
        );

        let spec = TaskDefinitionSpec {
            family: names.task_family.clone(),
            container_name: names.container_name.clone(),
            image: self.settings.image.clone(),
            execution_role_arn: self.settings.execution_role_arn.clone(),
            memory: TASK_MEMORY.to_string(),
            cpu: TASK_CPU.to_string(),
            container_ports: vec![SERVING_PORT, CONTROL_PORT],
            environment: vec![
                ("PROJECT_ID".to_string(), project_id.to_string()),
                ("TEMPLATE".to_string(), template.to_string()),
                ("USER".to_string(), user_id.to_string()),
            ],
        };

        let arn = self.api.register_task_definition(&spec).await.map_err(|e| {
            error!("Failed to register task definition {}: {}", spec.family, e);
            e
        })?;

        info!("Task definition created: {}", arn);
        Ok(arn)
    }

    /// Launch one replica attached to both target groups
    pub async fn create_service(
        &self,
        names: &ResourceNames,
        target_group1: &str,
        port1: u16,
        target_group2: &str,
        port2: u16,
    ) -> Result<String> {
        debug!("Creating service {}", names.service_name);

        let spec = ServiceSpec {
            cluster: self.settings.cluster.clone(),
            service_name: names.service_name.clone(),
            task_definition: names.task_family.clone(),
            desired_count: 1,
            subnets: self.settings.subnets.clone(),
            security_groups: vec![self.settings.security_group.clone()],
            assign_public_ip: true,
            load_balancers: vec![
                ServiceLoadBalancer {
                    target_group_arn: target_group1.to_string(),
                    container_name: names.container_name.clone(),
                    container_port: port1,
                },
                ServiceLoadBalancer {
                    target_group_arn: target_group2.to_string(),
                    container_name: names.container_name.clone(),
                    container_port: port2,
                },
            ],
        };

        let arn = self.api.create_service(&spec).await.map_err(|e| {
            error!("Failed to create service {}: {}", spec.service_name, e);
            e
        })?;

        info!("Service created: {}", arn);
        Ok(arn)
    }

    /// Set desired count to zero so the forced delete does not race running tasks
    pub async fn scale_to_zero(&self, service: &str) -> Result<()> {
        match self
            .api
            .update_desired_count(&self.settings.cluster, service, 0)
            .await
        {
            Ok(()) => {
                info!("Service {} scaled to zero", service);
                Ok(())
            }
            Err(e) if e.is_not_found() => {
                debug!("Service {} not found while scaling down", service);
                Ok(())
            }
            Err(e) => {
                warn!("Failed to scale service {} to zero: {}", service, e);
                Err(e)
            }
        }
    }

    /// Force-delete a service; a service that no longer exists counts as deleted
    pub async fn delete_service(&self, service: &str) -> Result<()> {
        match self
            .api
            .delete_service(&self.settings.cluster, service, true)
            .await
        {
            Ok(()) => {
                info!("Service {} deleted", service);
                Ok(())
            }
            Err(e) if e.is_not_found() => {
                debug!("Service {} already deleted", service);
                Ok(())
            }
            Err(e) => {
                warn!("Failed to delete service {}: {}", service, e);
                Err(e)
            }
        }
    }

    /// Stop every cluster task launched by `service_name`
    ///
    /// Stops run concurrently; one failing stop does not prevent the others.
    /// A failed describe batch is reported and the tasks matched in the other
    /// batches are still stopped. Only listing the cluster's tasks fails the
    /// whole call.
    pub async fn list_and_stop_tasks(&self, service_name: &str) -> Result<TaskStopOutcome> {
        let cluster = &self.settings.cluster;
        let group = service_group(service_name);
        let mut outcome = TaskStopOutcome::default();

        let task_arns = self.api.list_task_arns(cluster).await?;
        debug!("Cluster {} has {} tasks", cluster, task_arns.len());

        let mut matching = Vec::new();
        for batch in task_arns.chunks(DESCRIBE_BATCH_SIZE) {
            match self.api.describe_tasks(cluster, batch).await {
                Ok(tasks) => matching.extend(
                    tasks
                        .into_iter()
                        .filter(|task| task.group.as_deref() == Some(group.as_str()))
                        .map(|task| task.task_arn),
                ),
                Err(e) => {
                    warn!("Failed to describe {} tasks in {}: {}", batch.len(), cluster, e);
                    outcome.undescribed.push(e);
                }
            }
        }

        debug!("Stopping {} tasks in group {}", matching.len(), group);

        let reason = format!("Environment {} torn down", service_name);
        let results = join_all(matching.iter().map(|task_arn| {
            let reason = reason.as_str();
            async move {
                let result = self.api.stop_task(cluster, task_arn, reason).await;
                (task_arn.clone(), result)
            }
        }))
        .await;

        for (task_arn, result) in results {
            match result {
                Ok(()) => {
                    info!("Task stopped: {}", task_arn);
                    outcome.stopped.push(task_arn);
                }
                Err(e) => {
                    warn!("Failed to stop task {}: {}", task_arn, e);
                    outcome.failed.push((task_arn, e));
                }
            }
        }

        Ok(outcome)
    }

    /// Deregister then delete a task definition, returning the steps that failed
    pub async fn deregister_and_delete_task_definition(
        &self,
        task_definition_arn: &str,
    ) -> Vec<(TeardownStep, ComputeError)> {
        let mut failures = Vec::new();

        match self.api.deregister_task_definition(task_definition_arn).await {
            Ok(()) => info!("Task definition deregistered: {}", task_definition_arn),
            Err(e) if e.is_not_found() => {
                debug!("Task definition {} already deregistered", task_definition_arn)
            }
            Err(e) => {
                warn!(
                    "Failed to deregister task definition {}: {}",
                    task_definition_arn, e
                );
                failures.push((TeardownStep::DeregisterTaskDefinition, e));
            }
        }

        match self.api.delete_task_definition(task_definition_arn).await {
            Ok(()) => info!("Task definition deleted: {}", task_definition_arn),
            Err(e) if e.is_not_found() => {
                debug!("Task definition {} already deleted", task_definition_arn)
            }
            Err(e) => {
                warn!(
                    "Failed to delete task definition {}: {}",
                    task_definition_arn, e
                );
                failures.push((TeardownStep::DeleteTaskDefinition, e));
            }
        }

        failures
    }
}
