// ABOUTME: Typed configuration for the provisioning orchestrator
// ABOUTME: Loads cluster, network, routing, DNS and persistence settings from environment variables

use invoker_config::constants::*;
use invoker_config::{parse_env_list, parse_env_or_default, parse_env_with_fallback};
use std::fmt;
use std::str::FromStr;
use tracing::debug;

use crate::compute::ComputeSettings;
use crate::error::ConfigError;

pub const DEFAULT_BASE_DOMAIN: &str = "invok3r.xyz";
pub const DEFAULT_DATABASE_URL: &str = "sqlite:invoker.db";

type Result<T> = std::result::Result<T, ConfigError>;

/// Where listener rule priorities come from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PriorityStrategy {
    /// Persisted sequence shared by every process using the same database
    #[default]
    Stored,
    /// Random-seeded counter local to this process
    Process,
}

impl FromStr for PriorityStrategy {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "stored" => Ok(Self::Stored),
            "process" => Ok(Self::Process),
            other => Err(format!(
                "unknown strategy '{}' (expected 'stored' or 'process')",
                other
            )),
        }
    }
}

impl fmt::Display for PriorityStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Stored => f.write_str("stored"),
            Self::Process => f.write_str("process"),
        }
    }
}

/// Static credentials; absent means the default provider chain is used
#[derive(Clone)]
pub struct StaticCredentials {
    pub access_key_id: String,
    pub secret_access_key: String,
}

impl fmt::Debug for StaticCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StaticCredentials")
            .field("access_key_id", &self.access_key_id)
            .field("secret_access_key", &"***")
            .finish()
    }
}

#[derive(Debug, Clone)]
pub struct AwsSettings {
    pub region: Option<String>,
    pub credentials: Option<StaticCredentials>,
}

#[derive(Debug, Clone)]
pub struct EnvironmentConfig {
    pub aws: AwsSettings,
    pub compute: ComputeSettings,
    pub vpc_id: String,
    pub listener_arn: String,
    /// DNS name of the shared load balancer, the target of every CNAME
    pub lb_domain: String,
    pub hosted_zone_id: String,
    pub base_domain: String,
    pub database_url: String,
    pub priority_strategy: PriorityStrategy,
}

fn optional(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn required(name: &'static str) -> Result<String> {
    optional(name).ok_or(ConfigError::Missing(name))
}

/// `AWS_REGION` wins over the SDK's conventional `AWS_DEFAULT_REGION`
fn load_region() -> Option<String> {
    let region: String = parse_env_with_fallback(AWS_REGION, AWS_DEFAULT_REGION, String::new());
    let region = region.trim();
    (!region.is_empty()).then(|| region.to_string())
}

fn load_credentials() -> Result<Option<StaticCredentials>> {
    match (optional(AWS_ACCESS_KEY), optional(AWS_SECRET)) {
        (Some(access_key_id), Some(secret_access_key)) => Ok(Some(StaticCredentials {
            access_key_id,
            secret_access_key,
        })),
        (None, None) => Ok(None),
        (Some(_), None) => Err(ConfigError::Missing(AWS_SECRET)),
        (None, Some(_)) => Err(ConfigError::Missing(AWS_ACCESS_KEY)),
    }
}

/// `SUBNET_IDS` wins; otherwise the legacy numbered variables are collected
fn load_subnets() -> Result<Vec<String>> {
    let subnets = parse_env_list(SUBNET_IDS);
    if !subnets.is_empty() {
        return Ok(subnets);
    }

    let legacy: Vec<String> = [SUBNET_1, SUBNET_2, SUBNET_3]
        .into_iter()
        .filter_map(optional)
        .collect();

    if legacy.is_empty() {
        return Err(ConfigError::Missing(SUBNET_IDS));
    }
    Ok(legacy)
}

fn load_priority_strategy() -> Result<PriorityStrategy> {
    match optional(RULE_PRIORITY_STRATEGY) {
        None => Ok(PriorityStrategy::default()),
        Some(raw) => raw.parse().map_err(|reason| ConfigError::Invalid {
            name: RULE_PRIORITY_STRATEGY,
            reason,
        }),
    }
}

impl EnvironmentConfig {
    /// Load configuration from the process environment
    pub fn from_env() -> Result<Self> {
        let compute = ComputeSettings {
            cluster: required(ECS_CLUSTER)?,
            image: required(IMAGE_URL)?,
            execution_role_arn: required(EXECUTION_ROLE_ARN)?,
            subnets: load_subnets()?,
            security_group: required(SECURITY_GROUP)?,
        };

        let config = Self {
            aws: AwsSettings {
                region: load_region(),
                credentials: load_credentials()?,
            },
            compute,
            vpc_id: required(VPC_ID)?,
            listener_arn: required(LISTENER_ARN)?,
            lb_domain: required(LB_DOMAIN)?,
            hosted_zone_id: required(HOSTED_ZONE_ID)?,
            base_domain: parse_env_or_default(BASE_DOMAIN, DEFAULT_BASE_DOMAIN.to_string()),
            database_url: parse_env_or_default(
                INVOKER_DATABASE_URL,
                DEFAULT_DATABASE_URL.to_string(),
            ),
            priority_strategy: load_priority_strategy()?,
        };

        debug!(
            "Loaded configuration: cluster={}, subnets={}, priority_strategy={}",
            config.compute.cluster,
            config.compute.subnets.len(),
            config.priority_strategy
        );

        Ok(config)
    }
}
