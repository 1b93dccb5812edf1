//! Invoker Environments - per-project sandbox environment provisioning
//!
//! This crate creates and tears down the infrastructure backing one
//! project's development environment on shared AWS resources: an ECS
//! service, two ALB target groups with host-header listener rules, and two
//! Route53 CNAME records. Every created resource is tracked in a SQLite
//! provisioning record so a later teardown can remove it.

pub mod aws;
pub mod compute;
pub mod config;
pub mod dns;
pub mod error;
pub mod naming;
pub mod orchestrator;
pub mod priority;
pub mod routing;
pub mod storage;
pub mod types;

// Re-export key types for easier use
pub use aws::AwsControlPlanes;
pub use compute::{ComputeApi, ComputeManager, ComputeSettings, TaskSummary};
pub use config::{EnvironmentConfig, PriorityStrategy};
pub use dns::{DnsApi, DnsManager};
pub use error::{
    ComputeError, ConfigError, DnsError, ProvisionError, Result, RoutingError, StepError,
    StorageError,
};
pub use naming::ResourceNames;
pub use orchestrator::EnvironmentOrchestrator;
pub use priority::{ProcessPriorityAllocator, RulePriorityAllocator};
pub use routing::{LoadBalancerApi, RoutingManager};
pub use storage::{RecordStore, SqlitePriorityAllocator, SqliteRecordStore};
pub use types::{
    EnvironmentUrls, Project, ProvisionStep, ProvisionedEnvironment, ProvisioningRecord,
    TeardownFailure, TeardownReport, TeardownStep, Template,
};
