// ABOUTME: Core type definitions for environment provisioning
// ABOUTME: Defines projects, templates, provisioning records and teardown reports

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::ProvisionError;

/// Port the dev server listens on inside the container
pub const SERVING_PORT: u16 = 3000;

/// Port of the terminal/file backend; also used for target group health checks
pub const CONTROL_PORT: u16 = 5000;

/// Project skeleton the container boots with
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Template {
    Next,
    React,
}

impl Template {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Next => "next",
            Self::React => "react",
        }
    }
}

impl fmt::Display for Template {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Template {
    type Err = ProvisionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "next" => Ok(Self::Next),
            "react" => Ok(Self::React),
            other => Err(ProvisionError::InvalidRequest(format!(
                "unknown template '{}' (expected 'next' or 'react')",
                other
            ))),
        }
    }
}

/// A user project, owned by the project creation flow
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Project {
    pub id: String,
    pub name: String,
    pub template: Template,
    pub user_id: String,
}

/// Persisted identifiers of every external resource backing one project's environment
///
/// Fields stay `None` until the matching creation step succeeds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProvisioningRecord {
    pub project_id: String,
    pub service_id: Option<String>,
    pub task_definition_id: Option<String>,
    pub target_group1_id: Option<String>,
    pub target_group2_id: Option<String>,
    pub listener_rule1_id: Option<String>,
    pub listener_rule2_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ProvisioningRecord {
    pub fn new(project_id: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            project_id: project_id.into(),
            service_id: None,
            task_definition_id: None,
            target_group1_id: None,
            target_group2_id: None,
            listener_rule1_id: None,
            listener_rule2_id: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Number of identifiers captured so far
    pub fn populated_count(&self) -> usize {
        [
            &self.service_id,
            &self.task_definition_id,
            &self.target_group1_id,
            &self.target_group2_id,
            &self.listener_rule1_id,
            &self.listener_rule2_id,
        ]
        .iter()
        .filter(|id| id.is_some())
        .count()
    }
}

/// Public URLs of a provisioned environment
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvironmentUrls {
    /// Terminal/file backend
    pub backend: String,
    /// Dev server preview
    pub frontend: String,
}

/// Result of a successful `provision`
#[derive(Debug, Clone, Serialize)]
pub struct ProvisionedEnvironment {
    pub record: ProvisioningRecord,
    pub urls: EnvironmentUrls,
    /// DNS upserts that failed; the environment is running but may not resolve yet
    pub dns_warnings: Vec<String>,
    /// Report of the teardown that ran first when replacing a live environment
    pub replaced: Option<TeardownReport>,
}

/// Creation steps of `provision`, in execution order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ProvisionStep {
    CreateControlTargetGroup,
    CreateServingTargetGroup,
    CreateBackendRule,
    CreateFrontendRule,
    RegisterTaskDefinition,
    CreateService,
}

impl fmt::Display for ProvisionStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::CreateControlTargetGroup => "creating control target group",
            Self::CreateServingTargetGroup => "creating serving target group",
            Self::CreateBackendRule => "creating backend listener rule",
            Self::CreateFrontendRule => "creating frontend listener rule",
            Self::RegisterTaskDefinition => "registering task definition",
            Self::CreateService => "creating service",
        };
        f.write_str(name)
    }
}

/// Teardown sub-steps, in execution order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TeardownStep {
    ScaleService,
    DeleteService,
    ListTasks,
    DescribeTasks,
    StopTask,
    DeregisterTaskDefinition,
    DeleteTaskDefinition,
    DeleteListenerRule,
    DeleteTargetGroup,
    DeleteDnsRecord,
}

impl fmt::Display for TeardownStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::ScaleService => "scale service to zero",
            Self::DeleteService => "delete service",
            Self::ListTasks => "list tasks",
            Self::DescribeTasks => "describe tasks",
            Self::StopTask => "stop task",
            Self::DeregisterTaskDefinition => "deregister task definition",
            Self::DeleteTaskDefinition => "delete task definition",
            Self::DeleteListenerRule => "delete listener rule",
            Self::DeleteTargetGroup => "delete target group",
            Self::DeleteDnsRecord => "delete DNS record",
        };
        f.write_str(name)
    }
}

/// A teardown sub-step that failed and may have leaked an external resource
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TeardownFailure {
    pub step: TeardownStep,
    pub resource: String,
    pub error: String,
}

/// Aggregate outcome of a best-effort teardown
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TeardownReport {
    pub failures: Vec<TeardownFailure>,
    /// Benign conditions that were logged but not counted as failures
    pub warnings: Vec<String>,
}

impl TeardownReport {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }

    pub(crate) fn record(
        &mut self,
        step: TeardownStep,
        resource: impl Into<String>,
        error: impl fmt::Display,
    ) {
        let resource = resource.into();
        tracing::warn!("Teardown step '{}' failed for {}: {}", step, resource, error);
        self.failures.push(TeardownFailure {
            step,
            resource,
            error: error.to_string(),
        });
    }

    pub(crate) fn warn(&mut self, message: String) {
        tracing::warn!("{}", message);
        self.warnings.push(message);
    }
}
