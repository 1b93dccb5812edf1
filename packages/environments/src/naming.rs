// ABOUTME: Deterministic resource naming for per-project environments
// ABOUTME: Derives service, task, target group and subdomain names from the project identifier

use sha2::{Digest, Sha256};

use crate::types::EnvironmentUrls;

/// Maximum length the load balancer accepts for a target group name
const TARGET_GROUP_NAME_MAX: usize = 32;

/// Hex characters of the project digest used in target group names
const TARGET_GROUP_DIGEST_LEN: usize = 24;

/// Task group the scheduler assigns to tasks launched by `service_name`
pub fn service_group(service_name: &str) -> String {
    format!("service:{}", service_name)
}

/// Names of every external resource belonging to one project
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceNames {
    pub service_name: String,
    pub task_family: String,
    pub container_name: String,
    /// Target group for the control port
    pub target_group_name1: String,
    /// Target group for the serving port
    pub target_group_name2: String,
    pub backend_subdomain: String,
    pub frontend_subdomain: String,
}

impl ResourceNames {
    /// Derive all names from the project's unique identifier
    ///
    /// Target group names are capped at 32 characters by the vendor, so they use a
    /// digest of the project id instead of the id itself.
    pub fn for_project(project_id: &str, base_domain: &str) -> Self {
        let digest = hex::encode(Sha256::digest(project_id.as_bytes()));
        let short = &digest[..TARGET_GROUP_DIGEST_LEN];

        Self {
            service_name: format!("{}-service", project_id),
            task_family: format!("{}-task", project_id),
            container_name: format!("{}-container", project_id),
            target_group_name1: format!("{}-ctl", short),
            target_group_name2: format!("{}-web", short),
            backend_subdomain: format!("{}-back.{}", project_id, base_domain),
            frontend_subdomain: format!("{}.{}", project_id, base_domain),
        }
    }

    pub fn urls(&self) -> EnvironmentUrls {
        EnvironmentUrls {
            backend: format!("https://{}", self.backend_subdomain),
            frontend: format!("https://{}", self.frontend_subdomain),
        }
    }
}
