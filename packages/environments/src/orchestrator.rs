// ABOUTME: Sequences routing, DNS, compute and persistence into environment create and destroy
// ABOUTME: Rolls back partial provisioning and reports every failed teardown step

use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::aws::AwsControlPlanes;
use crate::compute::ComputeManager;
use crate::config::{EnvironmentConfig, PriorityStrategy};
use crate::dns::DnsManager;
use crate::error::{ProvisionError, Result, StepError, StorageError};
use crate::naming::ResourceNames;
use crate::priority::{ProcessPriorityAllocator, RulePriorityAllocator};
use crate::routing::RoutingManager;
use crate::storage::{RecordStore, SqliteRecordStore};
use crate::types::{
    EnvironmentUrls, Project, ProvisionStep, ProvisionedEnvironment, ProvisioningRecord,
    TeardownReport, TeardownStep, Template, CONTROL_PORT, SERVING_PORT,
};

/// External resources a teardown should remove
///
/// Built from a stored record for `deprovision`, or from what one failed
/// `provision` call created for its rollback.
#[derive(Debug, Default)]
struct TeardownPlan {
    service: Option<String>,
    task_definition: Option<String>,
    listener_rules: Vec<String>,
    target_groups: Vec<String>,
    dns_records: Vec<String>,
}

impl TeardownPlan {
    fn for_record(record: &ProvisioningRecord, names: &ResourceNames) -> Self {
        Self {
            // The service name is deterministic, so it is torn down even when its id was never stored
            service: Some(names.service_name.clone()),
            task_definition: record.task_definition_id.clone(),
            listener_rules: [&record.listener_rule1_id, &record.listener_rule2_id]
                .into_iter()
                .flatten()
                .cloned()
                .collect(),
            target_groups: [&record.target_group1_id, &record.target_group2_id]
                .into_iter()
                .flatten()
                .cloned()
                .collect(),
            dns_records: vec![
                names.backend_subdomain.clone(),
                names.frontend_subdomain.clone(),
            ],
        }
    }

    fn is_empty(&self) -> bool {
        self.service.is_none()
            && self.task_definition.is_none()
            && self.listener_rules.is_empty()
            && self.target_groups.is_empty()
            && self.dns_records.is_empty()
    }
}

/// State of one `provision` call while its resources are being created
struct ProvisionAttempt {
    record: ProvisioningRecord,
    created: TeardownPlan,
    dns_warnings: Vec<String>,
}

enum AttemptError {
    Step(ProvisionStep, StepError),
    Storage(StorageError),
}

impl From<StorageError> for AttemptError {
    fn from(error: StorageError) -> Self {
        AttemptError::Storage(error)
    }
}

fn failed<E: Into<StepError>>(step: ProvisionStep) -> impl FnOnce(E) -> AttemptError {
    move |error| AttemptError::Step(step, error.into())
}

fn require_id(value: &str, what: &str) -> Result<String> {
    let value = value.trim();
    if value.is_empty() {
        return Err(ProvisionError::InvalidRequest(format!("{} is required", what)));
    }
    Ok(value.to_string())
}

/// Creates and destroys per-project environments
///
/// Calls for the same project must be serialized by the caller; calls for
/// different projects may run concurrently.
pub struct EnvironmentOrchestrator {
    store: Arc<dyn RecordStore>,
    compute: ComputeManager,
    routing: RoutingManager,
    dns: DnsManager,
    listener_arn: String,
    lb_domain: String,
    base_domain: String,
}

impl EnvironmentOrchestrator {
    pub fn new(
        config: &EnvironmentConfig,
        planes: AwsControlPlanes,
        store: Arc<dyn RecordStore>,
        priorities: Arc<dyn RulePriorityAllocator>,
    ) -> Self {
        Self {
            store,
            compute: ComputeManager::new(planes.compute, config.compute.clone()),
            routing: RoutingManager::new(planes.load_balancer, priorities, &config.vpc_id),
            dns: DnsManager::new(planes.dns, &config.hosted_zone_id),
            listener_arn: config.listener_arn.clone(),
            lb_domain: config.lb_domain.clone(),
            base_domain: config.base_domain.clone(),
        }
    }

    /// Open the record store and the AWS clients described by `config`
    pub async fn connect(config: &EnvironmentConfig) -> Result<Self> {
        let store = SqliteRecordStore::connect(&config.database_url).await?;

        let priorities: Arc<dyn RulePriorityAllocator> = match config.priority_strategy {
            PriorityStrategy::Stored => Arc::new(store.priority_allocator()),
            PriorityStrategy::Process => Arc::new(ProcessPriorityAllocator::new()),
        };
        debug!("Using {} rule priority strategy", config.priority_strategy);

        let planes = AwsControlPlanes::connect(&config.aws).await;

        Ok(Self::new(config, planes, Arc::new(store), priorities))
    }

    fn names(&self, project_id: &str) -> ResourceNames {
        ResourceNames::for_project(project_id, &self.base_domain)
    }

    /// Public URLs the project's environment is (or would be) served at
    pub fn urls(&self, project_id: &str) -> EnvironmentUrls {
        self.names(project_id).urls()
    }

    /// Current provisioning record of a project, if it has live infrastructure
    pub async fn status(&self, project_id: &str) -> Result<Option<ProvisioningRecord>> {
        Ok(self.store.get(project_id).await?)
    }

    pub async fn create_environment(
        &self,
        project_id: &str,
        user_id: &str,
        template: &str,
    ) -> Result<ProvisionedEnvironment> {
        self.provision(project_id, user_id, template).await
    }

    /// Provision for a project loaded by the project creation flow
    pub async fn provision_project(&self, project: &Project) -> Result<ProvisionedEnvironment> {
        self.provision(&project.id, &project.user_id, project.template.as_str())
            .await
    }

    pub async fn destroy_environment(&self, project_id: &str) -> Result<TeardownReport> {
        self.deprovision(project_id).await
    }

    /// Create (or replace) the environment of a project
    ///
    /// If any creation step fails, the resources this call created are torn
    /// down again. The record is removed when that rollback is clean and kept
    /// otherwise, so a later `deprovision` can finish the cleanup.
    pub async fn provision(
        &self,
        project_id: &str,
        user_id: &str,
        template: &str,
    ) -> Result<ProvisionedEnvironment> {
        let project_id = require_id(project_id, "project id")?;
        let user_id = require_id(user_id, "user id")?;
        let template: Template = template.parse()?;
        let names = self.names(&project_id);

        info!(
            "Provisioning environment for project {} (user {}, template {})",
            project_id, user_id, template
        );

        let replaced = if self.store.get(&project_id).await?.is_some() {
            info!("Project {} already has an environment, replacing it", project_id);
            Some(self.deprovision(&project_id).await?)
        } else {
            None
        };

        let mut attempt = ProvisionAttempt {
            record: self.store.create(&project_id).await?,
            created: TeardownPlan::default(),
            dns_warnings: Vec::new(),
        };

        match self
            .create_resources(&names, &user_id, &project_id, template, &mut attempt)
            .await
        {
            Ok(()) => {
                info!(
                    "Environment for project {} provisioned at {}",
                    project_id, names.frontend_subdomain
                );
                Ok(ProvisionedEnvironment {
                    record: attempt.record,
                    urls: names.urls(),
                    dns_warnings: attempt.dns_warnings,
                    replaced,
                })
            }
            Err(AttemptError::Step(step, source)) => {
                error!(
                    "Provisioning project {} failed while {}: {}",
                    project_id, step, source
                );
                let rollback = self.roll_back(&project_id, &attempt.created).await;
                Err(ProvisionError::Step {
                    step,
                    source,
                    rollback,
                })
            }
            Err(AttemptError::Storage(source)) => {
                error!(
                    "Provisioning project {} failed to persist its record: {}",
                    project_id, source
                );
                let rollback = self.roll_back(&project_id, &attempt.created).await;
                Err(ProvisionError::RecordPersistence { source, rollback })
            }
        }
    }

    async fn persist(
        &self,
        attempt: &mut ProvisionAttempt,
    ) -> std::result::Result<(), StorageError> {
        attempt.record = self.store.update(&attempt.record).await?;
        Ok(())
    }

    async fn create_resources(
        &self,
        names: &ResourceNames,
        user_id: &str,
        project_id: &str,
        template: Template,
        attempt: &mut ProvisionAttempt,
    ) -> std::result::Result<(), AttemptError> {
        let target_group1 = self
            .routing
            .create_target_group(&names.target_group_name1, CONTROL_PORT)
            .await
            .map_err(failed(ProvisionStep::CreateControlTargetGroup))?;
        attempt.created.target_groups.push(target_group1.clone());
        attempt.record.target_group1_id = Some(target_group1.clone());
        self.persist(attempt).await?;

        let target_group2 = self
            .routing
            .create_target_group(&names.target_group_name2, SERVING_PORT)
            .await
            .map_err(failed(ProvisionStep::CreateServingTargetGroup))?;
        attempt.created.target_groups.push(target_group2.clone());
        attempt.record.target_group2_id = Some(target_group2.clone());
        self.persist(attempt).await?;

        let rule1 = self
            .routing
            .create_listener_rule(&self.listener_arn, &names.backend_subdomain, &target_group1)
            .await
            .map_err(failed(ProvisionStep::CreateBackendRule))?;
        attempt.created.listener_rules.push(rule1.clone());
        attempt.record.listener_rule1_id = Some(rule1);
        self.persist(attempt).await?;

        let rule2 = self
            .routing
            .create_listener_rule(&self.listener_arn, &names.frontend_subdomain, &target_group2)
            .await
            .map_err(failed(ProvisionStep::CreateFrontendRule))?;
        attempt.created.listener_rules.push(rule2.clone());
        attempt.record.listener_rule2_id = Some(rule2);
        self.persist(attempt).await?;

        // A record that fails to update leaves the environment running but unresolvable
        for subdomain in [&names.backend_subdomain, &names.frontend_subdomain] {
            match self.dns.upsert_record(subdomain, &self.lb_domain).await {
                Ok(_) => attempt.created.dns_records.push(subdomain.clone()),
                Err(e) => {
                    warn!("DNS record {} was not updated: {}", subdomain, e);
                    attempt.dns_warnings.push(format!("{}: {}", subdomain, e));
                }
            }
        }

        let task_definition = self
            .compute
            .register_task_definition(names, user_id, project_id, template)
            .await
            .map_err(failed(ProvisionStep::RegisterTaskDefinition))?;
        attempt.created.task_definition = Some(task_definition.clone());
        attempt.record.task_definition_id = Some(task_definition);
        self.persist(attempt).await?;

        // The service may exist even when its creation reports an error, so
        // rollback always tears it down by name
        attempt.created.service = Some(names.service_name.clone());
        let service = self
            .compute
            .create_service(names, &target_group1, CONTROL_PORT, &target_group2, SERVING_PORT)
            .await
            .map_err(failed(ProvisionStep::CreateService))?;
        attempt.record.service_id = Some(service);
        self.persist(attempt).await?;

        Ok(())
    }

    async fn roll_back(&self, project_id: &str, created: &TeardownPlan) -> TeardownReport {
        if created.is_empty() {
            debug!("Nothing to roll back for project {}", project_id);
        } else {
            info!("Rolling back partial environment of project {}", project_id);
        }

        let report = self.teardown(created).await;

        if report.is_clean() {
            if let Err(e) = self.store.delete(project_id).await {
                error!(
                    "Failed to delete provisioning record of project {} after rollback: {}",
                    project_id, e
                );
            }
        } else {
            warn!(
                "Rollback of project {} left {} resources behind; keeping its record",
                project_id,
                report.failures.len()
            );
        }

        report
    }

    /// Tear down the environment of a project and delete its record
    ///
    /// Every step is attempted even when earlier ones fail; failures are
    /// collected in the returned report. A project without a record is a
    /// no-op. Only record store failures are returned as errors.
    pub async fn deprovision(&self, project_id: &str) -> Result<TeardownReport> {
        let Some(record) = self.store.get(project_id).await? else {
            info!("Project {} has no environment to tear down", project_id);
            return Ok(TeardownReport::default());
        };

        info!("Tearing down environment of project {}", project_id);

        let names = self.names(project_id);
        let report = self
            .teardown(&TeardownPlan::for_record(&record, &names))
            .await;

        self.store.delete(project_id).await?;

        if report.is_clean() {
            info!("Environment of project {} torn down", project_id);
        } else {
            warn!(
                "Environment of project {} torn down with {} failed steps",
                project_id,
                report.failures.len()
            );
        }

        Ok(report)
    }

    async fn teardown(&self, plan: &TeardownPlan) -> TeardownReport {
        let mut report = TeardownReport::default();

        if let Some(service) = &plan.service {
            // Deletion is forced, so it proceeds even if scaling down failed
            if let Err(e) = self.compute.scale_to_zero(service).await {
                report.record(TeardownStep::ScaleService, service.as_str(), e);
            }
            if let Err(e) = self.compute.delete_service(service).await {
                report.record(TeardownStep::DeleteService, service.as_str(), e);
            }

            match self.compute.list_and_stop_tasks(service).await {
                Ok(outcome) => {
                    for e in outcome.undescribed {
                        report.record(TeardownStep::DescribeTasks, self.compute.cluster(), e);
                    }
                    for (task_arn, e) in outcome.failed {
                        report.record(TeardownStep::StopTask, task_arn, e);
                    }
                }
                Err(e) => report.record(TeardownStep::ListTasks, self.compute.cluster(), e),
            }
        }

        if let Some(task_definition) = &plan.task_definition {
            for (step, e) in self
                .compute
                .deregister_and_delete_task_definition(task_definition)
                .await
            {
                report.record(step, task_definition.as_str(), e);
            }
        }

        for rule in &plan.listener_rules {
            if let Err(e) = self.routing.delete_listener_rule(rule).await {
                report.record(TeardownStep::DeleteListenerRule, rule.as_str(), e);
            }
        }

        for target_group in &plan.target_groups {
            if let Err(e) = self.routing.delete_target_group(target_group).await {
                report.record(TeardownStep::DeleteTargetGroup, target_group.as_str(), e);
            }
        }

        for subdomain in &plan.dns_records {
            match self.dns.delete_record(subdomain, &self.lb_domain).await {
                Ok(_) => {}
                Err(e) if e.is_benign_on_delete() => {
                    report.warn(format!("DNS record {} was not deleted: {}", subdomain, e));
                }
                Err(e) => report.record(TeardownStep::DeleteDnsRecord, subdomain.as_str(), e),
            }
        }

        report
    }
}
