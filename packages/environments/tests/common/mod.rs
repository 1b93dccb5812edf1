// ABOUTME: Common test utilities for provisioning integration tests
// ABOUTME: In-memory recording control planes with failure injection and an in-memory record store

#![allow(dead_code)]

use async_trait::async_trait;
use invoker_environments::compute::{ServiceSpec, TaskDefinitionSpec};
use invoker_environments::dns::{ChangeAction, CnameChange};
use invoker_environments::routing::{ListenerRuleSpec, TargetGroupSpec};
use invoker_environments::{
    AwsControlPlanes, ComputeApi, ComputeError, ComputeSettings, DnsApi, DnsError,
    EnvironmentConfig, EnvironmentOrchestrator, LoadBalancerApi, PriorityStrategy,
    ProvisioningRecord, RecordStore, RoutingError, SqliteRecordStore, StorageError, TaskSummary,
};
use invoker_environments::config::AwsSettings;
use std::collections::{BTreeMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

pub const LB_DOMAIN: &str = "shared-lb-123.ap-south-1.elb.amazonaws.com";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuleState {
    pub host_header: String,
    pub target_group_arn: String,
    pub priority: i32,
}

#[derive(Debug, Default)]
pub struct CloudState {
    /// Every control plane call, in order
    pub calls: Vec<String>,
    /// Operations that fail with a generic API error while listed
    pub failing: HashSet<String>,
    /// Operations that take effect but still report an error while listed
    pub failing_after_effect: HashSet<String>,
    /// Target group ARN to name
    pub target_groups: BTreeMap<String, String>,
    pub rules: BTreeMap<String, RuleState>,
    /// Priorities held by rules this fake did not create
    pub reserved_priorities: HashSet<i32>,
    /// CNAME name to target
    pub dns_records: BTreeMap<String, String>,
    /// Task definition ARN to family, active ones only
    pub task_definitions: BTreeMap<String, String>,
    /// Service name to desired count
    pub services: BTreeMap<String, i32>,
    pub tasks: Vec<TaskSummary>,
    next_id: u32,
}

impl CloudState {
    fn next_arn(&mut self, kind: &str) -> String {
        self.next_id += 1;
        format!("arn:aws:{}/{}", kind, self.next_id)
    }

    fn call(&mut self, operation: &str, detail: &str) -> bool {
        self.calls.push(format!("{} {}", operation, detail));
        self.failing.contains(operation)
    }
}

/// Recording stand-in for ECS, ELBv2 and Route53
#[derive(Clone, Default)]
pub struct FakeCloud {
    state: Arc<Mutex<CloudState>>,
}

impl FakeCloud {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> MutexGuard<'_, CloudState> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn planes(&self) -> AwsControlPlanes {
        AwsControlPlanes {
            compute: Arc::new(self.clone()),
            load_balancer: Arc::new(self.clone()),
            dns: Arc::new(self.clone()),
        }
    }

    pub fn fail(&self, operation: &str) {
        self.state().failing.insert(operation.to_string());
    }

    /// Make `operation` change the cloud and then return an error anyway
    pub fn fail_after_effect(&self, operation: &str) {
        self.state()
            .failing_after_effect
            .insert(operation.to_string());
    }

    pub fn heal(&self) {
        let mut state = self.state();
        state.failing.clear();
        state.failing_after_effect.clear();
    }

    pub fn reserve_priority(&self, priority: i32) {
        self.state().reserved_priorities.insert(priority);
    }

    /// Run a task that belongs to some other service in the cluster
    pub fn add_task(&self, group: &str) -> String {
        let mut state = self.state();
        let arn = state.next_arn("ecs:task");
        state.tasks.push(TaskSummary {
            task_arn: arn.clone(),
            group: Some(group.to_string()),
        });
        arn
    }

    pub fn call_count(&self) -> usize {
        self.state().calls.len()
    }

    /// Calls recorded so far, in order, as "Operation detail"
    pub fn calls(&self) -> Vec<String> {
        self.state().calls.clone()
    }

    /// Operation names recorded so far, in order
    pub fn operations(&self) -> Vec<String> {
        self.state()
            .calls
            .iter()
            .map(|call| call.split(' ').next().unwrap_or_default().to_string())
            .collect()
    }

    pub fn clear_calls(&self) {
        self.state().calls.clear();
    }

    pub fn calls_to(&self, operation: &str) -> usize {
        let prefix = format!("{} ", operation);
        self.state()
            .calls
            .iter()
            .filter(|call| call.starts_with(&prefix))
            .count()
    }

    pub fn rule_priorities(&self) -> Vec<i32> {
        self.state().rules.values().map(|rule| rule.priority).collect()
    }

    pub fn rule_for_host(&self, host: &str) -> Option<RuleState> {
        self.state()
            .rules
            .values()
            .find(|rule| rule.host_header == host)
            .cloned()
    }

    /// True when nothing created by provisioning is left
    pub fn is_empty(&self) -> bool {
        let state = self.state();
        state.target_groups.is_empty()
            && state.rules.is_empty()
            && state.dns_records.is_empty()
            && state.task_definitions.is_empty()
            && state.services.is_empty()
    }
}

fn api_failure(operation: &str) -> String {
    format!("{}: injected failure", operation)
}

#[async_trait]
impl ComputeApi for FakeCloud {
    async fn register_task_definition(
        &self,
        spec: &TaskDefinitionSpec,
    ) -> Result<String, ComputeError> {
        let mut state = self.state();
        if state.call("RegisterTaskDefinition", &spec.family) {
            return Err(ComputeError::Api(api_failure("RegisterTaskDefinition")));
        }
        let arn = state.next_arn(&format!("ecs:task-definition/{}", spec.family));
        state
            .task_definitions
            .insert(arn.clone(), spec.family.clone());
        Ok(arn)
    }

    async fn deregister_task_definition(
        &self,
        task_definition_arn: &str,
    ) -> Result<(), ComputeError> {
        let mut state = self.state();
        if state.call("DeregisterTaskDefinition", task_definition_arn) {
            return Err(ComputeError::Api(api_failure("DeregisterTaskDefinition")));
        }
        Ok(())
    }

    async fn delete_task_definition(&self, task_definition_arn: &str) -> Result<(), ComputeError> {
        let mut state = self.state();
        if state.call("DeleteTaskDefinitions", task_definition_arn) {
            return Err(ComputeError::Api(api_failure("DeleteTaskDefinitions")));
        }
        state.task_definitions.remove(task_definition_arn);
        Ok(())
    }

    async fn create_service(&self, spec: &ServiceSpec) -> Result<String, ComputeError> {
        let mut state = self.state();
        if state.call("CreateService", &spec.service_name) {
            return Err(ComputeError::Api(api_failure("CreateService")));
        }
        if state.services.contains_key(&spec.service_name) {
            return Err(ComputeError::InvalidRequest(format!(
                "service {} already exists",
                spec.service_name
            )));
        }
        for lb in &spec.load_balancers {
            if !state.target_groups.contains_key(&lb.target_group_arn) {
                return Err(ComputeError::InvalidRequest(format!(
                    "target group {} does not exist",
                    lb.target_group_arn
                )));
            }
        }

        state
            .services
            .insert(spec.service_name.clone(), spec.desired_count);
        for _ in 0..spec.desired_count {
            let task_arn = state.next_arn("ecs:task");
            state.tasks.push(TaskSummary {
                task_arn,
                group: Some(format!("service:{}", spec.service_name)),
            });
        }
        if state.failing_after_effect.contains("CreateService") {
            return Err(ComputeError::MissingIdentifier("service ARN"));
        }
        Ok(state.next_arn(&format!("ecs:service/{}", spec.service_name)))
    }

    async fn update_desired_count(
        &self,
        _cluster: &str,
        service: &str,
        count: i32,
    ) -> Result<(), ComputeError> {
        let mut state = self.state();
        if state.call("UpdateService", service) {
            return Err(ComputeError::Api(api_failure("UpdateService")));
        }
        match state.services.get_mut(service) {
            Some(desired) => {
                *desired = count;
                Ok(())
            }
            None => Err(ComputeError::NotFound(format!("service {}", service))),
        }
    }

    async fn delete_service(
        &self,
        _cluster: &str,
        service: &str,
        _force: bool,
    ) -> Result<(), ComputeError> {
        let mut state = self.state();
        if state.call("DeleteService", service) {
            return Err(ComputeError::Api(api_failure("DeleteService")));
        }
        match state.services.remove(service) {
            Some(_) => Ok(()),
            None => Err(ComputeError::NotFound(format!("service {}", service))),
        }
    }

    async fn list_task_arns(&self, cluster: &str) -> Result<Vec<String>, ComputeError> {
        let mut state = self.state();
        if state.call("ListTasks", cluster) {
            return Err(ComputeError::Api(api_failure("ListTasks")));
        }
        Ok(state.tasks.iter().map(|task| task.task_arn.clone()).collect())
    }

    async fn describe_tasks(
        &self,
        cluster: &str,
        task_arns: &[String],
    ) -> Result<Vec<TaskSummary>, ComputeError> {
        let mut state = self.state();
        if state.call("DescribeTasks", cluster) {
            return Err(ComputeError::Api(api_failure("DescribeTasks")));
        }
        Ok(state
            .tasks
            .iter()
            .filter(|task| task_arns.contains(&task.task_arn))
            .cloned()
            .collect())
    }

    async fn stop_task(
        &self,
        _cluster: &str,
        task_arn: &str,
        _reason: &str,
    ) -> Result<(), ComputeError> {
        let mut state = self.state();
        if state.call("StopTask", task_arn) {
            return Err(ComputeError::Api(api_failure("StopTask")));
        }
        state.tasks.retain(|task| task.task_arn != task_arn);
        Ok(())
    }
}

#[async_trait]
impl LoadBalancerApi for FakeCloud {
    async fn create_target_group(&self, spec: &TargetGroupSpec) -> Result<String, RoutingError> {
        let mut state = self.state();
        if state.call("CreateTargetGroup", &format!("{}:{}", spec.name, spec.port)) {
            return Err(RoutingError::Api(api_failure("CreateTargetGroup")));
        }
        if state.target_groups.values().any(|name| name == &spec.name) {
            return Err(RoutingError::Conflict(format!(
                "target group {} already exists",
                spec.name
            )));
        }
        let arn = state.next_arn(&format!("elasticloadbalancing:targetgroup/{}", spec.name));
        state.target_groups.insert(arn.clone(), spec.name.clone());
        Ok(arn)
    }

    async fn delete_target_group(&self, target_group_arn: &str) -> Result<(), RoutingError> {
        let mut state = self.state();
        if state.call("DeleteTargetGroup", target_group_arn) {
            return Err(RoutingError::Api(api_failure("DeleteTargetGroup")));
        }
        if state
            .rules
            .values()
            .any(|rule| rule.target_group_arn == target_group_arn)
        {
            return Err(RoutingError::Conflict(format!(
                "target group {} is in use by a listener rule",
                target_group_arn
            )));
        }
        match state.target_groups.remove(target_group_arn) {
            Some(_) => Ok(()),
            None => Err(RoutingError::NotFound(target_group_arn.to_string())),
        }
    }

    async fn create_rule(&self, spec: &ListenerRuleSpec) -> Result<String, RoutingError> {
        let mut state = self.state();
        if state.call("CreateRule", &spec.host_header) {
            return Err(RoutingError::Api(api_failure("CreateRule")));
        }
        let taken = state.reserved_priorities.contains(&spec.priority)
            || state.rules.values().any(|rule| rule.priority == spec.priority);
        if taken {
            return Err(RoutingError::PriorityInUse(spec.priority));
        }
        if !state.target_groups.contains_key(&spec.target_group_arn) {
            return Err(RoutingError::NotFound(spec.target_group_arn.clone()));
        }
        let arn = state.next_arn("elasticloadbalancing:listener-rule");
        state.rules.insert(
            arn.clone(),
            RuleState {
                host_header: spec.host_header.clone(),
                target_group_arn: spec.target_group_arn.clone(),
                priority: spec.priority,
            },
        );
        Ok(arn)
    }

    async fn delete_rule(&self, rule_arn: &str) -> Result<(), RoutingError> {
        let mut state = self.state();
        if state.call("DeleteRule", rule_arn) {
            return Err(RoutingError::Api(api_failure("DeleteRule")));
        }
        match state.rules.remove(rule_arn) {
            Some(_) => Ok(()),
            None => Err(RoutingError::NotFound(rule_arn.to_string())),
        }
    }
}

#[async_trait]
impl DnsApi for FakeCloud {
    async fn change_cname(&self, change: &CnameChange) -> Result<String, DnsError> {
        let mut state = self.state();
        let operation = format!("ChangeResourceRecordSets:{}", change.action);
        if state.call(&operation, &change.name) {
            return Err(DnsError::Api(api_failure(&operation)));
        }

        match change.action {
            ChangeAction::Upsert => {
                state
                    .dns_records
                    .insert(change.name.clone(), change.target.clone());
            }
            ChangeAction::Delete => {
                if state.dns_records.get(&change.name) != Some(&change.target) {
                    return Err(DnsError::RecordMismatch(format!(
                        "record {} not found with value {}",
                        change.name, change.target
                    )));
                }
                state.dns_records.remove(&change.name);
            }
        }

        Ok(state.next_arn("route53:change"))
    }
}

pub fn test_config() -> EnvironmentConfig {
    EnvironmentConfig {
        aws: AwsSettings {
            region: Some("ap-south-1".to_string()),
            credentials: None,
        },
        compute: ComputeSettings {
            cluster: "test-cluster".to_string(),
            image: "registry.example.com/sandbox:latest".to_string(),
            execution_role_arn: "arn:aws:iam::123456789012:role/ecsTaskExecutionRole".to_string(),
            subnets: vec!["subnet-1".to_string(), "subnet-2".to_string()],
            security_group: "sg-1".to_string(),
        },
        vpc_id: "vpc-1".to_string(),
        listener_arn: "arn:aws:elasticloadbalancing:listener/shared".to_string(),
        lb_domain: LB_DOMAIN.to_string(),
        hosted_zone_id: "Z0000000000001".to_string(),
        base_domain: "invok3r.xyz".to_string(),
        database_url: "sqlite::memory:".to_string(),
        priority_strategy: PriorityStrategy::Stored,
    }
}

/// Record store that can be told to reject updates
#[derive(Clone)]
pub struct FlakyStore {
    inner: SqliteRecordStore,
    fail_updates: Arc<AtomicBool>,
}

impl FlakyStore {
    pub fn new(inner: SqliteRecordStore) -> Self {
        Self {
            inner,
            fail_updates: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn fail_updates(&self) {
        self.fail_updates.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl RecordStore for FlakyStore {
    async fn get(&self, project_id: &str) -> Result<Option<ProvisioningRecord>, StorageError> {
        self.inner.get(project_id).await
    }

    async fn create(&self, project_id: &str) -> Result<ProvisioningRecord, StorageError> {
        self.inner.create(project_id).await
    }

    async fn update(
        &self,
        record: &ProvisioningRecord,
    ) -> Result<ProvisioningRecord, StorageError> {
        if self.fail_updates.load(Ordering::SeqCst) {
            return Err(StorageError::Database(sqlx::Error::PoolTimedOut));
        }
        self.inner.update(record).await
    }

    async fn delete(&self, project_id: &str) -> Result<bool, StorageError> {
        self.inner.delete(project_id).await
    }
}

/// Test context holding the orchestrator and handles to its fake cloud and store
pub struct TestContext {
    pub orchestrator: EnvironmentOrchestrator,
    pub cloud: FakeCloud,
    pub store: SqliteRecordStore,
    /// The store the orchestrator writes through
    pub records: FlakyStore,
}

/// Create an orchestrator over a fresh fake cloud and in-memory database
pub async fn setup() -> TestContext {
    let config = test_config();
    let store = SqliteRecordStore::connect(&config.database_url)
        .await
        .expect("Failed to create in-memory store");
    let cloud = FakeCloud::new();
    let records = FlakyStore::new(store.clone());

    let orchestrator = EnvironmentOrchestrator::new(
        &config,
        cloud.planes(),
        Arc::new(records.clone()),
        Arc::new(store.priority_allocator()),
    );

    TestContext {
        orchestrator,
        cloud,
        store,
        records,
    }
}
