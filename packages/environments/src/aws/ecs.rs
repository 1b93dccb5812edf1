// ABOUTME: ECS implementation of the compute control plane
// ABOUTME: Fargate task definitions, services and task stops on a fixed cluster

use async_trait::async_trait;
use aws_sdk_ecs::error::{DisplayErrorContext, ProvideErrorMetadata, SdkError};
use aws_sdk_ecs::types::{
    ApplicationProtocol, AssignPublicIp, AwsVpcConfiguration, CapacityProviderStrategyItem,
    Compatibility, ContainerDefinition, KeyValuePair, LoadBalancer, NetworkConfiguration,
    NetworkMode, PortMapping, TransportProtocol,
};
use aws_sdk_ecs::Client;
use std::fmt::Debug;
use tracing::debug;

use crate::compute::{ComputeApi, ServiceSpec, TaskDefinitionSpec, TaskSummary};
use crate::error::ComputeError;

type Result<T> = std::result::Result<T, ComputeError>;

const FARGATE_CAPACITY_PROVIDER: &str = "FARGATE";

fn classify<E, R>(operation: &str, error: SdkError<E, R>) -> ComputeError
where
    E: ProvideErrorMetadata + std::error::Error + 'static,
    R: Debug,
{
    let code = error
        .as_service_error()
        .and_then(|e| e.code())
        .map(str::to_string);
    let message = format!("{}: {}", operation, DisplayErrorContext(&error));
    ComputeError::from_code(code.as_deref(), message)
}

pub struct EcsComputeApi {
    client: Client,
}

impl EcsComputeApi {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ComputeApi for EcsComputeApi {
    async fn register_task_definition(&self, spec: &TaskDefinitionSpec) -> Result<String> {
        let port_mappings = spec
            .container_ports
            .iter()
            .map(|port| {
                PortMapping::builder()
                    .container_port(i32::from(*port))
                    .protocol(TransportProtocol::Tcp)
                    .app_protocol(ApplicationProtocol::Http)
                    .build()
            })
            .collect();

        let environment = spec
            .environment
            .iter()
            .map(|(name, value)| KeyValuePair::builder().name(name).value(value).build())
            .collect();

        let container = ContainerDefinition::builder()
            .name(&spec.container_name)
            .image(&spec.image)
            .essential(true)
            .set_port_mappings(Some(port_mappings))
            .set_environment(Some(environment))
            .build();

        let output = self
            .client
            .register_task_definition()
            .family(&spec.family)
            .requires_compatibilities(Compatibility::Fargate)
            .network_mode(NetworkMode::Awsvpc)
            .memory(&spec.memory)
            .cpu(&spec.cpu)
            .execution_role_arn(&spec.execution_role_arn)
            .container_definitions(container)
            .send()
            .await
            .map_err(|e| classify("RegisterTaskDefinition", e))?;

        output
            .task_definition()
            .and_then(|definition| definition.task_definition_arn())
            .map(str::to_string)
            .ok_or(ComputeError::MissingIdentifier("task definition ARN"))
    }

    async fn deregister_task_definition(&self, task_definition_arn: &str) -> Result<()> {
        self.client
            .deregister_task_definition()
            .task_definition(task_definition_arn)
            .send()
            .await
            .map_err(|e| classify("DeregisterTaskDefinition", e))?;
        Ok(())
    }

    async fn delete_task_definition(&self, task_definition_arn: &str) -> Result<()> {
        let output = self
            .client
            .delete_task_definitions()
            .task_definitions(task_definition_arn)
            .send()
            .await
            .map_err(|e| classify("DeleteTaskDefinitions", e))?;

        // Per-definition failures come back in the body, not as an error
        if let Some(failure) = output.failures().first() {
            return Err(ComputeError::Api(format!(
                "DeleteTaskDefinitions: {} ({})",
                failure.reason().unwrap_or("unknown reason"),
                failure.detail().unwrap_or(task_definition_arn)
            )));
        }
        Ok(())
    }

    async fn create_service(&self, spec: &ServiceSpec) -> Result<String> {
        let capacity = CapacityProviderStrategyItem::builder()
            .capacity_provider(FARGATE_CAPACITY_PROVIDER)
            .weight(1)
            .base(0)
            .build()?;

        let assign_public_ip = if spec.assign_public_ip {
            AssignPublicIp::Enabled
        } else {
            AssignPublicIp::Disabled
        };

        let vpc = AwsVpcConfiguration::builder()
            .set_subnets(Some(spec.subnets.clone()))
            .set_security_groups(Some(spec.security_groups.clone()))
            .assign_public_ip(assign_public_ip)
            .build()?;

        let load_balancers = spec
            .load_balancers
            .iter()
            .map(|lb| {
                LoadBalancer::builder()
                    .target_group_arn(&lb.target_group_arn)
                    .container_name(&lb.container_name)
                    .container_port(i32::from(lb.container_port))
                    .build()
            })
            .collect();

        let output = self
            .client
            .create_service()
            .cluster(&spec.cluster)
            .service_name(&spec.service_name)
            .task_definition(&spec.task_definition)
            .desired_count(spec.desired_count)
            .capacity_provider_strategy(capacity)
            .network_configuration(
                NetworkConfiguration::builder()
                    .awsvpc_configuration(vpc)
                    .build(),
            )
            .set_load_balancers(Some(load_balancers))
            .send()
            .await
            .map_err(|e| classify("CreateService", e))?;

        output
            .service()
            .and_then(|service| service.service_arn())
            .map(str::to_string)
            .ok_or(ComputeError::MissingIdentifier("service ARN"))
    }

    async fn update_desired_count(&self, cluster: &str, service: &str, count: i32) -> Result<()> {
        self.client
            .update_service()
            .cluster(cluster)
            .service(service)
            .desired_count(count)
            .send()
            .await
            .map_err(|e| classify("UpdateService", e))?;
        Ok(())
    }

    async fn delete_service(&self, cluster: &str, service: &str, force: bool) -> Result<()> {
        self.client
            .delete_service()
            .cluster(cluster)
            .service(service)
            .force(force)
            .send()
            .await
            .map_err(|e| classify("DeleteService", e))?;
        Ok(())
    }

    async fn list_task_arns(&self, cluster: &str) -> Result<Vec<String>> {
        let mut task_arns = Vec::new();
        let mut next_token: Option<String> = None;

        loop {
            let output = self
                .client
                .list_tasks()
                .cluster(cluster)
                .set_next_token(next_token.take())
                .send()
                .await
                .map_err(|e| classify("ListTasks", e))?;

            task_arns.extend(output.task_arns().iter().cloned());

            match output.next_token() {
                Some(token) => next_token = Some(token.to_string()),
                None => break,
            }
        }

        Ok(task_arns)
    }

    async fn describe_tasks(&self, cluster: &str, task_arns: &[String]) -> Result<Vec<TaskSummary>> {
        if task_arns.is_empty() {
            return Ok(Vec::new());
        }

        let output = self
            .client
            .describe_tasks()
            .cluster(cluster)
            .set_tasks(Some(task_arns.to_vec()))
            .send()
            .await
            .map_err(|e| classify("DescribeTasks", e))?;

        for failure in output.failures() {
            debug!(
                "Could not describe task {}: {}",
                failure.arn().unwrap_or("<unknown>"),
                failure.reason().unwrap_or("unknown reason")
            );
        }

        Ok(output
            .tasks()
            .iter()
            .filter_map(|task| {
                task.task_arn().map(|arn| TaskSummary {
                    task_arn: arn.to_string(),
                    group: task.group().map(str::to_string),
                })
            })
            .collect())
    }

    async fn stop_task(&self, cluster: &str, task_arn: &str, reason: &str) -> Result<()> {
        self.client
            .stop_task()
            .cluster(cluster)
            .task(task_arn)
            .reason(reason)
            .send()
            .await
            .map_err(|e| classify("StopTask", e))?;
        Ok(())
    }
}
