// ABOUTME: ELBv2 implementation of the routing control plane
// ABOUTME: IP target groups and host-header forward rules on the shared listener

use async_trait::async_trait;
use aws_sdk_elasticloadbalancingv2::error::{DisplayErrorContext, ProvideErrorMetadata, SdkError};
use aws_sdk_elasticloadbalancingv2::types::{
    Action, ActionTypeEnum, ProtocolEnum, RuleCondition, TargetTypeEnum,
};
use aws_sdk_elasticloadbalancingv2::Client;
use std::fmt::Debug;

use crate::error::RoutingError;
use crate::routing::{ListenerRuleSpec, LoadBalancerApi, TargetGroupSpec};

type Result<T> = std::result::Result<T, RoutingError>;

const HOST_HEADER_FIELD: &str = "host-header";

fn classify<E, R>(operation: &str, error: SdkError<E, R>, priority: Option<i32>) -> RoutingError
where
    E: ProvideErrorMetadata + std::error::Error + 'static,
    R: Debug,
{
    let code = error
        .as_service_error()
        .and_then(|e| e.code())
        .map(str::to_string);
    let message = format!("{}: {}", operation, DisplayErrorContext(&error));
    RoutingError::from_code(code.as_deref(), message, priority)
}

pub struct ElbLoadBalancerApi {
    client: Client,
}

impl ElbLoadBalancerApi {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl LoadBalancerApi for ElbLoadBalancerApi {
    async fn create_target_group(&self, spec: &TargetGroupSpec) -> Result<String> {
        let output = self
            .client
            .create_target_group()
            .name(&spec.name)
            .port(i32::from(spec.port))
            .protocol(ProtocolEnum::Http)
            .vpc_id(&spec.vpc_id)
            .target_type(TargetTypeEnum::Ip)
            .health_check_port(spec.health_check_port.to_string())
            .send()
            .await
            .map_err(|e| classify("CreateTargetGroup", e, None))?;

        output
            .target_groups()
            .first()
            .and_then(|group| group.target_group_arn())
            .map(str::to_string)
            .ok_or(RoutingError::MissingIdentifier("target group ARN"))
    }

    async fn delete_target_group(&self, target_group_arn: &str) -> Result<()> {
        self.client
            .delete_target_group()
            .target_group_arn(target_group_arn)
            .send()
            .await
            .map_err(|e| classify("DeleteTargetGroup", e, None))?;
        Ok(())
    }

    async fn create_rule(&self, spec: &ListenerRuleSpec) -> Result<String> {
        let action = Action::builder()
            .r#type(ActionTypeEnum::Forward)
            .target_group_arn(&spec.target_group_arn)
            .build();

        let condition = RuleCondition::builder()
            .field(HOST_HEADER_FIELD)
            .values(&spec.host_header)
            .build();

        let output = self
            .client
            .create_rule()
            .listener_arn(&spec.listener_arn)
            .priority(spec.priority)
            .actions(action)
            .conditions(condition)
            .send()
            .await
            .map_err(|e| classify("CreateRule", e, Some(spec.priority)))?;

        output
            .rules()
            .first()
            .and_then(|rule| rule.rule_arn())
            .map(str::to_string)
            .ok_or(RoutingError::MissingIdentifier("listener rule ARN"))
    }

    async fn delete_rule(&self, rule_arn: &str) -> Result<()> {
        self.client
            .delete_rule()
            .rule_arn(rule_arn)
            .send()
            .await
            .map_err(|e| classify("DeleteRule", e, None))?;
        Ok(())
    }
}
