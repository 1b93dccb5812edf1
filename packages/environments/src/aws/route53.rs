// ABOUTME: Route53 implementation of the DNS control plane
// ABOUTME: Submits single-record CNAME change batches to the managed hosted zone

use async_trait::async_trait;
use aws_sdk_route53::error::{DisplayErrorContext, ProvideErrorMetadata, SdkError};
use aws_sdk_route53::types::{
    Change, ChangeAction as Route53ChangeAction, ChangeBatch, ResourceRecord, ResourceRecordSet,
    RrType,
};
use aws_sdk_route53::Client;
use std::fmt::Debug;

use crate::dns::{ChangeAction, CnameChange, DnsApi};
use crate::error::DnsError;

type Result<T> = std::result::Result<T, DnsError>;

const CHANGE_COMMENT: &str = "Update DNS record for subdomain";

fn classify<E, R>(error: SdkError<E, R>) -> DnsError
where
    E: ProvideErrorMetadata + std::error::Error + 'static,
    R: Debug,
{
    let code = error
        .as_service_error()
        .and_then(|e| e.code())
        .map(str::to_string);
    let message = format!("ChangeResourceRecordSets: {}", DisplayErrorContext(&error));
    DnsError::from_code(code.as_deref(), message)
}

pub struct Route53DnsApi {
    client: Client,
}

impl Route53DnsApi {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl DnsApi for Route53DnsApi {
    async fn change_cname(&self, change: &CnameChange) -> Result<String> {
        let action = match change.action {
            ChangeAction::Upsert => Route53ChangeAction::Upsert,
            ChangeAction::Delete => Route53ChangeAction::Delete,
        };

        let record_set = ResourceRecordSet::builder()
            .name(&change.name)
            .r#type(RrType::Cname)
            .ttl(change.ttl)
            .resource_records(ResourceRecord::builder().value(&change.target).build()?)
            .build()?;

        let batch = ChangeBatch::builder()
            .comment(CHANGE_COMMENT)
            .changes(
                Change::builder()
                    .action(action)
                    .resource_record_set(record_set)
                    .build()?,
            )
            .build()?;

        let output = self
            .client
            .change_resource_record_sets()
            .hosted_zone_id(&change.hosted_zone_id)
            .change_batch(batch)
            .send()
            .await
            .map_err(classify)?;

        output
            .change_info()
            .map(|info| info.id().to_string())
            .ok_or(DnsError::MissingIdentifier("change id"))
    }
}
