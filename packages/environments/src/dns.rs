// ABOUTME: DNS record management for project subdomains
// ABOUTME: Upserts and deletes CNAME records pointing at the shared load balancer

use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::error::DnsError;

/// TTL of every record this package writes
pub const RECORD_TTL_SECONDS: i64 = 300;

type Result<T> = std::result::Result<T, DnsError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeAction {
    Upsert,
    Delete,
}

impl ChangeAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Upsert => "UPSERT",
            Self::Delete => "DELETE",
        }
    }
}

impl fmt::Display for ChangeAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One CNAME change against the managed zone
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CnameChange {
    pub hosted_zone_id: String,
    pub action: ChangeAction,
    pub name: String,
    pub target: String,
    pub ttl: i64,
}

/// DNS control plane operations
#[async_trait]
pub trait DnsApi: Send + Sync {
    /// Submit a change and return the change id
    async fn change_cname(&self, change: &CnameChange) -> Result<String>;
}

pub struct DnsManager {
    api: Arc<dyn DnsApi>,
    hosted_zone_id: String,
}

impl DnsManager {
    pub fn new(api: Arc<dyn DnsApi>, hosted_zone_id: impl Into<String>) -> Self {
        Self {
            api,
            hosted_zone_id: hosted_zone_id.into(),
        }
    }

    fn change(&self, action: ChangeAction, subdomain: &str, target: &str) -> CnameChange {
        CnameChange {
            hosted_zone_id: self.hosted_zone_id.clone(),
            action,
            name: subdomain.to_string(),
            target: target.to_string(),
            ttl: RECORD_TTL_SECONDS,
        }
    }

    /// Point `subdomain` at `target`, creating or replacing the record
    pub async fn upsert_record(&self, subdomain: &str, target: &str) -> Result<String> {
        debug!("Upserting CNAME {} -> {}", subdomain, target);

        let change = self.change(ChangeAction::Upsert, subdomain, target);
        let change_id = self.api.change_cname(&change).await.map_err(|e| {
            error!("Failed to upsert DNS record {}: {}", subdomain, e);
            e
        })?;

        info!("DNS record {} updated ({})", subdomain, change_id);
        Ok(change_id)
    }

    /// Remove the CNAME for `subdomain`
    ///
    /// The vendor only deletes an exact match, so a changed or missing record
    /// yields `DnsError::RecordMismatch`.
    pub async fn delete_record(&self, subdomain: &str, target: &str) -> Result<String> {
        debug!("Deleting CNAME {} -> {}", subdomain, target);

        let change = self.change(ChangeAction::Delete, subdomain, target);
        match self.api.change_cname(&change).await {
            Ok(change_id) => {
                info!("DNS record {} deleted ({})", subdomain, change_id);
                Ok(change_id)
            }
            Err(e) => {
                warn!("Failed to delete DNS record {}: {}", subdomain, e);
                Err(e)
            }
        }
    }
}
