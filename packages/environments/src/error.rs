// ABOUTME: Error types for environment provisioning
// ABOUTME: One taxonomy per control plane plus storage, configuration and orchestration failures

use thiserror::Error;

use crate::types::{ProvisionStep, TeardownReport};

/// Broad classification of a control-plane failure, derived from the vendor error code
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum FailureKind {
    NotFound,
    Conflict,
    QuotaExceeded,
    AccessDenied,
    Other,
}

impl FailureKind {
    /// Codes shared by every AWS control plane
    fn common(code: &str) -> Option<Self> {
        match code {
            "AccessDenied"
            | "AccessDeniedException"
            | "UnauthorizedOperation"
            | "ExpiredToken"
            | "InvalidClientTokenId"
            | "UnrecognizedClientException" => Some(Self::AccessDenied),
            "Throttling" | "ThrottlingException" | "LimitExceededException" => {
                Some(Self::QuotaExceeded)
            }
            _ => None,
        }
    }
}

/// Errors raised by the compute control plane (ECS)
#[derive(Error, Debug)]
pub enum ComputeError {
    #[error("Compute resource not found: {0}")]
    NotFound(String),

    #[error("Compute conflict: {0}")]
    Conflict(String),

    #[error("Compute quota exceeded: {0}")]
    QuotaExceeded(String),

    #[error("Compute access denied: {0}")]
    AccessDenied(String),

    #[error("Compute API error: {0}")]
    Api(String),

    #[error("Compute response did not include a {0}")]
    MissingIdentifier(&'static str),

    #[error("Invalid compute request: {0}")]
    InvalidRequest(String),
}

impl ComputeError {
    pub(crate) fn from_code(code: Option<&str>, message: String) -> Self {
        let kind = code.and_then(|code| {
            FailureKind::common(code).or(match code {
                "ServiceNotFoundException" | "ServiceNotActiveException" => {
                    Some(FailureKind::NotFound)
                }
                "ResourceInUseException" | "UpdateInProgressException" => {
                    Some(FailureKind::Conflict)
                }
                _ => None,
            })
        });

        match kind.unwrap_or(FailureKind::Other) {
            FailureKind::NotFound => Self::NotFound(message),
            FailureKind::Conflict => Self::Conflict(message),
            FailureKind::QuotaExceeded => Self::QuotaExceeded(message),
            FailureKind::AccessDenied => Self::AccessDenied(message),
            FailureKind::Other => Self::Api(message),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, ComputeError::NotFound(_))
    }
}

impl From<aws_sdk_ecs::error::BuildError> for ComputeError {
    fn from(error: aws_sdk_ecs::error::BuildError) -> Self {
        ComputeError::InvalidRequest(error.to_string())
    }
}

/// Errors raised by the routing control plane (ELBv2) and rule priority allocation
#[derive(Error, Debug)]
pub enum RoutingError {
    #[error("Routing resource not found: {0}")]
    NotFound(String),

    #[error("Routing conflict: {0}")]
    Conflict(String),

    #[error("Listener rule priority {0} is already in use")]
    PriorityInUse(i32),

    #[error("Failed to allocate a listener rule priority: {0}")]
    PriorityAllocation(String),

    #[error("Routing quota exceeded: {0}")]
    QuotaExceeded(String),

    #[error("Routing access denied: {0}")]
    AccessDenied(String),

    #[error("Routing API error: {0}")]
    Api(String),

    #[error("Routing response did not include a {0}")]
    MissingIdentifier(&'static str),

    #[error("Invalid routing request: {0}")]
    InvalidRequest(String),
}

impl RoutingError {
    /// Classify an ELBv2 failure; `priority` is the value the failed call used, if any
    pub(crate) fn from_code(code: Option<&str>, message: String, priority: Option<i32>) -> Self {
        if let (Some("PriorityInUse"), Some(priority)) = (code, priority) {
            return Self::PriorityInUse(priority);
        }
        if code == Some("ValidationError") {
            return Self::InvalidRequest(message);
        }

        let kind = code.and_then(|code| {
            FailureKind::common(code).or(match code {
                "RuleNotFound" | "TargetGroupNotFound" | "ListenerNotFound" => {
                    Some(FailureKind::NotFound)
                }
                "DuplicateTargetGroupName" | "ResourceInUse" => Some(FailureKind::Conflict),
                "TooManyTargetGroups" | "TooManyRules" | "TooManyActions" => {
                    Some(FailureKind::QuotaExceeded)
                }
                _ => None,
            })
        });

        match kind.unwrap_or(FailureKind::Other) {
            FailureKind::NotFound => Self::NotFound(message),
            FailureKind::Conflict => Self::Conflict(message),
            FailureKind::QuotaExceeded => Self::QuotaExceeded(message),
            FailureKind::AccessDenied => Self::AccessDenied(message),
            FailureKind::Other => Self::Api(message),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, RoutingError::NotFound(_))
    }
}

/// Errors raised by the DNS control plane (Route53)
#[derive(Error, Debug)]
pub enum DnsError {
    /// The change batch was rejected because the record does not match (or no longer exists)
    #[error("DNS record does not match: {0}")]
    RecordMismatch(String),

    #[error("DNS resource not found: {0}")]
    NotFound(String),

    #[error("DNS conflict: {0}")]
    Conflict(String),

    #[error("DNS quota exceeded: {0}")]
    QuotaExceeded(String),

    #[error("DNS access denied: {0}")]
    AccessDenied(String),

    #[error("DNS API error: {0}")]
    Api(String),

    #[error("DNS response did not include a {0}")]
    MissingIdentifier(&'static str),

    #[error("Invalid DNS request: {0}")]
    InvalidRequest(String),
}

impl DnsError {
    pub(crate) fn from_code(code: Option<&str>, message: String) -> Self {
        if code == Some("InvalidChangeBatch") {
            return Self::RecordMismatch(message);
        }

        let kind = code.and_then(|code| {
            FailureKind::common(code).or(match code {
                "NoSuchHostedZone" => Some(FailureKind::NotFound),
                "PriorRequestNotComplete" => Some(FailureKind::Conflict),
                _ => None,
            })
        });

        match kind.unwrap_or(FailureKind::Other) {
            FailureKind::NotFound => Self::NotFound(message),
            FailureKind::Conflict => Self::Conflict(message),
            FailureKind::QuotaExceeded => Self::QuotaExceeded(message),
            FailureKind::AccessDenied => Self::AccessDenied(message),
            FailureKind::Other => Self::Api(message),
        }
    }

    /// Mismatches are expected during teardown (record already changed or gone)
    pub fn is_benign_on_delete(&self) -> bool {
        matches!(self, DnsError::RecordMismatch(_) | DnsError::NotFound(_))
    }
}

impl From<aws_sdk_route53::error::BuildError> for DnsError {
    fn from(error: aws_sdk_route53::error::BuildError) -> Self {
        DnsError::InvalidRequest(error.to_string())
    }
}

/// Errors raised by the provisioning record store
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("Provisioning record not found for project {0}")]
    NotFound(String),

    #[error("Provisioning record already exists for project {0}")]
    AlreadyExists(String),

    #[error("Invalid stored value: {0}")]
    InvalidData(String),
}

/// Errors raised while loading configuration from the environment
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    Missing(&'static str),

    #[error("Invalid value for {name}: {reason}")]
    Invalid { name: &'static str, reason: String },
}

/// Failure of a single creation step during provisioning
#[derive(Error, Debug)]
pub enum StepError {
    #[error(transparent)]
    Compute(#[from] ComputeError),

    #[error(transparent)]
    Routing(#[from] RoutingError),

    #[error(transparent)]
    Dns(#[from] DnsError),
}

/// Top-level error for orchestrator operations
#[derive(Error, Debug)]
pub enum ProvisionError {
    #[error("Invalid provisioning request: {0}")]
    InvalidRequest(String),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    /// A creation step failed; whatever this attempt created was rolled back
    #[error("{step} failed: {source}")]
    Step {
        step: ProvisionStep,
        #[source]
        source: StepError,
        rollback: TeardownReport,
    },

    /// The record could not be saved mid-provisioning; created resources were rolled back
    #[error("Failed to persist provisioning record: {source}")]
    RecordPersistence {
        #[source]
        source: StorageError,
        rollback: TeardownReport,
    },
}

impl ProvisionError {
    /// Report of the rollback that followed a failed provisioning attempt
    pub fn rollback(&self) -> Option<&TeardownReport> {
        match self {
            Self::Step { rollback, .. } | Self::RecordPersistence { rollback, .. } => {
                Some(rollback)
            }
            Self::InvalidRequest(_) | Self::Storage(_) => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, ProvisionError>;
