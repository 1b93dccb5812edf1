// ABOUTME: AWS SDK implementations of the compute, routing and DNS control planes
// ABOUTME: Builds one shared SDK configuration and one client per control plane

mod ecs;
mod elb;
mod route53;

pub use ecs::EcsComputeApi;
pub use elb::ElbLoadBalancerApi;
pub use route53::Route53DnsApi;

use aws_config::{BehaviorVersion, Region};
use aws_sdk_ecs::config::Credentials;
use std::sync::Arc;
use tracing::{debug, info};

use crate::compute::ComputeApi;
use crate::config::AwsSettings;
use crate::dns::DnsApi;
use crate::routing::LoadBalancerApi;

/// Provider name attached to credentials read from the environment
const STATIC_CREDENTIALS_PROVIDER: &str = "invoker-environment";

/// The three control planes, built once at start-up and shared by the managers
#[derive(Clone)]
pub struct AwsControlPlanes {
    pub compute: Arc<dyn ComputeApi>,
    pub load_balancer: Arc<dyn LoadBalancerApi>,
    pub dns: Arc<dyn DnsApi>,
}

impl AwsControlPlanes {
    /// Load the shared SDK configuration and create the clients
    ///
    /// Static credentials take precedence; without them the SDK's default
    /// provider chain (profile, instance role, ...) is used.
    pub async fn connect(settings: &AwsSettings) -> Self {
        let mut loader = aws_config::defaults(BehaviorVersion::latest());

        if let Some(region) = &settings.region {
            loader = loader.region(Region::new(region.clone()));
        }

        if let Some(credentials) = &settings.credentials {
            debug!("Using static AWS credentials from the environment");
            loader = loader.credentials_provider(Credentials::new(
                &credentials.access_key_id,
                &credentials.secret_access_key,
                None,
                None,
                STATIC_CREDENTIALS_PROVIDER,
            ));
        }

        let shared = loader.load().await;
        info!(
            "AWS clients configured for region {}",
            shared
                .region()
                .map(|region| region.as_ref())
                .unwrap_or("<default>")
        );

        Self {
            compute: Arc::new(EcsComputeApi::new(aws_sdk_ecs::Client::new(&shared))),
            load_balancer: Arc::new(ElbLoadBalancerApi::new(
                aws_sdk_elasticloadbalancingv2::Client::new(&shared),
            )),
            dns: Arc::new(Route53DnsApi::new(aws_sdk_route53::Client::new(&shared))),
        }
    }
}
