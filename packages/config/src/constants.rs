// ABOUTME: Environment variable name constants
// ABOUTME: Centralized definitions of all environment variable names used across Invoker

// AWS Credentials & Region
pub const AWS_REGION: &str = "AWS_REGION";
pub const AWS_DEFAULT_REGION: &str = "AWS_DEFAULT_REGION";
pub const AWS_ACCESS_KEY: &str = "AWS_ACCESS_KEY";
pub const AWS_SECRET: &str = "AWS_SECRET";

// Compute (ECS) Configuration
pub const ECS_CLUSTER: &str = "ECS_CLUSTER";
pub const IMAGE_URL: &str = "IMAGE_URL";
pub const EXECUTION_ROLE_ARN: &str = "EXECUTION_ROLE_ARN";

// Network Configuration
pub const VPC_ID: &str = "VPC_ID";
pub const SUBNET_IDS: &str = "SUBNET_IDS";
pub const SUBNET_1: &str = "SUBNET_1"; // Legacy
pub const SUBNET_2: &str = "SUBNET_2"; // Legacy
pub const SUBNET_3: &str = "SUBNET_3"; // Legacy
pub const SECURITY_GROUP: &str = "SECURITY_GROUP";

// Load Balancer Configuration
pub const LISTENER_ARN: &str = "LISTENER_ARN";
pub const LB_DOMAIN: &str = "LB_DOMAIN";
pub const RULE_PRIORITY_STRATEGY: &str = "RULE_PRIORITY_STRATEGY";

// DNS Configuration
pub const HOSTED_ZONE_ID: &str = "HOSTED_ZONE_ID";
pub const BASE_DOMAIN: &str = "BASE_DOMAIN";

// Persistence
pub const INVOKER_DATABASE_URL: &str = "INVOKER_DATABASE_URL";

// Logging
pub const RUST_LOG: &str = "RUST_LOG";
