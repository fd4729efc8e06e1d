//! awsf - fuzzy finder for AWS resources
//!
//! Builds a local index of Lambda functions, S3 buckets, SQS queues, Kinesis
//! streams, DynamoDB tables, RDS databases and API Gateway REST APIs, tags
//! each with an environment inferred from its name, and resolves entries to
//! AWS console deep links.
//!
//! # Module Structure
//!
//! - [`aws`] - SDK clients, error taxonomy, retry policy
//! - [`resource`] - Data model, adapters, normalization, console URLs
//! - [`aggregator`] - Concurrent per-service aggregation into one index
//! - [`store`] - Atomic on-disk persistence of the index
//! - [`config`] - User configuration and the per-run `ServiceConfig`
//! - [`search`] - Line rendering, query parsing, suggestions
//! - [`shell`] - fzf and browser integration

pub mod aggregator;
pub mod aws;
pub mod config;
pub mod resource;
pub mod search;
pub mod shell;
pub mod store;

/// Version injected at compile time via AWSF_VERSION env var (set by CI/CD),
/// or "dev" for local builds.
pub const VERSION: &str = match option_env!("AWSF_VERSION") {
    Some(v) => v,
    None => "dev",
};

pub use aggregator::Aggregator;
pub use config::{Config, ConfigError, ServiceConfig};
pub use resource::{Environment, Resource, ResourceIndex, Service};
pub use store::{IndexStore, StoreError};
