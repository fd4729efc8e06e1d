//! Resource abstraction layer
//!
//! This module turns heterogeneous AWS listings into one uniform, searchable
//! record type. Service metadata (id/name fields, console URL templates) is
//! loaded from embedded JSON so the per-service code only deals with the SDK.
//!
//! # Architecture
//!
//! - [`model`] - `Resource`, `ResourceIndex` and the `Service` tag
//! - [`environment`] - Environment classification from resource names
//! - [`registry`] - Loads and caches service definitions from embedded JSON
//! - [`fetcher`] - Adapter contract, pagination, describe fan-out, normalization
//! - [`sdk_dispatch`] - One adapter per AWS service
//! - [`console`] - Console deep links
//!
//! # Example
//!
//! ```ignore
//! use awsf::resource::{normalize_all, AwsSource, FetchContext, ResourceSource, Service};
//!
//! async fn list_functions(source: &AwsSource) -> Vec<awsf::resource::Resource> {
//!     let ctx = FetchContext::new("us-east-1");
//!     let outcome = source.fetch(Service::Lambda, &ctx).await;
//!     normalize_all(Service::Lambda, outcome.records, &ctx.region).0
//! }
//! ```

pub mod console;
pub mod environment;
pub mod fetcher;
pub mod model;
pub mod registry;
pub mod sdk_dispatch;

pub use console::resolve;
pub use environment::{classify, Environment};
pub use fetcher::{
    describe_each, fetch_all_pages, normalize, normalize_all, FetchContext, FetchOutcome,
    PaginatedResult, RawRecord, ResourceSource,
};
pub use model::{IndexDiff, Resource, ResourceIndex, ResourceKey, Service, UnknownService};
pub use registry::{get_kind, get_service, validate_registry};
pub use sdk_dispatch::AwsSource;
