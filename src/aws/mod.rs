//! AWS API interaction module
//!
//! # Module Structure
//!
//! - [`client`] - SDK configuration and per-service clients
//! - [`error`] - Folding SDK errors into a small retry-aware taxonomy
//! - [`retry`] - Bounded exponential backoff
//!
//! # Example
//!
//! ```ignore
//! use awsf::aws::client::AwsClients;
//!
//! async fn example() {
//!     let clients = AwsClients::new("eu-west-1", Some("staging")).await;
//!     let identity = clients.caller_identity().await;
//! }
//! ```

pub mod client;
pub mod error;
pub mod retry;

pub use client::{AwsClients, CallerIdentity};
pub use error::{classify_sdk_error, FetchError};
pub use retry::RetryPolicy;
