//! AWS Clients
//!
//! Builds one SDK configuration from a profile/region pair and derives a
//! client per supported service. Credentials are resolved by the SDK's
//! default provider chain and never pass through this crate.

use super::error::{classify_sdk_error, FetchError};
use aws_config::retry::RetryConfig;
use aws_config::timeout::TimeoutConfig;
use aws_config::{BehaviorVersion, Region, SdkConfig};
use std::time::Duration;

/// Timeout for a single API call (one page or one describe)
const CALL_TIMEOUT: Duration = Duration::from_secs(30);

/// Service clients sharing one SDK configuration
#[derive(Clone, Debug)]
pub struct AwsClients {
    pub lambda: aws_sdk_lambda::Client,
    pub s3: aws_sdk_s3::Client,
    pub sqs: aws_sdk_sqs::Client,
    pub kinesis: aws_sdk_kinesis::Client,
    pub dynamodb: aws_sdk_dynamodb::Client,
    pub rds: aws_sdk_rds::Client,
    pub apigateway: aws_sdk_apigateway::Client,
    pub sts: aws_sdk_sts::Client,
    pub region: String,
}

/// Who the resolved credentials belong to
#[derive(Debug, Clone)]
pub struct CallerIdentity {
    pub account: String,
    pub arn: String,
}

impl CallerIdentity {
    /// Last path segment of the principal ARN (user or role session)
    pub fn principal(&self) -> &str {
        self.arn.rsplit('/').next().unwrap_or(&self.arn)
    }
}

impl AwsClients {
    /// Load SDK configuration for a region and optional named profile
    pub async fn new(region: &str, profile: Option<&str>) -> Self {
        let mut loader = aws_config::defaults(BehaviorVersion::latest())
            .region(Region::new(region.to_string()))
            .retry_config(RetryConfig::disabled())
            .timeout_config(
                TimeoutConfig::builder()
                    .operation_attempt_timeout(CALL_TIMEOUT)
                    .build(),
            );

        if let Some(profile) = profile {
            tracing::info!("Using AWS profile: {}", profile);
            loader = loader.profile_name(profile);
        }

        let config = loader.load().await;
        Self::from_sdk_config(&config, region)
    }

    /// Build clients from an existing SDK configuration
    pub fn from_sdk_config(config: &SdkConfig, region: &str) -> Self {
        Self {
            lambda: aws_sdk_lambda::Client::new(config),
            s3: aws_sdk_s3::Client::new(config),
            sqs: aws_sdk_sqs::Client::new(config),
            kinesis: aws_sdk_kinesis::Client::new(config),
            dynamodb: aws_sdk_dynamodb::Client::new(config),
            rds: aws_sdk_rds::Client::new(config),
            apigateway: aws_sdk_apigateway::Client::new(config),
            sts: aws_sdk_sts::Client::new(config),
            region: region.to_string(),
        }
    }

    /// Resolve the account and principal behind the current credentials
    pub async fn caller_identity(&self) -> Result<CallerIdentity, FetchError> {
        let output = self
            .sts
            .get_caller_identity()
            .send()
            .await
            .map_err(|e| classify_sdk_error(&e))?;

        Ok(CallerIdentity {
            account: output.account().unwrap_or("unknown").to_string(),
            arn: output.arn().unwrap_or("unknown").to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_principal_from_role_session_arn() {
        let identity = CallerIdentity {
            account: "123456789012".to_string(),
            arn: "arn:aws:sts::123456789012:assumed-role/Admin/jane".to_string(),
        };
        assert_eq!(identity.principal(), "jane");
    }

    #[test]
    fn test_principal_without_path() {
        let identity = CallerIdentity {
            account: "123456789012".to_string(),
            arn: "arn:aws:iam::123456789012:root".to_string(),
        };
        assert_eq!(identity.principal(), "arn:aws:iam::123456789012:root");
    }
}
