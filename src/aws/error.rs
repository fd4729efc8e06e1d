//! AWS error taxonomy
//!
//! Every SDK failure is folded into a [`FetchError`] so adapters can decide
//! between retrying, recording a partial result, or giving up on a service.

use aws_smithy_runtime_api::client::orchestrator::HttpResponse;
use aws_smithy_runtime_api::client::result::SdkError;
use aws_smithy_types::error::display::DisplayErrorContext;
use aws_smithy_types::error::metadata::ProvideErrorMetadata;

/// Maximum length of an error message kept for logs and index warnings
const MAX_MESSAGE_LENGTH: usize = 200;

const THROTTLING_CODES: &[&str] = &[
    "Throttling",
    "ThrottlingException",
    "ThrottledException",
    "TooManyRequestsException",
    "RequestLimitExceeded",
    "RequestThrottled",
    "RequestThrottledException",
    "ProvisionedThroughputExceededException",
    "LimitExceededException",
    "SlowDown",
    "PriorRequestNotComplete",
    "ServiceUnavailable",
];

const AUTH_CODES: &[&str] = &[
    "AccessDenied",
    "AccessDeniedException",
    "UnauthorizedOperation",
    "UnauthorizedException",
    "UnrecognizedClientException",
    "InvalidClientTokenId",
    "InvalidAccessKeyId",
    "SignatureDoesNotMatch",
    "InvalidSignatureException",
    "MissingAuthenticationToken",
    "ExpiredToken",
    "ExpiredTokenException",
    "AuthFailure",
    "AuthorizationError",
];

/// Failure of a single AWS call, or of a whole adapter run
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FetchError {
    #[error("throttled: {0}")]
    Throttled(String),
    #[error("not authorized: {0}")]
    Unauthorized(String),
    #[error("timed out: {0}")]
    Timeout(String),
    #[error("cancelled")]
    Cancelled,
    #[error("request failed: {0}")]
    Request(String),
}

impl FetchError {
    /// Transient errors are worth another attempt after a backoff
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Throttled(_) | Self::Timeout(_))
    }

    /// Short message suitable for the end-of-run summary
    pub fn user_message(&self) -> String {
        match self {
            Self::Throttled(_) => "Rate limited by AWS. Try refreshing again later.".to_string(),
            Self::Unauthorized(_) => {
                "Permission denied. Check the IAM permissions of your profile.".to_string()
            }
            Self::Timeout(_) => "Timed out waiting for AWS.".to_string(),
            Self::Cancelled => "Refresh was cancelled before this service finished.".to_string(),
            Self::Request(msg) => truncate(msg),
        }
    }
}

/// Classify an SDK error
///
/// The service error code decides first, then the HTTP status, then the
/// transport-level variant.
pub fn classify_sdk_error<E>(err: &SdkError<E, HttpResponse>) -> FetchError
where
    E: ProvideErrorMetadata + std::error::Error + 'static,
{
    match err {
        SdkError::ServiceError(service_err) => {
            let inner = service_err.err();
            let code = inner.code().unwrap_or("Unknown");
            let msg = truncate(&format!(
                "{}: {}",
                code,
                inner.message().unwrap_or("no message")
            ));
            let status = service_err.raw().status().as_u16();
            classify_code(code, status, msg)
        }
        SdkError::TimeoutError(_) => FetchError::Timeout("operation timed out".to_string()),
        SdkError::DispatchFailure(failure) => {
            let msg = truncate(&DisplayErrorContext(err).to_string());
            if failure.is_timeout() {
                FetchError::Timeout(msg)
            } else {
                classify_message(msg)
            }
        }
        _ => classify_message(truncate(&DisplayErrorContext(err).to_string())),
    }
}

/// Classify from a service error code and HTTP status
pub fn classify_code(code: &str, status: u16, msg: String) -> FetchError {
    if THROTTLING_CODES.contains(&code) {
        return FetchError::Throttled(msg);
    }
    if AUTH_CODES.contains(&code) {
        return FetchError::Unauthorized(msg);
    }
    match status {
        429 | 503 => FetchError::Throttled(msg),
        401 | 403 => FetchError::Unauthorized(msg),
        _ => FetchError::Request(msg),
    }
}

/// Fallback for errors that carry no service error code
fn classify_message(msg: String) -> FetchError {
    let lower = msg.to_lowercase();
    if lower.contains("credentials") || lower.contains("access denied") {
        FetchError::Unauthorized(msg)
    } else if lower.contains("timeout") || lower.contains("timed out") {
        FetchError::Timeout(msg)
    } else if lower.contains("throttl") || lower.contains("too many requests") {
        FetchError::Throttled(msg)
    } else {
        FetchError::Request(msg)
    }
}

/// Truncate and strip control characters before logging or persisting
fn truncate(msg: &str) -> String {
    let cleaned: String = msg
        .chars()
        .filter(|c| !c.is_control() || *c == ' ')
        .collect();

    if cleaned.chars().count() > MAX_MESSAGE_LENGTH {
        let short: String = cleaned.chars().take(MAX_MESSAGE_LENGTH).collect();
        format!("{}...", short)
    } else {
        cleaned
    }
}
