//! AWS adapters for the storage and CDN ports.

mod cloudfront;
mod s3;

pub use cloudfront::CloudFrontInvalidator;
pub use s3::S3Store;

use crate::error::PortError;
use aws_config::{BehaviorVersion, Region, SdkConfig};
use aws_sdk_s3::config::http::HttpResponse;
use aws_sdk_s3::error::{DisplayErrorContext, ProvideErrorMetadata, SdkError};
use tracing::debug;

/// Error codes meaning the caller's identity was rejected
const AUTH_CODES: &[&str] = &[
    "AccessDenied",
    "AccessDeniedException",
    "ExpiredToken",
    "InvalidAccessKeyId",
    "InvalidClientTokenId",
    "InvalidToken",
    "SignatureDoesNotMatch",
    "TokenRefreshRequired",
    "UnrecognizedClientException",
];

/// Error codes worth another attempt
const TRANSIENT_CODES: &[&str] = &[
    "InternalError",
    "RequestTimeout",
    "RequestTimeoutException",
    "ServiceUnavailable",
    "SlowDown",
    "Throttling",
    "ThrottlingException",
];

/// Where and as whom to talk to AWS. Credentials always come from the
/// default provider chain (env vars, profile, instance role).
#[derive(Debug, Clone, Default)]
pub struct AwsOptions {
    pub region: Option<String>,
    pub profile: Option<String>,
    /// Custom S3 endpoint, e.g. LocalStack or MinIO
    pub endpoint_url: Option<String>,
}

pub async fn load_sdk_config(options: &AwsOptions) -> SdkConfig {
    let mut loader = aws_config::defaults(BehaviorVersion::latest());
    if let Some(region) = &options.region {
        loader = loader.region(Region::new(region.clone()));
    }
    if let Some(profile) = &options.profile {
        loader = loader.profile_name(profile);
    }
    let config = loader.load().await;
    debug!(region = ?config.region(), "loaded AWS config");
    config
}

/// Sort an SDK error into auth, transient or rejected
pub(crate) fn classify<E>(operation: &str, err: SdkError<E, HttpResponse>) -> PortError
where
    E: ProvideErrorMetadata + std::error::Error + Send + Sync + 'static,
{
    let message = format!("{}: {}", operation, DisplayErrorContext(&err));
    match &err {
        SdkError::ServiceError(ctx) => {
            let status = ctx.raw().status().as_u16();
            let code = ctx.err().code().unwrap_or_default();
            if AUTH_CODES.contains(&code) || status == 401 || status == 403 {
                PortError::auth(message)
            } else if TRANSIENT_CODES.contains(&code) || status == 429 || status >= 500 {
                PortError::transient(message)
            } else {
                PortError::rejected(message)
            }
        }
        SdkError::TimeoutError(_) | SdkError::ResponseError(_) => PortError::transient(message),
        SdkError::DispatchFailure(_) | SdkError::ConstructionFailure(_)
            if mentions_credentials(&message) =>
        {
            PortError::auth(message)
        }
        SdkError::DispatchFailure(_) => PortError::transient(message),
        _ => PortError::rejected(message),
    }
}

fn mentions_credentials(message: &str) -> bool {
    let lower = message.to_ascii_lowercase();
    lower.contains("credential") || lower.contains("no identity")
}
