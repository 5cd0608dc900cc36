//! Seams between the pipeline and the outside world.
//!
//! The AWS adapters live in [`crate::aws`], the in-memory fakes in
//! [`crate::memory`] and the shell build in [`crate::build`].

use crate::error::PortError;
use async_trait::async_trait;
use serde::Serialize;
use shipfront_artifacts::Artifact;

/// Object metadata key holding the SHA-256 of the uploaded body
pub const SHA256_METADATA_KEY: &str = "sha256";

/// An object as reported by a bucket listing
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RemoteObject {
    pub key: String,
    pub size: u64,
    /// Recorded content hash, if the listing carries it
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sha256: Option<String>,
}

#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Every object under `prefix/`, or the whole bucket when `prefix` is None
    async fn list(&self, bucket: &str, prefix: Option<&str>) -> Result<Vec<RemoteObject>, PortError>;

    /// SHA-256 recorded at upload time; `None` when absent or the key is gone
    async fn content_hash(&self, bucket: &str, key: &str) -> Result<Option<String>, PortError>;

    /// Upload one artifact, recording its hash, content type and cache control
    async fn put(&self, bucket: &str, artifact: &Artifact) -> Result<(), PortError>;

    /// Delete up to 1000 keys
    async fn delete(&self, bucket: &str, keys: &[String]) -> Result<(), PortError>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvalidationRequest {
    pub distribution_id: String,
    pub paths: Vec<String>,
    /// Unique per request; lets the CDN deduplicate resubmissions
    pub caller_reference: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InvalidationReceipt {
    pub id: String,
    pub status: String,
}

/// Status string a finished invalidation reports
pub const INVALIDATION_COMPLETED: &str = "Completed";

#[async_trait]
pub trait CdnInvalidator: Send + Sync {
    async fn create_invalidation(
        &self,
        request: &InvalidationRequest,
    ) -> Result<InvalidationReceipt, PortError>;

    async fn invalidation_status(
        &self,
        distribution_id: &str,
        invalidation_id: &str,
    ) -> Result<String, PortError>;
}

/// Produces the artifact directory. Only success or failure matters.
#[async_trait]
pub trait BuildStep: Send + Sync {
    fn describe(&self) -> String;

    async fn run(&self) -> Result<(), PortError>;
}
