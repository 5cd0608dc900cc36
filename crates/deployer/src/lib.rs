//! Deploy pipeline for static sites: build, mirror-sync to a bucket,
//! invalidate the CDN.
//!
//! [`Pipeline`] talks to the outside world only through the traits in
//! [`ports`], so it runs the same against AWS ([`aws`]) and against the
//! in-memory fakes ([`memory`]).

pub mod aws;
pub mod build;
pub mod error;
pub mod lock;
pub mod memory;
pub mod pipeline;
pub mod plan;
pub mod ports;
pub mod retry;

pub use build::ShellBuild;
pub use error::{DeployError, PortError, PortErrorKind, Step};
pub use lock::{BucketGuard, BucketLocks};
pub use pipeline::{DeployRequest, DeploySummary, Pipeline};
pub use plan::{PlannedUpload, SyncPlan, UploadReason};
pub use ports::{BuildStep, CdnInvalidator, ObjectStore};
pub use retry::RetryPolicy;

use async_trait::async_trait;

/// A deploy target. The CLI drives everything through this.
#[async_trait]
pub trait Deployer {
    async fn deploy(&self, request: &DeployRequest) -> Result<DeploySummary, DeployError>;
}

#[async_trait]
impl Deployer for Pipeline {
    async fn deploy(&self, request: &DeployRequest) -> Result<DeploySummary, DeployError> {
        Pipeline::deploy(self, request).await
    }
}
