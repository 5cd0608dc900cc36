//! The deploy pipeline: build, validate, mirror-sync, invalidate.

use crate::error::{DeployError, PortError};
use crate::lock::BucketLocks;
use crate::plan::{SyncPlan, keys_needing_hash};
use crate::ports::{
    BuildStep, CdnInvalidator, INVALIDATION_COMPLETED, InvalidationReceipt, InvalidationRequest,
    ObjectStore, RemoteObject,
};
use crate::retry::RetryPolicy;
use futures::stream::{self, StreamExt, TryStreamExt};
use serde::Serialize;
use shipfront_artifacts::{ArtifactOptions, ArtifactSet};
use shipfront_core::{CacheConfig, INVALIDATE_ALL, config};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// S3 DeleteObjects accepts at most this many keys per call
const DELETE_BATCH_SIZE: usize = 1000;

/// HeadObject lookups in flight at once while planning
const HEAD_CONCURRENCY: usize = 16;

/// Inputs of one deploy
#[derive(Debug, Clone)]
pub struct DeployRequest {
    pub artifact_dir: PathBuf,
    pub bucket: String,
    pub distribution_id: String,
    pub prefix: Option<String>,
    pub exclude: Vec<String>,
    pub cache: CacheConfig,
    pub invalidation_paths: Vec<String>,
    pub skip_build: bool,
    pub dry_run: bool,
    /// Poll the invalidation until it completes, bounded by this timeout
    pub wait_for_invalidation: Option<Duration>,
}

impl DeployRequest {
    pub fn new(
        artifact_dir: impl Into<PathBuf>,
        bucket: impl Into<String>,
        distribution_id: impl Into<String>,
    ) -> Self {
        Self {
            artifact_dir: artifact_dir.into(),
            bucket: bucket.into(),
            distribution_id: distribution_id.into(),
            prefix: None,
            exclude: Vec::new(),
            cache: CacheConfig::default(),
            invalidation_paths: vec![INVALIDATE_ALL.to_string()],
            skip_build: false,
            dry_run: false,
            wait_for_invalidation: None,
        }
    }

    fn validate(&self) -> Result<(), DeployError> {
        config::validate_bucket_name(&self.bucket)?;
        config::validate_distribution_id(&self.distribution_id)?;
        config::validate_invalidation_paths(&self.invalidation_paths)?;
        Ok(())
    }
}

/// Outcome of a deploy
#[derive(Debug, Clone, Serialize)]
pub struct DeploySummary {
    pub bucket: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prefix: Option<String>,
    pub uploaded: usize,
    pub deleted: usize,
    pub unchanged: usize,
    pub bytes_uploaded: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub invalidation_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub invalidation_status: Option<String>,
    pub dry_run: bool,
    pub elapsed_ms: u64,
    pub plan: SyncPlan,
}

/// Wires the ports together and runs deploys one bucket at a time
pub struct Pipeline {
    store: Arc<dyn ObjectStore>,
    cdn: Arc<dyn CdnInvalidator>,
    build: Option<Arc<dyn BuildStep>>,
    retry: RetryPolicy,
    locks: BucketLocks,
    poll_interval: Duration,
}

impl Pipeline {
    pub fn new(store: Arc<dyn ObjectStore>, cdn: Arc<dyn CdnInvalidator>) -> Self {
        Self {
            store,
            cdn,
            build: None,
            retry: RetryPolicy::default(),
            locks: BucketLocks::new(),
            poll_interval: Duration::from_secs(5),
        }
    }

    pub fn with_build(mut self, build: Arc<dyn BuildStep>) -> Self {
        self.build = Some(build);
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Share a lock table with other pipelines in this process
    pub fn with_locks(mut self, locks: BucketLocks) -> Self {
        self.locks = locks;
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Run the full pipeline. Every failure aborts the remaining steps.
    pub async fn deploy(&self, request: &DeployRequest) -> Result<DeploySummary, DeployError> {
        let started = Instant::now();
        request.validate()?;
        let prefix = config::normalize_prefix(request.prefix.as_deref())?;

        let _guard = self.locks.acquire(&request.bucket).await;
        info!(bucket = %request.bucket, distribution = %request.distribution_id, "deploy started");

        // Step 0: build
        if let Some(build) = self.build.as_ref().filter(|_| !request.skip_build) {
            info!(build = %build.describe(), "build step");
            build
                .run()
                .await
                .map_err(|e| DeployError::Build(e.message))?;
        }

        // Step 1: validate artifacts
        let options = ArtifactOptions {
            prefix: prefix.clone(),
            exclude: request.exclude.clone(),
            cache: request.cache.clone(),
        };
        let artifacts = ArtifactSet::scan(&request.artifact_dir, &options)?;
        info!(files = artifacts.len(), bytes = artifacts.total_bytes(), "artifacts ready");

        // Step 2: mirror sync
        let plan = self.plan(&request.bucket, prefix.as_deref(), &artifacts).await?;
        info!(
            uploads = plan.uploads.len(),
            deletions = plan.deletions.len(),
            unchanged = plan.unchanged,
            "sync plan"
        );

        let mut summary = DeploySummary {
            bucket: request.bucket.clone(),
            prefix,
            uploaded: 0,
            deleted: 0,
            unchanged: plan.unchanged,
            bytes_uploaded: 0,
            invalidation_id: None,
            invalidation_status: None,
            dry_run: request.dry_run,
            elapsed_ms: 0,
            plan: SyncPlan::default(),
        };

        if request.dry_run {
            info!("dry run, nothing transferred");
            summary.elapsed_ms = started.elapsed().as_millis() as u64;
            summary.plan = plan;
            return Ok(summary);
        }

        self.sync(&request.bucket, &artifacts, &plan, &mut summary)
            .await?;

        // Step 3: invalidate
        let receipt = self
            .submit_invalidation(&request.distribution_id, &request.invalidation_paths)
            .await?;
        summary.invalidation_id = Some(receipt.id.clone());
        summary.invalidation_status = Some(receipt.status.clone());

        if let Some(timeout) = request.wait_for_invalidation {
            let status = self
                .wait_for_invalidation(&request.distribution_id, &receipt.id, timeout)
                .await;
            if let Some(status) = status {
                summary.invalidation_status = Some(status);
            }
        }

        summary.elapsed_ms = started.elapsed().as_millis() as u64;
        summary.plan = plan;
        info!(
            uploaded = summary.uploaded,
            deleted = summary.deleted,
            invalidation = %receipt.id,
            elapsed_ms = summary.elapsed_ms,
            "deploy finished"
        );
        Ok(summary)
    }

    /// Compute what a sync would do without changing anything
    pub async fn plan(
        &self,
        bucket: &str,
        prefix: Option<&str>,
        artifacts: &ArtifactSet,
    ) -> Result<SyncPlan, DeployError> {
        let store = self.store.as_ref();
        let mut remote: Vec<RemoteObject> = self
            .retry
            .run("ListObjectsV2", move || store.list(bucket, prefix))
            .await
            .map_err(DeployError::from_sync)?;

        let unhashed = keys_needing_hash(artifacts, &remote);
        if !unhashed.is_empty() {
            debug!(count = unhashed.len(), "fetching recorded hashes");
        }
        let retry = &self.retry;
        let hashes: HashMap<String, Option<String>> = stream::iter(unhashed.into_iter().map(
            |key| async move {
                let key_ref = key.as_str();
                let hash = retry
                    .run("HeadObject", move || store.content_hash(bucket, key_ref))
                    .await?;
                Ok::<_, PortError>((key, hash))
            },
        ))
        .buffer_unordered(HEAD_CONCURRENCY)
        .try_collect()
        .await
        .map_err(DeployError::from_sync)?;

        for obj in remote.iter_mut() {
            if let Some(hash) = hashes.get(&obj.key) {
                obj.sha256 = hash.clone();
            }
        }

        Ok(SyncPlan::diff(artifacts, &remote))
    }

    /// Uploads first, then deletions, so a failed run leaves no dangling references
    async fn sync(
        &self,
        bucket: &str,
        artifacts: &ArtifactSet,
        plan: &SyncPlan,
        summary: &mut DeploySummary,
    ) -> Result<(), DeployError> {
        let store = self.store.as_ref();
        let total = plan.uploads.len();

        for upload in &plan.uploads {
            let artifact = artifacts.get(&upload.key).ok_or_else(|| {
                DeployError::Transfer(format!("planned key {} missing from artifacts", upload.key))
            })?;
            self.retry
                .run("PutObject", move || store.put(bucket, artifact))
                .await
                .map_err(|e| partial(e, "uploaded", summary.uploaded, total))?;
            debug!(key = %upload.key, reason = ?upload.reason, "uploaded");
            summary.uploaded += 1;
            summary.bytes_uploaded += artifact.size;
        }

        let total = plan.deletions.len();
        for batch in plan.deletions.chunks(DELETE_BATCH_SIZE) {
            self.retry
                .run("DeleteObjects", move || store.delete(bucket, batch))
                .await
                .map_err(|e| partial(e, "deleted", summary.deleted, total))?;
            debug!(count = batch.len(), "deleted");
            summary.deleted += batch.len();
        }

        Ok(())
    }

    /// Submit an invalidation outside a deploy, e.g. to retry one that
    /// failed after a successful sync
    pub async fn invalidate(
        &self,
        distribution_id: &str,
        paths: &[String],
        wait: Option<Duration>,
    ) -> Result<InvalidationReceipt, DeployError> {
        config::validate_distribution_id(distribution_id)?;
        config::validate_invalidation_paths(paths)?;

        let mut receipt = self.submit_invalidation(distribution_id, paths).await?;
        if let Some(timeout) = wait {
            if let Some(status) = self
                .wait_for_invalidation(distribution_id, &receipt.id, timeout)
                .await
            {
                receipt.status = status;
            }
        }
        Ok(receipt)
    }

    async fn submit_invalidation(
        &self,
        distribution_id: &str,
        paths: &[String],
    ) -> Result<InvalidationReceipt, DeployError> {
        let invalidation = InvalidationRequest {
            distribution_id: distribution_id.to_string(),
            paths: paths.to_vec(),
            caller_reference: caller_reference(),
        };
        let receipt = self
            .retry
            .once("CreateInvalidation", self.cdn.create_invalidation(&invalidation))
            .await
            .map_err(DeployError::from_invalidation)?;
        info!(id = %receipt.id, paths = ?invalidation.paths, "invalidation submitted");
        Ok(receipt)
    }

    /// Poll until Completed. Timeouts and poll errors are warnings: the
    /// invalidation was already accepted.
    async fn wait_for_invalidation(
        &self,
        distribution_id: &str,
        invalidation_id: &str,
        timeout: Duration,
    ) -> Option<String> {
        let deadline = Instant::now() + timeout;
        let mut last = None;
        loop {
            match self
                .retry
                .once(
                    "GetInvalidation",
                    self.cdn.invalidation_status(distribution_id, invalidation_id),
                )
                .await
            {
                Ok(status) if status == INVALIDATION_COMPLETED => return Some(status),
                Ok(status) => {
                    debug!(id = invalidation_id, %status, "invalidation pending");
                    last = Some(status);
                }
                Err(e) => {
                    warn!(id = invalidation_id, error = %e, "could not poll invalidation");
                    return last;
                }
            }
            if Instant::now() + self.poll_interval > deadline {
                warn!(
                    id = invalidation_id,
                    timeout_secs = timeout.as_secs(),
                    "gave up waiting for invalidation"
                );
                return last;
            }
            tokio::time::sleep(self.poll_interval).await;
        }
    }
}

/// Wrap a sync failure with how far the transfer got
fn partial(err: PortError, verb: &str, done: usize, total: usize) -> DeployError {
    let annotated = PortError {
        kind: err.kind,
        message: format!("{} ({} {} of {} before failure)", err.message, verb, done, total),
    };
    DeployError::from_sync(annotated)
}

/// Unique per invalidation request
fn caller_reference() -> String {
    static SEQ: AtomicU64 = AtomicU64::new(0);
    format!(
        "shipfront-{}-{}-{}",
        chrono::Utc::now().timestamp_millis(),
        std::process::id(),
        SEQ.fetch_add(1, Ordering::Relaxed)
    )
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("build", &self.build.as_ref().map(|b| b.describe()))
            .field("retry", &self.retry)
            .field("poll_interval", &self.poll_interval)
            .finish()
    }
}
