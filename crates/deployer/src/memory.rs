//! In-memory ports for tests and local experiments.
//!
//! [`InMemoryStore`] keeps buckets as sorted maps and can inject failures;
//! [`InMemoryCdn`] records every invalidation it is asked for.

use crate::error::PortError;
use crate::ports::{
    BuildStep, CdnInvalidator, INVALIDATION_COMPLETED, InvalidationReceipt, InvalidationRequest,
    ObjectStore, RemoteObject,
};
use async_trait::async_trait;
use shipfront_artifacts::{Artifact, hash_bytes};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::PathBuf;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

fn locked<T>(m: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredObject {
    pub body: Vec<u8>,
    /// Hash recorded in metadata; `None` for objects written by other tools
    pub sha256: Option<String>,
    pub content_type: Option<String>,
    pub cache_control: Option<String>,
}

#[derive(Debug, Default)]
struct Faults {
    /// Puts that succeed before every further put fails
    puts_before_failure: Option<usize>,
    /// Calls of any kind that fail transiently before things recover
    transient_failures: usize,
    reject_credentials: bool,
}

#[derive(Debug, Default)]
struct StoreState {
    buckets: HashMap<String, BTreeMap<String, StoredObject>>,
    faults: Faults,
    puts: Vec<String>,
    deletes: Vec<String>,
    lists: usize,
    head_calls: usize,
    in_flight: usize,
    max_in_flight: usize,
}

/// Object store backed by a map per bucket
#[derive(Debug, Default)]
pub struct InMemoryStore {
    state: Mutex<StoreState>,
    op_delay: Option<Duration>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every operation sleeps this long; used to observe overlapping deploys
    pub fn with_op_delay(mut self, delay: Duration) -> Self {
        self.op_delay = Some(delay);
        self
    }

    /// Store an object as if a previous deploy had uploaded it
    pub fn seed(&self, bucket: &str, key: &str, body: &[u8]) {
        self.insert(bucket, key, body, Some(hash_bytes(body)));
    }

    /// Store an object without a recorded hash
    pub fn seed_foreign(&self, bucket: &str, key: &str, body: &[u8]) {
        self.insert(bucket, key, body, None);
    }

    fn insert(&self, bucket: &str, key: &str, body: &[u8], sha256: Option<String>) {
        locked(&self.state)
            .buckets
            .entry(bucket.to_string())
            .or_default()
            .insert(
                key.to_string(),
                StoredObject {
                    body: body.to_vec(),
                    sha256,
                    content_type: None,
                    cache_control: None,
                },
            );
    }

    /// After `n` more successful puts, every put fails transiently
    pub fn fail_puts_after(&self, n: usize) {
        locked(&self.state).faults.puts_before_failure = Some(n);
    }

    /// The next `n` calls fail transiently
    pub fn fail_next_calls(&self, n: usize) {
        locked(&self.state).faults.transient_failures = n;
    }

    /// Every call fails with an auth error
    pub fn reject_credentials(&self) {
        locked(&self.state).faults.reject_credentials = true;
    }

    /// Key -> SHA-256 of the stored body
    pub fn contents(&self, bucket: &str) -> BTreeMap<String, String> {
        locked(&self.state)
            .buckets
            .get(bucket)
            .map(|objects| {
                objects
                    .iter()
                    .map(|(k, o)| (k.clone(), hash_bytes(&o.body)))
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn object(&self, bucket: &str, key: &str) -> Option<StoredObject> {
        locked(&self.state)
            .buckets
            .get(bucket)
            .and_then(|objects| objects.get(key).cloned())
    }

    /// Keys put so far, in call order
    pub fn put_keys(&self) -> Vec<String> {
        locked(&self.state).puts.clone()
    }

    /// Keys deleted so far, in call order
    pub fn deleted_keys(&self) -> Vec<String> {
        locked(&self.state).deletes.clone()
    }

    pub fn list_calls(&self) -> usize {
        locked(&self.state).lists
    }

    pub fn head_calls(&self) -> usize {
        locked(&self.state).head_calls
    }

    /// Highest number of operations that were running at once
    pub fn max_in_flight(&self) -> usize {
        locked(&self.state).max_in_flight
    }

    /// Shared fault checks run at the start of every call
    fn check_faults(&self) -> Result<(), PortError> {
        let mut state = locked(&self.state);
        if state.faults.reject_credentials {
            return Err(PortError::auth("InvalidAccessKeyId: credentials rejected"));
        }
        if state.faults.transient_failures > 0 {
            state.faults.transient_failures -= 1;
            return Err(PortError::transient("connection reset"));
        }
        Ok(())
    }

    async fn enter(&self) -> Result<(), PortError> {
        {
            let mut state = locked(&self.state);
            state.in_flight += 1;
            state.max_in_flight = state.max_in_flight.max(state.in_flight);
        }
        if let Some(delay) = self.op_delay {
            tokio::time::sleep(delay).await;
        }
        let result = self.check_faults();
        if result.is_err() {
            self.leave();
        }
        result
    }

    fn leave(&self) {
        let mut state = locked(&self.state);
        state.in_flight = state.in_flight.saturating_sub(1);
    }
}

#[async_trait]
impl ObjectStore for InMemoryStore {
    async fn list(&self, bucket: &str, prefix: Option<&str>) -> Result<Vec<RemoteObject>, PortError> {
        self.enter().await?;
        let mut state = locked(&self.state);
        state.lists += 1;
        let scope = prefix.map(|p| format!("{}/", p));
        let objects = state
            .buckets
            .get(bucket)
            .map(|objects| {
                objects
                    .iter()
                    .filter(|(key, _)| scope.as_deref().is_none_or(|s| key.starts_with(s)))
                    .map(|(key, obj)| RemoteObject {
                        key: key.clone(),
                        size: obj.body.len() as u64,
                        // S3 listings carry no user metadata
                        sha256: None,
                    })
                    .collect()
            })
            .unwrap_or_default();
        state.in_flight -= 1;
        Ok(objects)
    }

    async fn content_hash(&self, bucket: &str, key: &str) -> Result<Option<String>, PortError> {
        self.enter().await?;
        let mut state = locked(&self.state);
        state.head_calls += 1;
        let hash = state
            .buckets
            .get(bucket)
            .and_then(|objects| objects.get(key))
            .and_then(|obj| obj.sha256.clone());
        state.in_flight -= 1;
        Ok(hash)
    }

    async fn put(&self, bucket: &str, artifact: &Artifact) -> Result<(), PortError> {
        let body = tokio::fs::read(&artifact.path)
            .await
            .map_err(|e| PortError::rejected(format!("read {}: {}", artifact.path.display(), e)))?;
        self.enter().await?;

        let mut state = locked(&self.state);
        state.in_flight -= 1;
        if let Some(remaining) = state.faults.puts_before_failure {
            if remaining == 0 {
                return Err(PortError::transient(format!(
                    "upload of {} interrupted",
                    artifact.key
                )));
            }
            state.faults.puts_before_failure = Some(remaining - 1);
        }

        state.puts.push(artifact.key.clone());
        state.buckets.entry(bucket.to_string()).or_default().insert(
            artifact.key.clone(),
            StoredObject {
                body,
                sha256: Some(artifact.sha256.clone()),
                content_type: Some(artifact.content_type.clone()),
                cache_control: artifact.cache_control.clone(),
            },
        );
        Ok(())
    }

    async fn delete(&self, bucket: &str, keys: &[String]) -> Result<(), PortError> {
        if keys.len() > 1000 {
            return Err(PortError::rejected("MalformedXML: more than 1000 keys"));
        }
        self.enter().await?;
        let mut state = locked(&self.state);
        state.in_flight -= 1;
        state.deletes.extend(keys.iter().cloned());
        if let Some(objects) = state.buckets.get_mut(bucket) {
            for key in keys {
                objects.remove(key);
            }
        }
        Ok(())
    }
}

/// CDN fake. Only distributions registered with [`InMemoryCdn::with_distribution`] exist.
#[derive(Debug, Default)]
pub struct InMemoryCdn {
    distributions: HashSet<String>,
    requests: Mutex<Vec<InvalidationRequest>>,
    /// Status polls that answer "InProgress" before "Completed"
    pending_polls: AtomicUsize,
    reject_credentials: bool,
}

impl InMemoryCdn {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_distribution(mut self, id: &str) -> Self {
        self.distributions.insert(id.to_string());
        self
    }

    pub fn with_pending_polls(self, polls: usize) -> Self {
        self.pending_polls.store(polls, Ordering::SeqCst);
        self
    }

    pub fn rejecting_credentials(mut self) -> Self {
        self.reject_credentials = true;
        self
    }

    pub fn requests(&self) -> Vec<InvalidationRequest> {
        locked(&self.requests).clone()
    }
}

#[async_trait]
impl CdnInvalidator for InMemoryCdn {
    async fn create_invalidation(
        &self,
        request: &InvalidationRequest,
    ) -> Result<InvalidationReceipt, PortError> {
        if self.reject_credentials {
            return Err(PortError::auth("InvalidClientTokenId: credentials rejected"));
        }
        if !self.distributions.contains(&request.distribution_id) {
            return Err(PortError::rejected(format!(
                "NoSuchDistribution: {}",
                request.distribution_id
            )));
        }
        let mut requests = locked(&self.requests);
        requests.push(request.clone());
        Ok(InvalidationReceipt {
            id: format!("I{:04}", requests.len()),
            status: "InProgress".to_string(),
        })
    }

    async fn invalidation_status(
        &self,
        distribution_id: &str,
        invalidation_id: &str,
    ) -> Result<String, PortError> {
        if !self.distributions.contains(distribution_id) {
            return Err(PortError::rejected(format!(
                "NoSuchDistribution: {}",
                distribution_id
            )));
        }
        if !invalidation_id.starts_with('I') {
            return Err(PortError::rejected(format!(
                "NoSuchInvalidation: {}",
                invalidation_id
            )));
        }
        let pending = self
            .pending_polls
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
        Ok(match pending {
            Ok(_) => "InProgress".to_string(),
            Err(_) => INVALIDATION_COMPLETED.to_string(),
        })
    }
}

/// Build step that writes fixed files, or fails
#[derive(Debug, Clone, Default)]
pub struct ScriptedBuild {
    output_dir: PathBuf,
    files: Vec<(String, Vec<u8>)>,
    fail_with: Option<String>,
    runs: std::sync::Arc<AtomicUsize>,
}

impl ScriptedBuild {
    pub fn writing(output_dir: impl Into<PathBuf>, files: &[(&str, &str)]) -> Self {
        Self {
            output_dir: output_dir.into(),
            files: files
                .iter()
                .map(|(k, v)| (k.to_string(), v.as_bytes().to_vec()))
                .collect(),
            ..Default::default()
        }
    }

    pub fn failing(message: &str) -> Self {
        Self {
            fail_with: Some(message.to_string()),
            ..Default::default()
        }
    }

    pub fn runs(&self) -> usize {
        self.runs.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl BuildStep for ScriptedBuild {
    fn describe(&self) -> String {
        "scripted build".to_string()
    }

    async fn run(&self) -> Result<(), PortError> {
        self.runs.fetch_add(1, Ordering::SeqCst);
        if let Some(message) = &self.fail_with {
            return Err(PortError::rejected(message.clone()));
        }
        for (rel, body) in &self.files {
            let path = self.output_dir.join(rel);
            if let Some(parent) = path.parent() {
                tokio::fs::create_dir_all(parent)
                    .await
                    .map_err(|e| PortError::rejected(e.to_string()))?;
            }
            tokio::fs::write(&path, body)
                .await
                .map_err(|e| PortError::rejected(e.to_string()))?;
        }
        Ok(())
    }
}
