//! Mirror-sync planning: which keys to upload and which to delete.

use crate::ports::RemoteObject;
use serde::Serialize;
use shipfront_artifacts::ArtifactSet;
use std::collections::{BTreeMap, BTreeSet};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum UploadReason {
    /// Key not in the bucket
    New,
    /// Size or recorded hash differs
    Changed,
    /// Same size but no recorded hash to compare against
    Unverified,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlannedUpload {
    pub key: String,
    pub size: u64,
    pub reason: UploadReason,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SyncPlan {
    pub uploads: Vec<PlannedUpload>,
    pub deletions: Vec<String>,
    pub unchanged: usize,
}

impl SyncPlan {
    /// Diff the local artifact set against a bucket listing.
    ///
    /// Output is ordered by key. Remote objects need `sha256` filled in
    /// wherever it is known; see [`keys_needing_hash`].
    pub fn diff(artifacts: &ArtifactSet, remote: &[RemoteObject]) -> Self {
        let remote: BTreeMap<&str, &RemoteObject> =
            remote.iter().map(|o| (o.key.as_str(), o)).collect();
        let local: BTreeSet<&str> = artifacts.files.iter().map(|f| f.key.as_str()).collect();

        let mut plan = SyncPlan::default();
        for artifact in &artifacts.files {
            let reason = match remote.get(artifact.key.as_str()) {
                None => Some(UploadReason::New),
                Some(obj) if obj.size != artifact.size => Some(UploadReason::Changed),
                Some(obj) => match &obj.sha256 {
                    Some(hash) if *hash == artifact.sha256 => None,
                    Some(_) => Some(UploadReason::Changed),
                    None => Some(UploadReason::Unverified),
                },
            };
            match reason {
                Some(reason) => plan.uploads.push(PlannedUpload {
                    key: artifact.key.clone(),
                    size: artifact.size,
                    reason,
                }),
                None => plan.unchanged += 1,
            }
        }

        plan.deletions = remote
            .keys()
            .filter(|key| !local.contains(*key))
            .map(|key| key.to_string())
            .collect();

        plan
    }

    pub fn is_noop(&self) -> bool {
        self.uploads.is_empty() && self.deletions.is_empty()
    }

    pub fn upload_bytes(&self) -> u64 {
        self.uploads.iter().map(|u| u.size).sum()
    }
}

/// Keys whose size matches locally but whose hash the listing did not carry
pub fn keys_needing_hash(artifacts: &ArtifactSet, remote: &[RemoteObject]) -> Vec<String> {
    remote
        .iter()
        .filter(|obj| obj.sha256.is_none())
        .filter(|obj| {
            artifacts
                .get(&obj.key)
                .is_some_and(|artifact| artifact.size == obj.size)
        })
        .map(|obj| obj.key.clone())
        .collect()
}
