//! Single-flight lock per target bucket.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

type LockMap = HashMap<String, Arc<AsyncMutex<()>>>;
type LockTable = Arc<Mutex<LockMap>>;

fn lock_table(table: &LockTable) -> MutexGuard<'_, LockMap> {
    table.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Serialises deploys that target the same bucket.
///
/// Clones share the same lock table. An entry lives only while a deploy
/// holds or waits for its bucket.
#[derive(Debug, Clone, Default)]
pub struct BucketLocks {
    locks: LockTable,
}

/// Held for the duration of one deploy
#[derive(Debug)]
pub struct BucketGuard {
    guard: Option<OwnedMutexGuard<()>>,
    bucket: String,
    locks: LockTable,
}

impl Drop for BucketGuard {
    fn drop(&mut self) {
        drop(self.guard.take());
        let mut table = lock_table(&self.locks);
        // Only the table's own reference left: nobody holds or waits
        if table
            .get(&self.bucket)
            .is_some_and(|lock| Arc::strong_count(lock) == 1)
        {
            table.remove(&self.bucket);
        }
    }
}

impl BucketLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait until no other deploy holds `bucket`. The lock is released on drop.
    pub async fn acquire(&self, bucket: &str) -> BucketGuard {
        let lock = lock_table(&self.locks)
            .entry(bucket.to_string())
            .or_insert_with(|| Arc::new(AsyncMutex::new(())))
            .clone();
        BucketGuard {
            guard: Some(lock.lock_owned().await),
            bucket: bucket.to_string(),
            locks: self.locks.clone(),
        }
    }

    /// True if a deploy currently holds `bucket`
    pub fn is_held(&self, bucket: &str) -> bool {
        lock_table(&self.locks)
            .get(bucket)
            .is_some_and(|lock| lock.try_lock().is_err())
    }
}
