//! Per-project write serialization.
//!
//! Every edit is a read-modify-write of the whole stored project. Two edits
//! to the same project must not interleave between the read and the write,
//! or one of them is silently lost. Edits to different projects proceed in
//! parallel.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{Mutex, OwnedMutexGuard};

/// Entries are pruned once the table grows past this many idle locks.
const PRUNE_THRESHOLD: usize = 256;

#[derive(Default)]
pub struct ProjectLocks {
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl ProjectLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive access to `project_id`. Released on drop.
    pub async fn lock(&self, project_id: &str) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock().await;
            if locks.len() > PRUNE_THRESHOLD {
                // Only the table holds a reference: nobody waits on it.
                locks.retain(|_, lock| Arc::strong_count(lock) > 1);
            }
            locks
                .entry(project_id.to_string())
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .clone()
        };
        lock.lock_owned().await
    }

    pub async fn len(&self) -> usize {
        self.locks.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.locks.lock().await.is_empty()
    }
}
