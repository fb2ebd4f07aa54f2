use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

/// Per-task serialization point: the read-compare-write sequence of one task
/// never interleaves with another writer of the same task.
#[derive(Debug, Default)]
pub struct TaskLocks {
    locks: Mutex<HashMap<String, Arc<AsyncMutex<()>>>>,
}

impl TaskLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn lock(&self, task_id: &str) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock().expect("task lock table poisoned");
            locks.entry(task_id.to_string()).or_default().clone()
        };
        lock.lock_owned().await
    }

    /// Drop the entry for a deleted task unless someone is still waiting on
    /// it.
    pub fn forget(&self, task_id: &str) {
        let mut locks = self.locks.lock().expect("task lock table poisoned");
        if locks
            .get(task_id)
            .is_some_and(|lock| Arc::strong_count(lock) == 1)
        {
            locks.remove(task_id);
        }
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.locks.lock().expect("task lock table poisoned").len()
    }
}
