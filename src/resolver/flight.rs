//! Per-key flight locks.
//!
//! At most one holder per (worker, sample) key. Entries are dropped once no
//! holder or waiter references them.

use std::collections::HashMap;
use std::sync::{Arc, Weak};
use tokio::sync::{Mutex, OwnedMutexGuard};

type FlightKey = (String, String);

/// Keyed async locks.
#[derive(Default)]
pub struct FlightLocks {
    locks: Mutex<HashMap<FlightKey, Weak<Mutex<()>>>>,
}

impl FlightLocks {
    /// Create an empty lock table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive use of a key.
    pub async fn acquire(&self, worker: &str, sample_id: &str) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock().await;
            locks.retain(|_, weak| weak.strong_count() > 0);

            let key = (worker.to_string(), sample_id.to_string());
            match locks.get(&key).and_then(Weak::upgrade) {
                Some(lock) => lock,
                None => {
                    let lock = Arc::new(Mutex::new(()));
                    locks.insert(key, Arc::downgrade(&lock));
                    lock
                }
            }
        };
        lock.lock_owned().await
    }

    /// Number of keys currently held or awaited.
    pub async fn active(&self) -> usize {
        self.locks
            .lock()
            .await
            .values()
            .filter(|weak| weak.strong_count() > 0)
            .count()
    }
}
