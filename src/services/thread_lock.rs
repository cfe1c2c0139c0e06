use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};

type ThreadKey = (String, String);

/// One async mutex per (business, thread), so turns of the same conversation run
/// one after another while different conversations proceed in parallel.
#[derive(Default)]
pub struct ThreadLocks {
    locks: DashMap<ThreadKey, Arc<Mutex<()>>>,
}

impl ThreadLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn acquire(&self, business_id: &str, thread_id: &str) -> ThreadGuard<'_> {
        let key = (business_id.to_string(), thread_id.to_string());
        let lock = self.locks.entry(key.clone()).or_default().clone();
        let guard = lock.lock_owned().await;
        ThreadGuard {
            locks: self,
            key,
            guard: Some(guard),
        }
    }

    /// Number of conversations currently holding or waiting on a lock.
    pub fn len(&self) -> usize {
        self.locks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }
}

pub struct ThreadGuard<'a> {
    locks: &'a ThreadLocks,
    key: ThreadKey,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for ThreadGuard<'_> {
    fn drop(&mut self) {
        drop(self.guard.take());
        // Evict the entry once nobody else holds or waits on it.
        self.locks
            .locks
            .remove_if(&self.key, |_, lock| Arc::strong_count(lock) == 1);
    }
}
