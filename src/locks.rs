use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use tracing::debug;

use crate::models::StockKey;

/// Per-key async mutexes serializing read-check-write on one (tenant, item, location).
///
/// Keys are always acquired in sorted order, so two callers locking overlapping key sets
/// cannot deadlock. Distinct keys never share a mutex.
#[derive(Debug, Clone, Default)]
pub struct StockKeyLocks {
    locks: Arc<DashMap<StockKey, Arc<AsyncMutex<()>>>>,
}

/// Guards held for the duration of one unit of work.
#[derive(Debug)]
pub struct KeyGuards {
    keys: Vec<StockKey>,
    _guards: Vec<OwnedMutexGuard<()>>,
}

impl KeyGuards {
    pub fn keys(&self) -> &[StockKey] {
        &self.keys
    }
}

impl StockKeyLocks {
    pub fn new() -> Self {
        Self::default()
    }

    fn mutex_for(&self, key: &StockKey) -> Arc<AsyncMutex<()>> {
        self.locks
            .entry(key.clone())
            .or_insert_with(|| Arc::new(AsyncMutex::new(())))
            .clone()
    }

    /// Locks every key, deduplicated, in ascending order.
    pub async fn acquire<I>(&self, keys: I) -> KeyGuards
    where
        I: IntoIterator<Item = StockKey>,
    {
        let mut keys: Vec<StockKey> = keys.into_iter().collect();
        keys.sort();
        keys.dedup();

        let mut guards = Vec::with_capacity(keys.len());
        for key in &keys {
            // The dashmap shard guard is released before awaiting.
            let mutex = self.mutex_for(key);
            guards.push(mutex.lock_owned().await);
        }
        debug!(keys = keys.len(), "stock keys locked");

        KeyGuards {
            keys,
            _guards: guards,
        }
    }

    /// Drops mutexes nobody holds or waits on.
    pub fn prune(&self) -> usize {
        let mut pruned = 0;
        self.locks.retain(|_, mutex| {
            let busy = Arc::strong_count(mutex) > 1;
            if !busy {
                pruned += 1;
            }
            busy
        });
        pruned
    }

    pub fn len(&self) -> usize {
        self.locks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }
}
