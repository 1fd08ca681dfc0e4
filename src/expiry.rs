//! Expiring-map primitive shared by the dispatch gates.
//!
//! Entries carry the instant they were stamped and are treated as absent
//! once older than the map's TTL. Expiry is lazy on read; a periodic sweep
//! task can be spawned to bound memory on maps whose keys are rarely
//! re-read.

use std::hash::Hash;
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::debug;

/// Map of key to stamp time with a fixed TTL.
///
/// Cheap to clone; clones share the underlying storage. All operations are
/// synchronous and atomic per key, so a check-and-set never straddles a
/// suspension point.
#[derive(Clone)]
pub struct ExpiringMap<K>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
{
    entries: Arc<DashMap<K, Instant>>,
    ttl: Duration,
}

impl<K> ExpiringMap<K>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
{
    /// Create an empty map whose entries expire after `ttl`.
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: Arc::new(DashMap::new()),
            ttl,
        }
    }

    /// Stamp a key with the current time, overwriting any previous stamp.
    pub fn insert(&self, key: K) {
        self.entries.insert(key, Instant::now());
    }

    /// True if the key holds a live (unexpired) stamp.
    ///
    /// An expired entry is removed on the way out.
    pub fn contains_live(&self, key: &K) -> bool {
        // Read guard drops at the end of this statement, before the remove
        // touches the shard again.
        let expired = match self.entries.get(key) {
            Some(stamp) => stamp.elapsed() >= self.ttl,
            None => return false,
        };
        if expired {
            self.entries.remove(key);
        }
        !expired
    }

    /// Atomically stamp the key if it is absent or expired.
    ///
    /// Returns true when the stamp was placed, false when a live entry
    /// already holds the key. The check and the set happen under one entry
    /// lock with no await in between.
    pub fn try_insert(&self, key: K) -> bool {
        let now = Instant::now();
        match self.entries.entry(key) {
            Entry::Occupied(mut occupied) => {
                if now.duration_since(*occupied.get()) < self.ttl {
                    false
                } else {
                    occupied.insert(now);
                    true
                }
            }
            Entry::Vacant(vacant) => {
                vacant.insert(now);
                true
            }
        }
    }

    /// Drop a key regardless of its stamp.
    pub fn remove(&self, key: &K) {
        self.entries.remove(key);
    }

    /// Remove every expired entry. Returns the number removed.
    pub fn sweep(&self) -> usize {
        let ttl = self.ttl;
        let before = self.entries.len();
        self.entries.retain(|_, stamp| stamp.elapsed() < ttl);
        before.saturating_sub(self.entries.len())
    }

    /// Number of entries currently stored, live or not yet swept.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True if no entries are stored.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Spawn a periodic sweep task that runs until the shutdown signal
    /// flips.
    pub fn spawn_sweep_task(
        &self,
        interval: Duration,
        mut shutdown: watch::Receiver<bool>,
        name: &'static str,
    ) -> JoinHandle<()> {
        let map = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await; // immediate first tick has nothing to sweep
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let removed = map.sweep();
                        if removed > 0 {
                            debug!(removed, remaining = map.len(), map = name, "Swept expired entries");
                        }
                    }
                    _ = shutdown.changed() => break,
                }
            }
        })
    }
}
