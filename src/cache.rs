//! In-memory artifact cache.
//!
//! Memoizes (media, episode, language) → resolved subtitle artifact so a
//! repeated request within the TTL skips network and extraction work.
//! Expiry is advisory-on-read: a read of a stale entry behaves as a miss
//! and removes the entry, no background sweep required. The cache lives
//! exactly as long as the service that owns it; dropping it is the
//! session-end invalidation.

use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use tokio::sync::Mutex;
use tracing::debug;

use crate::error::Result;
use crate::types::{CacheKey, SubtitleArtifact};

struct CacheEntry {
    artifact: Arc<SubtitleArtifact>,
    inserted: Instant,
}

/// Thread-safe cache of resolved subtitle artifacts.
pub struct ArtifactCache {
    entries: DashMap<CacheKey, CacheEntry>,
    /// Per-key fetch gates guaranteeing at most one in-flight fetch per
    /// key. Unrelated keys never serialize against each other.
    inflight: DashMap<CacheKey, Arc<Mutex<()>>>,
    max_entries: usize,
    ttl: Duration,
}

impl ArtifactCache {
    /// Create a cache holding at most `max_entries` artifacts for `ttl` each.
    /// Capacity is clamped to at least one entry so `put` always leaves the
    /// inserted artifact resident.
    pub fn new(max_entries: usize, ttl: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            inflight: DashMap::new(),
            max_entries: max_entries.max(1),
            ttl,
        }
    }

    /// Look up an artifact. Never triggers network or extraction work; a
    /// stale entry is removed and reported as a miss.
    pub fn get(&self, key: &CacheKey) -> Option<Arc<SubtitleArtifact>> {
        if let Some(entry) = self.entries.get(key) {
            if entry.inserted.elapsed() < self.ttl {
                return Some(Arc::clone(&entry.artifact));
            }
        } else {
            return None;
        }
        // Stale: drop the read guard before removing.
        self.entries.remove(key);
        debug!(key = ?key, "evicted stale cache entry on read");
        None
    }

    /// Store an artifact, evicting the oldest entry at capacity.
    pub fn put(&self, key: CacheKey, artifact: SubtitleArtifact) -> Arc<SubtitleArtifact> {
        let artifact = Arc::new(artifact);
        if self.entries.len() >= self.max_entries {
            self.evict_oldest();
        }
        self.entries.insert(
            key,
            CacheEntry {
                artifact: Arc::clone(&artifact),
                inserted: Instant::now(),
            },
        );
        artifact
    }

    /// Remove one entry.
    pub fn invalidate(&self, key: &CacheKey) {
        self.entries.remove(key);
    }

    /// Remove all entries.
    pub fn clear(&self) {
        self.entries.clear();
    }

    /// Number of cached entries, stale ones included.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the cache holds no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Resolve `key` through the cache, running `fetch` on a miss.
    ///
    /// Concurrent callers for the same key are serialized on a per-key
    /// gate: exactly one runs `fetch`, the rest observe its result through
    /// the cache once the gate opens. A `fetch` that yields `None` (no
    /// subtitle found) is not cached; the next request may try again.
    pub async fn get_or_fetch<F, Fut>(
        &self,
        key: &CacheKey,
        fetch: F,
    ) -> Result<Option<Arc<SubtitleArtifact>>>
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = Result<Option<SubtitleArtifact>>>,
    {
        if let Some(hit) = self.get(key) {
            debug!(key = ?key, "cache hit");
            return Ok(Some(hit));
        }

        let gate = self
            .inflight
            .entry(key.clone())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        let _guard = gate.lock().await;

        // A concurrent fetch may have populated the entry while this task
        // waited on the gate.
        if let Some(hit) = self.get(key) {
            debug!(key = ?key, "cache hit after waiting on in-flight fetch");
            return Ok(Some(hit));
        }

        let result = fetch().await;

        let out = match result {
            Ok(Some(artifact)) => Ok(Some(self.put(key.clone(), artifact))),
            Ok(None) => Ok(None),
            Err(e) => Err(e),
        };

        drop(_guard);
        drop(gate);
        // Drop the gate once no other task holds it; waiters keep theirs
        // alive through their own clones.
        self.inflight
            .remove_if(key, |_, gate| Arc::strong_count(gate) == 1);
        out
    }

    fn evict_oldest(&self) {
        let oldest = self
            .entries
            .iter()
            .min_by_key(|entry| entry.inserted)
            .map(|entry| entry.key().clone());
        if let Some(key) = oldest {
            self.entries.remove(&key);
        }
    }
}
