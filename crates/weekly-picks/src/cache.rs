//! Two-tier score cache
//!
//! A bounded in-memory LRU sits in front of a durable [`ScoreStore`]. Store
//! calls are blocking, so they run on tokio's blocking pool. Store failures are
//! returned to the caller rather than treated as misses.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use anyhow::{Context, Result};
use photo_quality::RecommendationScore;
use score_db::ScoreStore;
use tracing::debug;

use crate::lru::LruCache;

/// Hit/miss counters since the cache was created.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CacheStats {
    pub memory_entries: usize,
    pub memory_hits: u64,
    pub store_hits: u64,
    pub misses: u64,
}

pub struct ScoreCache {
    store: Arc<dyn ScoreStore>,
    memory: LruCache<i64, RecommendationScore>,
    memory_hits: AtomicU64,
    store_hits: AtomicU64,
    misses: AtomicU64,
}

impl ScoreCache {
    pub fn new(store: Arc<dyn ScoreStore>, memory_entries: usize) -> Self {
        Self {
            store,
            memory: LruCache::new(memory_entries),
            memory_hits: AtomicU64::new(0),
            store_hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    pub async fn get(&self, photo_id: i64) -> Result<Option<RecommendationScore>> {
        if let Some(score) = self.memory.get(&photo_id) {
            self.memory_hits.fetch_add(1, Ordering::Relaxed);
            debug!(photo_id, tier = "memory", "score cache hit");
            return Ok(Some(score));
        }

        let store = Arc::clone(&self.store);
        let stored = tokio::task::spawn_blocking(move || store.load(photo_id))
            .await
            .context("score store task failed")??;

        match stored {
            Some(stored) => {
                self.store_hits.fetch_add(1, Ordering::Relaxed);
                debug!(photo_id, tier = "store", "score cache hit");
                self.memory.insert(photo_id, stored.score.clone());
                Ok(Some(stored.score))
            }
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                debug!(photo_id, "score cache miss");
                Ok(None)
            }
        }
    }

    /// Write through to the store, then the memory tier. Last write wins.
    pub async fn put(
        &self,
        photo_id: i64,
        score: &RecommendationScore,
        analyzed_at: i64,
    ) -> Result<()> {
        let store = Arc::clone(&self.store);
        let owned = score.clone();
        tokio::task::spawn_blocking(move || store.save(photo_id, &owned, analyzed_at))
            .await
            .context("score store task failed")??;

        self.memory.insert(photo_id, score.clone());
        Ok(())
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            memory_entries: self.memory.len(),
            memory_hits: self.memory_hits.load(Ordering::Relaxed),
            store_hits: self.store_hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
        }
    }
}
