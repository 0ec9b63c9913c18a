//! Memoisation of extraction results
//!
//! Extraction is a pure function of the image bytes, the confidence
//! threshold and the word bounds, so results are cached on exactly those
//! inputs. Uses a bounded moka cache with a time-to-live.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use certy_core::ExtractionConfig;
use moka::sync::Cache;
use sha2::{Digest, Sha256};

use crate::candidate::{ExtractionResult, NameRules};

/// Key for cached extraction results
#[derive(Debug, Clone, Hash, PartialEq, Eq)]
struct ExtractionKey {
    /// SHA-256 of the image bytes
    digest: [u8; 32],
    /// Threshold scaled to avoid float comparison issues
    threshold_scaled: i32,
    min_words: usize,
    max_words: usize,
}

impl ExtractionKey {
    fn new(bytes: &[u8], threshold: f32, rules: &NameRules) -> Self {
        Self {
            digest: Sha256::digest(bytes).into(),
            threshold_scaled: (threshold * 10000.0).round() as i32,
            min_words: rules.min_words,
            max_words: rules.max_words,
        }
    }
}

/// Cache of extraction results keyed by image content and parameters
#[derive(Clone)]
pub struct ExtractionCache {
    cache: Cache<ExtractionKey, ExtractionResult>,
    stats: Arc<CacheStats>,
}

impl ExtractionCache {
    pub fn new(capacity: u64, ttl: Duration) -> Self {
        let cache = Cache::builder()
            .max_capacity(capacity)
            .time_to_live(ttl)
            .build();

        Self {
            cache,
            stats: Arc::new(CacheStats::default()),
        }
    }

    pub fn from_config(config: &ExtractionConfig) -> Self {
        Self::new(
            config.cache_capacity,
            Duration::from_secs(config.cache_ttl_secs),
        )
    }

    pub fn get(&self, bytes: &[u8], threshold: f32, rules: &NameRules) -> Option<ExtractionResult> {
        let result = self.cache.get(&ExtractionKey::new(bytes, threshold, rules));

        if result.is_some() {
            self.stats.record_hit();
        } else {
            self.stats.record_miss();
        }

        result
    }

    pub fn put(&self, bytes: &[u8], threshold: f32, rules: &NameRules, result: ExtractionResult) {
        self.cache
            .insert(ExtractionKey::new(bytes, threshold, rules), result);
    }

    /// Drop every entry and reset the counters
    pub fn clear(&self) {
        self.cache.invalidate_all();
        self.cache.run_pending_tasks();
        self.stats.reset();
    }

    pub fn stats(&self) -> Arc<CacheStats> {
        Arc::clone(&self.stats)
    }

    pub fn entry_count(&self) -> u64 {
        self.cache.run_pending_tasks();
        self.cache.entry_count()
    }
}

impl Default for ExtractionCache {
    fn default() -> Self {
        Self::from_config(&ExtractionConfig::default())
    }
}

/// Hit and miss counters
#[derive(Debug, Default)]
pub struct CacheStats {
    hits: AtomicU64,
    misses: AtomicU64,
}

impl CacheStats {
    fn record_hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    fn record_miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    fn reset(&self) {
        self.hits.store(0, Ordering::Relaxed);
        self.misses.store(0, Ordering::Relaxed);
    }

    pub fn hits(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    pub fn misses(&self) -> u64 {
        self.misses.load(Ordering::Relaxed)
    }

    /// Fraction of lookups served from the cache
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits() + self.misses();
        if total == 0 {
            0.0
        } else {
            self.hits() as f64 / total as f64
        }
    }
}
