//! Bounded-concurrency batch processing and the per-operator-family result
//! cache (C6). Mirrors the worker-pool idiom: a semaphore caps in-flight
//! work, and a small TTL cache keyed by content hash avoids recomputation
//! across calls with duplicate inputs.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use sha2::{Digest, Sha256};
use tokio::sync::{Mutex, Semaphore};

/// Per-call knobs for a batch operation.
#[derive(Debug, Clone, Copy)]
pub struct BatchConfig {
    pub max_concurrency: usize,
    pub use_cache: bool,
    pub stop_on_error: bool,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            max_concurrency: 5,
            use_cache: true,
            stop_on_error: false,
        }
    }
}

/// Outcome of running one item through a batch.
pub struct BatchItemResult<T> {
    pub index: usize,
    pub result: Result<T, String>,
    pub cache_hit: bool,
}

/// Run `f` over every item in `inputs`, with at most `config.max_concurrency`
/// futures in flight. If `config.stop_on_error` is set, the first error
/// cancels remaining not-yet-started work (already-running items still
/// complete). `f` reports whether it served its item from cache as the
/// second element of its `Ok` tuple — that becomes `BatchItemResult::
/// cache_hit`, rather than a value this function could ever know on its own.
pub async fn run_batch<I, T, F, Fut>(
    inputs: Vec<I>,
    config: BatchConfig,
    f: F,
) -> Vec<BatchItemResult<T>>
where
    I: Send + 'static,
    T: Send + 'static,
    F: Fn(I) -> Fut + Send + Sync + 'static,
    Fut: std::future::Future<Output = Result<(T, bool), String>> + Send,
{
    let semaphore = Arc::new(Semaphore::new(config.max_concurrency.max(1)));
    let f = Arc::new(f);
    let stop = Arc::new(std::sync::atomic::AtomicBool::new(false));
    let mut handles = Vec::with_capacity(inputs.len());

    for (index, input) in inputs.into_iter().enumerate() {
        let semaphore = semaphore.clone();
        let f = f.clone();
        let stop = stop.clone();
        let stop_on_error = config.stop_on_error;
        handles.push(tokio::spawn(async move {
            let _permit = semaphore.acquire_owned().await.expect("semaphore closed");
            if stop_on_error && stop.load(std::sync::atomic::Ordering::SeqCst) {
                return BatchItemResult {
                    index,
                    result: Err("skipped: earlier item in batch failed".into()),
                    cache_hit: false,
                };
            }
            let outcome = f(input).await;
            if outcome.is_err() && stop_on_error {
                stop.store(true, std::sync::atomic::Ordering::SeqCst);
            }
            let (result, cache_hit) = match outcome {
                Ok((value, cache_hit)) => (Ok(value), cache_hit),
                Err(e) => (Err(e), false),
            };
            BatchItemResult { index, result, cache_hit }
        }));
    }

    let mut results = Vec::with_capacity(handles.len());
    for handle in handles {
        match handle.await {
            Ok(r) => results.push(r),
            Err(e) => results.push(BatchItemResult {
                index: results.len(),
                result: Err(format!("task panicked: {e}")),
                cache_hit: false,
            }),
        }
    }
    results.sort_by_key(|r| r.index);
    results
}

/// SHA-256 of `input`, used as the cache key so identical content hits the
/// cache regardless of its origin.
pub fn content_hash(input: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(input.as_bytes());
    hex::encode(hasher.finalize())
}

/// The operator families that get their own cache, with each one's TTL and
/// entry-count cap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CacheFamily {
    Fact,
    Entity,
    Citation,
    SourceRating,
    Conflict,
}

impl CacheFamily {
    fn ttl(self) -> Duration {
        match self {
            CacheFamily::Fact => Duration::from_secs(10 * 60),
            CacheFamily::Entity => Duration::from_secs(10 * 60),
            CacheFamily::Citation => Duration::from_secs(30 * 60),
            CacheFamily::SourceRating => Duration::from_secs(60 * 60),
            CacheFamily::Conflict => Duration::from_secs(5 * 60),
        }
    }

    fn capacity(self) -> usize {
        match self {
            CacheFamily::Fact => 500,
            CacheFamily::Entity => 500,
            CacheFamily::Citation => 200,
            CacheFamily::SourceRating => 1000,
            CacheFamily::Conflict => 200,
        }
    }
}

struct CacheEntry {
    value: serde_json::Value,
    inserted_at: Instant,
}

struct FamilyCache {
    entries: HashMap<String, CacheEntry>,
}

impl FamilyCache {
    fn new() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }
}

#[derive(Default, Clone, Copy)]
struct CacheStatsInner {
    hits: u64,
    misses: u64,
    evictions: u64,
}

/// Bounded, TTL'd, content-hash-keyed result cache shared by the batch
/// operators. One instance is held per server, covering every
/// [`CacheFamily`] — each family tracks its own entries and hit/miss/eviction
/// counters, since a hot `source_rating` cache says nothing about a cold
/// `conflict` one.
pub struct ResultCache {
    families: Mutex<HashMap<CacheFamily, FamilyCache>>,
    stats: Mutex<HashMap<CacheFamily, CacheStatsInner>>,
}

#[derive(Debug, Clone, Copy, Default, serde::Serialize)]
pub struct CacheStats {
    pub size: usize,
    pub hits: u64,
    pub misses: u64,
    pub hit_rate: f64,
}

/// Per-[`CacheFamily`] breakdown returned by [`ResultCache::stats`].
#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct CacheStatsReport {
    pub fact: CacheStats,
    pub entity: CacheStats,
    pub citation: CacheStats,
    pub source_rating: CacheStats,
    pub conflict: CacheStats,
}

impl ResultCache {
    pub fn new() -> Self {
        Self {
            families: Mutex::new(HashMap::new()),
            stats: Mutex::new(HashMap::new()),
        }
    }

    pub async fn get(&self, family: CacheFamily, key: &str) -> Option<serde_json::Value> {
        let mut families = self.families.lock().await;
        let cache = families.entry(family).or_insert_with(FamilyCache::new);
        let mut stats = self.stats.lock().await;
        let entry_stats = stats.entry(family).or_default();
        match cache.entries.get(key) {
            Some(entry) if entry.inserted_at.elapsed() < family.ttl() => {
                entry_stats.hits += 1;
                Some(entry.value.clone())
            }
            Some(_) => {
                cache.entries.remove(key);
                entry_stats.misses += 1;
                None
            }
            None => {
                entry_stats.misses += 1;
                None
            }
        }
    }

    pub async fn put(&self, family: CacheFamily, key: String, value: serde_json::Value) {
        let mut families = self.families.lock().await;
        let cache = families.entry(family).or_insert_with(FamilyCache::new);
        if cache.entries.len() >= family.capacity() {
            self.evict_oldest(cache, family).await;
        }
        cache.entries.insert(
            key,
            CacheEntry {
                value,
                inserted_at: Instant::now(),
            },
        );
    }

    /// Evict the oldest 10% of entries, at least one, per the documented
    /// eviction policy.
    async fn evict_oldest(&self, cache: &mut FamilyCache, family: CacheFamily) {
        let evict_count = (family.capacity() / 10).max(1);
        let mut keys: Vec<(String, Instant)> = cache
            .entries
            .iter()
            .map(|(k, v)| (k.clone(), v.inserted_at))
            .collect();
        keys.sort_by_key(|(_, inserted_at)| *inserted_at);
        let mut stats = self.stats.lock().await;
        let entry_stats = stats.entry(family).or_default();
        for (key, _) in keys.into_iter().take(evict_count) {
            cache.entries.remove(&key);
            entry_stats.evictions += 1;
        }
    }

    pub async fn clear(&self) {
        let mut families = self.families.lock().await;
        families.clear();
        let mut stats = self.stats.lock().await;
        stats.clear();
    }

    /// Per-family `{size, hits, misses, hit_rate}` breakdown across every
    /// [`CacheFamily`], not a single aggregate — each family caches
    /// different data with different traffic patterns.
    pub async fn stats(&self) -> CacheStatsReport {
        let families = self.families.lock().await;
        let stats = self.stats.lock().await;
        let one = |family: CacheFamily| -> CacheStats {
            let size = families.get(&family).map(|c| c.entries.len()).unwrap_or(0);
            let s = stats.get(&family).copied().unwrap_or_default();
            let total = s.hits + s.misses;
            let hit_rate = if total == 0 { 0.0 } else { s.hits as f64 / total as f64 };
            CacheStats {
                size,
                hits: s.hits,
                misses: s.misses,
                hit_rate,
            }
        };
        CacheStatsReport {
            fact: one(CacheFamily::Fact),
            entity: one(CacheFamily::Entity),
            citation: one(CacheFamily::Citation),
            source_rating: one(CacheFamily::SourceRating),
            conflict: one(CacheFamily::Conflict),
        }
    }
}

impl Default for ResultCache {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn run_batch_respects_concurrency_and_order() {
        let config = BatchConfig {
            max_concurrency: 2,
            use_cache: false,
            stop_on_error: false,
        };
        let results = run_batch(vec![1, 2, 3, 4], config, |x: i32| async move {
            Ok::<_, String>((x * 2, false))
        })
        .await;
        let values: Vec<i32> = results.into_iter().map(|r| r.result.unwrap()).collect();
        assert_eq!(values, vec![2, 4, 6, 8]);
    }

    #[tokio::test]
    async fn cache_round_trip_and_eviction() {
        let cache = ResultCache::new();
        cache
            .put(CacheFamily::Conflict, "k1".into(), serde_json::json!(1))
            .await;
        assert!(cache.get(CacheFamily::Conflict, "k1").await.is_some());
        assert!(cache.get(CacheFamily::Conflict, "missing").await.is_none());
        let stats = cache.stats().await;
        assert_eq!(stats.conflict.size, 1);
        assert_eq!(stats.conflict.hits, 1);
        assert_eq!(stats.conflict.misses, 1);
        assert_eq!(stats.conflict.hit_rate, 0.5);
        assert_eq!(stats.fact.size, 0);
        assert_eq!(stats.fact.hits, 0);
    }

    #[test]
    fn content_hash_is_stable() {
        assert_eq!(content_hash("hello"), content_hash("hello"));
        assert_ne!(content_hash("hello"), content_hash("world"));
    }
}
