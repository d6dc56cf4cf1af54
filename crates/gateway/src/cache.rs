//! In-memory response cache.
//!
//! Entries are keyed by a SHA-256 fingerprint of the prompt and its options.
//! When semantic matching is on, a miss on the fingerprint falls back to the
//! most similar stored prompt with identical options. Expired entries are
//! skipped on lookup and removed by [`ResponseCache::purge_expired`]; when
//! full, the least recently accessed entry is evicted.

use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info};

use tollgate_config::GatewayConfig;
use tollgate_core::{Clock, CompletionOptions, CompletionResult, SystemClock};

/// Deterministic cache key for a prompt and its options.
pub fn fingerprint(prompt: &str, options: &CompletionOptions) -> String {
    #[derive(Serialize)]
    struct Keyed<'a> {
        prompt: &'a str,
        options: &'a CompletionOptions,
    }
    let canonical = serde_json::to_string(&Keyed { prompt, options }).unwrap_or_default();
    hex::encode(Sha256::digest(canonical.as_bytes()))
}

/// Cosine similarity of whitespace-token frequency vectors, in `[0, 1]`.
pub fn similarity(a: &str, b: &str) -> f64 {
    let a = a.trim().to_lowercase();
    let b = b.trim().to_lowercase();
    if a == b {
        return 1.0;
    }

    let tf = |text: &str| {
        let mut counts: HashMap<String, f64> = HashMap::new();
        for word in text.split_whitespace() {
            *counts.entry(word.to_string()).or_default() += 1.0;
        }
        counts
    };
    let va = tf(&a);
    let vb = tf(&b);

    let dot: f64 = va
        .iter()
        .filter_map(|(word, x)| vb.get(word).map(|y| x * y))
        .sum();
    let norm = |v: &HashMap<String, f64>| v.values().map(|x| x * x).sum::<f64>().sqrt();
    let denom = norm(&va) * norm(&vb);
    if denom == 0.0 { 0.0 } else { dot / denom }
}

#[derive(Debug, Clone)]
pub struct CacheSettings {
    pub enabled: bool,
    pub semantic: bool,
    pub similarity_threshold: f64,
    pub max_size: usize,
    pub ttl: Duration,
}

impl CacheSettings {
    pub fn from_config(config: &GatewayConfig) -> Self {
        Self {
            enabled: config.cache_enabled,
            semantic: config.semantic_caching,
            similarity_threshold: config.similarity_threshold,
            max_size: config.cache.max_size.max(1),
            ttl: Duration::seconds(i64::try_from(config.cache.ttl_secs).unwrap_or(i64::MAX)),
        }
    }
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            semantic: false,
            similarity_threshold: 0.9,
            max_size: 100,
            ttl: Duration::hours(1),
        }
    }
}

#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub fingerprint: String,
    /// Original, pre-compression prompt
    pub prompt: String,
    /// Canonical serialized options; similarity never crosses option sets
    pub options: String,
    pub result: CompletionResult,
    pub created_at: DateTime<Utc>,
    pub last_accessed_at: DateTime<Utc>,
    pub access_count: u64,
    seq: u64,
}

impl CacheEntry {
    fn is_expired(&self, now: DateTime<Utc>, ttl: Duration) -> bool {
        now - self.created_at > ttl
    }

    fn touch(&mut self, now: DateTime<Utc>) -> CompletionResult {
        self.access_count += 1;
        self.last_accessed_at = now;
        self.result.as_cached()
    }
}

/// Counters exposed through [`ResponseCache::stats`].
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CacheStats {
    pub size: usize,
    pub max_size: usize,
    pub hits: u64,
    pub semantic_hits: u64,
    pub misses: u64,
    pub total_accesses: u64,
    pub evictions: u64,
    pub expired: u64,
}

impl CacheStats {
    pub fn hit_rate(&self) -> f64 {
        if self.total_accesses == 0 {
            0.0
        } else {
            self.hits as f64 / self.total_accesses as f64
        }
    }
}

#[derive(Default)]
struct CacheState {
    entries: HashMap<String, CacheEntry>,
    next_seq: u64,
    stats: CacheStats,
}

pub struct ResponseCache {
    settings: CacheSettings,
    clock: Arc<dyn Clock>,
    state: Mutex<CacheState>,
}

impl ResponseCache {
    pub fn new(settings: CacheSettings) -> Self {
        Self::with_clock(settings, Arc::new(SystemClock))
    }

    pub fn with_clock(settings: CacheSettings, clock: Arc<dyn Clock>) -> Self {
        Self {
            settings,
            clock,
            state: Mutex::new(CacheState::default()),
        }
    }

    pub fn settings(&self) -> &CacheSettings {
        &self.settings
    }

    /// Find a stored result for `prompt` under `options`.
    ///
    /// The returned copy has `was_cached` set; the stored entry's access
    /// bookkeeping is updated in the same critical section.
    pub fn lookup(&self, prompt: &str, options: &CompletionOptions) -> Option<CompletionResult> {
        if !self.settings.enabled {
            return None;
        }

        let key = fingerprint(prompt, options);
        let now = self.clock.now();
        let ttl = self.settings.ttl;
        let mut guard = self.state.lock();
        let state = &mut *guard;

        if let Some(entry) = state.entries.get_mut(&key) {
            if !entry.is_expired(now, ttl) {
                let result = entry.touch(now);
                state.stats.hits += 1;
                debug!(fingerprint = %key, "Exact cache hit");
                return Some(result);
            }
        }

        if self.settings.semantic {
            let canonical = options.canonical();
            let best = state
                .entries
                .values()
                .filter(|e| e.options == canonical && !e.is_expired(now, ttl))
                .map(|e| (similarity(prompt, &e.prompt), e.seq, e.fingerprint.clone()))
                .filter(|(score, _, _)| *score >= self.settings.similarity_threshold)
                // highest score wins, earliest insertion breaks ties
                .max_by(|a, b| a.0.total_cmp(&b.0).then(b.1.cmp(&a.1)));

            if let Some((score, _, found)) = best {
                if let Some(entry) = state.entries.get_mut(&found) {
                    let result = entry.touch(now);
                    state.stats.hits += 1;
                    state.stats.semantic_hits += 1;
                    debug!(similarity = score, "Semantic cache hit");
                    return Some(result);
                }
            }
        }

        state.stats.misses += 1;
        None
    }

    /// Store `result` under the original `prompt`.
    pub fn store(&self, prompt: &str, options: &CompletionOptions, result: &CompletionResult) {
        if !self.settings.enabled {
            return;
        }

        let key = fingerprint(prompt, options);
        let now = self.clock.now();
        let mut guard = self.state.lock();
        let state = &mut *guard;

        if !state.entries.contains_key(&key) && state.entries.len() >= self.settings.max_size {
            let victim = state
                .entries
                .values()
                .min_by(|a, b| {
                    a.last_accessed_at
                        .cmp(&b.last_accessed_at)
                        .then(a.seq.cmp(&b.seq))
                })
                .map(|e| e.fingerprint.clone());
            if let Some(victim) = victim {
                state.entries.remove(&victim);
                state.stats.evictions += 1;
                debug!(fingerprint = %victim, "Evicted least recently used entry");
            }
        }

        let seq = state.next_seq;
        state.next_seq += 1;
        state.entries.insert(
            key.clone(),
            CacheEntry {
                fingerprint: key,
                prompt: prompt.to_string(),
                options: options.canonical(),
                result: CompletionResult {
                    was_cached: false,
                    ..result.clone()
                },
                created_at: now,
                last_accessed_at: now,
                access_count: 0,
                seq,
            },
        );
    }

    pub fn clear(&self) {
        let mut state = self.state.lock();
        let dropped = state.entries.len();
        state.entries.clear();
        info!(entries = dropped, "Cache cleared");
    }

    /// Remove every expired entry. Returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        let now = self.clock.now();
        let ttl = self.settings.ttl;
        let mut state = self.state.lock();
        let before = state.entries.len();
        state.entries.retain(|_, e| !e.is_expired(now, ttl));
        let removed = before - state.entries.len();
        state.stats.expired += removed as u64;
        if removed > 0 {
            debug!(removed, "Purged expired cache entries");
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.state.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> CacheStats {
        let state = self.state.lock();
        CacheStats {
            size: state.entries.len(),
            max_size: self.settings.max_size,
            total_accesses: state.stats.hits + state.stats.misses,
            ..state.stats.clone()
        }
    }

    /// Snapshot of the entry stored for `prompt` under `options`, if any.
    pub fn entry(&self, prompt: &str, options: &CompletionOptions) -> Option<CacheEntry> {
        let key = fingerprint(prompt, options);
        self.state.lock().entries.get(&key).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tollgate_core::ManualClock;

    fn cache(settings: CacheSettings) -> (ResponseCache, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::default());
        (ResponseCache::with_clock(settings, clock.clone()), clock)
    }

    fn result(text: &str) -> CompletionResult {
        CompletionResult::new(text, 5, 0.01, "openai")
    }

    fn opts() -> CompletionOptions {
        CompletionOptions::default()
    }

    #[test]
    fn store_then_lookup_marks_cached() {
        let (cache, _) = cache(CacheSettings::default());
        let stored = result("Paris");
        cache.store("capital of France?", &opts(), &stored);

        let hit = cache.lookup("capital of France?", &opts()).unwrap();
        assert!(hit.was_cached);
        assert_eq!(hit.text, "Paris");
        assert_eq!(hit.cost, stored.cost);
        assert_eq!(cache.entry("capital of France?", &opts()).unwrap().access_count, 1);
    }

    #[test]
    fn options_are_part_of_the_key() {
        let (cache, _) = cache(CacheSettings::default());
        cache.store("hi", &opts(), &result("a"));
        assert!(cache.lookup("hi", &opts().with_model("gpt-4o")).is_none());
        assert_ne!(
            fingerprint("hi", &opts()),
            fingerprint("hi", &opts().with_temperature(0.2))
        );
    }

    #[test]
    fn lru_evicts_least_recently_accessed() {
        let (cache, clock) = cache(CacheSettings {
            max_size: 3,
            ..Default::default()
        });
        for prompt in ["one", "two", "three"] {
            cache.store(prompt, &opts(), &result(prompt));
            clock.advance(Duration::seconds(1));
        }

        // touching "one" protects it
        assert!(cache.lookup("one", &opts()).is_some());
        clock.advance(Duration::seconds(1));

        cache.store("four", &opts(), &result("four"));
        assert_eq!(cache.len(), 3);
        assert!(cache.entry("two", &opts()).is_none());
        assert!(cache.entry("one", &opts()).is_some());
        assert!(cache.entry("three", &opts()).is_some());
        assert_eq!(cache.stats().evictions, 1);
    }

    #[test]
    fn restoring_existing_key_does_not_evict() {
        let (cache, _) = cache(CacheSettings {
            max_size: 2,
            ..Default::default()
        });
        cache.store("a", &opts(), &result("1"));
        cache.store("b", &opts(), &result("2"));
        cache.store("a", &opts(), &result("3"));
        assert_eq!(cache.len(), 2);
        assert_eq!(cache.lookup("a", &opts()).unwrap().text, "3");
    }

    #[test]
    fn ttl_expiry_is_lazy_then_purged() {
        let (cache, clock) = cache(CacheSettings {
            ttl: Duration::seconds(1),
            ..Default::default()
        });
        cache.store("q", &opts(), &result("a"));
        clock.advance(Duration::milliseconds(1100));

        assert!(cache.lookup("q", &opts()).is_none());
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.purge_expired(), 1);
        assert!(cache.is_empty());
        assert_eq!(cache.stats().expired, 1);
    }

    #[test]
    fn entry_at_exactly_ttl_is_still_fresh() {
        let (cache, clock) = cache(CacheSettings {
            ttl: Duration::seconds(1),
            ..Default::default()
        });
        cache.store("q", &opts(), &result("a"));
        clock.advance(Duration::seconds(1));
        assert!(cache.lookup("q", &opts()).is_some());
    }

    #[test]
    fn similarity_basics() {
        assert!((similarity("Explain Rust", "explain rust  ") - 1.0).abs() < 1e-10);
        assert!((similarity("What is TypeScript?", "Explain JavaScript") - 0.0).abs() < 1e-10);
        assert!((similarity("", "anything") - 0.0).abs() < 1e-10);
        let s = similarity("Explain TypeScript", "Can you explain TypeScript?");
        assert!(s > 0.3 && s < 1.0);
    }

    #[test]
    fn semantic_lookup_respects_threshold() {
        let (strict, _) = cache(CacheSettings {
            semantic: true,
            similarity_threshold: 0.95,
            ..Default::default()
        });
        strict.store("Explain JavaScript", &opts(), &result("js"));
        assert!(strict.lookup("What is TypeScript?", &opts()).is_none());

        let (loose, _) = cache(CacheSettings {
            semantic: true,
            similarity_threshold: 0.3,
            ..Default::default()
        });
        loose.store("Can you explain TypeScript?", &opts(), &result("ts"));
        let hit = loose.lookup("Explain TypeScript", &opts()).unwrap();
        assert_eq!(hit.text, "ts");
        assert!(hit.was_cached);
        assert_eq!(loose.stats().semantic_hits, 1);
    }

    #[test]
    fn semantic_lookup_never_crosses_options() {
        let (cache, _) = cache(CacheSettings {
            semantic: true,
            similarity_threshold: 0.1,
            ..Default::default()
        });
        cache.store("explain rust ownership", &opts().with_model("a"), &result("a"));
        assert!(cache.lookup("explain rust ownership please", &opts()).is_none());
    }

    #[test]
    fn semantic_lookup_picks_best_match() {
        let (cache, _) = cache(CacheSettings {
            semantic: true,
            similarity_threshold: 0.3,
            ..Default::default()
        });
        cache.store("rust ownership rules", &opts(), &result("weak"));
        cache.store("explain rust ownership rules", &opts(), &result("strong"));
        let hit = cache.lookup("please explain rust ownership rules", &opts()).unwrap();
        assert_eq!(hit.text, "strong");
    }

    #[test]
    fn semantic_ties_prefer_first_stored() {
        let (cache, _) = cache(CacheSettings {
            semantic: true,
            similarity_threshold: 0.3,
            ..Default::default()
        });
        cache.store("alpha beta", &opts(), &result("first"));
        cache.store("alpha gamma", &opts(), &result("second"));
        let hit = cache.lookup("alpha", &opts()).unwrap();
        assert_eq!(hit.text, "first");
    }

    #[test]
    fn disabled_cache_is_inert() {
        let (cache, _) = cache(CacheSettings {
            enabled: false,
            ..Default::default()
        });
        cache.store("q", &opts(), &result("a"));
        assert!(cache.lookup("q", &opts()).is_none());
        assert!(cache.is_empty());
    }

    #[test]
    fn clear_and_stats() {
        let (cache, _) = cache(CacheSettings::default());
        cache.store("q", &opts(), &result("a"));
        cache.lookup("q", &opts());
        cache.lookup("nope", &opts());
        let stats = cache.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.total_accesses, 2);
        assert!((stats.hit_rate() - 0.5).abs() < 1e-10);

        cache.clear();
        assert!(cache.is_empty());
    }
}
