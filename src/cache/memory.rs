//! In-memory cache implementation using moka
//!
//! Values are stored as JSON strings so any serializable type fits. Each
//! entry remembers the TTL it was written with and moka's expiry policy
//! evicts it once that elapses.

use super::CacheLayer;
use anyhow::{Context, Result};
use async_trait::async_trait;
use moka::future::Cache;
use moka::Expiry;
use serde::{de::DeserializeOwned, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};

const DEFAULT_MAX_CAPACITY: u64 = 10_000;

const DEFAULT_TTL: Duration = Duration::from_secs(3600);

#[derive(Clone)]
struct CacheEntry {
    data: Arc<String>,
    ttl: Duration,
}

impl CacheEntry {
    fn new<T: Serialize>(value: &T, ttl: Duration) -> Result<Self> {
        let json = serde_json::to_string(value).context("Failed to serialize cache value")?;
        Ok(Self {
            data: Arc::new(json),
            ttl,
        })
    }

    fn counter(value: u64, ttl: Duration) -> Self {
        Self {
            data: Arc::new(value.to_string()),
            ttl,
        }
    }

    fn deserialize<T: DeserializeOwned>(&self) -> Result<T> {
        serde_json::from_str(&self.data).context("Failed to deserialize cache value")
    }
}

/// Expiry policy reading the TTL stored on each entry
struct PerEntryTtl;

impl Expiry<String, CacheEntry> for PerEntryTtl {
    fn expire_after_create(
        &self,
        _key: &String,
        value: &CacheEntry,
        _created_at: Instant,
    ) -> Option<Duration> {
        Some(value.ttl)
    }

    // Overwriting a key restarts its clock with the new entry's TTL.
    fn expire_after_update(
        &self,
        _key: &String,
        value: &CacheEntry,
        _updated_at: Instant,
        _duration_until_expiry: Option<Duration>,
    ) -> Option<Duration> {
        Some(value.ttl)
    }
}

/// In-memory cache using moka
pub struct MemoryCache {
    cache: Cache<String, CacheEntry>,
    default_ttl: Duration,
}

impl std::fmt::Debug for MemoryCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryCache")
            .field("entry_count", &self.cache.entry_count())
            .field("default_ttl", &self.default_ttl)
            .finish()
    }
}

impl MemoryCache {
    /// Create a cache holding up to 10,000 entries with a one hour default TTL
    pub fn new() -> Self {
        Self::with_capacity_and_ttl(DEFAULT_MAX_CAPACITY, DEFAULT_TTL)
    }

    pub fn with_capacity_and_ttl(max_capacity: u64, default_ttl: Duration) -> Self {
        let cache = Cache::builder()
            .max_capacity(max_capacity)
            .expire_after(PerEntryTtl)
            .build();

        Self { cache, default_ttl }
    }

    /// TTL used by [`MemoryCache::set_default`]
    pub fn default_ttl(&self) -> Duration {
        self.default_ttl
    }

    /// Store a value with the cache's default TTL
    pub async fn set_default<T: Serialize + Send + Sync>(&self, key: &str, value: &T) -> Result<()> {
        self.set(key, value, self.default_ttl).await
    }

    pub fn entry_count(&self) -> u64 {
        self.cache.entry_count()
    }

    /// Glob match where `*` is any run of characters and `?` is one character
    fn pattern_matches(pattern: &str, key: &str) -> bool {
        let pattern: Vec<char> = pattern.chars().collect();
        let key: Vec<char> = key.chars().collect();

        // Iterative matcher with single-star backtracking.
        let (mut pi, mut ki) = (0, 0);
        let mut star: Option<(usize, usize)> = None;
        while ki < key.len() {
            if pi < pattern.len() && (pattern[pi] == '?' || pattern[pi] == key[ki]) {
                pi += 1;
                ki += 1;
            } else if pi < pattern.len() && pattern[pi] == '*' {
                star = Some((pi, ki));
                pi += 1;
            } else if let Some((sp, sk)) = star {
                pi = sp + 1;
                ki = sk + 1;
                star = Some((sp, sk + 1));
            } else {
                return false;
            }
        }
        pattern[pi..].iter().all(|c| *c == '*')
    }
}

impl Default for MemoryCache {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CacheLayer for MemoryCache {
    async fn get<T: DeserializeOwned + Send>(&self, key: &str) -> Result<Option<T>> {
        match self.cache.get(key).await {
            Some(entry) => Ok(Some(entry.deserialize()?)),
            None => Ok(None),
        }
    }

    async fn set<T: Serialize + Send + Sync>(
        &self,
        key: &str,
        value: &T,
        ttl: Duration,
    ) -> Result<()> {
        let entry = CacheEntry::new(value, ttl)?;
        self.cache.insert(key.to_string(), entry).await;
        Ok(())
    }

    /// Read-modify-write runs under moka's per-key lock
    async fn incr(&self, key: &str, ttl: Duration) -> Result<u64> {
        let entry = self
            .cache
            .entry(key.to_string())
            .and_upsert_with(|existing| {
                let current = existing
                    .and_then(|e| e.into_value().deserialize::<u64>().ok())
                    .unwrap_or(0);
                std::future::ready(CacheEntry::counter(current + 1, ttl))
            })
            .await;
        entry.into_value().deserialize()
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.cache.invalidate(key).await;
        Ok(())
    }

    async fn delete_pattern(&self, pattern: &str) -> Result<()> {
        let keys_to_delete: Vec<String> = self
            .cache
            .iter()
            .filter(|(key, _)| Self::pattern_matches(pattern, key.as_ref()))
            .map(|(key, _)| (*key).clone())
            .collect();

        for key in keys_to_delete {
            self.cache.invalidate(&key).await;
        }
        Ok(())
    }

    async fn clear(&self) -> Result<()> {
        self.cache.invalidate_all();
        self.cache.run_pending_tasks().await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_set_and_get() {
        let cache = MemoryCache::new();
        cache
            .set("key1", &"value1".to_string(), Duration::from_secs(60))
            .await
            .unwrap();

        let result: Option<String> = cache.get("key1").await.unwrap();
        assert_eq!(result, Some("value1".to_string()));
    }

    #[tokio::test]
    async fn test_get_missing_key() {
        let cache = MemoryCache::new();
        let result: Option<String> = cache.get("missing").await.unwrap();
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn test_entry_expires_after_its_own_ttl() {
        let cache = MemoryCache::new();
        cache
            .set("short", &1_u32, Duration::from_millis(20))
            .await
            .unwrap();
        cache
            .set("long", &2_u32, Duration::from_secs(60))
            .await
            .unwrap();

        tokio::time::sleep(Duration::from_millis(80)).await;

        let short: Option<u32> = cache.get("short").await.unwrap();
        let long: Option<u32> = cache.get("long").await.unwrap();
        assert_eq!(short, None);
        assert_eq!(long, Some(2));
    }

    #[tokio::test]
    async fn test_overwrite_restarts_ttl() {
        let cache = MemoryCache::new();
        cache.set("k", &1_u32, Duration::from_millis(40)).await.unwrap();
        cache.set("k", &2_u32, Duration::from_secs(60)).await.unwrap();

        tokio::time::sleep(Duration::from_millis(80)).await;

        let value: Option<u32> = cache.get("k").await.unwrap();
        assert_eq!(value, Some(2));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_incr_is_atomic_under_contention() {
        let cache = Arc::new(MemoryCache::new());
        let ttl = Duration::from_secs(60);

        let mut tasks = tokio::task::JoinSet::new();
        for _ in 0..50 {
            let cache = cache.clone();
            tasks.spawn(async move { cache.incr("hits", ttl).await.unwrap() });
        }
        let mut seen = Vec::new();
        while let Some(value) = tasks.join_next().await {
            seen.push(value.unwrap());
        }
        seen.sort_unstable();

        assert_eq!(seen, (1..=50).collect::<Vec<u64>>());
        let stored: Option<u64> = cache.get("hits").await.unwrap();
        assert_eq!(stored, Some(50));
    }

    #[tokio::test]
    async fn test_incr_restarts_ttl() {
        let cache = MemoryCache::new();
        cache.incr("n", Duration::from_millis(40)).await.unwrap();
        assert_eq!(cache.incr("n", Duration::from_secs(60)).await.unwrap(), 2);

        tokio::time::sleep(Duration::from_millis(80)).await;

        let value: Option<u64> = cache.get("n").await.unwrap();
        assert_eq!(value, Some(2));
    }

    #[tokio::test]
    async fn test_delete_and_delete_pattern() {
        let cache = MemoryCache::new();
        let ttl = Duration::from_secs(60);
        cache.set("2fa_rate_limit_1", &1_u64, ttl).await.unwrap();
        cache.set("2fa_rate_limit_2", &1_u64, ttl).await.unwrap();
        cache.set("2fa_pending:x", &7_i64, ttl).await.unwrap();

        cache.delete_pattern("2fa_rate_limit_*").await.unwrap();
        let a: Option<u64> = cache.get("2fa_rate_limit_1").await.unwrap();
        let b: Option<u64> = cache.get("2fa_rate_limit_2").await.unwrap();
        let c: Option<i64> = cache.get("2fa_pending:x").await.unwrap();
        assert!(a.is_none() && b.is_none());
        assert_eq!(c, Some(7));

        cache.delete("2fa_pending:x").await.unwrap();
        let c: Option<i64> = cache.get("2fa_pending:x").await.unwrap();
        assert!(c.is_none());
    }

    #[tokio::test]
    async fn test_clear() {
        let cache = MemoryCache::new();
        cache.set_default("a", &1_u8).await.unwrap();
        cache.clear().await.unwrap();
        let a: Option<u8> = cache.get("a").await.unwrap();
        assert!(a.is_none());
    }

    #[test]
    fn test_pattern_matches() {
        assert!(MemoryCache::pattern_matches("user:*", "user:1"));
        assert!(MemoryCache::pattern_matches("user:?:x", "user:a:x"));
        assert!(MemoryCache::pattern_matches("*", ""));
        assert!(MemoryCache::pattern_matches("a*b*c", "axxbyyc"));
        assert!(!MemoryCache::pattern_matches("user:?", "user:12"));
        assert!(!MemoryCache::pattern_matches("a*c", "abd"));
    }

    mod property_tests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn prop_literal_pattern_matches_only_itself(key in "[a-z:_0-9]{0,20}", other in "[a-z:_0-9]{0,20}") {
                prop_assert!(MemoryCache::pattern_matches(&key, &key));
                prop_assert_eq!(MemoryCache::pattern_matches(&key, &other), key == other);
            }

            #[test]
            fn prop_prefix_star_matches_extensions(prefix in "[a-z_]{0,10}", rest in "[a-z0-9]{0,10}") {
                let pattern = format!("{}*", prefix);
                let key = format!("{}{}", prefix, rest);
                prop_assert!(MemoryCache::pattern_matches(&pattern, &key));
            }
        }
    }
}
