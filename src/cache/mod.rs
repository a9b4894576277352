//! Cache layer
//!
//! Short-lived state that does not belong in the database lives here:
//! two-factor rate-limit counters and pending login challenges. Every entry
//! carries its own TTL.
//!
//! ```rust,ignore
//! use quillhub::cache::{create_cache, CacheLayer};
//!
//! let cache = create_cache(&config.cache);
//! cache.set("2fa_pending:abc", &42_i64, Duration::from_secs(600)).await?;
//! ```

pub mod memory;

use anyhow::Result;
use async_trait::async_trait;
use serde::{de::DeserializeOwned, Serialize};
use std::sync::Arc;
use std::time::Duration;

use crate::config::CacheConfig;

pub use memory::MemoryCache;

/// Cache layer trait
///
/// Generic methods keep the trait out of `dyn` territory; callers hold the
/// concrete [`MemoryCache`] behind an `Arc`.
#[async_trait]
pub trait CacheLayer: Send + Sync {
    /// Get a value from cache
    async fn get<T: DeserializeOwned + Send>(&self, key: &str) -> Result<Option<T>>;

    /// Set a value in cache with TTL
    async fn set<T: Serialize + Send + Sync>(&self, key: &str, value: &T, ttl: Duration)
        -> Result<()>;

    /// Increment a counter, restarting its TTL, and return the new value
    ///
    /// The default is a plain get then set; implementations that can
    /// update in place override it.
    async fn incr(&self, key: &str, ttl: Duration) -> Result<u64> {
        let current: u64 = self.get(key).await?.unwrap_or(0);
        let next = current + 1;
        self.set(key, &next, ttl).await?;
        Ok(next)
    }

    /// Delete a value from cache
    async fn delete(&self, key: &str) -> Result<()>;

    /// Delete all values matching a glob pattern
    async fn delete_pattern(&self, pattern: &str) -> Result<()>;

    /// Clear all cache entries
    async fn clear(&self) -> Result<()>;
}

/// Create the process-wide cache from configuration
pub fn create_cache(config: &CacheConfig) -> Arc<MemoryCache> {
    Arc::new(MemoryCache::with_capacity_and_ttl(
        config.max_capacity,
        Duration::from_secs(config.ttl_seconds),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_create_cache_from_config() {
        let config = CacheConfig {
            ttl_seconds: 120,
            max_capacity: 10,
        };
        let cache = create_cache(&config);
        assert_eq!(cache.default_ttl(), Duration::from_secs(120));

        cache.set("k", &1_u8, Duration::from_secs(5)).await.unwrap();
        let value: Option<u8> = cache.get("k").await.unwrap();
        assert_eq!(value, Some(1));
    }

    #[tokio::test]
    async fn test_incr_counts_up_from_zero() {
        let cache = MemoryCache::new();
        let ttl = Duration::from_secs(60);

        assert_eq!(cache.incr("counter", ttl).await.unwrap(), 1);
        assert_eq!(cache.incr("counter", ttl).await.unwrap(), 2);
        assert_eq!(cache.incr("counter", ttl).await.unwrap(), 3);

        let stored: Option<u64> = cache.get("counter").await.unwrap();
        assert_eq!(stored, Some(3));
    }
}
