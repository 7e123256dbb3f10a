//! Source result cache.
//!
//! Caches successful fetches per (source, lookup) so that repeated lookups,
//! e.g. the same market symbol across several categories, hit the provider
//! only once per TTL. Failures are never cached.

use georisk_core::Evidence;
use moka::future::Cache;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::config::duration_str;

/// Cache settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub enabled: bool,
    pub max_entries: u64,
    #[serde(with = "duration_str")]
    pub ttl: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_entries: 10_000,
            ttl: Duration::from_secs(3600),
        }
    }
}

/// Cache key: source id plus the source-specific lookup string.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct SourceCacheKey {
    source: String,
    lookup: String,
}

impl SourceCacheKey {
    pub fn new(source: impl Into<String>, lookup: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            lookup: lookup.into(),
        }
    }
}

/// Fetch cache shared by all guarded sources of a run.
#[derive(Clone)]
pub struct SourceCache {
    cache: Cache<SourceCacheKey, Vec<Evidence>>,
}

impl SourceCache {
    pub fn new(max_entries: u64, ttl: Duration) -> Self {
        let cache = Cache::builder()
            .max_capacity(max_entries)
            .time_to_live(ttl)
            .build();

        Self { cache }
    }

    pub fn from_config(config: &CacheConfig) -> Option<Self> {
        config
            .enabled
            .then(|| Self::new(config.max_entries, config.ttl))
    }

    pub async fn get(&self, key: &SourceCacheKey) -> Option<Vec<Evidence>> {
        self.cache.get(key).await
    }

    pub async fn insert(&self, key: SourceCacheKey, evidence: Vec<Evidence>) {
        self.cache.insert(key, evidence).await;
    }

    pub fn invalidate_all(&self) {
        self.cache.invalidate_all();
    }

    pub fn entry_count(&self) -> u64 {
        self.cache.entry_count()
    }
}

impl Default for SourceCache {
    fn default() -> Self {
        let config = CacheConfig::default();
        Self::new(config.max_entries, config.ttl)
    }
}

impl std::fmt::Debug for SourceCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SourceCache")
            .field("entries", &self.cache.entry_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_cache_operations() {
        let cache = SourceCache::default();
        let key = SourceCacheKey::new("yahoo", "^GDAXI");

        assert!(cache.get(&key).await.is_none());

        cache
            .insert(key.clone(), vec![Evidence::new("yahoo", "DAX closed at 18000")])
            .await;

        let cached = cache.get(&key).await.unwrap();
        assert_eq!(cached.len(), 1);
        assert_eq!(cached[0].text, "DAX closed at 18000");

        let other = SourceCacheKey::new("tavily", "^GDAXI");
        assert!(cache.get(&other).await.is_none());
    }

    #[test]
    fn test_disabled_cache() {
        let config = CacheConfig {
            enabled: false,
            ..Default::default()
        };
        assert!(SourceCache::from_config(&config).is_none());
    }
}
