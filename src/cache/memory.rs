use std::time::{Duration, Instant};

use async_trait::async_trait;
use moka::future::Cache as MokaInner;
use moka::Expiry;
use serde_json::Value;

use super::Cache;

#[derive(Clone)]
struct Entry {
    value: Value,
    ttl: Duration,
}

/// Per-entry TTL: each value expires `ttl` after it was written
struct EntryExpiry;

impl Expiry<String, Entry> for EntryExpiry {
    fn expire_after_create(&self, _key: &String, value: &Entry, _created_at: Instant) -> Option<Duration> {
        Some(value.ttl)
    }

    fn expire_after_update(
        &self,
        _key: &String,
        value: &Entry,
        _updated_at: Instant,
        _duration_until_expiry: Option<Duration>,
    ) -> Option<Duration> {
        Some(value.ttl)
    }
}

/// In-process cache backed by moka
#[derive(Clone)]
pub struct MokaCache {
    inner: MokaInner<String, Entry>,
}

impl MokaCache {
    pub fn new(max_entries: u64) -> Self {
        let inner = MokaInner::builder().max_capacity(max_entries).expire_after(EntryExpiry).build();
        Self { inner }
    }
}

#[async_trait]
impl Cache for MokaCache {
    async fn get(&self, key: &str) -> Option<Value> {
        self.inner.get(key).await.map(|entry| entry.value)
    }

    async fn put(&self, key: &str, value: Value, ttl: Duration) {
        self.inner.insert(key.to_string(), Entry { value, ttl }).await;
    }

    async fn forget(&self, key: &str) {
        self.inner.invalidate(key).await;
    }
}

/// Cache that never stores anything
#[derive(Debug, Clone, Copy, Default)]
pub struct NullCache;

#[async_trait]
impl Cache for NullCache {
    async fn get(&self, _key: &str) -> Option<Value> {
        None
    }

    async fn put(&self, _key: &str, _value: Value, _ttl: Duration) {}

    async fn forget(&self, _key: &str) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn stores_and_forgets() {
        let cache = MokaCache::new(100);
        cache.put("widgets:query", json!([1, 2]), Duration::from_secs(60)).await;
        assert_eq!(cache.get("widgets:query").await, Some(json!([1, 2])));

        cache.forget("widgets:query").await;
        assert_eq!(cache.get("widgets:query").await, None);
    }

    #[tokio::test]
    async fn entries_expire_after_their_ttl() {
        let cache = MokaCache::new(100);
        cache.put("short", json!(1), Duration::from_millis(50)).await;
        cache.put("long", json!(2), Duration::from_secs(60)).await;
        tokio::time::sleep(Duration::from_millis(150)).await;
        assert_eq!(cache.get("short").await, None);
        assert_eq!(cache.get("long").await, Some(json!(2)));
    }

    #[tokio::test]
    async fn null_cache_never_hits() {
        let cache = NullCache;
        cache.put("k", json!(1), Duration::from_secs(60)).await;
        assert_eq!(cache.get("k").await, None);
    }
}
