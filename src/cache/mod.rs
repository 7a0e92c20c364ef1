pub mod keys;
pub mod memory;

use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

pub use keys::CacheKeys;
pub use memory::{MokaCache, NullCache};

/// Key/value cache with per-entry TTL. Only the read-through and invalidation
/// contract matters; entries may vanish at any time.
#[async_trait]
pub trait Cache: Send + Sync {
    async fn get(&self, key: &str) -> Option<Value>;

    async fn put(&self, key: &str, value: Value, ttl: Duration);

    async fn forget(&self, key: &str);

    async fn forget_all(&self, keys: &[String]) {
        for key in keys {
            self.forget(key).await;
        }
    }
}
