use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tracing::warn;

/// Cache-aside port for serialized query results. Backend failures degrade to
/// a miss (get) or a no-op (put/invalidate); they are logged, never returned,
/// so a broken cache backend can never fail a read that the store can serve.
#[async_trait]
pub trait ResultCache: Send + Sync {
    async fn get(&self, key: &str) -> Option<String>;
    async fn put(&self, key: &str, value: &str, ttl: Duration);
    async fn invalidate(&self, key: &str);
}

/// Redis-backed result cache. The connection is established explicitly at
/// process start and the client instance is injected into the service; there
/// is no module-level connection state.
pub struct RedisResultCache {
    manager: ConnectionManager,
}

impl RedisResultCache {
    pub async fn connect(redis_url: &str) -> anyhow::Result<Self> {
        let client = redis::Client::open(redis_url)?;
        let manager = client.get_connection_manager().await?;
        Ok(Self { manager })
    }
}

#[async_trait]
impl ResultCache for RedisResultCache {
    async fn get(&self, key: &str) -> Option<String> {
        let mut conn = self.manager.clone();
        match conn.get::<_, Option<String>>(key).await {
            Ok(value) => value,
            Err(err) => {
                warn!(key, error = %err, "cache get failed, falling back to store");
                None
            }
        }
    }

    async fn put(&self, key: &str, value: &str, ttl: Duration) {
        let mut conn = self.manager.clone();
        if let Err(err) = conn
            .set_ex::<_, _, ()>(key, value, ttl.as_secs().max(1))
            .await
        {
            warn!(key, error = %err, "cache put failed");
        }
    }

    async fn invalidate(&self, key: &str) {
        let mut conn = self.manager.clone();
        if let Err(err) = conn.del::<_, ()>(key).await {
            warn!(key, error = %err, "cache invalidation failed, entry expires with ttl");
        }
    }
}

#[derive(Clone)]
struct MemoryEntry {
    value: String,
    expires_at: Instant,
}

/// In-process result cache for tests and single-node deployments.
pub struct MemoryResultCache {
    entries: RwLock<HashMap<String, MemoryEntry>>,
}

impl MemoryResultCache {
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
        }
    }

    pub async fn len(&self) -> usize {
        let entries = self.entries.read().await;
        entries.len()
    }

    pub async fn cleanup_expired(&self) {
        let mut entries = self.entries.write().await;
        let now = Instant::now();
        entries.retain(|_, entry| entry.expires_at > now);
    }
}

impl Default for MemoryResultCache {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ResultCache for MemoryResultCache {
    async fn get(&self, key: &str) -> Option<String> {
        let entries = self.entries.read().await;
        entries
            .get(key)
            .filter(|entry| entry.expires_at > Instant::now())
            .map(|entry| entry.value.clone())
    }

    async fn put(&self, key: &str, value: &str, ttl: Duration) {
        let entry = MemoryEntry {
            value: value.to_string(),
            expires_at: Instant::now() + ttl,
        };
        let mut entries = self.entries.write().await;
        entries.insert(key.to_string(), entry);
    }

    async fn invalidate(&self, key: &str) {
        let mut entries = self.entries.write().await;
        entries.remove(key);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn memory_cache_round_trip() {
        let cache = MemoryResultCache::new();
        cache.put("book:1", "{\"id\":\"1\"}", Duration::from_secs(60)).await;

        assert_eq!(cache.get("book:1").await.as_deref(), Some("{\"id\":\"1\"}"));

        cache.invalidate("book:1").await;
        assert!(cache.get("book:1").await.is_none());
    }

    #[tokio::test]
    async fn memory_cache_expires_after_ttl() {
        let cache = MemoryResultCache::new();
        cache.put("book:1", "stale", Duration::from_millis(10)).await;

        tokio::time::sleep(Duration::from_millis(30)).await;
        assert!(cache.get("book:1").await.is_none());

        cache.cleanup_expired().await;
        assert_eq!(cache.len().await, 0);
    }

    #[tokio::test]
    async fn memory_cache_overwrites_existing_key() {
        let cache = MemoryResultCache::new();
        cache.put("books:10:first", "old", Duration::from_secs(60)).await;
        cache.put("books:10:first", "new", Duration::from_secs(60)).await;

        assert_eq!(cache.get("books:10:first").await.as_deref(), Some("new"));
        assert_eq!(cache.len().await, 1);
    }
}
