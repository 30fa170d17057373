use redis::aio::ConnectionManager;
use serde::{Deserialize, Serialize};
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Errors that can occur with cache operations
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("Redis error: {0}")]
    RedisError(#[from] redis::RedisError),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("Cache miss: {0}")]
    CacheMiss(String),
}

/// Two-tier cache for ranked candidate pages
///
/// L1 is a per-instance moka cache, L2 is Redis shared across instances.
/// Entries are keyed per viewer so recording an action can drop every
/// page for that viewer with [`CacheManager::invalidate_viewer`].
pub struct CacheManager {
    redis: Arc<tokio::sync::Mutex<ConnectionManager>>,
    l1_cache: moka::future::Cache<String, Vec<u8>>,
    ttl_secs: u64,
}

impl CacheManager {
    pub async fn new(redis_url: &str, l1_size: u64, ttl_secs: u64) -> Result<Self, CacheError> {
        let client = redis::Client::open(redis_url)?;
        let redis = redis::aio::ConnectionManager::new(client).await?;

        let l1_cache = moka::future::CacheBuilder::new(l1_size)
            .time_to_live(Duration::from_secs(ttl_secs))
            .support_invalidation_closures()
            .build();

        Ok(Self {
            redis: Arc::new(tokio::sync::Mutex::new(redis)),
            l1_cache,
            ttl_secs,
        })
    }

    /// Get a value from cache (L1 first, then L2)
    pub async fn get<T>(&self, key: &str) -> Result<T, CacheError>
    where
        T: for<'de> Deserialize<'de>,
    {
        if let Some(bytes) = self.l1_cache.get(key).await {
            tracing::trace!("L1 cache hit: {}", key);
            return Ok(serde_json::from_slice(&bytes)?);
        }

        let mut conn = self.redis.lock().await;
        let value: Option<String> = redis::cmd("GET")
            .arg(key)
            .query_async(&mut *conn)
            .await?;
        drop(conn);

        if let Some(json) = value {
            tracing::trace!("L2 cache hit: {}", key);
            self.l1_cache
                .insert(key.to_string(), json.as_bytes().to_vec())
                .await;
            return Ok(serde_json::from_str(&json)?);
        }

        tracing::trace!("Cache miss: {}", key);
        Err(CacheError::CacheMiss(key.to_string()))
    }

    /// Set a value in both tiers
    pub async fn set<T>(&self, key: &str, value: &T) -> Result<(), CacheError>
    where
        T: Serialize,
    {
        let json = serde_json::to_string(value)?;

        self.l1_cache
            .insert(key.to_string(), json.as_bytes().to_vec())
            .await;

        let mut conn = self.redis.lock().await;
        redis::cmd("SETEX")
            .arg(key)
            .arg(self.ttl_secs)
            .arg(json)
            .query_async::<()>(&mut *conn)
            .await?;
        drop(conn);

        tracing::trace!("Cache set: {}", key);
        Ok(())
    }

    /// Drop every cached candidate page of `viewer_id`
    pub async fn invalidate_viewer(&self, viewer_id: &str) -> Result<(), CacheError> {
        self.invalidate_prefix(&CacheKey::candidate_prefix(viewer_id))
            .await
    }

    /// Drop all entries whose key starts with `prefix`
    pub async fn invalidate_prefix(&self, prefix: &str) -> Result<(), CacheError> {
        let owned = prefix.to_string();
        if let Err(e) = self
            .l1_cache
            .invalidate_entries_if(move |key, _| key.starts_with(&owned))
        {
            // Only fails when the builder lacks invalidation closures
            tracing::warn!("L1 prefix invalidation unavailable, clearing L1: {}", e);
            self.l1_cache.invalidate_all();
        }

        let mut conn = self.redis.lock().await;
        let keys: Vec<String> = redis::cmd("KEYS")
            .arg(format!("{}*", prefix))
            .query_async(&mut *conn)
            .await?;

        if !keys.is_empty() {
            redis::cmd("DEL")
                .arg(keys)
                .query_async::<()>(&mut *conn)
                .await?;
        }

        tracing::debug!("Invalidated cache prefix: {}", prefix);
        Ok(())
    }
}

/// Cache key builder
pub struct CacheKey;

impl CacheKey {
    /// Every candidate page of a viewer shares this prefix
    pub fn candidate_prefix(viewer_id: &str) -> String {
        format!("candidates:{}:", viewer_id)
    }

    /// Key for one candidate page; `fingerprint` hashes the request body
    pub fn candidates(viewer_id: &str, offset: u32, limit: u32, fingerprint: u64) -> String {
        format!(
            "{}{}:{}:{:016x}",
            Self::candidate_prefix(viewer_id),
            offset,
            limit,
            fingerprint
        )
    }

    /// Stable fingerprint of a serializable request
    pub fn fingerprint<T: Serialize>(value: &T) -> Result<u64, CacheError> {
        let json = serde_json::to_string(value)?;
        let mut hasher = DefaultHasher::new();
        json.hash(&mut hasher);
        Ok(hasher.finish())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    #[ignore = "Requires Redis"]
    async fn test_cache_set_get_invalidate() {
        let cache = CacheManager::new("redis://127.0.0.1:6379", 1000, 60)
            .await
            .expect("Failed to create cache");

        let key = CacheKey::candidates("viewer-1", 0, 20, 7);
        cache.set(&key, &"page").await.unwrap();
        let result: String = cache.get(&key).await.unwrap();
        assert_eq!(result, "page");

        cache.invalidate_viewer("viewer-1").await.unwrap();
        assert!(cache.get::<String>(&key).await.is_err());
    }

    #[test]
    fn test_cache_key_builder() {
        assert_eq!(CacheKey::candidate_prefix("p1"), "candidates:p1:");
        assert_eq!(
            CacheKey::candidates("p1", 20, 10, 255),
            "candidates:p1:20:10:00000000000000ff"
        );
        assert!(CacheKey::candidates("p1", 0, 20, 1).starts_with(&CacheKey::candidate_prefix("p1")));
    }

    #[test]
    fn test_fingerprint_is_stable() {
        let a = CacheKey::fingerprint(&json!({"viewerId": "p1", "limit": 20})).unwrap();
        let b = CacheKey::fingerprint(&json!({"viewerId": "p1", "limit": 20})).unwrap();
        let c = CacheKey::fingerprint(&json!({"viewerId": "p1", "limit": 21})).unwrap();
        assert_eq!(a, b);
        assert_ne!(a, c);
    }
}
