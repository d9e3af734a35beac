// Response cache - serialized payloads keyed by request shape
// A failing or slow backend never fails a request; every operation degrades to a miss.

use async_trait::async_trait;
use futures::future::join_all;
use serde::de::DeserializeOwned;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, instrument, warn};

use crate::cache_policy::{CacheTarget, Invalidation};
use crate::error::AppResult;

/// Key-value backend with TTL and prefix deletion
#[async_trait]
pub trait CacheStore: Send + Sync {
    async fn get(&self, key: &str) -> AppResult<Option<Vec<u8>>>;
    async fn put(&self, key: &str, value: Vec<u8>, ttl: Duration) -> AppResult<()>;
    async fn delete(&self, key: &str) -> AppResult<()>;
    /// Remove every key starting with `prefix`, returning how many were removed.
    async fn invalidate_prefix(&self, prefix: &str) -> AppResult<u64>;
}

#[derive(Clone)]
pub struct ResponseCache {
    store: Arc<dyn CacheStore>,
    ttl: Duration,
    op_timeout: Duration,
}

impl ResponseCache {
    pub fn new(store: Arc<dyn CacheStore>, ttl: Duration, op_timeout: Duration) -> Self {
        Self {
            store,
            ttl,
            op_timeout,
        }
    }

    /// Cached bytes for `key`, or `None` on a miss, a backend error or a timeout.
    #[instrument(skip(self))]
    pub async fn get(&self, key: &str) -> Option<Vec<u8>> {
        let hit = self.bounded("get", key, self.store.get(key)).await.flatten();
        debug!(hit = hit.is_some(), "cache lookup");
        hit
    }

    /// Cached value decoded as `T`. Undecodable entries are dropped and reported as a miss.
    pub async fn get_json<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let bytes = self.get(key).await?;
        match serde_json::from_slice(&bytes) {
            Ok(value) => Some(value),
            Err(e) => {
                warn!("Discarding undecodable cache entry {}: {}", key, e);
                self.bounded("delete", key, self.store.delete(key)).await;
                None
            }
        }
    }

    #[instrument(skip(self, value), fields(bytes = value.len()))]
    pub async fn set(&self, key: &str, value: Vec<u8>) {
        self.bounded("put", key, self.store.put(key, value, self.ttl))
            .await;
    }

    /// Apply every target of the invalidation concurrently.
    #[instrument(skip(self))]
    pub async fn invalidate(&self, invalidation: Invalidation) {
        let ops = invalidation.targets().iter().map(|target| async move {
            match target {
                CacheTarget::Key(key) => {
                    self.bounded("delete", key, self.store.delete(key)).await;
                }
                CacheTarget::Prefix(prefix) => {
                    if let Some(removed) = self
                        .bounded("invalidate_prefix", prefix, self.store.invalidate_prefix(prefix))
                        .await
                    {
                        debug!("Invalidated {} keys under {}", removed, prefix);
                    }
                }
            }
        });
        join_all(ops).await;
    }

    async fn bounded<T>(
        &self,
        op: &str,
        key: &str,
        fut: impl Future<Output = AppResult<T>>,
    ) -> Option<T> {
        match tokio::time::timeout(self.op_timeout, fut).await {
            Ok(Ok(value)) => Some(value),
            Ok(Err(e)) => {
                warn!("Cache {} failed for {}: {}", op, key, e);
                None
            }
            Err(_) => {
                warn!("Cache {} timed out for {} after {:?}", op, key, self.op_timeout);
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AppError;
    use crate::infrastructure::cache::LocalCache;

    struct BrokenStore;

    #[async_trait]
    impl CacheStore for BrokenStore {
        async fn get(&self, _key: &str) -> AppResult<Option<Vec<u8>>> {
            Err(AppError::Internal("connection refused".to_string()))
        }

        async fn put(&self, _key: &str, _value: Vec<u8>, _ttl: Duration) -> AppResult<()> {
            Err(AppError::Internal("connection refused".to_string()))
        }

        async fn delete(&self, _key: &str) -> AppResult<()> {
            Err(AppError::Internal("connection refused".to_string()))
        }

        async fn invalidate_prefix(&self, _prefix: &str) -> AppResult<u64> {
            Err(AppError::Internal("connection refused".to_string()))
        }
    }

    struct StalledStore;

    #[async_trait]
    impl CacheStore for StalledStore {
        async fn get(&self, _key: &str) -> AppResult<Option<Vec<u8>>> {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(Some(vec![1]))
        }

        async fn put(&self, _key: &str, _value: Vec<u8>, _ttl: Duration) -> AppResult<()> {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(())
        }

        async fn delete(&self, _key: &str) -> AppResult<()> {
            Ok(())
        }

        async fn invalidate_prefix(&self, _prefix: &str) -> AppResult<u64> {
            Ok(0)
        }
    }

    fn cache_over(store: Arc<dyn CacheStore>) -> ResponseCache {
        ResponseCache::new(store, Duration::from_secs(60), Duration::from_millis(50))
    }

    #[tokio::test]
    async fn broken_backend_reads_as_a_miss() {
        let cache = cache_over(Arc::new(BrokenStore));
        cache.set("all_users", b"[]".to_vec()).await;
        assert_eq!(cache.get("all_users").await, None);
        cache.invalidate(Invalidation::user_changed()).await;
    }

    #[tokio::test]
    async fn stalled_backend_times_out_as_a_miss() {
        let cache = cache_over(Arc::new(StalledStore));
        assert_eq!(cache.get("newsfeed_posts").await, None);
    }

    #[tokio::test]
    async fn invalidation_removes_exact_and_prefixed_keys() {
        let local = Arc::new(LocalCache::new(32));
        let cache = cache_over(local.clone());
        for key in ["posts_list:/posts", "newsfeed_posts", "post_detail:4", "all_users"] {
            cache.set(key, b"x".to_vec()).await;
        }

        cache.invalidate(Invalidation::like_changed(4)).await;

        assert!(!local.contains("posts_list:/posts").await);
        assert!(!local.contains("newsfeed_posts").await);
        assert!(!local.contains("post_detail:4").await);
        assert!(local.contains("all_users").await);
    }

    #[tokio::test]
    async fn undecodable_entries_are_dropped() {
        let local = Arc::new(LocalCache::new(4));
        let cache = cache_over(local.clone());
        cache.set("all_likes", b"not json".to_vec()).await;

        let decoded: Option<Vec<i64>> = cache.get_json("all_likes").await;
        assert!(decoded.is_none());
        assert!(!local.contains("all_likes").await);
    }
}
