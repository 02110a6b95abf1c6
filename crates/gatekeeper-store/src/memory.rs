use gatekeeper_models::threshold::PerformanceWindow;
use moka::future::Cache;
use std::time::Duration;

/// In-memory hot cache of trailing-window aggregates, backed by moka.
///
/// Entries are evicted after TTL so newly closed trades show up within one TTL.
pub struct MemoryCache {
    inner: Cache<String, PerformanceWindow>,
}

impl MemoryCache {
    pub fn new(max_capacity: u64, ttl: Duration) -> Self {
        Self {
            inner: Cache::builder()
                .max_capacity(max_capacity)
                .time_to_live(ttl)
                .build(),
        }
    }

    pub fn key(instrument: &str, window_days: u32) -> String {
        format!("{instrument}:{window_days}d")
    }

    pub async fn get(&self, key: &str) -> Option<PerformanceWindow> {
        self.inner.get(key).await
    }

    pub async fn insert(&self, key: String, value: PerformanceWindow) {
        self.inner.insert(key, value).await;
    }

    pub async fn invalidate(&self, key: &str) {
        self.inner.invalidate(key).await;
    }

    pub fn entry_count(&self) -> u64 {
        self.inner.entry_count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn window(instrument: &str, trade_count: u64) -> PerformanceWindow {
        PerformanceWindow {
            instrument: instrument.to_string(),
            window_days: 7,
            trade_count,
            mean_return: Some(0.01),
        }
    }

    #[tokio::test]
    async fn insert_and_get() {
        let cache = MemoryCache::new(100, Duration::from_secs(60));
        let key = MemoryCache::key("BTC", 7);
        cache.insert(key.clone(), window("BTC", 12)).await;

        assert_eq!(cache.get(&key).await, Some(window("BTC", 12)));
        assert_eq!(cache.get(&MemoryCache::key("BTC", 30)).await, None);
    }

    #[tokio::test]
    async fn invalidate() {
        let cache = MemoryCache::new(100, Duration::from_secs(60));
        let key = MemoryCache::key("ETH", 7);
        cache.insert(key.clone(), window("ETH", 3)).await;
        cache.invalidate(&key).await;

        assert_eq!(cache.get(&key).await, None);
    }

    #[tokio::test]
    async fn ttl_expiration() {
        let cache = MemoryCache::new(100, Duration::from_millis(50));
        let key = MemoryCache::key("SOL", 7);
        cache.insert(key.clone(), window("SOL", 1)).await;
        assert!(cache.get(&key).await.is_some());

        tokio::time::sleep(Duration::from_millis(100)).await;

        assert!(cache.get(&key).await.is_none());
    }
}
