use chrono::Utc;
use decidra_cache::DataCacheManager;
use decidra_core::cache::entity::CacheLayer;
use decidra_core::cache::port::{TieredCache, TieredCacheExt};
use decidra_core::common::time::FakeClockProvider;
use decidra_core::config::CacheConfig;
use decidra_core::market::error::MarketError;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
struct QuoteLike {
    code: String,
    price: f64,
}

fn tiny_config() -> CacheConfig {
    CacheConfig {
        hot_capacity: 2,
        warm_capacity: 2,
        cold_capacity: 4,
        ..CacheConfig::default()
    }
}

fn no_fetch() -> impl std::future::Future<Output = Result<Option<u32>, MarketError>> {
    async { Ok(None) }
}

#[tokio::test]
async fn test_cold_hit_promotes_one_tier_at_a_time() {
    let cache = DataCacheManager::new(tiny_config());
    assert!(cache.store_data("k", &7u32, "test", CacheLayer::Cold));

    assert_eq!(cache.get_data("k", "test", no_fetch).await, Some(7));
    assert!(cache.contains("k", CacheLayer::Warm));
    assert!(!cache.contains("k", CacheLayer::Hot));
    assert!(!cache.contains("k", CacheLayer::Cold));

    assert_eq!(cache.get_data("k", "test", no_fetch).await, Some(7));
    assert!(cache.contains("k", CacheLayer::Hot));
    assert!(!cache.contains("k", CacheLayer::Warm));
}

#[test]
fn test_hit_and_miss_counters_follow_the_tier() {
    let cache = DataCacheManager::new(tiny_config());
    cache.store_data("k", &1u32, "test", CacheLayer::Cold);

    // hot miss, warm miss, cold hit
    assert_eq!(cache.get_cached::<u32>("k"), Some(1));
    let stats = cache.get_cache_stats();
    assert_eq!((stats.hot.hits, stats.hot.misses), (0, 1));
    assert_eq!((stats.warm.hits, stats.warm.misses), (0, 1));
    assert_eq!((stats.cold.hits, stats.cold.misses), (1, 0));

    // hot miss, warm hit: the hit belongs to the new tier
    assert_eq!(cache.get_cached::<u32>("k"), Some(1));
    let stats = cache.get_cache_stats();
    assert_eq!((stats.hot.hits, stats.hot.misses), (0, 2));
    assert_eq!((stats.warm.hits, stats.warm.misses), (1, 1));
    assert_eq!((stats.cold.hits, stats.cold.misses), (1, 0));

    // full miss touches every tier once
    assert_eq!(cache.get_cached::<u32>("absent"), None);
    let stats = cache.get_cache_stats();
    assert_eq!(stats.hot.hits + stats.hot.misses, 3);
    assert_eq!(stats.warm.hits + stats.warm.misses, 3);
    assert_eq!(stats.cold.hits + stats.cold.misses, 2);
    assert_eq!(stats.total.hits, 2);
}

#[test]
fn test_lru_order_decides_the_victim() {
    let config = CacheConfig {
        hot_capacity: 3,
        ..tiny_config()
    };
    let cache = DataCacheManager::new(config);
    for key in ["a", "b", "c"] {
        cache.store_data(key, key, "test", CacheLayer::Hot);
    }
    assert!(cache.get_cached::<String>("b").is_some());
    cache.store_data("d", "d", "test", CacheLayer::Hot);

    assert!(!cache.contains("a", CacheLayer::Hot));
    for key in ["b", "c", "d"] {
        assert!(cache.contains(key, CacheLayer::Hot));
    }
    assert_eq!(cache.get_cache_stats().hot.evictions, 1);
}

#[tokio::test]
async fn test_cold_overflow_evicts_oldest() {
    let cache = DataCacheManager::new(tiny_config());
    for key in ["k1", "k2", "k3", "k4"] {
        assert!(cache.store_data(key, &key.len(), "test", CacheLayer::Cold));
    }

    assert!(cache.get_data("k1", "test", no_fetch).await.is_some());
    assert!(cache.contains("k1", CacheLayer::Warm));

    cache.store_data("k5", &5u32, "test", CacheLayer::Cold);
    cache.store_data("k6", &6u32, "test", CacheLayer::Cold);

    assert_eq!(cache.get_data("k2", "test", no_fetch).await, None);
    assert!(cache.get_data("k3", "test", no_fetch).await.is_some());
    assert_eq!(cache.layer_len(CacheLayer::Cold), 3);
}

#[test]
fn test_memory_budget_converges() {
    let config = CacheConfig {
        max_memory_mb: 1,
        ..CacheConfig::default()
    };
    let budget = config.max_memory_bytes();
    let cache = DataCacheManager::new(config);
    let blob = "x".repeat(50 * 1024);

    for i in 0..50 {
        assert!(cache.store_data(&format!("blob_{}", i), &blob, "blob", CacheLayer::Cold));
        assert!(cache.total_memory_usage() <= budget);
    }

    let stats = cache.get_cache_stats();
    assert!(stats.cold.evictions > 0);
    assert!(stats.memory_usage_percent <= 100.0);
    // newest entry survives
    assert!(cache.contains("blob_49", CacheLayer::Cold));
}

#[test]
fn test_memory_budget_spares_hot_tier() {
    let config = CacheConfig {
        max_memory_mb: 1,
        ..CacheConfig::default()
    };
    let cache = DataCacheManager::new(config);
    let blob = "x".repeat(300 * 1024);

    for i in 0..4 {
        cache.store_data(&format!("hot_{}", i), &blob, "blob", CacheLayer::Hot);
    }
    cache.store_data("warm_0", &blob, "blob", CacheLayer::Warm);

    assert_eq!(cache.layer_len(CacheLayer::Hot), 4);
    assert_eq!(cache.layer_len(CacheLayer::Warm), 0);
    assert_eq!(cache.get_cache_stats().hot.evictions, 0);
}

#[test]
fn test_invalidate_is_idempotent() {
    let cache = DataCacheManager::new(tiny_config());
    assert!(!cache.invalidate("missing", None));
    let before = cache.get_cache_stats();
    assert_eq!(before.total.evictions, 0);
    assert_eq!(before.total.hits + before.total.misses, 0);

    cache.store_data("k", &1u32, "test", CacheLayer::Warm);
    assert!(!cache.invalidate("k", Some(CacheLayer::Hot)));
    assert!(cache.invalidate("k", None));
    assert!(!cache.invalidate("k", None));
    assert_eq!(cache.get_cache_stats().warm.evictions, 1);
    assert_eq!(cache.get_cached::<u32>("k"), None);
}

#[tokio::test]
async fn test_get_data_fetches_and_stores_hot() {
    let cache = DataCacheManager::new(tiny_config());
    let quote = QuoteLike {
        code: "00700.HK".to_string(),
        price: 320.4,
    };
    let fetched = quote.clone();

    let value = cache
        .get_data("quote_00700.HK", "quote", || async move {
            Ok::<_, MarketError>(Some(fetched))
        })
        .await;
    assert_eq!(value.as_ref(), Some(&quote));
    assert!(cache.contains("quote_00700.HK", CacheLayer::Hot));

    // second read is served from cache, the source is not consulted
    let value = cache
        .get_data("quote_00700.HK", "quote", || async {
            Err::<Option<QuoteLike>, _>(MarketError::NotFound)
        })
        .await;
    assert_eq!(value, Some(quote));
}

#[tokio::test]
async fn test_get_data_swallows_fetch_errors() {
    let cache = DataCacheManager::new(tiny_config());
    let value = cache
        .get_data("quote_X", "quote", || async {
            Err::<Option<u32>, _>(MarketError::Network("connection reset".to_string()))
        })
        .await;
    assert_eq!(value, None);
    assert_eq!(cache.total_memory_usage(), 0);
}

#[test]
fn test_get_data_type_mismatch_is_a_miss() {
    let cache = DataCacheManager::new(tiny_config());
    cache.store_data("k", "text", "test", CacheLayer::Hot);
    assert_eq!(cache.get_cached::<u32>("k"), None);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_blocking_fetch_runs_off_the_runtime() {
    let cache = DataCacheManager::new(tiny_config());
    let value = cache
        .get_data_blocking("kline_AAPL", "kline", || {
            std::thread::sleep(Duration::from_millis(20));
            Ok::<_, MarketError>(Some(vec![1.0f64, 2.0, 3.0]))
        })
        .await;
    assert_eq!(value, Some(vec![1.0, 2.0, 3.0]));
    assert!(cache.contains("kline_AAPL", CacheLayer::Hot));

    let failed = cache
        .get_data_blocking("kline_MSFT", "kline", || {
            Err::<Option<Vec<f64>>, _>(MarketError::Timeout(1.0))
        })
        .await;
    assert_eq!(failed, None);
}

#[test]
fn test_periodic_cleanup_expires_idle_cold_entries() {
    let clock = Arc::new(FakeClockProvider::new(Utc::now()));
    let cache = DataCacheManager::with_clock(tiny_config(), clock.clone());

    cache.store_data("stale", &1u32, "test", CacheLayer::Cold);
    cache.store_data("warm", &2u32, "test", CacheLayer::Warm);
    clock.advance(chrono::Duration::minutes(59));
    cache.store_data("fresh", &3u32, "test", CacheLayer::Cold);
    clock.advance(chrono::Duration::minutes(2));

    assert_eq!(cache.periodic_cleanup().ok(), Some(1));
    assert!(!cache.contains("stale", CacheLayer::Cold));
    assert!(cache.contains("fresh", CacheLayer::Cold));
    assert!(cache.contains("warm", CacheLayer::Warm));
}

#[tokio::test(start_paused = true)]
async fn test_cleanup_loop_runs_on_schedule() {
    let clock = Arc::new(FakeClockProvider::new(Utc::now()));
    let config = CacheConfig {
        cleanup_interval_secs: 10,
        ..tiny_config()
    };
    let cache = DataCacheManager::with_clock(config, clock.clone());
    cache.store_data("stale", &1u32, "test", CacheLayer::Cold);
    clock.advance(chrono::Duration::hours(2));

    assert!(cache.start_cache_manager());
    assert!(cache.contains("stale", CacheLayer::Cold));

    tokio::time::sleep(Duration::from_secs(11)).await;
    assert!(!cache.contains("stale", CacheLayer::Cold));

    cache.stop_cache_manager().await;
}

#[tokio::test]
async fn test_lifecycle_is_idempotent() {
    let cache = DataCacheManager::new(tiny_config());
    cache.stop_cache_manager().await;
    assert!(!cache.is_running());

    assert!(cache.start_cache_manager());
    assert!(!cache.start_cache_manager());
    assert!(cache.is_running());

    cache.stop_cache_manager().await;
    cache.stop_cache_manager().await;
    assert!(!cache.is_running());

    assert!(cache.start_cache_manager());
    cache.stop_cache_manager().await;
}

#[test]
fn test_start_without_runtime_stays_stopped() {
    let cache = DataCacheManager::new(tiny_config());
    assert!(!cache.start_cache_manager());
    assert!(!cache.is_running());
}

#[test]
fn test_clear_layer_resets_that_tier_only() {
    let cache = DataCacheManager::new(tiny_config());
    cache.store_data("h", &1u32, "test", CacheLayer::Hot);
    cache.store_data("c", &2u32, "test", CacheLayer::Cold);
    cache.get_cached::<u32>("h");

    assert!(cache.clear_layer(CacheLayer::Hot));
    let stats = cache.get_cache_stats();
    assert_eq!(stats.hot.hits, 0);
    assert_eq!(stats.hot.entry_count, 0);
    assert_eq!(stats.cold.entry_count, 1);

    cache.clear_all_cache();
    assert_eq!(cache.get_cache_stats().total.entry_count, 0);
}
