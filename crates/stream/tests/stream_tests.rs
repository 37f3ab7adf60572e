use decidra_cache::DataCacheManager;
use decidra_core::cache::entity::CacheLayer;
use decidra_core::cache::port::TieredCacheExt;
use decidra_core::common::StreamKind;
use decidra_core::config::CacheConfig;
use decidra_core::event::entity::MarketEvent;
use decidra_core::event::port::EventBus;
use decidra_core::market::entity::{KlineSeries, Quote};
use decidra_core::stream::entity::{StreamConfig, StreamConfigUpdate, StreamStatus};
use decidra_core::test_utils::{Behavior, RecordingBus, ScriptedProvider};
use decidra_stream::RealTimeDataStreamManager;
use std::sync::Arc;
use std::time::Duration;

struct Harness {
    provider: Arc<ScriptedProvider>,
    cache: Arc<DataCacheManager>,
    bus: Arc<RecordingBus>,
    manager: Arc<RealTimeDataStreamManager>,
}

fn configs(enabled: &[StreamKind], interval: f64) -> Vec<StreamConfig> {
    StreamKind::ALL
        .iter()
        .map(|kind| StreamConfig {
            interval,
            enabled: enabled.contains(kind),
            ..StreamConfig::new(*kind)
        })
        .collect()
}

fn harness(provider: ScriptedProvider, configs: Vec<StreamConfig>) -> Harness {
    harness_with_bus(provider, configs, RecordingBus::new())
}

fn harness_with_bus(
    provider: ScriptedProvider,
    configs: Vec<StreamConfig>,
    bus: RecordingBus,
) -> Harness {
    let provider = Arc::new(provider);
    let cache = DataCacheManager::new(CacheConfig::default());
    let bus = Arc::new(bus);
    let event_bus: Arc<dyn EventBus> = bus.clone();
    let manager = RealTimeDataStreamManager::with_configs(
        provider.clone(),
        cache.clone(),
        Some(event_bus),
        configs,
    );
    Harness {
        provider,
        cache,
        bus,
        manager,
    }
}

#[tokio::test(start_paused = true)]
async fn test_partial_success_keeps_failing_stream_running() {
    let provider = ScriptedProvider::new().with(StreamKind::OrderBook, Behavior::Fail);
    let h = harness(
        provider,
        configs(&[StreamKind::Quote, StreamKind::OrderBook], 1.0),
    );

    assert!(h.manager.start_realtime_updates("00700.HK").await);
    tokio::time::sleep(Duration::from_millis(10)).await;

    let report = h.manager.get_stream_stats();
    let quote = &report.streams[&StreamKind::Quote];
    let book = &report.streams[&StreamKind::OrderBook];
    assert_eq!(quote.status, StreamStatus::Running);
    assert_eq!(quote.update_count, 1);
    assert_eq!(quote.success_rate, 100.0);
    assert_eq!(book.status, StreamStatus::Running);
    assert!(book.error_count >= 1);
    assert_eq!(book.update_count, 0);
    assert_eq!(report.global_status.active_stream_count, 2);
    assert_eq!(report.global_status.current_stock.as_deref(), Some("00700.HK"));

    let started = h
        .bus
        .events()
        .into_iter()
        .find(|e| e.name() == "realtime_streams_started");
    assert_eq!(
        started,
        Some(MarketEvent::StreamsStarted {
            stock_code: "00700.HK".to_string(),
            streams_started: 2,
            total_streams: 2,
        })
    );

    h.manager.stop_all_streams().await;
}

#[tokio::test(start_paused = true)]
async fn test_failed_fetch_backs_off_twice_the_interval() {
    let provider = ScriptedProvider::new().with(StreamKind::Quote, Behavior::Fail);
    let h = harness(provider, configs(&[StreamKind::Quote], 1.0));

    h.manager.start_realtime_updates("AAPL").await;
    tokio::time::sleep(Duration::from_millis(1500)).await;
    assert_eq!(h.provider.calls(StreamKind::Quote), 1);

    tokio::time::sleep(Duration::from_millis(1000)).await;
    assert_eq!(h.provider.calls(StreamKind::Quote), 2);

    let stats = h.manager.stream_stats(StreamKind::Quote).unwrap();
    assert_eq!(stats.error_count, 2);
    assert_eq!(stats.consecutive_errors, 2);
    assert_eq!(h.manager.stream_status(StreamKind::Quote), StreamStatus::Running);

    h.provider.set(StreamKind::Quote, Behavior::Succeed);
    tokio::time::sleep(Duration::from_millis(2000)).await;
    let stats = h.manager.stream_stats(StreamKind::Quote).unwrap();
    assert!(stats.update_count >= 1);
    assert_eq!(stats.consecutive_errors, 0);

    h.manager.stop_all_streams().await;
}

#[tokio::test(start_paused = true)]
async fn test_stop_cancels_every_task() {
    let h = harness(ScriptedProvider::new(), configs(&StreamKind::ALL, 0.5));

    assert!(h.manager.start_realtime_updates("AAPL").await);
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert_eq!(h.manager.live_task_count(), 6);

    h.manager.stop_all_streams().await;
    let report = h.manager.get_stream_stats();
    assert_eq!(report.global_status.active_stream_count, 0);
    assert!(!report.global_status.is_running);
    assert_eq!(report.global_status.current_stock, None);
    assert_eq!(h.manager.live_task_count(), 0);
    assert!(report.streams.values().all(|s| s.active_subscriptions == 0));
    assert_eq!(h.bus.count("realtime_streams_stopped"), 1);

    let calls = h.provider.calls(StreamKind::Tick);
    tokio::time::sleep(Duration::from_secs(5)).await;
    assert_eq!(h.provider.calls(StreamKind::Tick), calls);

    // stopping again is a no-op
    h.manager.stop_all_streams().await;
    assert_eq!(h.bus.count("realtime_streams_stopped"), 1);
}

#[tokio::test(start_paused = true)]
async fn test_paused_stream_does_not_fetch() {
    let h = harness(ScriptedProvider::new(), configs(&[StreamKind::Quote], 0.1));

    h.manager.start_realtime_updates("AAPL").await;
    tokio::time::sleep(Duration::from_millis(250)).await;
    assert!(h.manager.pause_stream(StreamKind::Quote));
    // let the in-flight iteration observe the pause
    tokio::time::sleep(Duration::from_millis(150)).await;

    let paused_at = h.manager.stream_stats(StreamKind::Quote).unwrap().update_count;
    tokio::time::sleep(Duration::from_millis(500)).await;
    assert_eq!(
        h.manager.stream_stats(StreamKind::Quote).unwrap().update_count,
        paused_at
    );
    assert_eq!(h.manager.stream_status(StreamKind::Quote), StreamStatus::Paused);
    assert_eq!(h.manager.get_stream_stats().global_status.active_stream_count, 0);

    assert!(h.manager.resume_stream(StreamKind::Quote));
    assert!(!h.manager.resume_stream(StreamKind::Quote));
    tokio::time::sleep(Duration::from_millis(1500)).await;
    assert!(h.manager.stream_stats(StreamKind::Quote).unwrap().update_count > paused_at);

    h.manager.stop_all_streams().await;
}

#[tokio::test(start_paused = true)]
async fn test_single_stream_cadence() {
    let h = harness(ScriptedProvider::new(), configs(&[StreamKind::Quote], 0.05));

    h.manager.start_realtime_updates("AAPL").await;
    tokio::time::sleep(Duration::from_millis(200)).await;

    let stats = h.manager.stream_stats(StreamKind::Quote).unwrap();
    assert!((3..=5).contains(&stats.update_count), "{}", stats.update_count);
    assert!(stats.average_latency >= 0.0);
    assert!(stats.start_time.is_some());
    assert!(stats.last_update.is_some());
    assert_eq!(h.provider.calls(StreamKind::OrderBook), 0);

    h.manager.stop_all_streams().await;
}

#[tokio::test(start_paused = true)]
async fn test_fetched_data_lands_in_the_routed_tier() {
    let h = harness(
        ScriptedProvider::new(),
        configs(&[StreamKind::Quote, StreamKind::Kline], 1.0),
    );

    h.manager.start_realtime_updates("AAPL").await;
    tokio::time::sleep(Duration::from_millis(10)).await;

    assert!(h.cache.contains("quote_AAPL", CacheLayer::Hot));
    assert!(h.cache.contains("kline_AAPL", CacheLayer::Warm));
    let quote: Quote = h.cache.get_cached("quote_AAPL").unwrap();
    assert_eq!(quote.code, "AAPL");
    let klines: KlineSeries = h.cache.get_cached("kline_AAPL").unwrap();
    assert_eq!(klines.candles.len(), 1);

    assert_eq!(h.bus.count("realtime_quote"), 1);
    assert_eq!(h.bus.count("kline_data"), 1);

    h.manager.stop_all_streams().await;
}

#[tokio::test(start_paused = true)]
async fn test_timeout_counts_as_error() {
    let provider =
        ScriptedProvider::new().with(StreamKind::Quote, Behavior::Slow(Duration::from_secs(5)));
    let mut configs = configs(&[StreamKind::Quote], 1.0);
    for config in &mut configs {
        config.timeout = 0.5;
    }
    let h = harness(provider, configs);

    h.manager.start_realtime_updates("AAPL").await;
    tokio::time::sleep(Duration::from_millis(600)).await;

    let stats = h.manager.stream_stats(StreamKind::Quote).unwrap();
    assert_eq!(stats.error_count, 1);
    assert_eq!(stats.update_count, 0);
    assert_eq!(h.manager.stream_status(StreamKind::Quote), StreamStatus::Running);

    h.manager.stop_all_streams().await;
}

#[tokio::test(start_paused = true)]
async fn test_empty_result_is_neither_update_nor_error() {
    let provider = ScriptedProvider::new().with(StreamKind::Tick, Behavior::Empty);
    let h = harness(provider, configs(&[StreamKind::Tick], 0.5));

    h.manager.start_realtime_updates("AAPL").await;
    tokio::time::sleep(Duration::from_millis(1200)).await;

    let stats = h.manager.stream_stats(StreamKind::Tick).unwrap();
    assert_eq!((stats.update_count, stats.error_count), (0, 0));
    assert!(h.provider.calls(StreamKind::Tick) >= 2);
    assert_eq!(h.bus.count("tick_data"), 0);

    h.manager.stop_all_streams().await;
}

#[tokio::test(start_paused = true)]
async fn test_disabled_streams_are_stopped_but_reported() {
    let h = harness(ScriptedProvider::new(), configs(&[StreamKind::Quote], 1.0));

    h.manager.start_realtime_updates("AAPL").await;
    let report = h.manager.get_stream_stats();
    assert_eq!(report.streams.len(), 6);
    assert_eq!(report.streams[&StreamKind::Kline].status, StreamStatus::Stopped);
    assert_eq!(report.streams[&StreamKind::Kline].start_time, None);
    assert_eq!(report.streams[&StreamKind::Quote].active_subscriptions, 1);
    assert!(!h.manager.pause_stream(StreamKind::Kline));

    h.manager.stop_all_streams().await;
}

#[tokio::test(start_paused = true)]
async fn test_switching_focus_restarts_streams() {
    let h = harness(ScriptedProvider::new(), configs(&[StreamKind::Quote], 1.0));

    assert!(h.manager.start_realtime_updates("AAPL").await);
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert!(h.manager.start_realtime_updates("MSFT").await);
    tokio::time::sleep(Duration::from_millis(10)).await;

    assert_eq!(h.manager.current_stock().as_deref(), Some("MSFT"));
    assert_eq!(h.manager.live_task_count(), 1);
    assert!(h.cache.contains("quote_MSFT", CacheLayer::Hot));
    let names: Vec<&str> = h
        .bus
        .events()
        .iter()
        .map(|e| e.name())
        .filter(|n| n.starts_with("realtime_streams"))
        .collect();
    assert_eq!(
        names,
        vec![
            "realtime_streams_started",
            "realtime_streams_stopped",
            "realtime_streams_started"
        ]
    );

    h.manager.stop_all_streams().await;
}

#[tokio::test]
async fn test_empty_code_is_rejected() {
    let h = harness(ScriptedProvider::new(), StreamConfig::defaults());
    assert!(!h.manager.start_realtime_updates("  ").await);
    assert!(!h.manager.is_running());
    assert!(h.bus.events().is_empty());
}

#[test]
fn test_start_outside_runtime_marks_streams_error() {
    let h = harness(
        ScriptedProvider::new(),
        configs(&[StreamKind::Quote, StreamKind::Tick], 1.0),
    );

    let started = futures::executor::block_on(h.manager.start_realtime_updates("AAPL"));
    assert!(!started);
    assert_eq!(h.manager.stream_status(StreamKind::Quote), StreamStatus::Error);
    assert_eq!(h.manager.stream_status(StreamKind::Tick), StreamStatus::Error);
    assert_eq!(h.manager.stream_status(StreamKind::Kline), StreamStatus::Stopped);
    assert_eq!(
        h.bus.events().first(),
        Some(&MarketEvent::StreamsStarted {
            stock_code: "AAPL".to_string(),
            streams_started: 0,
            total_streams: 2,
        })
    );
}

#[tokio::test(start_paused = true)]
async fn test_config_update_applies_to_running_stream() {
    let h = harness(ScriptedProvider::new(), configs(&[StreamKind::Quote], 10.0));
    h.manager.start_realtime_updates("AAPL").await;
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert_eq!(h.provider.calls(StreamKind::Quote), 1);

    assert!(h.manager.update_stream_config(
        StreamKind::Quote,
        StreamConfigUpdate {
            interval: Some(-1.0),
            retry_count: Some(5),
            ..Default::default()
        }
    ));
    let config = h.manager.stream_config(StreamKind::Quote).unwrap();
    assert_eq!(config.interval, 10.0);
    assert_eq!(config.retry_count, 5);

    h.manager.update_stream_config(
        StreamKind::Quote,
        StreamConfigUpdate {
            interval: Some(1.0),
            ..Default::default()
        },
    );
    // the pending 10s sleep finishes first, then the 1s cadence applies
    tokio::time::sleep(Duration::from_millis(12_500)).await;
    assert_eq!(h.provider.calls(StreamKind::Quote), 4);

    h.manager.stop_all_streams().await;
}

#[tokio::test(start_paused = true)]
async fn test_oversized_timeout_falls_back_to_defaults() {
    let mut configs = configs(&[StreamKind::Quote], 1.0);
    for config in &mut configs {
        config.timeout = 1e300;
    }
    let h = harness(ScriptedProvider::new(), configs);

    let config = h.manager.stream_config(StreamKind::Quote).unwrap();
    assert_eq!(config.timeout, 10.0);
    assert!(config.enabled);

    assert!(h.manager.start_realtime_updates("AAPL").await);
    tokio::time::sleep(Duration::from_millis(2100)).await;

    let stats = h.manager.stream_stats(StreamKind::Quote).unwrap();
    assert_eq!(stats.update_count, 3);
    assert_eq!(h.manager.live_task_count(), 1);

    h.manager.stop_all_streams().await;
}

#[tokio::test(start_paused = true)]
async fn test_oversized_interval_update_keeps_stream_polling() {
    let h = harness(ScriptedProvider::new(), configs(&[StreamKind::Quote], 1.0));
    h.manager.start_realtime_updates("AAPL").await;
    tokio::time::sleep(Duration::from_millis(10)).await;

    assert!(h.manager.update_stream_config(
        StreamKind::Quote,
        StreamConfigUpdate {
            interval: Some(1e20),
            timeout: Some(1e300),
            ..Default::default()
        }
    ));
    let config = h.manager.stream_config(StreamKind::Quote).unwrap();
    assert_eq!(config.interval, 1.0);
    assert_eq!(config.timeout, 10.0);

    tokio::time::sleep(Duration::from_millis(2000)).await;
    assert_eq!(h.provider.calls(StreamKind::Quote), 3);
    assert_eq!(h.manager.live_task_count(), 1);
    assert_eq!(h.manager.stream_status(StreamKind::Quote), StreamStatus::Running);

    h.manager.stop_all_streams().await;
}

#[tokio::test]
async fn test_unknown_stream_config_update() {
    let quote_only = vec![StreamConfig::new(StreamKind::Quote)];
    let h = harness(ScriptedProvider::new(), quote_only);
    assert!(!h.manager.update_stream_config(StreamKind::Tick, StreamConfigUpdate::default()));
    assert!(!h.manager.pause_stream(StreamKind::Tick));
    assert!(h.manager.stream_config(StreamKind::Tick).is_none());
}

#[tokio::test(start_paused = true)]
async fn test_failing_bus_does_not_stop_streams() {
    let h = harness_with_bus(
        ScriptedProvider::new(),
        configs(&[StreamKind::Quote], 0.5),
        RecordingBus::failing(),
    );

    assert!(h.manager.start_realtime_updates("AAPL").await);
    tokio::time::sleep(Duration::from_millis(1200)).await;
    assert!(h.manager.stream_stats(StreamKind::Quote).unwrap().update_count >= 2);

    h.manager.stop_all_streams().await;
}

#[tokio::test(start_paused = true)]
async fn test_streams_run_without_a_bus() {
    let provider = Arc::new(ScriptedProvider::new());
    let cache = DataCacheManager::new(CacheConfig::default());
    let manager = RealTimeDataStreamManager::with_configs(
        provider.clone(),
        cache.clone(),
        None,
        configs(&[StreamKind::CapitalFlow], 1.0),
    );

    assert!(manager.start_realtime_updates("AAPL").await);
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert!(cache.contains("capital_AAPL", CacheLayer::Warm));

    drop(manager);
    let calls = provider.calls(StreamKind::CapitalFlow);
    tokio::time::sleep(Duration::from_secs(5)).await;
    assert_eq!(provider.calls(StreamKind::CapitalFlow), calls);
}
