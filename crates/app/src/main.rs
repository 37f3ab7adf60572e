mod settings;
mod telemetry;

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use decidra_cache::DataCacheManager;
use decidra_core::cache::port::{TieredCache, TieredCacheExt};
use decidra_core::common::{StreamKind, TimeFrame};
use decidra_core::event::port::{EventBus, EventStream};
use decidra_core::market::entity::Quote;
use decidra_feed::YahooProvider;
use decidra_stream::{BroadcastEventBus, RealTimeDataStreamManager};
use futures::StreamExt;
use tracing::{debug, info, warn};

/// # Summary
/// 应用启动入口，纯粹的 DI 容器。
/// 负责实例化缓存、行情源、事件总线与数据流管理器，并聚焦一个证券代码直至退出。
///
/// # Logic
/// 1. 加载配置，初始化全局日志。
/// 2. 实例化基础设施层（缓存、Feed、事件总线）。
/// 3. 构造数据流管理器并启动实时更新。
/// 4. 挂起等待外部信号，随后按 数据流 -> 缓存 的顺序关闭。
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // 1. 配置与日志
    let config = settings::load_config(
        Path::new(settings::DEFAULT_CONFIG_FILE),
        std::env::args().nth(1),
    )?;
    let _log_guard = telemetry::init_logging(&config.log)?;
    info!("Decidra monitor starting...");

    if rustls::crypto::ring::default_provider()
        .install_default()
        .is_err()
    {
        warn!("A TLS crypto provider was already installed");
    }

    // 2. 实例化基础设施层
    let cache = DataCacheManager::new(config.cache.clone());
    if !cache.start_cache_manager() {
        warn!("Cache cleanup task did not start");
    }
    let timeframe: TimeFrame = config.monitor.kline_timeframe.parse()?;
    let feed = Arc::new(YahooProvider::new()?.with_timeframe(timeframe));
    info!("Kline stream uses {} candles", timeframe);
    let bus = Arc::new(BroadcastEventBus::default());
    let event_logger = tokio::spawn(log_events(bus.subscribe()));

    // 3. 构造数据流管理器
    let manager = RealTimeDataStreamManager::with_configs(
        feed,
        cache.clone(),
        Some(bus.clone() as Arc<dyn EventBus>),
        config.streams.clone(),
    );

    let code = config.monitor.stock_code.clone();
    if !manager.start_realtime_updates(&code).await {
        warn!("No stream started for {}", code);
    }

    let reporter = tokio::spawn(report_stats(
        manager.clone(),
        cache.clone(),
        code,
        Duration::from_secs(config.monitor.stats_interval_secs.max(1)),
    ));

    info!("Streams running. Waiting for signals...");

    // 4. 挂起主线程，等待外部退出信号
    tokio::signal::ctrl_c().await?;
    info!("Shutdown signal received. Stopping streams...");

    reporter.abort();
    manager.stop_all_streams().await;
    cache.stop_cache_manager().await;
    event_logger.abort();

    info!("Final cache stats: {}", serde_json::to_string(&cache.get_cache_stats())?);
    Ok(())
}

/// 将总线上的事件输出到日志。
async fn log_events(mut events: EventStream) {
    while let Some(event) = events.next().await {
        debug!("event {}", event.name());
    }
}

/// # Summary
/// 周期性输出数据流与缓存统计。
///
/// # Logic
/// 同时从缓存读取最新报价，验证消费端的读取路径。
async fn report_stats(
    manager: Arc<RealTimeDataStreamManager>,
    cache: Arc<DataCacheManager>,
    code: String,
    every: Duration,
) {
    let mut ticker = tokio::time::interval(every);
    // 首个 tick 立即返回
    ticker.tick().await;
    loop {
        ticker.tick().await;

        let report = manager.get_stream_stats();
        match serde_json::to_string(&report) {
            Ok(json) => info!("Stream stats: {}", json),
            Err(e) => warn!("Failed to render stream stats: {}", e),
        }

        let cache_stats = cache.get_cache_stats();
        info!(
            "Cache: {} entries, {:.2}% of budget",
            cache_stats.total.entry_count, cache_stats.memory_usage_percent
        );

        if let Some(quote) = cache.get_cached::<Quote>(&StreamKind::Quote.cache_key(&code)) {
            info!("{} last price {:.2}", quote.code, quote.last_price);
        }
    }
}
