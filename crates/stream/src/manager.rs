use crate::worker;
use chrono::Utc;
use dashmap::DashMap;
use decidra_core::cache::port::TieredCache;
use decidra_core::common::StreamKind;
use decidra_core::event::entity::MarketEvent;
use decidra_core::event::port::EventBus;
use decidra_core::market::entity::MarketPayload;
use decidra_core::market::error::MarketError;
use decidra_core::market::port::MarketDataProvider;
use decidra_core::stream::entity::{
    GlobalStreamStatus, StreamConfig, StreamConfigUpdate, StreamStats, StreamStatsReport,
    StreamStatsView, StreamStatus,
};
use decidra_core::stream::error::StreamError;
use futures::future::join_all;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// # Summary
/// 实时数据流管理器，为当前聚焦的证券协调六类行情的轮询协程。
///
/// # Invariants
/// - 同一时刻只聚焦一只证券；每种数据流最多一个轮询协程。
/// - 启动与停止互斥执行，停止返回前所有协程都已结束。
/// - 数据源与事件总线是外部注入的能力，管理器不负责其生命周期。
/// - 对外操作从不返回错误：失败只体现为返回值、日志与统计。
pub struct RealTimeDataStreamManager {
    // 行情数据源
    provider: Arc<dyn MarketDataProvider>,
    // 抓取结果写入的缓存
    cache: Arc<dyn TieredCache>,
    // 可选的事件总线
    bus: Option<Arc<dyn EventBus>>,
    configs: DashMap<StreamKind, StreamConfig>,
    statuses: DashMap<StreamKind, StreamStatus>,
    stats: DashMap<StreamKind, StreamStats>,
    // 每种数据流当前订阅的证券代码
    subscriptions: DashMap<StreamKind, HashSet<String>>,
    tasks: Mutex<HashMap<StreamKind, JoinHandle<()>>>,
    running: AtomicBool,
    current_stock: Mutex<Option<String>>,
    // 串行化启动与停止，允许跨 await 持有
    lifecycle: tokio::sync::Mutex<()>,
}

impl RealTimeDataStreamManager {
    /// # Summary
    /// 使用六种数据流的默认配置创建管理器。
    ///
    /// # Arguments
    /// * `provider`: 行情数据源。
    /// * `cache`: 分层缓存。
    /// * `bus`: 事件总线，可为空。
    ///
    /// # Returns
    /// 管理器的共享指针。
    pub fn new(
        provider: Arc<dyn MarketDataProvider>,
        cache: Arc<dyn TieredCache>,
        bus: Option<Arc<dyn EventBus>>,
    ) -> Arc<Self> {
        Self::with_configs(provider, cache, bus, StreamConfig::defaults())
    }

    /// # Summary
    /// 使用指定的数据流配置创建管理器。
    ///
    /// # Logic
    /// 1. 只有出现在 `configs` 中的类型会被管理。
    /// 2. 不满足不变量的配置记录警告，并以该类型的默认值替换（保留 `enabled`）。
    /// 3. 同一类型出现多次时以最后一次为准。
    pub fn with_configs(
        provider: Arc<dyn MarketDataProvider>,
        cache: Arc<dyn TieredCache>,
        bus: Option<Arc<dyn EventBus>>,
        configs: Vec<StreamConfig>,
    ) -> Arc<Self> {
        let map = DashMap::new();
        let statuses = DashMap::new();
        for config in configs {
            let kind = config.name;
            let config = match config.validate() {
                Ok(()) => config,
                Err(e) => {
                    warn!("{}, falling back to defaults", e);
                    StreamConfig {
                        enabled: config.enabled,
                        ..StreamConfig::new(kind)
                    }
                }
            };
            map.insert(kind, config);
            statuses.insert(kind, StreamStatus::Stopped);
        }

        Arc::new(Self {
            provider,
            cache,
            bus,
            configs: map,
            statuses,
            stats: DashMap::new(),
            subscriptions: DashMap::new(),
            tasks: Mutex::new(HashMap::new()),
            running: AtomicBool::new(false),
            current_stock: Mutex::new(None),
            lifecycle: tokio::sync::Mutex::new(()),
        })
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// 当前聚焦的证券代码。
    pub fn current_stock(&self) -> Option<String> {
        self.current_stock
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// 指定数据流的当前状态，未配置的类型视为已停止。
    pub fn stream_status(&self, kind: StreamKind) -> StreamStatus {
        self.statuses
            .get(&kind)
            .map(|s| *s)
            .unwrap_or(StreamStatus::Stopped)
    }

    /// 指定数据流的统计快照。
    pub fn stream_stats(&self, kind: StreamKind) -> Option<StreamStats> {
        self.stats.get(&kind).map(|s| s.clone())
    }

    /// 指定数据流的配置快照。
    pub fn stream_config(&self, kind: StreamKind) -> Option<StreamConfig> {
        self.configs.get(&kind).map(|c| c.clone())
    }

    /// 仍在执行的轮询协程数量。
    pub fn live_task_count(&self) -> usize {
        self.tasks
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .values()
            .filter(|task| !task.is_finished())
            .count()
    }

    /// # Summary
    /// 为指定证券启动实时数据更新。
    ///
    /// # Logic
    /// 1. 代码为空时记录错误并返回 `false`。
    /// 2. 已在运行（切换聚焦）时先停止全部旧数据流。
    /// 3. 为所有已配置的类型准备统计；未启用的类型标记为 Stopped。
    /// 4. 逐个启动已启用的数据流，单个失败只将该类型标记为 Error。
    /// 5. 发布 `realtime_streams_started` 事件。
    ///
    /// # Arguments
    /// * `stock_code`: 证券代码。
    ///
    /// # Returns
    /// 至少一个数据流启动成功时返回 `true`。
    pub async fn start_realtime_updates(self: &Arc<Self>, stock_code: &str) -> bool {
        let code = stock_code.trim();
        if code.is_empty() {
            error!("Cannot start realtime updates: empty stock code");
            return false;
        }

        let _guard = self.lifecycle.lock().await;
        if self.is_running() {
            info!("Switching realtime focus to {}", code);
            self.stop_streams().await;
        }

        info!("Starting realtime streams for {}", code);
        *self
            .current_stock
            .lock()
            .unwrap_or_else(|e| e.into_inner()) = Some(code.to_string());
        self.running.store(true, Ordering::SeqCst);

        let mut configs: Vec<StreamConfig> = self.configs.iter().map(|c| c.clone()).collect();
        configs.sort_by_key(|c| c.name);

        let mut started = 0;
        let mut enabled = 0;
        for config in &configs {
            self.stats
                .entry(config.name)
                .or_insert_with(|| StreamStats::new(config.name));
            if !config.enabled {
                self.statuses.insert(config.name, StreamStatus::Stopped);
                continue;
            }
            enabled += 1;
            match self.start_stream(config, code) {
                Ok(()) => started += 1,
                Err(e) => {
                    error!("Failed to start {} stream: {}", config.name, e);
                    self.statuses.insert(config.name, StreamStatus::Error);
                }
            }
        }

        self.publish(MarketEvent::StreamsStarted {
            stock_code: code.to_string(),
            streams_started: started,
            total_streams: enabled,
        })
        .await;

        info!(
            "Realtime streams for {} started: {}/{}",
            code, started, enabled
        );
        started > 0
    }

    fn start_stream(self: &Arc<Self>, config: &StreamConfig, code: &str) -> Result<(), StreamError> {
        let kind = config.name;
        self.statuses.insert(kind, StreamStatus::Starting);
        config.validate()?;
        let runtime =
            tokio::runtime::Handle::try_current().map_err(|_| StreamError::NoRuntime(kind))?;

        if let Some(mut stats) = self.stats.get_mut(&kind) {
            stats.start_time = Some(Utc::now());
        }
        self.subscriptions
            .entry(kind)
            .or_default()
            .insert(code.to_string());
        self.statuses.insert(kind, StreamStatus::Running);

        let task = runtime.spawn(worker::run_stream(
            Arc::downgrade(self),
            kind,
            code.to_string(),
        ));
        let previous = self
            .tasks
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(kind, task);
        if let Some(previous) = previous {
            previous.abort();
        }

        debug!("Stream {} started for {}", kind, code);
        Ok(())
    }

    /// # Summary
    /// 停止全部数据流。
    ///
    /// # Logic
    /// 1. 未运行时直接返回。
    /// 2. 并发中止全部协程并等待其结束，取消错误被忽略。
    /// 3. 清理订阅与聚焦代码，全部类型标记为 Stopped。
    /// 4. 发布 `realtime_streams_stopped` 事件。
    pub async fn stop_all_streams(&self) {
        let _guard = self.lifecycle.lock().await;
        self.stop_streams().await;
    }

    async fn stop_streams(&self) {
        if !self.running.swap(false, Ordering::SeqCst) {
            return;
        }
        info!("Stopping all realtime streams");

        let tasks: Vec<JoinHandle<()>> = self
            .tasks
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .drain()
            .map(|(_, task)| task)
            .collect();
        for task in &tasks {
            task.abort();
        }
        for result in join_all(tasks).await {
            if let Err(e) = result
                && !e.is_cancelled()
            {
                warn!("Stream task ended abnormally: {}", e);
            }
        }

        for mut status in self.statuses.iter_mut() {
            *status = StreamStatus::Stopped;
        }
        self.subscriptions.clear();
        *self
            .current_stock
            .lock()
            .unwrap_or_else(|e| e.into_inner()) = None;

        self.publish(MarketEvent::StreamsStopped {
            timestamp: Utc::now(),
        })
        .await;
        info!("All realtime streams stopped");
    }

    /// # Summary
    /// 暂停数据流。协程保持存活，只是不再抓取。
    ///
    /// # Returns
    /// 该类型有存活协程且处于运行或暂停状态时返回 `true`。
    pub fn pause_stream(&self, kind: StreamKind) -> bool {
        let has_task = self
            .tasks
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .contains_key(&kind);
        if !has_task {
            return false;
        }
        match self.statuses.get_mut(&kind) {
            Some(mut status)
                if matches!(*status, StreamStatus::Running | StreamStatus::Paused) =>
            {
                *status = StreamStatus::Paused;
                info!("Stream {} paused", kind);
                true
            }
            _ => false,
        }
    }

    /// # Summary
    /// 恢复已暂停的数据流。
    ///
    /// # Returns
    /// 仅当该类型处于 Paused 时恢复并返回 `true`。
    pub fn resume_stream(&self, kind: StreamKind) -> bool {
        match self.statuses.get_mut(&kind) {
            Some(mut status) if *status == StreamStatus::Paused => {
                *status = StreamStatus::Running;
                info!("Stream {} resumed", kind);
                true
            }
            _ => false,
        }
    }

    /// # Summary
    /// 局部更新数据流配置，运行中的协程在下一轮读取新值。
    ///
    /// # Logic
    /// 非法字段被记录并忽略，其余字段照常应用。
    ///
    /// # Returns
    /// 该类型已配置时返回 `true`。
    pub fn update_stream_config(&self, kind: StreamKind, update: StreamConfigUpdate) -> bool {
        let Some(mut config) = self.configs.get_mut(&kind) else {
            warn!("{}", StreamError::UnknownStream(kind));
            return false;
        };
        for rejected in config.apply(&update) {
            warn!("Ignoring config field: {}", rejected);
        }
        info!("Stream config updated: {:?}", *config);
        true
    }

    /// # Summary
    /// 生成全部数据流的统计报表。
    ///
    /// # Logic
    /// 1. 只包含已经创建统计的类型（首次启动后才会出现）。
    /// 2. 全局块统计当前处于 Running 的数据流数量。
    pub fn get_stream_stats(&self) -> StreamStatsReport {
        let streams: BTreeMap<StreamKind, StreamStatsView> = self
            .stats
            .iter()
            .map(|entry| {
                let kind = *entry.key();
                let subs = self.subscriptions.get(&kind).map(|s| s.len()).unwrap_or(0);
                let view = StreamStatsView::build(entry.value(), self.stream_status(kind), subs);
                (kind, view)
            })
            .collect();

        let active_stream_count = self
            .statuses
            .iter()
            .filter(|s| *s.value() == StreamStatus::Running)
            .count();

        StreamStatsReport {
            streams,
            global_status: GlobalStreamStatus {
                is_running: self.is_running(),
                current_stock: self.current_stock(),
                active_stream_count,
            },
        }
    }

    pub(crate) fn provider(&self) -> &Arc<dyn MarketDataProvider> {
        &self.provider
    }

    /// 轮询协程每轮读取的状态与配置快照。
    pub(crate) fn poll_state(&self, kind: StreamKind) -> Option<(StreamStatus, StreamConfig)> {
        if !self.is_running() {
            return None;
        }
        let config = self.stream_config(kind)?;
        Some((self.stream_status(kind), config))
    }

    /// # Summary
    /// 处理一次成功抓取。
    ///
    /// # Logic
    /// 1. 将载荷写入该类型对应的缓存层，写入失败只记录日志。
    /// 2. 更新统计（在任何 await 之前完成，不跨 await 持有分片锁）。
    /// 3. 发布数据事件。
    pub(crate) async fn record_payload(
        &self,
        kind: StreamKind,
        code: &str,
        payload: MarketPayload,
        latency: Duration,
    ) {
        let key = kind.cache_key(code);
        match payload.content_json() {
            Ok(bytes) => {
                if !self
                    .cache
                    .store_raw(&key, bytes, kind.data_type(), kind.cache_layer())
                {
                    warn!("Fresh {} data for {} was not cached", kind, code);
                }
            }
            Err(e) => error!("Failed to encode {} payload for {}: {}", kind, code, e),
        }

        let now = Utc::now();
        if let Some(mut stats) = self.stats.get_mut(&kind) {
            stats.record_success(now, latency);
        }

        self.publish(MarketEvent::StreamData {
            stock_code: code.to_string(),
            payload,
            timestamp: now,
        })
        .await;
    }

    /// # Summary
    /// 处理一次失败抓取，状态保持 Running。
    ///
    /// # Logic
    /// 连续失败次数达到 `retry_count` 后日志级别从 warn 升级为 error。
    pub(crate) fn record_failure(&self, config: &StreamConfig, code: &str, err: &MarketError) {
        let consecutive = self
            .stats
            .get_mut(&config.name)
            .map(|mut stats| stats.record_error())
            .unwrap_or(1);
        if consecutive >= config.retry_count {
            error!(
                "{} stream for {} failed {} times in a row: {}",
                config.name, code, consecutive, err
            );
        } else {
            warn!("{} stream for {} fetch failed: {}", config.name, code, err);
        }
    }

    async fn publish(&self, event: MarketEvent) {
        if let Some(bus) = &self.bus {
            let name = event.name();
            if let Err(e) = bus.publish(event).await {
                warn!("Failed to publish {}: {}", name, e);
            }
        }
    }
}

impl Drop for RealTimeDataStreamManager {
    fn drop(&mut self) {
        let tasks = self.tasks.get_mut().unwrap_or_else(|e| e.into_inner());
        for (_, task) in tasks.drain() {
            task.abort();
        }
    }
}
