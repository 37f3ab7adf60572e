use crate::tier::{CacheEntry, LruTier};
use decidra_core::cache::entity::{CacheLayer, CacheStats, CacheStatsReport, LayerStatsView};
use decidra_core::cache::error::CacheError;
use decidra_core::cache::port::{TieredCache, TieredCacheExt};
use decidra_core::common::time::{RealTimeProvider, TimeProvider};
use decidra_core::config::CacheConfig;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::fmt::Display;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// 三个缓存层，整体由同一把锁保护。
struct Tiers {
    hot: LruTier,
    warm: LruTier,
    cold: LruTier,
}

impl Tiers {
    fn tier_mut(&mut self, layer: CacheLayer) -> &mut LruTier {
        match layer {
            CacheLayer::Hot => &mut self.hot,
            CacheLayer::Warm => &mut self.warm,
            CacheLayer::Cold => &mut self.cold,
        }
    }

    fn total_size(&self) -> usize {
        self.hot.stats().total_size_bytes
            + self.warm.stats().total_size_bytes
            + self.cold.stats().total_size_bytes
    }
}

/// # Summary
/// 热/温/冷三层读穿缓存管理器。
///
/// # Invariants
/// - 三层共用一把 `std::sync::Mutex`，任何方法都不会在持锁期间 `.await`。
/// - 命中时只向上晋升一级（冷 -> 温 -> 热），晋升是移动而非复制。
/// - 同一个键在任意时刻最多存在于一层。
/// - 每次写入后执行内存预算检查；内存回收只作用于冷层与温层，热层只受自身容量约束。
/// - 后台清理协程最多一个，启动与停止均幂等。
pub struct DataCacheManager {
    config: CacheConfig,
    tiers: Mutex<Tiers>,
    clock: Arc<dyn TimeProvider>,
    // 后台清理是否运行中
    running: AtomicBool,
    cleanup_task: Mutex<Option<JoinHandle<()>>>,
}

impl DataCacheManager {
    /// # Summary
    /// 使用系统时钟创建缓存管理器。
    ///
    /// # Arguments
    /// * `config`: 容量、内存预算与清理节奏。
    ///
    /// # Returns
    /// 共享的管理器实例，后台清理需另行调用 `start_cache_manager` 启动。
    pub fn new(config: CacheConfig) -> Arc<Self> {
        Self::with_clock(config, Arc::new(RealTimeProvider))
    }

    /// 使用指定时钟创建缓存管理器。
    pub fn with_clock(config: CacheConfig, clock: Arc<dyn TimeProvider>) -> Arc<Self> {
        let config = config.normalized();
        let tiers = Tiers {
            hot: LruTier::new(CacheLayer::Hot, config.hot_capacity),
            warm: LruTier::new(CacheLayer::Warm, config.warm_capacity),
            cold: LruTier::new(CacheLayer::Cold, config.cold_capacity),
        };
        Arc::new(Self {
            config,
            tiers: Mutex::new(tiers),
            clock,
            running: AtomicBool::new(false),
            cleanup_task: Mutex::new(None),
        })
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// 后台清理是否正在运行。
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// 指定层是否持有该键，不影响访问顺序与统计。
    pub fn contains(&self, key: &str, layer: CacheLayer) -> bool {
        match self.lock_tiers() {
            Ok(mut tiers) => tiers.tier_mut(layer).contains(key),
            Err(_) => false,
        }
    }

    /// 指定层当前的条目数。
    pub fn layer_len(&self, layer: CacheLayer) -> usize {
        let mut tiers = self.tiers.lock().unwrap_or_else(|e| e.into_inner());
        tiers.tier_mut(layer).len()
    }

    fn lock_tiers(&self) -> Result<MutexGuard<'_, Tiers>, CacheError> {
        self.tiers.lock().map_err(|_| CacheError::Poisoned)
    }

    /// # Summary
    /// 启动后台清理协程。
    ///
    /// # Logic
    /// 1. 已在运行时直接返回（幂等）。
    /// 2. 当前线程没有 tokio 运行时则记录错误并保持停止状态。
    /// 3. 协程只持有 `Weak` 引用，管理器被释放后自动退出。
    ///
    /// # Returns
    /// 本次调用实际启动了协程时返回 `true`。
    pub fn start_cache_manager(self: &Arc<Self>) -> bool {
        if self.running.swap(true, Ordering::SeqCst) {
            debug!("Cache manager already running");
            return false;
        }

        let handle = match tokio::runtime::Handle::try_current() {
            Ok(handle) => handle,
            Err(e) => {
                error!("Cannot start cache cleanup without a runtime: {}", e);
                self.running.store(false, Ordering::SeqCst);
                return false;
            }
        };

        let task = handle.spawn(Self::cleanup_loop(Arc::downgrade(self)));
        let mut slot = self.cleanup_task.lock().unwrap_or_else(|e| e.into_inner());
        *slot = Some(task);
        info!(
            "Cache manager started (cleanup every {:?})",
            self.config.cleanup_interval()
        );
        true
    }

    /// # Summary
    /// 停止后台清理协程，并等待其真正结束后才返回。
    ///
    /// # Logic
    /// 1. 未运行时直接返回（幂等）。
    /// 2. 取出句柄后释放锁，再中止并等待协程。
    pub async fn stop_cache_manager(&self) {
        if !self.running.swap(false, Ordering::SeqCst) {
            return;
        }

        let task = self
            .cleanup_task
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();
        if let Some(task) = task {
            task.abort();
            if let Err(e) = task.await
                && !e.is_cancelled()
            {
                warn!("Cache cleanup task ended abnormally: {}", e);
            }
        }
        info!("Cache manager stopped");
    }

    async fn cleanup_loop(manager: Weak<Self>) {
        loop {
            let interval = match manager.upgrade() {
                Some(this) => this.config.cleanup_interval(),
                None => break,
            };
            tokio::time::sleep(interval).await;

            let Some(this) = manager.upgrade() else {
                break;
            };
            match this.periodic_cleanup() {
                Ok(expired) => {
                    debug!("Cache cleanup finished, {} cold entries expired", expired);
                }
                Err(e) => {
                    error!("Cache cleanup failed: {}", e);
                    let backoff = this.config.error_backoff();
                    drop(this);
                    tokio::time::sleep(backoff).await;
                }
            }
        }
        debug!("Cache cleanup loop exited");
    }

    /// # Summary
    /// 执行一轮清理。
    ///
    /// # Logic
    /// 1. 淘汰冷层中最后访问时间早于 `now - cold_ttl` 的条目。
    /// 2. 重新执行一次内存预算检查。
    ///
    /// # Returns
    /// 过期淘汰的条目数；锁中毒时返回错误。
    pub fn periodic_cleanup(&self) -> Result<usize, CacheError> {
        let mut tiers = self.lock_tiers()?;
        let cutoff = self.clock.now() - self.config.cold_ttl();
        let expired = tiers.cold.expire_older_than(cutoff);
        if expired > 0 {
            info!("Expired {} idle cold cache entries", expired);
        }
        self.enforce_memory_budget(&mut tiers);
        Ok(expired)
    }

    /// # Summary
    /// 内存预算检查。
    ///
    /// # Logic
    /// 1. 总占用未超预算时不做任何事。
    /// 2. 超出时淘汰冷层最旧的 1/4（至少 1 条）。
    /// 3. 若仍高于预算的 90%，再淘汰温层最旧的 1/10（至少 1 条）。
    #[allow(clippy::cast_precision_loss)]
    fn enforce_memory_budget(&self, tiers: &mut Tiers) {
        let budget = self.config.max_memory_bytes();
        let before = tiers.total_size();
        if before <= budget {
            return;
        }

        let mut evicted = 0;
        if !tiers.cold.is_empty() {
            let count = (tiers.cold.len() / 4).max(1);
            evicted += tiers.cold.evict_oldest(count);
        }
        if tiers.total_size() as f64 > budget as f64 * 0.9 && !tiers.warm.is_empty() {
            let count = (tiers.warm.len() / 10).max(1);
            evicted += tiers.warm.evict_oldest(count);
        }
        info!(
            "Memory budget exceeded ({} > {} bytes), evicted {} entries, now {} bytes",
            before,
            budget,
            evicted,
            tiers.total_size()
        );
    }

    fn try_lookup(&self, key: &str) -> Result<Option<Vec<u8>>, CacheError> {
        let mut guard = self.lock_tiers()?;
        let tiers = &mut *guard;
        let now = self.clock.now();

        if let Some(entry) = tiers.hot.get(key, now) {
            debug!("Hot cache hit: {}", key);
            return Ok(Some(entry.payload.clone()));
        }

        if let Some(payload) = tiers.warm.get(key, now).map(|e| e.payload.clone()) {
            if let Some(entry) = tiers.warm.take(key) {
                tiers.hot.put(entry);
            }
            debug!("Warm cache hit, promoted to hot: {}", key);
            return Ok(Some(payload));
        }

        if let Some(payload) = tiers.cold.get(key, now).map(|e| e.payload.clone()) {
            if let Some(entry) = tiers.cold.take(key) {
                tiers.warm.put(entry);
            }
            debug!("Cold cache hit, promoted to warm: {}", key);
            return Ok(Some(payload));
        }

        Ok(None)
    }

    fn try_store(
        &self,
        key: &str,
        bytes: Vec<u8>,
        data_type: &str,
        layer: CacheLayer,
    ) -> Result<bool, CacheError> {
        let mut guard = self.lock_tiers()?;
        let tiers = &mut *guard;
        let entry = CacheEntry::new(key, bytes, data_type, self.clock.now());

        // 同一个键只保留最新写入的那一层
        for other in CacheLayer::ALL {
            if other != layer {
                tiers.tier_mut(other).take(key);
            }
        }

        if !tiers.tier_mut(layer).put(entry) {
            return Ok(false);
        }
        debug!("Stored [{}] ({}) into {} tier", key, data_type, layer);
        self.enforce_memory_budget(tiers);
        Ok(true)
    }

    fn try_invalidate(&self, key: &str, layer: Option<CacheLayer>) -> Result<bool, CacheError> {
        let mut tiers = self.lock_tiers()?;
        let removed = match layer {
            Some(layer) => tiers.tier_mut(layer).evict(key),
            None => CacheLayer::ALL
                .iter()
                .fold(false, |removed, l| tiers.tier_mut(*l).evict(key) || removed),
        };
        Ok(removed)
    }

    /// # Summary
    /// 读穿查询，缓存全部未命中时在阻塞线程池中执行同步数据源。
    ///
    /// # Logic
    /// 1. 依次检查三层。
    /// 2. 未命中时通过 `spawn_blocking` 执行 `fetch`，避免阻塞轮询协程。
    /// 3. 得到非空结果后写入热层；`fetch` 出错或 panic 时记录日志并返回 `None`。
    ///
    /// # Arguments
    /// * `key`: 唯一键。
    /// * `data_type`: 诊断用类型标签。
    /// * `fetch`: 同步数据源。
    pub async fn get_data_blocking<T, F, E>(
        &self,
        key: &str,
        data_type: &str,
        fetch: F,
    ) -> Option<T>
    where
        T: Serialize + DeserializeOwned + Send + Sync + 'static,
        F: FnOnce() -> Result<Option<T>, E> + Send + 'static,
        E: Display + Send + 'static,
    {
        self.get_data(key, data_type, move || async move {
            match tokio::task::spawn_blocking(fetch).await {
                Ok(result) => result.map_err(|e| e.to_string()),
                Err(e) => Err(format!("blocking fetch did not complete: {}", e)),
            }
        })
        .await
    }
}

impl TieredCache for DataCacheManager {
    fn lookup_raw(&self, key: &str) -> Option<Vec<u8>> {
        match self.try_lookup(key) {
            Ok(found) => found,
            Err(e) => {
                error!("Cache lookup [{}] failed: {}", key, e);
                None
            }
        }
    }

    fn store_raw(&self, key: &str, bytes: Vec<u8>, data_type: &str, layer: CacheLayer) -> bool {
        match self.try_store(key, bytes, data_type, layer) {
            Ok(stored) => stored,
            Err(e) => {
                error!("Cache store [{}] failed: {}", key, e);
                false
            }
        }
    }

    fn invalidate(&self, key: &str, layer: Option<CacheLayer>) -> bool {
        match self.try_invalidate(key, layer) {
            Ok(removed) => removed,
            Err(e) => {
                error!("Cache invalidate [{}] failed: {}", key, e);
                false
            }
        }
    }

    fn clear_layer(&self, layer: CacheLayer) -> bool {
        match self.lock_tiers() {
            Ok(mut tiers) => {
                tiers.tier_mut(layer).clear();
                info!("Cleared {} cache tier", layer);
                true
            }
            Err(e) => {
                error!("Clearing {} tier failed: {}", layer, e);
                false
            }
        }
    }

    fn clear_all_cache(&self) {
        // 清空后三层重新满足不变量，可以解除中毒标记
        let mut tiers = self.tiers.lock().unwrap_or_else(|e| e.into_inner());
        for layer in CacheLayer::ALL {
            tiers.tier_mut(layer).clear();
        }
        drop(tiers);
        self.tiers.clear_poison();
        info!("Cleared all cache tiers");
    }

    #[allow(clippy::cast_precision_loss)]
    fn get_cache_stats(&self) -> CacheStatsReport {
        let tiers = self.tiers.lock().unwrap_or_else(|e| e.into_inner());
        let (hot, warm, cold) = (tiers.hot.stats(), tiers.warm.stats(), tiers.cold.stats());
        drop(tiers);

        let mut total = CacheStats::default();
        for stats in [&hot, &warm, &cold] {
            total.accumulate(stats);
        }
        let budget = self.config.max_memory_bytes();
        let memory_usage_percent = if budget == 0 {
            0.0
        } else {
            let percent = total.total_size_bytes as f64 / budget as f64 * 100.0;
            (percent * 100.0).round() / 100.0
        };

        CacheStatsReport {
            hot: LayerStatsView::from(&hot),
            warm: LayerStatsView::from(&warm),
            cold: LayerStatsView::from(&cold),
            total: LayerStatsView::from(&total),
            memory_usage_percent,
        }
    }

    fn total_memory_usage(&self) -> usize {
        self.tiers
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .total_size()
    }
}

impl Drop for DataCacheManager {
    fn drop(&mut self) {
        let slot = self.cleanup_task.get_mut().unwrap_or_else(|e| e.into_inner());
        if let Some(task) = slot.take() {
            task.abort();
        }
    }
}
