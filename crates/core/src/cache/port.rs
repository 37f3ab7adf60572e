use crate::cache::entity::{CacheLayer, CacheStatsReport};
use crate::cache::error::CacheError;
use async_trait::async_trait;
use serde::{Serialize, de::DeserializeOwned};
use std::fmt::Display;
use std::future::Future;
use tracing::{debug, error, warn};

/// # Summary
/// 热/温/冷三层读穿缓存接口 (Port)。
///
/// # Invariants
/// - 处理原始字节，确保 Trait 是对象安全的 (Object Safe)。
/// - 所有方法都是同步的，内部不得出现 `.await`，从而保证单次调用对其他协程是原子的。
/// - 所有方法都是全函数：失败只体现为 `false` / `None` 与日志，不向调用方传播。
pub trait TieredCache: Send + Sync {
    /// # Summary
    /// 按 热 -> 温 -> 冷 的顺序查找键，命中后向上晋升一级。
    ///
    /// # Logic
    /// 1. 热层命中直接返回。
    /// 2. 温层命中后移入热层。
    /// 3. 冷层命中后移入温层（不会直接进入热层）。
    ///
    /// # Arguments
    /// * `key`: 唯一键。
    ///
    /// # Returns
    /// 命中返回载荷字节的副本，否则返回 `None`。
    fn lookup_raw(&self, key: &str) -> Option<Vec<u8>>;

    /// # Summary
    /// 将原始字节写入指定层。
    ///
    /// # Logic
    /// 1. 构造新的缓存条目并写入目标层。
    /// 2. 写入成功后执行一次内存预算检查。
    ///
    /// # Arguments
    /// * `key`: 唯一键。
    /// * `bytes`: 序列化后的载荷。
    /// * `data_type`: 诊断用类型标签。
    /// * `layer`: 目标层。
    ///
    /// # Returns
    /// 写入成功返回 `true`。
    fn store_raw(&self, key: &str, bytes: Vec<u8>, data_type: &str, layer: CacheLayer) -> bool;

    /// # Summary
    /// 使缓存失效。
    ///
    /// # Logic
    /// 指定层时只从该层移除；未指定时尝试从全部三层移除。
    ///
    /// # Returns
    /// 至少移除了一个条目时返回 `true`，键不存在时返回 `false`（幂等）。
    fn invalidate(&self, key: &str, layer: Option<CacheLayer>) -> bool;

    /// 清空指定层并重置该层统计。
    fn clear_layer(&self, layer: CacheLayer) -> bool;

    /// 清空全部层，任何时候调用都不会失败。
    fn clear_all_cache(&self);

    /// 获取各层及汇总统计。
    fn get_cache_stats(&self) -> CacheStatsReport;

    /// 三层存活条目的估算总字节数。
    fn total_memory_usage(&self) -> usize;
}

/// # Summary
/// 分层缓存的强类型扩展接口，提供序列化与读穿 (read-through) 支持。
///
/// # Invariants
/// - 自动为所有实现 `TieredCache` 的类型提供支持。
/// - 载荷以 JSON 字节形式存放，读取总是得到独立的深拷贝。
#[async_trait]
pub trait TieredCacheExt: TieredCache {
    /// # Summary
    /// 存入强类型对象。
    ///
    /// # Logic
    /// 1. 使用 JSON 序列化对象，序列化失败即视为存储失败。
    /// 2. 调用底层 `store_raw` 写入。
    ///
    /// # Arguments
    /// * `key`: 唯一键。
    /// * `data`: 实现了 Serialize 的对象引用。
    /// * `data_type`: 诊断用类型标签。
    /// * `layer`: 目标层。
    ///
    /// # Returns
    /// 写入成功返回 `true`。
    fn store_data<T: Serialize + Sync + ?Sized>(
        &self,
        key: &str,
        data: &T,
        data_type: &str,
        layer: CacheLayer,
    ) -> bool {
        match serde_json::to_vec(data) {
            Ok(bytes) => self.store_raw(key, bytes, data_type, layer),
            Err(e) => {
                let err = CacheError::Serialize(e.to_string());
                error!("Failed to store [{}]: {}", key, err);
                false
            }
        }
    }

    /// # Summary
    /// 按层名称存入强类型对象，供配置或调试命令等以字符串指定层级的场景使用。
    ///
    /// # Logic
    /// 1. 解析层名称，未知名称记录错误并返回 `false`。
    /// 2. 委托给 `store_data`。
    fn store_data_named<T: Serialize + Sync + ?Sized>(
        &self,
        key: &str,
        data: &T,
        data_type: &str,
        layer: &str,
    ) -> bool {
        match layer.parse::<CacheLayer>() {
            Ok(layer) => self.store_data(key, data, data_type, layer),
            Err(e) => {
                error!("Failed to store [{}]: {}", key, e);
                false
            }
        }
    }

    /// # Summary
    /// 只读缓存，不触发数据源抓取。
    ///
    /// # Logic
    /// 1. 调用 `lookup_raw`（含晋升）。
    /// 2. 反序列化为目标类型；类型不匹配时记录日志并按未命中处理。
    ///
    /// # Returns
    /// 命中且类型匹配时返回对象。
    fn get_cached<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let bytes = self.lookup_raw(key)?;
        match serde_json::from_slice(&bytes) {
            Ok(value) => Some(value),
            Err(e) => {
                let err = CacheError::Deserialize(e.to_string());
                warn!("Cached payload [{}] does not match requested type: {}", key, err);
                None
            }
        }
    }

    /// # Summary
    /// 分层读取，全部未命中时调用数据源并写入热层。
    ///
    /// # Logic
    /// 1. 调用 `get_cached` 依次检查三层。
    /// 2. 未命中则等待 `fetch`，得到非空结果后写入热层再返回。
    /// 3. `fetch` 返回错误时记录日志并返回 `None`，不向上传播。
    ///
    /// # Arguments
    /// * `key`: 唯一键。
    /// * `data_type`: 诊断用类型标签。
    /// * `fetch`: 异步数据源。
    ///
    /// # Returns
    /// 缓存值或新抓取的值；两者都没有时返回 `None`。
    async fn get_data<T, F, Fut, E>(&self, key: &str, data_type: &str, fetch: F) -> Option<T>
    where
        T: Serialize + DeserializeOwned + Send + Sync,
        F: FnOnce() -> Fut + Send,
        Fut: Future<Output = Result<Option<T>, E>> + Send,
        E: Display + Send,
    {
        if let Some(value) = self.get_cached::<T>(key) {
            return Some(value);
        }

        debug!("Cache miss, fetching from source: {}", key);
        match fetch().await {
            Ok(Some(value)) => {
                self.store_data(key, &value, data_type, CacheLayer::Hot);
                Some(value)
            }
            Ok(None) => None,
            Err(e) => {
                error!("Fetch for [{}] failed: {}", key, e);
                None
            }
        }
    }
}

impl<T: TieredCache + ?Sized> TieredCacheExt for T {}
