use chrono::{DateTime, Utc};
use decidra_core::cache::entity::{CacheLayer, CacheStats};
use lru::LruCache;
use tracing::{debug, warn};

/// # Summary
/// 缓存条目，持有序列化后的载荷及访问元数据。
///
/// # Invariants
/// - `size_bytes` 在构造时按载荷长度计算一次，之后不再变化。
/// - `last_accessed >= created_at` 恒成立。
#[derive(Debug, Clone, PartialEq)]
pub struct CacheEntry {
    pub key: String,
    // JSON 字节，条目独占
    pub payload: Vec<u8>,
    pub created_at: DateTime<Utc>,
    pub last_accessed: DateTime<Utc>,
    // 命中次数
    pub access_count: u64,
    // 诊断用类型标签
    pub data_type: String,
    pub size_bytes: usize,
}

impl CacheEntry {
    pub fn new(key: &str, payload: Vec<u8>, data_type: &str, now: DateTime<Utc>) -> Self {
        let size_bytes = payload.len();
        Self {
            key: key.to_string(),
            payload,
            created_at: now,
            last_accessed: now,
            access_count: 0,
            data_type: data_type.to_string(),
            size_bytes,
        }
    }

    /// 记录一次访问。时钟回拨时不早于创建时间。
    fn touch(&mut self, now: DateTime<Utc>) {
        self.last_accessed = now.max(self.created_at);
        self.access_count += 1;
    }
}

/// # Summary
/// 单个有界缓存层，按访问顺序排列，超出容量时淘汰最久未使用的条目。
///
/// # Invariants
/// - 任何 `put` 返回后 `len() <= max_size`。
/// - 每次命中的 `get` 与每次 `put` 都会把键移到最近使用端。
/// - `stats.total_size_bytes` 恒等于存活条目 `size_bytes` 之和。
pub struct LruTier {
    layer: CacheLayer,
    max_size: usize,
    // 容量由本结构自行约束，底层容器不设上限
    entries: LruCache<String, CacheEntry>,
    stats: CacheStats,
}

impl LruTier {
    pub fn new(layer: CacheLayer, max_size: usize) -> Self {
        Self {
            layer,
            max_size,
            entries: LruCache::unbounded(),
            stats: CacheStats::default(),
        }
    }

    pub fn layer(&self) -> CacheLayer {
        self.layer
    }

    pub fn max_size(&self) -> usize {
        self.max_size
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn stats(&self) -> CacheStats {
        self.stats
    }

    /// 不影响访问顺序与统计的存在性检查。
    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains(key)
    }

    /// 由旧到新列出当前的键，不影响访问顺序。
    pub fn keys_oldest_first(&self) -> Vec<String> {
        self.entries.iter().rev().map(|(k, _)| k.clone()).collect()
    }

    /// # Summary
    /// 查找条目。
    ///
    /// # Logic
    /// 1. 命中：更新访问时间与次数，移到最近使用端，`hits + 1`。
    /// 2. 未命中：只增加 `misses`。
    ///
    /// # Arguments
    /// * `key`: 唯一键。
    /// * `now`: 当前时间。
    ///
    /// # Returns
    /// 命中的条目引用。
    pub fn get(&mut self, key: &str, now: DateTime<Utc>) -> Option<&CacheEntry> {
        match self.entries.get_mut(key) {
            Some(entry) => {
                entry.touch(now);
                self.stats.hits += 1;
                Some(entry)
            }
            None => {
                self.stats.misses += 1;
                None
            }
        }
    }

    /// # Summary
    /// 插入或替换条目。
    ///
    /// # Logic
    /// 1. 替换时先扣除旧条目的字节数，再累加新条目。
    /// 2. 循环淘汰最久未使用的条目，直到数量不超过容量。
    ///
    /// # Arguments
    /// * `entry`: 新条目，键取自 `entry.key`。
    ///
    /// # Returns
    /// 写入成功返回 `true`；容量为 0 的层拒绝写入并返回 `false`。
    pub fn put(&mut self, entry: CacheEntry) -> bool {
        if self.max_size == 0 {
            warn!(
                "Refusing to store [{}] into zero-capacity {} tier",
                entry.key, self.layer
            );
            return false;
        }

        let size = entry.size_bytes;
        if let Some(old) = self.entries.put(entry.key.clone(), entry) {
            self.stats.total_size_bytes = self.stats.total_size_bytes.saturating_sub(old.size_bytes);
        }
        self.stats.total_size_bytes += size;

        while self.entries.len() > self.max_size {
            match self.entries.pop_lru() {
                Some((key, old)) => {
                    self.stats.total_size_bytes =
                        self.stats.total_size_bytes.saturating_sub(old.size_bytes);
                    self.stats.evictions += 1;
                    debug!("Evicted [{}] from {} tier (capacity)", key, self.layer);
                }
                None => break,
            }
        }
        self.stats.entry_count = self.entries.len();
        true
    }

    /// # Summary
    /// 淘汰指定键。
    ///
    /// # Returns
    /// 键存在并被移除时返回 `true`，同时计入淘汰次数。
    pub fn evict(&mut self, key: &str) -> bool {
        match self.remove(key) {
            Some(_) => {
                self.stats.evictions += 1;
                true
            }
            None => false,
        }
    }

    /// 取出条目用于跨层移动，不计入淘汰次数。
    pub fn take(&mut self, key: &str) -> Option<CacheEntry> {
        self.remove(key)
    }

    /// # Summary
    /// 淘汰最久未使用的若干条目，供内存预算回收使用。
    ///
    /// # Returns
    /// 实际淘汰的数量。
    pub fn evict_oldest(&mut self, count: usize) -> usize {
        let mut evicted = 0;
        while evicted < count {
            let Some((_, old)) = self.entries.pop_lru() else {
                break;
            };
            self.stats.total_size_bytes = self.stats.total_size_bytes.saturating_sub(old.size_bytes);
            self.stats.evictions += 1;
            evicted += 1;
        }
        self.stats.entry_count = self.entries.len();
        evicted
    }

    /// # Summary
    /// 淘汰最后访问时间早于 `cutoff` 的全部条目。
    ///
    /// # Returns
    /// 实际淘汰的数量。
    pub fn expire_older_than(&mut self, cutoff: DateTime<Utc>) -> usize {
        let expired: Vec<String> = self
            .entries
            .iter()
            .filter(|(_, entry)| entry.last_accessed < cutoff)
            .map(|(key, _)| key.clone())
            .collect();
        expired.iter().filter(|key| self.evict(key)).count()
    }

    /// 清空本层并重置本层统计。
    pub fn clear(&mut self) {
        self.entries.clear();
        self.stats = CacheStats::default();
    }

    fn remove(&mut self, key: &str) -> Option<CacheEntry> {
        let entry = self.entries.pop(key)?;
        self.stats.total_size_bytes = self.stats.total_size_bytes.saturating_sub(entry.size_bytes);
        self.stats.entry_count = self.entries.len();
        Some(entry)
    }
}
