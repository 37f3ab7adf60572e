use crate::cache::error::CacheError;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// # Summary
/// 缓存层级。热层存放正在展示的数据，温层存放最近相关的数据，冷层存放后台/历史数据。
///
/// # Invariants
/// - 晋升方向只能是 Cold -> Warm -> Hot，每次命中只晋升一级。
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum CacheLayer {
    Hot,
    Warm,
    Cold,
}

impl CacheLayer {
    /// 全部层级，由热到冷。
    pub const ALL: [CacheLayer; 3] = [CacheLayer::Hot, CacheLayer::Warm, CacheLayer::Cold];

    pub fn as_str(&self) -> &'static str {
        match self {
            CacheLayer::Hot => "hot",
            CacheLayer::Warm => "warm",
            CacheLayer::Cold => "cold",
        }
    }
}

impl FromStr for CacheLayer {
    type Err = CacheError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "hot" => Ok(CacheLayer::Hot),
            "warm" => Ok(CacheLayer::Warm),
            "cold" => Ok(CacheLayer::Cold),
            _ => Err(CacheError::InvalidLayer(s.to_string())),
        }
    }
}

impl std::fmt::Display for CacheLayer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// # Summary
/// 单个缓存层的统计计数。
///
/// # Invariants
/// - `hits`、`misses`、`evictions` 在一次运行内单调递增，仅在清空该层时归零。
/// - `total_size_bytes` 恒等于该层存活条目的 `size_bytes` 之和。
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheStats {
    // 命中次数
    pub hits: u64,
    // 未命中次数
    pub misses: u64,
    // 淘汰次数
    pub evictions: u64,
    // 存活条目的估算总字节数
    pub total_size_bytes: usize,
    // 存活条目数量
    pub entry_count: usize,
}

impl CacheStats {
    /// # Summary
    /// 命中率。
    ///
    /// # Returns
    /// `hits / (hits + misses)`，尚无访问时为 0。
    #[allow(clippy::cast_precision_loss)]
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }

    /// 将另一层的计数累加到当前统计上，用于生成汇总视图。
    pub fn accumulate(&mut self, other: &CacheStats) {
        self.hits += other.hits;
        self.misses += other.misses;
        self.evictions += other.evictions;
        self.total_size_bytes += other.total_size_bytes;
        self.entry_count += other.entry_count;
    }
}

/// 单层统计的展示视图。
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LayerStatsView {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub entry_count: usize,
    pub size_mb: f64,
    pub hit_rate: f64,
}

impl From<&CacheStats> for LayerStatsView {
    #[allow(clippy::cast_precision_loss)]
    fn from(stats: &CacheStats) -> Self {
        Self {
            hits: stats.hits,
            misses: stats.misses,
            evictions: stats.evictions,
            entry_count: stats.entry_count,
            size_mb: stats.total_size_bytes as f64 / 1024.0 / 1024.0,
            hit_rate: stats.hit_rate(),
        }
    }
}

/// # Summary
/// 三层缓存的统计报表，供诊断面板展示。
///
/// # Invariants
/// - `total` 为三层计数之和。
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CacheStatsReport {
    pub hot: LayerStatsView,
    pub warm: LayerStatsView,
    pub cold: LayerStatsView,
    pub total: LayerStatsView,
    // 总占用相对内存预算的百分比
    pub memory_usage_percent: f64,
}

impl CacheStatsReport {
    /// 按层级取出对应的统计视图。
    pub fn layer(&self, layer: CacheLayer) -> &LayerStatsView {
        match layer {
            CacheLayer::Hot => &self.hot,
            CacheLayer::Warm => &self.warm,
            CacheLayer::Cold => &self.cold,
        }
    }
}
