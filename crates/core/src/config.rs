use crate::stream::entity::StreamConfig;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::warn;

/// 全局应用配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default = "StreamConfig::defaults")]
    pub streams: Vec<StreamConfig>,
    #[serde(default)]
    pub monitor: MonitorConfig,
    #[serde(default)]
    pub log: LogConfig,
}

/// # Summary
/// 分层缓存配置。
///
/// # Invariants
/// - 容量按条目数计；`max_memory_mb` 按估算字节数约束三层总和。
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub max_memory_mb: u64,
    pub hot_capacity: usize,
    pub warm_capacity: usize,
    pub cold_capacity: usize,
    // 后台清理间隔
    pub cleanup_interval_secs: u64,
    // 冷层条目超过该时长未访问即过期
    pub cold_ttl_secs: u64,
    // 清理循环出错后的退避时间
    pub error_backoff_secs: u64,
}

impl CacheConfig {
    /// 内存预算（字节）。
    pub fn max_memory_bytes(&self) -> usize {
        let bytes = self.max_memory_mb.saturating_mul(1024 * 1024);
        usize::try_from(bytes).unwrap_or(usize::MAX)
    }

    pub fn cleanup_interval(&self) -> Duration {
        Duration::from_secs(self.cleanup_interval_secs)
    }

    pub fn error_backoff(&self) -> Duration {
        Duration::from_secs(self.error_backoff_secs)
    }

    pub fn cold_ttl(&self) -> chrono::Duration {
        chrono::Duration::seconds(i64::try_from(self.cold_ttl_secs).unwrap_or(i64::MAX))
    }

    /// # Summary
    /// 修正会让后台清理空转或让晋升丢失条目的取值。
    ///
    /// # Logic
    /// 三层容量、清理间隔与退避时间为 0 时提升为 1，并记录警告。
    pub fn normalized(mut self) -> Self {
        for (field, value) in [
            ("hot_capacity", &mut self.hot_capacity),
            ("warm_capacity", &mut self.warm_capacity),
            ("cold_capacity", &mut self.cold_capacity),
        ] {
            if *value == 0 {
                warn!("cache.{} must be at least 1, using 1", field);
                *value = 1;
            }
        }
        for (field, value) in [
            ("cleanup_interval_secs", &mut self.cleanup_interval_secs),
            ("error_backoff_secs", &mut self.error_backoff_secs),
        ] {
            if *value == 0 {
                warn!("cache.{} must be at least 1, using 1", field);
                *value = 1;
            }
        }
        self
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_memory_mb: 100,
            hot_capacity: 500,
            warm_capacity: 1000,
            cold_capacity: 2000,
            cleanup_interval_secs: 300,
            cold_ttl_secs: 3600,
            error_backoff_secs: 60,
        }
    }
}

/// 监控目标配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    // 启动后聚焦的证券代码
    pub stock_code: String,
    // 周期性输出统计的间隔
    pub stats_interval_secs: u64,
    // K 线数据流的周期，取值如 1m、5m、1h、1d
    pub kline_timeframe: String,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            stock_code: "AAPL".to_string(),
            stats_interval_secs: 30,
            kline_timeframe: "1m".to_string(),
        }
    }
}

/// 日志配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    // EnvFilter 语法的默认过滤级别
    pub level: String,
    // 日志文件目录，为空时只输出到终端
    pub dir: Option<String>,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            dir: None,
        }
    }
}

impl AppConfig {
    /// 加载后修正非法的缓存参数。
    pub fn normalized(mut self) -> Self {
        self.cache = self.cache.normalized();
        self
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            cache: CacheConfig::default(),
            streams: StreamConfig::defaults(),
            monitor: MonitorConfig::default(),
            log: LogConfig::default(),
        }
    }
}
