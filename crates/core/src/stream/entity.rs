use crate::common::StreamKind;
use crate::stream::error::StreamError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

/// # Summary
/// 单个数据流的运行状态。
///
/// # Invariants
/// - 合法迁移：Stopped -> Starting -> Running <-> Paused；Starting/Running -> Error 仅发生在启动失败时。
/// - Error 不会自动恢复，只有重新调用启动才会重置。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StreamStatus {
    Stopped,
    Starting,
    Running,
    Paused,
    Error,
}

impl StreamStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            StreamStatus::Stopped => "stopped",
            StreamStatus::Starting => "starting",
            StreamStatus::Running => "running",
            StreamStatus::Paused => "paused",
            StreamStatus::Error => "error",
        }
    }
}

impl std::fmt::Display for StreamStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// # Summary
/// 数据流配置。
///
/// # Invariants
/// - `interval > 0`，`timeout > 0`。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamConfig {
    // 数据流类型
    pub name: StreamKind,
    // 轮询间隔（秒）
    pub interval: f64,
    // 连续失败的告警阈值
    #[serde(default = "default_retry_count")]
    pub retry_count: u32,
    // 单次抓取超时（秒）
    #[serde(default = "default_timeout")]
    pub timeout: f64,
    // 是否启用
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

/// 间隔与超时允许的最大秒数（一天）。
pub const MAX_STREAM_SECS: f64 = 86_400.0;

/// 校验秒数字段：必须是有限正数且不超过 `MAX_STREAM_SECS`。
fn check_secs(name: StreamKind, field: &str, secs: f64) -> Result<(), StreamError> {
    if secs.is_finite() && secs > 0.0 && secs <= MAX_STREAM_SECS {
        return Ok(());
    }
    Err(StreamError::InvalidConfig(format!(
        "{}: {} must be in (0, {}] seconds, got {}",
        name, field, MAX_STREAM_SECS, secs
    )))
}

// 负数与 NaN 视为 0，过大的值饱和到 Duration::MAX
fn saturating_secs(secs: f64) -> Duration {
    Duration::try_from_secs_f64(secs.max(0.0)).unwrap_or(Duration::MAX)
}

fn default_retry_count() -> u32 {
    3
}

fn default_timeout() -> f64 {
    10.0
}

fn default_enabled() -> bool {
    true
}

impl StreamConfig {
    /// # Summary
    /// 按类型构造默认配置。
    ///
    /// # Arguments
    /// * `name`: 数据流类型。
    ///
    /// # Returns
    /// 使用类型默认间隔、3 次告警阈值、10 秒超时且已启用的配置。
    pub fn new(name: StreamKind) -> Self {
        Self {
            name,
            interval: name.default_interval(),
            retry_count: default_retry_count(),
            timeout: default_timeout(),
            enabled: default_enabled(),
        }
    }

    /// 六种数据流的默认配置。
    pub fn defaults() -> Vec<StreamConfig> {
        StreamKind::ALL.iter().map(|k| StreamConfig::new(*k)).collect()
    }

    /// 校验配置不变量。
    pub fn validate(&self) -> Result<(), StreamError> {
        check_secs(self.name, "interval", self.interval)?;
        check_secs(self.name, "timeout", self.timeout)
    }

    /// 轮询间隔。
    pub fn interval_duration(&self) -> Duration {
        saturating_secs(self.interval)
    }

    /// 出错后的等待时间，为正常间隔的两倍。
    pub fn error_backoff(&self) -> Duration {
        saturating_secs(self.interval * 2.0)
    }

    /// 单次抓取超时。
    pub fn timeout_duration(&self) -> Duration {
        saturating_secs(self.timeout)
    }

    /// # Summary
    /// 应用一次局部更新。
    ///
    /// # Logic
    /// 1. 逐个字段检查，只应用合法的值。
    /// 2. 非法字段被丢弃并收集到返回的错误列表中。
    ///
    /// # Arguments
    /// * `update`: 需要修改的字段。
    ///
    /// # Returns
    /// 被拒绝字段的错误列表，为空表示全部应用。
    pub fn apply(&mut self, update: &StreamConfigUpdate) -> Vec<StreamError> {
        let mut rejected = Vec::new();
        if let Some(interval) = update.interval {
            match check_secs(self.name, "interval", interval) {
                Ok(()) => self.interval = interval,
                Err(e) => rejected.push(e),
            }
        }
        if let Some(timeout) = update.timeout {
            match check_secs(self.name, "timeout", timeout) {
                Ok(()) => self.timeout = timeout,
                Err(e) => rejected.push(e),
            }
        }
        if let Some(retry_count) = update.retry_count {
            self.retry_count = retry_count;
        }
        if let Some(enabled) = update.enabled {
            self.enabled = enabled;
        }
        rejected
    }
}

/// # Summary
/// 数据流配置的局部更新，只有 `Some` 字段会被写入。
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StreamConfigUpdate {
    pub interval: Option<f64>,
    pub retry_count: Option<u32>,
    pub timeout: Option<f64>,
    pub enabled: Option<bool>,
}

/// # Summary
/// 数据流运行统计。
///
/// # Invariants
/// - 首次启动该类型时创建，暂停/恢复期间保留，只随管理器实例重建而重置。
/// - `average_latency == total_latency / update_count`（`update_count > 0` 时）。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamStats {
    pub name: StreamKind,
    pub start_time: Option<DateTime<Utc>>,
    pub last_update: Option<DateTime<Utc>>,
    pub update_count: u64,
    pub error_count: u64,
    // 当前连续失败次数，成功一次即归零
    pub consecutive_errors: u32,
    // 平均延迟（秒）
    pub average_latency: f64,
    // 累计延迟（秒）
    pub total_latency: f64,
}

impl StreamStats {
    pub fn new(name: StreamKind) -> Self {
        Self {
            name,
            start_time: None,
            last_update: None,
            update_count: 0,
            error_count: 0,
            consecutive_errors: 0,
            average_latency: 0.0,
            total_latency: 0.0,
        }
    }

    /// # Summary
    /// 成功率。
    ///
    /// # Returns
    /// `update_count / (update_count + error_count)`，尚无请求时为 0。
    #[allow(clippy::cast_precision_loss)]
    pub fn success_rate(&self) -> f64 {
        let total = self.update_count + self.error_count;
        if total == 0 {
            0.0
        } else {
            self.update_count as f64 / total as f64
        }
    }

    /// # Summary
    /// 记录一次成功的更新。
    ///
    /// # Logic
    /// 更新最后时间、计数与滑动平均延迟，并清零连续失败计数。
    #[allow(clippy::cast_precision_loss)]
    pub fn record_success(&mut self, at: DateTime<Utc>, latency: Duration) {
        self.last_update = Some(at);
        self.update_count += 1;
        self.consecutive_errors = 0;
        self.total_latency += latency.as_secs_f64();
        self.average_latency = self.total_latency / self.update_count as f64;
    }

    /// 记录一次失败，返回当前连续失败次数。
    pub fn record_error(&mut self) -> u32 {
        self.error_count += 1;
        self.consecutive_errors = self.consecutive_errors.saturating_add(1);
        self.consecutive_errors
    }
}

/// 单个数据流的统计视图。
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StreamStatsView {
    pub status: StreamStatus,
    pub start_time: Option<String>,
    pub last_update: Option<String>,
    pub update_count: u64,
    pub error_count: u64,
    // 百分比，保留两位小数
    pub success_rate: f64,
    // 秒，保留三位小数
    pub average_latency: f64,
    pub active_subscriptions: usize,
}

/// 管理器级别的全局状态。
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GlobalStreamStatus {
    pub is_running: bool,
    pub current_stock: Option<String>,
    pub active_stream_count: usize,
}

/// # Summary
/// 全部数据流的统计报表，供界面状态栏与诊断使用。
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StreamStatsReport {
    pub streams: BTreeMap<StreamKind, StreamStatsView>,
    pub global_status: GlobalStreamStatus,
}

/// 四舍五入到指定位数的小数。
pub(crate) fn round_to(value: f64, digits: i32) -> f64 {
    let factor = 10f64.powi(digits);
    (value * factor).round() / factor
}

impl StreamStatsView {
    /// # Summary
    /// 由运行统计与状态生成展示视图。
    ///
    /// # Arguments
    /// * `stats`: 运行统计。
    /// * `status`: 当前状态。
    /// * `active_subscriptions`: 该类型当前订阅的证券数量。
    pub fn build(stats: &StreamStats, status: StreamStatus, active_subscriptions: usize) -> Self {
        Self {
            status,
            start_time: stats.start_time.map(|t| t.to_rfc3339()),
            last_update: stats.last_update.map(|t| t.to_rfc3339()),
            update_count: stats.update_count,
            error_count: stats.error_count,
            success_rate: round_to(stats.success_rate() * 100.0, 2),
            average_latency: round_to(stats.average_latency, 3),
            active_subscriptions,
        }
    }
}
