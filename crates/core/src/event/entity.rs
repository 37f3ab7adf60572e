use crate::market::entity::MarketPayload;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// # Summary
/// 数据流子系统向外发布的事件。
///
/// # Invariants
/// - 启动/停止事件的 `name()` 与序列化后的 `event` 字段一致。
/// - 数据事件序列化为 `"event":"stream_data"`，载荷自带类型标签；
///   `name()` 按载荷类型返回 `realtime_quote`、`kline_data` 等，界面层按它订阅。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event")]
pub enum MarketEvent {
    // 一次启动完成，携带实际启动成功的数据流数量
    #[serde(rename = "realtime_streams_started")]
    StreamsStarted {
        stock_code: String,
        streams_started: usize,
        total_streams: usize,
    },
    // 全部数据流已停止
    #[serde(rename = "realtime_streams_stopped")]
    StreamsStopped { timestamp: DateTime<Utc> },
    // 单个数据流的一次成功更新
    #[serde(rename = "stream_data")]
    StreamData {
        stock_code: String,
        payload: MarketPayload,
        timestamp: DateTime<Utc>,
    },
}

impl MarketEvent {
    /// # Summary
    /// 事件名。
    ///
    /// # Logic
    /// 数据事件按载荷类型细分，例如 `realtime_quote`、`kline_data`。
    pub fn name(&self) -> &'static str {
        match self {
            MarketEvent::StreamsStarted { .. } => "realtime_streams_started",
            MarketEvent::StreamsStopped { .. } => "realtime_streams_stopped",
            MarketEvent::StreamData { payload, .. } => payload.kind().event_name(),
        }
    }
}
