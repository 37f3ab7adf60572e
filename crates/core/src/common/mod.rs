use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::time::Duration;

pub mod time;

use crate::cache::entity::CacheLayer;

/// # Summary
/// 交易时间周期枚举，定义 K 线的时间跨度。
///
/// # Invariants
/// - 无特定约束。
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum TimeFrame {
    // 1分钟
    Minute1,
    // 5分钟
    Minute5,
    // 1小时
    Hour1,
    // 1日
    Day1,
}

impl FromStr for TimeFrame {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "1m" | "minute1" => Ok(TimeFrame::Minute1),
            "5m" | "minute5" => Ok(TimeFrame::Minute5),
            "1h" | "hour1" => Ok(TimeFrame::Hour1),
            "1d" | "day1" => Ok(TimeFrame::Day1),
            _ => Err(format!("Unknown TimeFrame: {}", s)),
        }
    }
}

impl std::fmt::Display for TimeFrame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TimeFrame::Minute1 => write!(f, "1m"),
            TimeFrame::Minute5 => write!(f, "5m"),
            TimeFrame::Hour1 => write!(f, "1h"),
            TimeFrame::Day1 => write!(f, "1d"),
        }
    }
}

/// # Summary
/// 实时数据流类型，每一种类型对应一个独立的轮询协程。
///
/// # Invariants
/// - 同一类型在任意时刻最多只有一个轮询协程。
/// - 各类型的节奏、缓存层与事件名互不影响。
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum StreamKind {
    // 报价
    Quote,
    // 五档盘口
    #[serde(rename = "orderbook")]
    OrderBook,
    // 逐笔成交
    Tick,
    // K 线
    Kline,
    // 经纪队列
    BrokerQueue,
    // 资金流向
    CapitalFlow,
}

impl StreamKind {
    /// 全部数据流类型，顺序即默认启动顺序。
    pub const ALL: [StreamKind; 6] = [
        StreamKind::Quote,
        StreamKind::OrderBook,
        StreamKind::Tick,
        StreamKind::Kline,
        StreamKind::BrokerQueue,
        StreamKind::CapitalFlow,
    ];

    /// # Summary
    /// 数据流的标准名称。
    ///
    /// # Returns
    /// 与配置文件、统计报表中一致的小写名称。
    pub fn as_str(&self) -> &'static str {
        match self {
            StreamKind::Quote => "quote",
            StreamKind::OrderBook => "orderbook",
            StreamKind::Tick => "tick",
            StreamKind::Kline => "kline",
            StreamKind::BrokerQueue => "broker_queue",
            StreamKind::CapitalFlow => "capital_flow",
        }
    }

    /// # Summary
    /// 默认轮询间隔（秒）。
    ///
    /// # Logic
    /// 报价与盘口 1 秒，逐笔 0.5 秒，K 线 60 秒，经纪队列 2 秒，资金流向 5 秒。
    pub fn default_interval(&self) -> f64 {
        match self {
            StreamKind::Quote => 1.0,
            StreamKind::OrderBook => 1.0,
            StreamKind::Tick => 0.5,
            StreamKind::Kline => 60.0,
            StreamKind::BrokerQueue => 2.0,
            StreamKind::CapitalFlow => 5.0,
        }
    }

    /// # Summary
    /// 暂停状态下重新检查状态的间隔。
    ///
    /// # Logic
    /// 低频数据流（K 线、资金流向）使用更长的检查间隔。
    pub fn paused_poll(&self) -> Duration {
        match self {
            StreamKind::Kline => Duration::from_secs(5),
            StreamKind::CapitalFlow => Duration::from_secs(2),
            _ => Duration::from_secs(1),
        }
    }

    /// 写入缓存时使用的键，例如 `quote_00700.HK`。
    pub fn cache_key(&self, stock_code: &str) -> String {
        let prefix = match self {
            StreamKind::Quote => "quote",
            StreamKind::OrderBook => "orderbook",
            StreamKind::Tick => "tick",
            StreamKind::Kline => "kline",
            StreamKind::BrokerQueue => "broker",
            StreamKind::CapitalFlow => "capital",
        };
        format!("{}_{}", prefix, stock_code)
    }

    /// 缓存条目的类型标签，仅用于诊断。
    pub fn data_type(&self) -> &'static str {
        match self {
            StreamKind::Quote => "quote",
            StreamKind::OrderBook => "orderbook",
            StreamKind::Tick => "tick",
            StreamKind::Kline => "kline",
            StreamKind::BrokerQueue => "broker",
            StreamKind::CapitalFlow => "capital",
        }
    }

    /// # Summary
    /// 数据写入的目标缓存层。
    ///
    /// # Logic
    /// K 线与资金流向更新频率低、载荷大，写入温层；其余写入热层。
    pub fn cache_layer(&self) -> CacheLayer {
        match self {
            StreamKind::Kline | StreamKind::CapitalFlow => CacheLayer::Warm,
            _ => CacheLayer::Hot,
        }
    }

    /// 成功抓取后发布的事件名。
    pub fn event_name(&self) -> &'static str {
        match self {
            StreamKind::Quote => "realtime_quote",
            StreamKind::OrderBook => "orderbook_data",
            StreamKind::Tick => "tick_data",
            StreamKind::Kline => "kline_data",
            StreamKind::BrokerQueue => "broker_queue_data",
            StreamKind::CapitalFlow => "capital_flow_data",
        }
    }
}

impl FromStr for StreamKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "quote" => Ok(StreamKind::Quote),
            "orderbook" | "order_book" => Ok(StreamKind::OrderBook),
            "tick" => Ok(StreamKind::Tick),
            "kline" => Ok(StreamKind::Kline),
            "broker_queue" | "broker" => Ok(StreamKind::BrokerQueue),
            "capital_flow" | "capital" => Ok(StreamKind::CapitalFlow),
            _ => Err(format!("Unknown StreamKind: {}", s)),
        }
    }
}

impl std::fmt::Display for StreamKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
