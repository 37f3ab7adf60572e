use crate::common::{StreamKind, TimeFrame};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// # Summary
/// 带时间戳的行情数据能力。所有载荷共享这一能力，供缓存与界面判断新鲜度。
pub trait Timestamped {
    /// 数据的生成时间
    fn timestamp(&self) -> DateTime<Utc>;
}

/// # Summary
/// 实时报价快照。
///
/// # Invariants
/// - `high` 必须大于或等于 `low`。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Quote {
    // 证券代码
    pub code: String,
    // 最新成交价
    pub last_price: f64,
    // 开盘价
    pub open: f64,
    // 最高价
    pub high: f64,
    // 最低价
    pub low: f64,
    // 昨收价
    pub prev_close: f64,
    // 成交量
    pub volume: f64,
    // 成交额
    pub turnover: f64,
    // 行情时间
    pub timestamp: DateTime<Utc>,
}

/// 盘口中的单个价位。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderBookLevel {
    pub price: f64,
    pub volume: f64,
    // 该价位挂单笔数
    pub order_count: u32,
}

/// # Summary
/// 五档（或更多档）盘口。
///
/// # Invariants
/// - `bids` 按价格降序，`asks` 按价格升序。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderBook {
    pub code: String,
    pub bids: Vec<OrderBookLevel>,
    pub asks: Vec<OrderBookLevel>,
    pub timestamp: DateTime<Utc>,
}

/// 逐笔成交方向。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TickDirection {
    Buy,
    Sell,
    Neutral,
}

/// 单笔成交。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tick {
    pub time: DateTime<Utc>,
    pub price: f64,
    pub volume: f64,
    pub direction: TickDirection,
}

/// 一次轮询取回的逐笔成交批次。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TickSeries {
    pub code: String,
    pub ticks: Vec<Tick>,
    pub timestamp: DateTime<Utc>,
}

/// # Summary
/// 单根 K 线数据实体，记录特定时段内的行情波动。
///
/// # Invariants
/// - `high` 必须大于或等于 `low`, `open`, `close`。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    // K 线开始时间
    pub time: DateTime<Utc>,
    // 开盘价
    pub open: f64,
    // 最高价
    pub high: f64,
    // 最低价
    pub low: f64,
    // 收盘价
    pub close: f64,
    // 调整后收盘价 (用于处理分红、拆股等复权情况)
    pub adj_close: Option<f64>,
    // 成交量
    pub volume: f64,
    // 是否为最终数据 (即该周期已收盘)
    pub is_final: bool,
}

/// # Summary
/// 一次轮询取回的 K 线序列。
///
/// # Invariants
/// - `candles` 按时间升序。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KlineSeries {
    pub code: String,
    pub timeframe: TimeFrame,
    pub candles: Vec<Candle>,
    pub timestamp: DateTime<Utc>,
}

/// 经纪队列中的一个席位。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BrokerEntry {
    pub broker_id: u32,
    pub broker_name: String,
    // 在队列中的档位
    pub position: u32,
}

/// 买卖两侧的经纪队列。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BrokerQueue {
    pub code: String,
    pub bid_brokers: Vec<BrokerEntry>,
    pub ask_brokers: Vec<BrokerEntry>,
    pub timestamp: DateTime<Utc>,
}

/// # Summary
/// 资金流向快照，正数为流入，负数为流出。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CapitalFlow {
    pub code: String,
    // 主力净流入
    pub main_inflow: f64,
    // 特大单净流入
    pub super_large_inflow: f64,
    // 大单净流入
    pub large_inflow: f64,
    // 中单净流入
    pub medium_inflow: f64,
    // 小单净流入
    pub small_inflow: f64,
    pub timestamp: DateTime<Utc>,
}

/// # Summary
/// 各数据流载荷的带标签联合体，是缓存与事件总线中流转的统一形态。
///
/// # Invariants
/// - 变体与 `StreamKind` 一一对应。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "data", rename_all = "snake_case")]
pub enum MarketPayload {
    Quote(Quote),
    OrderBook(OrderBook),
    Tick(TickSeries),
    Kline(KlineSeries),
    BrokerQueue(BrokerQueue),
    CapitalFlow(CapitalFlow),
}

impl MarketPayload {
    /// 载荷所属的数据流类型。
    pub fn kind(&self) -> StreamKind {
        match self {
            MarketPayload::Quote(_) => StreamKind::Quote,
            MarketPayload::OrderBook(_) => StreamKind::OrderBook,
            MarketPayload::Tick(_) => StreamKind::Tick,
            MarketPayload::Kline(_) => StreamKind::Kline,
            MarketPayload::BrokerQueue(_) => StreamKind::BrokerQueue,
            MarketPayload::CapitalFlow(_) => StreamKind::CapitalFlow,
        }
    }

    /// 载荷对应的证券代码。
    pub fn code(&self) -> &str {
        match self {
            MarketPayload::Quote(p) => &p.code,
            MarketPayload::OrderBook(p) => &p.code,
            MarketPayload::Tick(p) => &p.code,
            MarketPayload::Kline(p) => &p.code,
            MarketPayload::BrokerQueue(p) => &p.code,
            MarketPayload::CapitalFlow(p) => &p.code,
        }
    }

    /// # Summary
    /// 只序列化内部数据，不带类型标签。
    ///
    /// # Logic
    /// 缓存按键区分数据类型，读取方直接反序列化为 `Quote`、`KlineSeries` 等具体类型。
    pub fn content_json(&self) -> Result<Vec<u8>, serde_json::Error> {
        match self {
            MarketPayload::Quote(p) => serde_json::to_vec(p),
            MarketPayload::OrderBook(p) => serde_json::to_vec(p),
            MarketPayload::Tick(p) => serde_json::to_vec(p),
            MarketPayload::Kline(p) => serde_json::to_vec(p),
            MarketPayload::BrokerQueue(p) => serde_json::to_vec(p),
            MarketPayload::CapitalFlow(p) => serde_json::to_vec(p),
        }
    }
}

impl Timestamped for MarketPayload {
    fn timestamp(&self) -> DateTime<Utc> {
        match self {
            MarketPayload::Quote(p) => p.timestamp,
            MarketPayload::OrderBook(p) => p.timestamp,
            MarketPayload::Tick(p) => p.timestamp,
            MarketPayload::Kline(p) => p.timestamp,
            MarketPayload::BrokerQueue(p) => p.timestamp,
            MarketPayload::CapitalFlow(p) => p.timestamp,
        }
    }
}
