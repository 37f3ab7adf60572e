//! 测试替身：可编排的行情源与记录型事件总线。
//! 仅在启用 `test-utils` 特性时编译，供各 crate 的测试共享。

use crate::common::{StreamKind, TimeFrame};
use crate::event::entity::MarketEvent;
use crate::event::error::EventBusError;
use crate::event::port::{EventBus, EventStream};
use crate::market::entity::{
    BrokerEntry, BrokerQueue, Candle, CapitalFlow, KlineSeries, OrderBook, OrderBookLevel, Quote,
    Tick, TickDirection, TickSeries,
};
use crate::market::error::MarketError;
use crate::market::port::MarketDataProvider;
use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use std::sync::Mutex;
use std::time::Duration;

/// 单个数据流的预设行为。
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Behavior {
    // 返回样例数据
    Succeed,
    // 返回网络错误
    Fail,
    // 返回 Ok(None)
    Empty,
    // 等待指定时长后返回样例数据
    Slow(Duration),
}

/// # Summary
/// 按数据流类型编排结果的行情源。
///
/// # Invariants
/// - 未显式编排的类型默认 `Behavior::Succeed`。
/// - 每次调用都会计数，无论结果如何。
#[derive(Default)]
pub struct ScriptedProvider {
    behaviors: DashMap<StreamKind, Behavior>,
    calls: DashMap<StreamKind, usize>,
}

impl ScriptedProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// 设置某一类型的行为，可链式调用。
    pub fn with(self, kind: StreamKind, behavior: Behavior) -> Self {
        self.behaviors.insert(kind, behavior);
        self
    }

    /// 运行期修改某一类型的行为。
    pub fn set(&self, kind: StreamKind, behavior: Behavior) {
        self.behaviors.insert(kind, behavior);
    }

    /// 某一类型累计被调用的次数。
    pub fn calls(&self, kind: StreamKind) -> usize {
        self.calls.get(&kind).map(|c| *c).unwrap_or(0)
    }

    async fn run<T>(&self, kind: StreamKind, make: impl FnOnce() -> T) -> Result<Option<T>, MarketError> {
        *self.calls.entry(kind).or_insert(0) += 1;
        let behavior = self
            .behaviors
            .get(&kind)
            .map(|b| *b)
            .unwrap_or(Behavior::Succeed);
        match behavior {
            Behavior::Succeed => Ok(Some(make())),
            Behavior::Fail => Err(MarketError::Network(format!("scripted {} failure", kind))),
            Behavior::Empty => Ok(None),
            Behavior::Slow(delay) => {
                tokio::time::sleep(delay).await;
                Ok(Some(make()))
            }
        }
    }
}

#[async_trait]
impl MarketDataProvider for ScriptedProvider {
    async fn fetch_quote(&self, code: &str) -> Result<Option<Quote>, MarketError> {
        self.run(StreamKind::Quote, || sample_quote(code)).await
    }

    async fn fetch_order_book(&self, code: &str) -> Result<Option<OrderBook>, MarketError> {
        self.run(StreamKind::OrderBook, || sample_order_book(code)).await
    }

    async fn fetch_ticks(&self, code: &str) -> Result<Option<TickSeries>, MarketError> {
        self.run(StreamKind::Tick, || sample_ticks(code)).await
    }

    async fn fetch_klines(&self, code: &str) -> Result<Option<KlineSeries>, MarketError> {
        self.run(StreamKind::Kline, || sample_klines(code)).await
    }

    async fn fetch_broker_queue(&self, code: &str) -> Result<Option<BrokerQueue>, MarketError> {
        self.run(StreamKind::BrokerQueue, || sample_broker_queue(code))
            .await
    }

    async fn fetch_capital_flow(&self, code: &str) -> Result<Option<CapitalFlow>, MarketError> {
        self.run(StreamKind::CapitalFlow, || sample_capital_flow(code))
            .await
    }
}

/// 样例报价。
pub fn sample_quote(code: &str) -> Quote {
    Quote {
        code: code.to_string(),
        last_price: 152.0,
        open: 150.0,
        high: 155.0,
        low: 149.0,
        prev_close: 151.0,
        volume: 1000.0,
        turnover: 152_000.0,
        timestamp: Utc::now(),
    }
}

/// 样例五档盘口。
pub fn sample_order_book(code: &str) -> OrderBook {
    let level = |price: f64| OrderBookLevel {
        price,
        volume: 100.0,
        order_count: 3,
    };
    OrderBook {
        code: code.to_string(),
        bids: (0..5).map(|i| level(151.9 - f64::from(i) * 0.1)).collect(),
        asks: (0..5).map(|i| level(152.0 + f64::from(i) * 0.1)).collect(),
        timestamp: Utc::now(),
    }
}

/// 样例逐笔成交。
pub fn sample_ticks(code: &str) -> TickSeries {
    let now = Utc::now();
    TickSeries {
        code: code.to_string(),
        ticks: vec![Tick {
            time: now,
            price: 152.0,
            volume: 200.0,
            direction: TickDirection::Buy,
        }],
        timestamp: now,
    }
}

/// 样例 K 线序列。
pub fn sample_klines(code: &str) -> KlineSeries {
    let now = Utc::now();
    KlineSeries {
        code: code.to_string(),
        timeframe: TimeFrame::Minute1,
        candles: vec![Candle {
            time: now,
            open: 150.0,
            high: 155.0,
            low: 149.0,
            close: 152.0,
            adj_close: None,
            volume: 1000.0,
            is_final: false,
        }],
        timestamp: now,
    }
}

/// 样例经纪队列。
pub fn sample_broker_queue(code: &str) -> BrokerQueue {
    BrokerQueue {
        code: code.to_string(),
        bid_brokers: vec![BrokerEntry {
            broker_id: 1001,
            broker_name: "Bid Broker".to_string(),
            position: 1,
        }],
        ask_brokers: vec![BrokerEntry {
            broker_id: 2002,
            broker_name: "Ask Broker".to_string(),
            position: 1,
        }],
        timestamp: Utc::now(),
    }
}

/// 样例资金流向。
pub fn sample_capital_flow(code: &str) -> CapitalFlow {
    CapitalFlow {
        code: code.to_string(),
        main_inflow: 2.3e8,
        super_large_inflow: 1.8e8,
        large_inflow: 0.5e8,
        medium_inflow: -1.2e8,
        small_inflow: -1.1e8,
        timestamp: Utc::now(),
    }
}

/// # Summary
/// 记录全部已发布事件的总线。
///
/// # Invariants
/// - `failing()` 构造的实例仍会记录事件，但每次发布都返回错误。
#[derive(Default)]
pub struct RecordingBus {
    events: Mutex<Vec<MarketEvent>>,
    fail: bool,
}

impl RecordingBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing() -> Self {
        Self {
            events: Mutex::new(Vec::new()),
            fail: true,
        }
    }

    /// 已记录事件的快照。
    pub fn events(&self) -> Vec<MarketEvent> {
        self.events
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// 指定事件名出现的次数。
    pub fn count(&self, name: &str) -> usize {
        self.events
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .filter(|e| e.name() == name)
            .count()
    }
}

#[async_trait]
impl EventBus for RecordingBus {
    async fn publish(&self, event: MarketEvent) -> Result<(), EventBusError> {
        self.events
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(event);
        if self.fail {
            return Err(EventBusError::Closed);
        }
        Ok(())
    }

    fn subscribe(&self) -> EventStream {
        Box::pin(futures::stream::empty())
    }
}
