use crate::common::StreamKind;
use crate::market::entity::{
    BrokerQueue, CapitalFlow, KlineSeries, MarketPayload, OrderBook, Quote, TickSeries,
};
use crate::market::error::MarketError;
use async_trait::async_trait;

/// # Summary
/// 市场行情数据提供者接口（原始数据源）。
///
/// # Invariants
/// - 每个方法对应一种数据流，`Ok(None)` 表示本次轮询没有新数据，不计为错误。
/// - 数据源未实现的类型默认返回 `MarketError::Unsupported`，调用方据此计入错误统计。
/// - 实现者若内部使用阻塞 SDK，必须自行派发到阻塞线程池，不得阻塞调用协程。
#[async_trait]
pub trait MarketDataProvider: Send + Sync {
    /// # Summary
    /// 获取实时报价。
    ///
    /// # Arguments
    /// * `code`: 证券代码。
    ///
    /// # Returns
    /// 成功返回报价快照。
    async fn fetch_quote(&self, _code: &str) -> Result<Option<Quote>, MarketError> {
        Err(MarketError::Unsupported(StreamKind::Quote))
    }

    /// 获取盘口。
    async fn fetch_order_book(&self, _code: &str) -> Result<Option<OrderBook>, MarketError> {
        Err(MarketError::Unsupported(StreamKind::OrderBook))
    }

    /// 获取最近的逐笔成交。
    async fn fetch_ticks(&self, _code: &str) -> Result<Option<TickSeries>, MarketError> {
        Err(MarketError::Unsupported(StreamKind::Tick))
    }

    /// # Summary
    /// 获取 K 线序列。
    ///
    /// # Logic
    /// 周期与回溯长度由实现者自行决定。
    ///
    /// # Arguments
    /// * `code`: 证券代码。
    ///
    /// # Returns
    /// 按时间升序的 K 线序列。
    async fn fetch_klines(&self, _code: &str) -> Result<Option<KlineSeries>, MarketError> {
        Err(MarketError::Unsupported(StreamKind::Kline))
    }

    /// 获取经纪队列。
    async fn fetch_broker_queue(&self, _code: &str) -> Result<Option<BrokerQueue>, MarketError> {
        Err(MarketError::Unsupported(StreamKind::BrokerQueue))
    }

    /// 获取资金流向。
    async fn fetch_capital_flow(&self, _code: &str) -> Result<Option<CapitalFlow>, MarketError> {
        Err(MarketError::Unsupported(StreamKind::CapitalFlow))
    }

    /// # Summary
    /// 按数据流类型路由到对应的抓取方法，并包装为统一载荷。
    ///
    /// # Logic
    /// 1. 根据 `kind` 调用具体方法。
    /// 2. 将结果映射为 `MarketPayload` 的对应变体。
    ///
    /// # Arguments
    /// * `kind`: 数据流类型。
    /// * `code`: 证券代码。
    ///
    /// # Returns
    /// 统一载荷，或本次无数据 / 错误。
    async fn fetch(
        &self,
        kind: StreamKind,
        code: &str,
    ) -> Result<Option<MarketPayload>, MarketError> {
        let payload = match kind {
            StreamKind::Quote => self.fetch_quote(code).await?.map(MarketPayload::Quote),
            StreamKind::OrderBook => self
                .fetch_order_book(code)
                .await?
                .map(MarketPayload::OrderBook),
            StreamKind::Tick => self.fetch_ticks(code).await?.map(MarketPayload::Tick),
            StreamKind::Kline => self.fetch_klines(code).await?.map(MarketPayload::Kline),
            StreamKind::BrokerQueue => self
                .fetch_broker_queue(code)
                .await?
                .map(MarketPayload::BrokerQueue),
            StreamKind::CapitalFlow => self
                .fetch_capital_flow(code)
                .await?
                .map(MarketPayload::CapitalFlow),
        };
        Ok(payload)
    }
}
