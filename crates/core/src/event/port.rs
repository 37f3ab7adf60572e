use crate::event::entity::MarketEvent;
use crate::event::error::EventBusError;
use async_trait::async_trait;
use futures::Stream;
use std::pin::Pin;

/// # Summary
/// 事件流别名，使用动态分发的异步流。
pub type EventStream = Pin<Box<dyn Stream<Item = MarketEvent> + Send>>;

/// # Summary
/// 进程内事件总线接口。
///
/// # Invariants
/// - 发布方不依赖订阅方是否存在：没有订阅者时发布仍视为成功。
/// - 总线是可选协作者，调用方必须在未配置总线时照常工作。
#[async_trait]
pub trait EventBus: Send + Sync {
    /// # Summary
    /// 发布事件。
    ///
    /// # Arguments
    /// * `event`: 待发布的事件。
    ///
    /// # Returns
    /// 成功返回 Ok，总线不可用时返回 `EventBusError`。
    async fn publish(&self, event: MarketEvent) -> Result<(), EventBusError>;

    /// # Summary
    /// 订阅后续发布的全部事件。
    ///
    /// # Returns
    /// 返回异步流 EventStream。
    fn subscribe(&self) -> EventStream;
}
