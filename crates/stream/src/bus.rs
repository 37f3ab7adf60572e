use async_trait::async_trait;
use decidra_core::event::entity::MarketEvent;
use decidra_core::event::error::EventBusError;
use decidra_core::event::port::{EventBus, EventStream};
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;
use tracing::{trace, warn};

/// # Summary
/// 基于 tokio 广播通道的进程内事件总线。
///
/// # Invariants
/// - 没有订阅者时发布不算失败，事件直接丢弃。
/// - 订阅者消费过慢时跳过被覆盖的事件并继续，不会中断订阅流。
pub struct BroadcastEventBus {
    tx: broadcast::Sender<MarketEvent>,
}

impl BroadcastEventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    /// 当前订阅者数量。
    pub fn receiver_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for BroadcastEventBus {
    fn default() -> Self {
        Self::new(256)
    }
}

#[async_trait]
impl EventBus for BroadcastEventBus {
    async fn publish(&self, event: MarketEvent) -> Result<(), EventBusError> {
        if let Err(e) = self.tx.send(event) {
            trace!("No subscribers for {}", e.0.name());
        }
        Ok(())
    }

    fn subscribe(&self) -> EventStream {
        let mut rx = self.tx.subscribe();
        let stream = async_stream::stream! {
            loop {
                match rx.recv().await {
                    Ok(event) => yield event,
                    Err(RecvError::Lagged(skipped)) => {
                        warn!("Event subscriber lagged, skipped {} events", skipped);
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        };
        Box::pin(stream)
    }
}
