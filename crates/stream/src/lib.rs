//! # `decidra-stream` - 实时数据流协调
//!
//! 为当前聚焦的证券维护每种行情数据一个独立的轮询协程，
//! 抓取结果写入分层缓存并通过事件总线广播。

pub mod bus;
pub mod manager;
mod worker;

pub use bus::BroadcastEventBus;
pub use manager::RealTimeDataStreamManager;
