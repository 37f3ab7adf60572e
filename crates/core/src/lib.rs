//! # `decidra-core` - 领域核心
//!
//! 行情监控子系统的实体、端口 (Trait) 与错误定义。
//! 其余 crate 只依赖这里的抽象，具体实现由 `crates/app` 在启动时注入。
//!
//! ## 模块划分
//! - `cache`: 分层缓存的层级/统计实体与 `TieredCache` 端口
//! - `market`: 行情载荷实体与 `MarketDataProvider` 端口
//! - `stream`: 实时数据流的配置、统计与状态机
//! - `event`: 事件总线端口与 `MarketEvent`
//! - `common`: 证券周期、数据流类型与时钟

pub mod cache {
    pub mod entity;
    pub mod error;
    pub mod port;
}

pub mod market {
    pub mod entity;
    pub mod error;
    pub mod port;
}

pub mod stream {
    pub mod entity;
    pub mod error;
}

pub mod event {
    pub mod entity;
    pub mod error;
    pub mod port;
}

pub mod common;
pub mod config;

#[cfg(feature = "test-utils")]
pub mod test_utils;
