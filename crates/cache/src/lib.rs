//! # `decidra-cache` - 分层内存缓存
//!
//! `TieredCache` 端口的内存实现：热/温/冷三个 LRU 层，命中逐级晋升，
//! 三层共享一个字节预算，并由后台协程定期清理冷层中长期未访问的条目。

pub mod tier;
pub mod tiered;

pub use tiered::DataCacheManager;
