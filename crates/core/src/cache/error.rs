use thiserror::Error;

/// # Summary
/// 缓存域错误枚举，处理层级名称、序列化及锁故障。
///
/// # Invariants
/// - 必须通过 `thiserror` 派生 `Error` trait。
/// - 这些错误只在缓存内部流转，对外一律降级为 `false` / `None` 并记录日志。
#[derive(Error, Debug)]
pub enum CacheError {
    // 未知的缓存层名称
    #[error("Invalid cache layer: {0}")]
    InvalidLayer(String),
    // 数据序列化失败
    #[error("Serialize error: {0}")]
    Serialize(String),
    // 数据反序列化失败
    #[error("Deserialize error: {0}")]
    Deserialize(String),
    // 分层容器的互斥锁已中毒
    #[error("Cache lock poisoned")]
    Poisoned,
}
