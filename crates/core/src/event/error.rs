use thiserror::Error;

/// # Summary
/// 事件总线错误枚举。
///
/// # Invariants
/// - 必须通过 `thiserror` 派生 `Error` trait。
#[derive(Error, Debug)]
pub enum EventBusError {
    // 总线已关闭，无法再投递
    #[error("Event bus closed")]
    Closed,
    // 未知或未分类的错误
    #[error("Unknown error: {0}")]
    Unknown(String),
}
