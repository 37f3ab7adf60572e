use crate::common::StreamKind;
use thiserror::Error;

/// # Summary
/// 数据流管理错误枚举。
///
/// # Invariants
/// - 必须通过 `thiserror` 派生 `Error` trait。
/// - 对外接口只返回 `bool`，这些错误仅用于日志与状态诊断。
#[derive(Error, Debug)]
pub enum StreamError {
    // 管理器中没有该类型的配置
    #[error("Unknown stream: {0}")]
    UnknownStream(StreamKind),
    // 配置值不满足不变量
    #[error("Invalid stream config: {0}")]
    InvalidConfig(String),
    // 当前线程没有可用的 tokio 运行时，无法派生协程
    #[error("No async runtime available to spawn {0}")]
    NoRuntime(StreamKind),
}
