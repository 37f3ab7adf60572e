use crate::common::StreamKind;
use thiserror::Error;

/// # Summary
/// 市场数据域错误枚举，处理网络、解析、超时及数据缺失等问题。
///
/// # Invariants
/// - 必须通过 `thiserror` 派生 `Error` trait。
#[derive(Error, Debug)]
pub enum MarketError {
    // 网络层错误，包含底层 HTTP 客户端错误信息
    #[error("Network error: {0}")]
    Network(String),
    // 数据解析错误，如 JSON 格式不匹配
    #[error("Parse error: {0}")]
    Parse(String),
    // 请求的数据未找到 (404 或内容为空)
    #[error("Data not found")]
    NotFound,
    // 数据源不提供该类型的数据
    #[error("Stream {0} is not supported by this provider")]
    Unsupported(StreamKind),
    // 单次抓取超过了数据流配置的超时时间
    #[error("Fetch timed out after {0:.3}s")]
    Timeout(f64),
    // 未知或未分类的错误
    #[error("Unknown error: {0}")]
    Unknown(String),
}
