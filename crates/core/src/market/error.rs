use thiserror::Error;

/// # Summary
/// 行情接口错误枚举，区分可重试的瞬时故障与应立即失败的错误。
///
/// # Invariants
/// - 必须通过 `thiserror` 派生 `Error` trait。
/// - 只有 `is_retryable` 为 true 的错误才会进入重试退避。
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FeedError {
    // 请求超时
    #[error("Request timed out: {0}")]
    Timeout(String),
    // 连接建立失败或被重置
    #[error("Connection error: {0}")]
    Connection(String),
    // 触发交易所限流 (HTTP 429)
    #[error("Rate limited by exchange")]
    RateLimited,
    // 其他非成功的 HTTP 状态
    #[error("HTTP {status}: {message}")]
    Http { status: u16, message: String },
    // 鉴权失败 (401/403)
    #[error("Authentication failed: {0}")]
    Auth(String),
    // 交易对或资源不存在 (404)
    #[error("Not found: {0}")]
    NotFound(String),
    // 响应体解析失败
    #[error("Parse error: {0}")]
    Parse(String),
    // 未分类的错误
    #[error("Unknown error: {0}")]
    Unknown(String),
}

impl FeedError {
    /// 超时、连接中断、限流以及 5xx 属于瞬时故障；校验、鉴权、404 等立即失败。
    pub fn is_retryable(&self) -> bool {
        match self {
            FeedError::Timeout(_) | FeedError::Connection(_) | FeedError::RateLimited => true,
            FeedError::Http { status, .. } => (500..600).contains(status),
            FeedError::Auth(_)
            | FeedError::NotFound(_)
            | FeedError::Parse(_)
            | FeedError::Unknown(_) => false,
        }
    }
}
