use cohida_core::common::error::ValidationError;
use cohida_core::market::error::FeedError;
use cohida_core::store::error::StoreError;
use thiserror::Error;

/// 命令行入口的顶层错误。
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),
    #[error("Logging setup failed: {0}")]
    Logging(String),
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Feed(#[from] FeedError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("Invalid date '{0}', expected YYYY-MM-DD or RFC 3339")]
    InvalidDate(String),
    #[error("Retrieval failed: {0}")]
    Retrieval(String),
    #[error("Health check failed: {0}")]
    HealthCheck(String),
}
