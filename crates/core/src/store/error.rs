use thiserror::Error;

/// # Summary
/// 存储层错误枚举，处理数据库连接、读写失败等问题。
///
/// # Invariants
/// - 必须通过 `thiserror` 派生 `Error` trait。
/// - 这些错误属于致命错误，存储层自身不重试。
#[derive(Error, Debug)]
pub enum StoreError {
    /// 数据库操作失败（连接池耗尽、提交失败等）
    #[error("Database error: {0}")]
    Database(String),
    /// 初始化存储失败
    #[error("Initialization error: {0}")]
    InitError(String),
    /// 导出文件时序列化失败
    #[error("Serialization error: {0}")]
    Serialization(String),
    /// 文件系统错误
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
