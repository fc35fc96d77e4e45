use crate::market::entity::DEFAULT_MAX_CANDLES_PER_REQUEST;
use serde::{Deserialize, Serialize};

/// 全局应用配置
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub feed: FeedConfig,
    pub retriever: RetrieverConfig,
    pub log: LogConfig,
    pub output: OutputConfig,
}

/// # Summary
/// SQLite 存储配置。
///
/// # Invariants
/// - `table` 只能包含字母、数字与下划线，实际表名为 `{table}_{粒度标签}`。
/// - `min_connections <= max_connections`。
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub data_dir: String,
    pub file_name: String,
    pub table: String,
    pub min_connections: u32,
    pub max_connections: u32,
    pub busy_timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FeedConfig {
    pub base_url: String,
    pub timeout_secs: u64,
    pub user_agent: String,
}

/// # Summary
/// 分块检索参数。
///
/// # Invariants
/// - `max_candles_per_request` 是交易所接口版本的属性，默认比 300 的硬上限少一根。
/// - `chunk_delay_ms` 为固定的块间等待，不随限流头自适应。
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrieverConfig {
    pub max_candles_per_request: u32,
    pub chunk_delay_ms: u64,
    pub retry: RetryConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    // tracing EnvFilter 语法，RUST_LOG 优先
    pub level: String,
    // "json" 或 "pretty"
    pub format: String,
    // 设置后额外按天滚动写入该目录
    pub dir: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    pub dir: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            data_dir: "data".to_string(),
            file_name: "candles.db".to_string(),
            table: "crypto_data".to_string(),
            min_connections: 1,
            max_connections: 10,
            busy_timeout_secs: 10,
        }
    }
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.exchange.coinbase.com".to_string(),
            timeout_secs: 10,
            user_agent: concat!("cohida/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

impl Default for RetrieverConfig {
    fn default() -> Self {
        Self {
            max_candles_per_request: DEFAULT_MAX_CANDLES_PER_REQUEST,
            chunk_delay_ms: 100,
            retry: RetryConfig::default(),
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 2_000,
            max_delay_ms: 10_000,
        }
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
            dir: None,
        }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            dir: "outputs".to_string(),
        }
    }
}
