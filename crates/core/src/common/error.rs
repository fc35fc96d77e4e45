use thiserror::Error;

/// # Summary
/// 值对象构造阶段的校验错误。
///
/// # Invariants
/// - 只在构造时同步抛出，调用方无法绕过它构造出违反接口契约的请求。
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// 交易对代码为空
    #[error("Symbol cannot be empty")]
    EmptySymbol,
    /// 交易对格式不合法
    #[error("Invalid symbol format: {0}")]
    InvalidSymbol(String),
    /// 价格必须为正
    #[error("All prices must be positive: {field} = {value}")]
    NonPositivePrice { field: &'static str, value: String },
    /// 成交量不能为负
    #[error("Volume cannot be negative: {0}")]
    NegativeVolume(String),
    /// 时间区间为空或倒置
    #[error("Start date must be before end date: {start} >= {end}")]
    InvalidRange { start: String, end: String },
    /// 单次请求覆盖的时长超出接口条数上限
    #[error(
        "Date range too large for granularity {granularity}s: {duration}s exceeds max duration {max_duration}s"
    )]
    RangeTooLarge {
        granularity: u32,
        duration: i64,
        max_duration: i64,
    },
    /// 不受支持的粒度秒数
    #[error("Granularity must be one of 60, 300, 900, 3600, 21600, 86400; got {0}")]
    UnsupportedGranularity(u32),
    /// 无法识别的粒度标签
    #[error("Unknown granularity: {0}")]
    UnknownGranularity(String),
}
