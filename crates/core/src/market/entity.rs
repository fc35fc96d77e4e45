use crate::common::Granularity;
use crate::common::error::ValidationError;
use chrono::{DateTime, SubsecRound, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

/// 交易所单次请求的 K 线条数上限（300）下方保留一根的安全余量。
pub const DEFAULT_MAX_CANDLES_PER_REQUEST: u32 = 299;

/// # Summary
/// 单根 OHLCV K 线观测值。
///
/// # Invariants
/// - `symbol` 非空。
/// - 四个价格严格为正，`volume` 非负。
/// - `timestamp` 精确到秒。
/// - 构造后不可变；`high`/`low` 与开收盘价的关系只做告警，不拒绝。
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CandlePoint {
    symbol: String,
    timestamp: DateTime<Utc>,
    #[serde(rename = "open_price")]
    open: Decimal,
    #[serde(rename = "high_price")]
    high: Decimal,
    #[serde(rename = "low_price")]
    low: Decimal,
    #[serde(rename = "close_price")]
    close: Decimal,
    volume: Decimal,
}

impl CandlePoint {
    /// # Summary
    /// 构造并校验一根 K 线。
    ///
    /// # Logic
    /// 1. 拒绝空 symbol、非正价格、负成交量。
    /// 2. `high < max(open, close)` 或 `low > min(open, close)` 时仅记录告警
    ///    （交易所边界数据偶尔如此）。
    /// 3. 时间戳截断到整秒。
    ///
    /// # Returns
    /// 成功返回 K 线，失败返回描述性的 `ValidationError`。
    pub fn new(
        symbol: impl Into<String>,
        timestamp: DateTime<Utc>,
        open: Decimal,
        high: Decimal,
        low: Decimal,
        close: Decimal,
        volume: Decimal,
    ) -> Result<Self, ValidationError> {
        let symbol = symbol.into();
        if symbol.is_empty() {
            return Err(ValidationError::EmptySymbol);
        }

        for (field, value) in [("open", open), ("high", high), ("low", low), ("close", close)] {
            if value <= Decimal::ZERO {
                return Err(ValidationError::NonPositivePrice {
                    field,
                    value: value.to_string(),
                });
            }
        }

        if volume < Decimal::ZERO {
            return Err(ValidationError::NegativeVolume(volume.to_string()));
        }

        if high < open.max(close) {
            warn!(
                "High price {} is lower than open/close prices for {} at {}",
                high, symbol, timestamp
            );
        }
        if low > open.min(close) {
            warn!(
                "Low price {} is higher than open/close prices for {} at {}",
                low, symbol, timestamp
            );
        }

        Ok(Self {
            symbol,
            timestamp: timestamp.trunc_subsecs(0),
            open,
            high,
            low,
            close,
            volume,
        })
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    pub fn open(&self) -> Decimal {
        self.open
    }

    pub fn high(&self) -> Decimal {
        self.high
    }

    pub fn low(&self) -> Decimal {
        self.low
    }

    pub fn close(&self) -> Decimal {
        self.close
    }

    pub fn volume(&self) -> Decimal {
        self.volume
    }
}

/// # Summary
/// 单次有界查询：一个交易对在 `[start, end)` 区间、指定粒度下的 K 线。
///
/// # Invariants
/// - `symbol` 非空且 `start < end`（始终校验）。
/// - 未设置 `skip_validation` 时，`end - start <= granularity * max_candles`。
/// - 构造后不可变。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetrievalRequest {
    symbol: String,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    granularity: Granularity,
    skip_validation: bool,
}

impl RetrievalRequest {
    /// 使用默认的 299 根上限构造并校验请求。
    pub fn new(
        symbol: impl Into<String>,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        granularity: Granularity,
    ) -> Result<Self, ValidationError> {
        Self::with_candle_limit(
            symbol,
            start,
            end,
            granularity,
            DEFAULT_MAX_CANDLES_PER_REQUEST,
        )
    }

    /// # Summary
    /// 使用自定义的单请求条数上限构造请求。
    ///
    /// # Logic
    /// 1. 校验 symbol 与区间方向。
    /// 2. 区间时长不得超过 `granularity * max_candles` 秒。
    pub fn with_candle_limit(
        symbol: impl Into<String>,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        granularity: Granularity,
        max_candles: u32,
    ) -> Result<Self, ValidationError> {
        let request = Self::build(symbol.into(), start, end, granularity, false)?;

        let max_duration = i64::from(granularity.seconds()) * i64::from(max_candles);
        let duration = (end - start).num_seconds();
        if duration > max_duration {
            return Err(ValidationError::RangeTooLarge {
                granularity: granularity.seconds(),
                duration,
                max_duration,
            });
        }

        Ok(request)
    }

    /// 跳过时长上限校验的请求，用于最早数据探测等允许交易所自行截断的场景。
    pub fn unchecked(
        symbol: impl Into<String>,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        granularity: Granularity,
    ) -> Result<Self, ValidationError> {
        Self::build(symbol.into(), start, end, granularity, true)
    }

    fn build(
        symbol: String,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        granularity: Granularity,
        skip_validation: bool,
    ) -> Result<Self, ValidationError> {
        if symbol.is_empty() {
            return Err(ValidationError::EmptySymbol);
        }
        if start >= end {
            return Err(ValidationError::InvalidRange {
                start: start.to_rfc3339(),
                end: end.to_rfc3339(),
            });
        }
        Ok(Self {
            symbol,
            start,
            end,
            granularity,
            skip_validation,
        })
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    pub fn start(&self) -> DateTime<Utc> {
        self.start
    }

    pub fn end(&self) -> DateTime<Utc> {
        self.end
    }

    pub fn granularity(&self) -> Granularity {
        self.granularity
    }

    pub fn skip_validation(&self) -> bool {
        self.skip_validation
    }
}

/// # Summary
/// 一次检索（单区间或完整分块回补）的结果，是向调用方报告错误的基本单位。
///
/// # Invariants
/// - `success == false` 时 `error` 必有值且 `points` 为空。
/// - 零条数据的成功结果与接口失败是两种不同状态。
#[derive(Debug, Clone, Serialize)]
pub struct RetrievalResult {
    pub symbol: String,
    pub success: bool,
    pub points: Vec<CandlePoint>,
    pub error: Option<String>,
    pub retrieved_at: DateTime<Utc>,
}

impl RetrievalResult {
    pub fn succeeded(
        symbol: impl Into<String>,
        points: Vec<CandlePoint>,
        retrieved_at: DateTime<Utc>,
    ) -> Self {
        Self {
            symbol: symbol.into(),
            success: true,
            points,
            error: None,
            retrieved_at,
        }
    }

    pub fn failed(
        symbol: impl Into<String>,
        error: impl Into<String>,
        retrieved_at: DateTime<Utc>,
    ) -> Self {
        Self {
            symbol: symbol.into(),
            success: false,
            points: Vec::new(),
            error: Some(error.into()),
            retrieved_at,
        }
    }

    /// 获取到的数据条数
    pub fn count(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}

/// # Summary
/// 交易所返回的原始 K 线记录。
///
/// # Invariants
/// - `Positional` 顺序固定为 `[timestamp, low, high, open, close, volume]`。
/// - `Keyed` 的字段既可能是 JSON 字符串也可能是数字；缺失字段留到转换阶段逐条报错。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RawCandle {
    Positional(Vec<Value>),
    Keyed(KeyedCandle),
}

/// 键值形态的原始 K 线。
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct KeyedCandle {
    #[serde(default)]
    pub start: Option<Value>,
    #[serde(default)]
    pub low: Option<Value>,
    #[serde(default)]
    pub high: Option<Value>,
    #[serde(default)]
    pub open: Option<Value>,
    #[serde(default)]
    pub close: Option<Value>,
    #[serde(default)]
    pub volume: Option<Value>,
}

/// # Summary
/// 交易对上线状态。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProductStatus {
    Online,
    Offline,
    Delisted,
    Other(String),
}

impl From<&str> for ProductStatus {
    fn from(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "online" => ProductStatus::Online,
            "offline" => ProductStatus::Offline,
            "delisted" => ProductStatus::Delisted,
            other => ProductStatus::Other(other.to_string()),
        }
    }
}

impl std::fmt::Display for ProductStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProductStatus::Online => write!(f, "online"),
            ProductStatus::Offline => write!(f, "offline"),
            ProductStatus::Delisted => write!(f, "delisted"),
            ProductStatus::Other(s) => write!(f, "{}", s),
        }
    }
}

/// # Summary
/// 交易对元数据。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProductInfo {
    // 交易对代码，例如 BTC-USD
    pub id: String,
    pub base_currency: String,
    pub quote_currency: String,
    pub display_name: String,
    pub status: ProductStatus,
    // 最小/最大下单量，部分接口版本不返回
    pub base_min_size: Option<String>,
    pub base_max_size: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rust_decimal_macros::dec;

    fn ts() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2023, 1, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_candle_point_rejects_non_positive_price() {
        let err = CandlePoint::new("BTC-USD", ts(), dec!(0), dec!(1), dec!(1), dec!(1), dec!(1))
            .unwrap_err();
        assert!(matches!(err, ValidationError::NonPositivePrice { field: "open", .. }));
        assert!(err.to_string().contains("positive"));

        let err = CandlePoint::new("BTC-USD", ts(), dec!(1), dec!(1), dec!(-2), dec!(1), dec!(1))
            .unwrap_err();
        assert!(matches!(err, ValidationError::NonPositivePrice { field: "low", .. }));
    }

    #[test]
    fn test_candle_point_rejects_negative_volume_and_empty_symbol() {
        let err = CandlePoint::new("BTC-USD", ts(), dec!(1), dec!(1), dec!(1), dec!(1), dec!(-0.1))
            .unwrap_err();
        assert_eq!(err, ValidationError::NegativeVolume("-0.1".to_string()));

        let err =
            CandlePoint::new("", ts(), dec!(1), dec!(1), dec!(1), dec!(1), dec!(1)).unwrap_err();
        assert_eq!(err, ValidationError::EmptySymbol);
    }

    #[test]
    fn test_candle_point_high_low_inconsistency_only_warns() {
        // high 低于 open，low 高于 close：依旧构造成功
        let point = CandlePoint::new(
            "BTC-USD",
            ts(),
            dec!(20000),
            dec!(19000),
            dec!(20600),
            dec!(20500),
            dec!(0),
        )
        .unwrap();
        assert_eq!(point.high(), dec!(19000));
        assert_eq!(point.volume(), Decimal::ZERO);
    }

    #[test]
    fn test_candle_point_truncates_subseconds() {
        let t = ts() + chrono::Duration::milliseconds(750);
        let point =
            CandlePoint::new("BTC-USD", t, dec!(1), dec!(1), dec!(1), dec!(1), dec!(1)).unwrap();
        assert_eq!(point.timestamp(), ts());
    }

    #[test]
    fn test_request_enforces_chunk_limit() {
        let start = ts();
        let ok_end = start + chrono::Duration::seconds(3600 * 299);
        assert!(RetrievalRequest::new("BTC-USD", start, ok_end, Granularity::OneHour).is_ok());

        let too_far = ok_end + chrono::Duration::seconds(1);
        let err = RetrievalRequest::new("BTC-USD", start, too_far, Granularity::OneHour).unwrap_err();
        assert!(matches!(err, ValidationError::RangeTooLarge { .. }));

        let req = RetrievalRequest::unchecked("BTC-USD", start, too_far, Granularity::OneHour).unwrap();
        assert!(req.skip_validation());
    }

    #[test]
    fn test_request_rejects_inverted_range() {
        let err = RetrievalRequest::new("BTC-USD", ts(), ts(), Granularity::OneHour).unwrap_err();
        assert!(matches!(err, ValidationError::InvalidRange { .. }));
        let err = RetrievalRequest::unchecked("", ts(), ts(), Granularity::OneHour).unwrap_err();
        assert_eq!(err, ValidationError::EmptySymbol);
    }

    #[test]
    fn test_request_custom_limit() {
        let start = ts();
        let end = start + chrono::Duration::seconds(60 * 100);
        assert!(
            RetrievalRequest::with_candle_limit("BTC-USD", start, end, Granularity::OneMinute, 99)
                .is_err()
        );
        assert!(
            RetrievalRequest::with_candle_limit("BTC-USD", start, end, Granularity::OneMinute, 100)
                .is_ok()
        );
    }

    #[test]
    fn test_raw_candle_deserializes_both_shapes() {
        let positional: RawCandle =
            serde_json::from_str("[1672531200, 19500, 21000, 20000, 20500, 1000.5]").unwrap();
        assert!(matches!(positional, RawCandle::Positional(ref v) if v.len() == 6));

        let keyed: RawCandle = serde_json::from_str(
            r#"{"start":"1672531200","low":"19500","high":"21000","open":"20000","close":"20500","volume":"1000.5"}"#,
        )
        .unwrap();
        match keyed {
            RawCandle::Keyed(k) => assert_eq!(k.open, Some(Value::String("20000".into()))),
            RawCandle::Positional(_) => panic!("expected keyed candle"),
        }
    }

    #[test]
    fn test_result_helpers() {
        let ok = RetrievalResult::succeeded("BTC-USD", Vec::new(), ts());
        assert!(ok.success && ok.is_empty() && ok.count() == 0);
        let failed = RetrievalResult::failed("BTC-USD", "boom", ts());
        assert!(!failed.success);
        assert_eq!(failed.error.as_deref(), Some("boom"));
    }
}
