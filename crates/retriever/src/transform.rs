use chrono::{DateTime, Utc};
use cohida_core::common::error::ValidationError;
use cohida_core::market::entity::{CandlePoint, KeyedCandle, RawCandle};
use rust_decimal::Decimal;
use serde_json::Value;
use std::str::FromStr;
use thiserror::Error;
use tracing::{debug, warn};

/// 单条原始记录的转换错误，只用于日志，不向上传播。
#[derive(Error, Debug, PartialEq)]
pub enum RecordError {
    #[error("positional record has {0} fields, expected 6")]
    WrongArity(usize),
    #[error("missing field '{0}'")]
    Missing(&'static str),
    #[error("field '{field}' is not a number: {value}")]
    BadNumber { field: &'static str, value: String },
    #[error("field 'timestamp' is not a valid epoch: {0}")]
    BadTimestamp(String),
    #[error(transparent)]
    Invalid(#[from] ValidationError),
}

/// # Summary
/// 把一批原始记录转为 K 线，逐条跳过无法转换的记录。
///
/// # Logic
/// 1. 按 `RawCandle` 形态分派到位置数组或键值解析。
/// 2. 单条失败记录告警后跳过，不影响同批其余记录。
///
/// # Returns
/// 保持输入顺序的 K 线列表。
pub fn transform(symbol: &str, records: &[RawCandle]) -> Vec<CandlePoint> {
    let points: Vec<CandlePoint> = records
        .iter()
        .filter_map(|raw| match to_point(symbol, raw) {
            Ok(point) => Some(point),
            Err(e) => {
                warn!("Failed to parse candle data for {}: {}", symbol, e);
                None
            }
        })
        .collect();

    debug!(
        "Transformed {} of {} raw records for {}",
        points.len(),
        records.len(),
        symbol
    );
    points
}

/// 转换单条原始记录。
pub fn to_point(symbol: &str, raw: &RawCandle) -> Result<CandlePoint, RecordError> {
    match raw {
        RawCandle::Positional(fields) => from_positional(symbol, fields),
        RawCandle::Keyed(keyed) => from_keyed(symbol, keyed),
    }
}

// [timestamp, low, high, open, close, volume]
fn from_positional(symbol: &str, fields: &[Value]) -> Result<CandlePoint, RecordError> {
    let [ts, low, high, open, close, volume] = fields else {
        return Err(RecordError::WrongArity(fields.len()));
    };

    Ok(CandlePoint::new(
        symbol,
        timestamp(ts)?,
        decimal("open", open)?,
        decimal("high", high)?,
        decimal("low", low)?,
        decimal("close", close)?,
        decimal("volume", volume)?,
    )?)
}

fn from_keyed(symbol: &str, keyed: &KeyedCandle) -> Result<CandlePoint, RecordError> {
    fn field<'a>(
        value: &'a Option<Value>,
        name: &'static str,
    ) -> Result<&'a Value, RecordError> {
        value.as_ref().ok_or(RecordError::Missing(name))
    }

    Ok(CandlePoint::new(
        symbol,
        timestamp(field(&keyed.start, "start")?)?,
        decimal("open", field(&keyed.open, "open")?)?,
        decimal("high", field(&keyed.high, "high")?)?,
        decimal("low", field(&keyed.low, "low")?)?,
        decimal("close", field(&keyed.close, "close")?)?,
        decimal("volume", field(&keyed.volume, "volume")?)?,
    )?)
}

/// 数值既可能是 JSON 数字也可能是字符串。
///
/// serde_json 开启 `arbitrary_precision`，`Number` 保留响应中的原始文本，
/// 这里直接按该文本解析，不经过浮点。
fn decimal(field: &'static str, value: &Value) -> Result<Decimal, RecordError> {
    let text = match value {
        Value::String(s) => s.trim().to_string(),
        Value::Number(n) => n.to_string(),
        other => {
            return Err(RecordError::BadNumber {
                field,
                value: other.to_string(),
            });
        }
    };

    Decimal::from_str(&text)
        .or_else(|_| Decimal::from_scientific(&text))
        .map_err(|_| RecordError::BadNumber { field, value: text })
}

/// Unix 秒数（数字或数字字符串），键值形态下也接受 RFC 3339 字符串。
fn timestamp(value: &Value) -> Result<DateTime<Utc>, RecordError> {
    let secs = match value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => {
            let s = s.trim();
            match s.parse::<i64>() {
                Ok(secs) => Some(secs),
                Err(_) => {
                    return DateTime::parse_from_rfc3339(s)
                        .map(|t| t.with_timezone(&Utc))
                        .map_err(|_| RecordError::BadTimestamp(s.to_string()));
                }
            }
        }
        _ => None,
    };

    secs.and_then(|s| DateTime::from_timestamp(s, 0))
        .ok_or_else(|| RecordError::BadTimestamp(value.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rust_decimal_macros::dec;
    use serde_json::json;

    fn positional(v: Value) -> RawCandle {
        serde_json::from_value(v).unwrap()
    }

    #[test]
    fn test_positional_field_order() {
        let raw = positional(json!([1672531200, 19500, 21000, 20000, 20500, 1000.5]));
        let point = to_point("BTC-USD", &raw).unwrap();
        assert_eq!(
            point.timestamp(),
            Utc.with_ymd_and_hms(2023, 1, 1, 0, 0, 0).unwrap()
        );
        assert_eq!(point.low(), dec!(19500));
        assert_eq!(point.high(), dec!(21000));
        assert_eq!(point.open(), dec!(20000));
        assert_eq!(point.close(), dec!(20500));
        assert_eq!(point.volume(), dec!(1000.5));
    }

    #[test]
    fn test_keyed_string_fields() {
        let raw = positional(json!({
            "start": "1672531200", "low": "19500.01", "high": "21000",
            "open": "20000", "close": "20500", "volume": "0.00000001"
        }));
        let point = to_point("BTC-USD", &raw).unwrap();
        assert_eq!(point.low(), dec!(19500.01));
        assert_eq!(point.volume(), dec!(0.00000001));
    }

    #[test]
    fn test_keyed_missing_field() {
        let raw = positional(json!({"start": 1672531200, "low": 1, "high": 1, "open": 1, "close": 1}));
        assert_eq!(
            to_point("BTC-USD", &raw).unwrap_err(),
            RecordError::Missing("volume")
        );
    }

    #[test]
    fn test_bad_records_are_skipped_individually() {
        let records = vec![
            positional(json!([1672531200, 19500, 21000, 20000, 20500, 1000.5])),
            positional(json!([1672534800, "abc", 21500, 20500, 21000, 1200.75])),
            positional(json!([1672538400, 1, 1, 1])),
            positional(json!([1672542000, 20000, 21500, -1, 21000, 1])),
            positional(json!([1672545600, 20000, 21500, 20500, 21000, 1200.75])),
        ];
        let points = transform("BTC-USD", &records);
        assert_eq!(points.len(), 2);
        assert_eq!(points[0].open(), dec!(20000));
        assert_eq!(points[1].open(), dec!(20500));
    }

    #[test]
    fn test_json_numbers_keep_every_digit() {
        // 超过 f64 的 17 位有效数字
        let raw: RawCandle = serde_json::from_str(
            "[1672531200, 19500.123456789012345, 21000, 20000, 20500, 1000.12345678901234567]",
        )
        .unwrap();
        let point = to_point("BTC-USD", &raw).unwrap();
        assert_eq!(point.low(), dec!(19500.123456789012345));
        assert_eq!(point.volume(), dec!(1000.12345678901234567));

        let keyed: RawCandle = serde_json::from_str(
            r#"{"start": 1672531200, "low": 19500.123456789012345, "high": 21000,
                "open": 20000, "close": 20500, "volume": 0.000000000000000001}"#,
        )
        .unwrap();
        let point = to_point("BTC-USD", &keyed).unwrap();
        assert_eq!(point.low(), dec!(19500.123456789012345));
        assert_eq!(point.volume(), dec!(0.000000000000000001));
    }

    #[test]
    fn test_non_positive_price_is_rejected() {
        let raw = positional(json!([1672531200, 0, 1, 1, 1, 1]));
        assert!(matches!(
            to_point("BTC-USD", &raw),
            Err(RecordError::Invalid(ValidationError::NonPositivePrice { field: "low", .. }))
        ));
    }
}
