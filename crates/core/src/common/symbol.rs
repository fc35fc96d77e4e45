//! 交易对代码（如 `BTC-USD`）的格式校验与规范化。
//!
//! 规范化与校验相互独立：调用方可以先规范化再决定是否校验。

use super::error::ValidationError;
use tracing::warn;

/// # Summary
/// 判断交易对代码是否为 `BASE-QUOTE` 形态。
///
/// # Logic
/// 1. 必须恰好包含一个 `-`，两侧均非空。
/// 2. BASE 长度在 [2, 10]，QUOTE 长度恰为 3。
/// 3. 两侧均只含字母或数字。
///
/// # Arguments
/// * `symbol`: 待校验的交易对代码（不做大小写处理）。
///
/// # Returns
/// 合法返回 true。
pub fn is_valid(symbol: &str) -> bool {
    let Some((base, quote)) = symbol.split_once('-') else {
        return false;
    };
    if quote.contains('-') {
        return false;
    }

    let base_len = base.chars().count();
    let quote_len = quote.chars().count();
    if !(2..=10).contains(&base_len) || quote_len != 3 {
        return false;
    }

    base.chars().all(char::is_alphanumeric) && quote.chars().all(char::is_alphanumeric)
}

/// # Summary
/// 将交易对代码转为大写并去除首尾空白。
///
/// # Logic
/// 1. 原始输入为空时返回 `EmptySymbol`。
/// 2. 规范化后形态不合法只记录告警，不返回错误。
///
/// # Arguments
/// * `symbol`: 原始输入。
///
/// # Returns
/// 规范化后的代码。
pub fn normalize(symbol: &str) -> Result<String, ValidationError> {
    if symbol.is_empty() {
        return Err(ValidationError::EmptySymbol);
    }

    let normalized = symbol.trim().to_uppercase();
    if !is_valid(&normalized) {
        warn!("Symbol '{}' may not be supported", symbol);
    }

    Ok(normalized)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_symbols() {
        assert!(is_valid("BTC-USD"));
        assert!(is_valid("ETH-EUR"));
        assert!(is_valid("SHIB1INU-USD"));
        assert!(is_valid("btc-usd"));
    }

    #[test]
    fn test_invalid_symbols() {
        assert!(!is_valid(""));
        assert!(!is_valid("BTCUSD"));
        assert!(!is_valid("BTC-USD-EUR"));
        assert!(!is_valid("-USD"));
        assert!(!is_valid("BTC-"));
        assert!(!is_valid("B-USD"));
        assert!(!is_valid("VERYLONGBASE-USD"));
        assert!(!is_valid("BTC-USDT"));
        assert!(!is_valid("BT$-USD"));
        assert!(!is_valid("INVALID-SYMBOL"));
    }

    #[test]
    fn test_normalize() {
        assert_eq!(normalize("  btc-usd ").unwrap(), "BTC-USD");
        // 形态不合法也照样返回，仅记录告警
        assert_eq!(normalize("foo").unwrap(), "FOO");
        assert_eq!(normalize(""), Err(ValidationError::EmptySymbol));
    }
}
