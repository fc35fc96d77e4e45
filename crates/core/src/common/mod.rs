use serde::{Deserialize, Serialize};
use std::str::FromStr;

pub mod error;
pub mod symbol;
pub mod time;

use error::ValidationError;

/// # Summary
/// K 线时间粒度枚举，取值即交易所接口接受的秒数。
///
/// # Invariants
/// - 只允许交易所支持的六种粒度，其余秒数在构造时即被拒绝。
/// - `Display` 输出的标签同时用作存储表名后缀，不同粒度的数据因此物理隔离。
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(try_from = "u32", into = "u32")]
pub enum Granularity {
    // 1 分钟
    OneMinute,
    // 5 分钟
    FiveMinutes,
    // 15 分钟
    FifteenMinutes,
    // 1 小时
    OneHour,
    // 6 小时
    SixHours,
    // 1 日
    OneDay,
}

impl Granularity {
    /// 全部受支持的粒度，按从细到粗排列。
    pub const ALL: [Granularity; 6] = [
        Granularity::OneMinute,
        Granularity::FiveMinutes,
        Granularity::FifteenMinutes,
        Granularity::OneHour,
        Granularity::SixHours,
        Granularity::OneDay,
    ];

    /// 单根 K 线覆盖的秒数。
    pub fn seconds(self) -> u32 {
        match self {
            Granularity::OneMinute => 60,
            Granularity::FiveMinutes => 300,
            Granularity::FifteenMinutes => 900,
            Granularity::OneHour => 3600,
            Granularity::SixHours => 21600,
            Granularity::OneDay => 86400,
        }
    }

    /// 单根 K 线覆盖的时长。
    pub fn duration(self) -> chrono::Duration {
        chrono::Duration::seconds(i64::from(self.seconds()))
    }

    /// 简写标签，例如 `1h`。
    pub fn tag(self) -> &'static str {
        match self {
            Granularity::OneMinute => "1m",
            Granularity::FiveMinutes => "5m",
            Granularity::FifteenMinutes => "15m",
            Granularity::OneHour => "1h",
            Granularity::SixHours => "6h",
            Granularity::OneDay => "1d",
        }
    }
}

impl TryFrom<u32> for Granularity {
    type Error = ValidationError;

    fn try_from(seconds: u32) -> Result<Self, Self::Error> {
        Granularity::ALL
            .into_iter()
            .find(|g| g.seconds() == seconds)
            .ok_or(ValidationError::UnsupportedGranularity(seconds))
    }
}

impl From<Granularity> for u32 {
    fn from(g: Granularity) -> Self {
        g.seconds()
    }
}

impl FromStr for Granularity {
    type Err = ValidationError;

    /// 同时接受秒数（`3600`）与标签（`1h`）。
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim().to_lowercase();
        if let Ok(seconds) = s.parse::<u32>() {
            return Granularity::try_from(seconds);
        }
        Granularity::ALL
            .into_iter()
            .find(|g| g.tag() == s)
            .ok_or(ValidationError::UnknownGranularity(s))
    }
}

impl std::fmt::Display for Granularity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.tag())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_granularity_accepts_only_exchange_values() {
        for g in Granularity::ALL {
            assert_eq!(Granularity::try_from(g.seconds()).unwrap(), g);
        }
        assert!(matches!(
            Granularity::try_from(120),
            Err(ValidationError::UnsupportedGranularity(120))
        ));
    }

    #[test]
    fn test_granularity_parses_seconds_and_tags() {
        assert_eq!("3600".parse::<Granularity>().unwrap(), Granularity::OneHour);
        assert_eq!("15M".parse::<Granularity>().unwrap(), Granularity::FifteenMinutes);
        assert_eq!(Granularity::SixHours.to_string(), "6h");
        assert!("2h".parse::<Granularity>().is_err());
    }
}
