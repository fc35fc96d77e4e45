#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use cohida_core::common::Granularity;
use cohida_core::config::{RetrieverConfig, RetryConfig};
use cohida_core::market::entity::{ProductInfo, ProductStatus, RawCandle};
use cohida_core::market::error::FeedError;
use cohida_core::market::port::CandleSource;
use serde_json::json;
use std::collections::HashMap;
use std::sync::Mutex;

pub fn now0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
}

/// 不等待的检索配置。
pub fn fast_config() -> RetrieverConfig {
    RetrieverConfig {
        chunk_delay_ms: 0,
        retry: RetryConfig {
            max_attempts: 3,
            base_delay_ms: 0,
            max_delay_ms: 0,
        },
        ..RetrieverConfig::default()
    }
}

/// # Summary
/// 模拟交易所：按粒度生成对齐的 K 线，倒序返回且包含 `end` 端点。
pub struct StubSource {
    pub tradeable: bool,
    // 早于该时间没有数据
    pub earliest: Option<DateTime<Utc>>,
    // 第 n 个（从 1 开始）不同的块，n 为该值的倍数时失败
    pub fail_every: Option<usize>,
    pub error: FeedError,
    // 固定返回的原始记录，设置后忽略生成逻辑
    pub fixed: Option<Vec<RawCandle>>,
    pub(crate) seen_starts: Mutex<Vec<DateTime<Utc>>>,
    pub(crate) calls: Mutex<HashMap<DateTime<Utc>, usize>>,
}

impl Default for StubSource {
    fn default() -> Self {
        Self {
            tradeable: true,
            earliest: None,
            fail_every: None,
            error: FeedError::Timeout("stub timeout".into()),
            fixed: None,
            seen_starts: Mutex::new(Vec::new()),
            calls: Mutex::new(HashMap::new()),
        }
    }
}

impl StubSource {
    pub fn total_calls(&self) -> usize {
        self.calls.lock().unwrap().values().sum()
    }

    pub fn max_calls_per_chunk(&self) -> usize {
        self.calls.lock().unwrap().values().copied().max().unwrap_or(0)
    }

    fn chunk_index(&self, start: DateTime<Utc>) -> usize {
        let mut seen = self.seen_starts.lock().unwrap();
        match seen.iter().position(|s| *s == start) {
            Some(i) => i + 1,
            None => {
                seen.push(start);
                seen.len()
            }
        }
    }
}

#[async_trait]
impl CandleSource for StubSource {
    async fn fetch_candles(
        &self,
        _symbol: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        granularity: Granularity,
    ) -> Result<Vec<RawCandle>, FeedError> {
        *self.calls.lock().unwrap().entry(start).or_insert(0) += 1;
        let index = self.chunk_index(start);

        if let Some(n) = self.fail_every
            && index % n == 0
        {
            return Err(self.error.clone());
        }
        if let Some(fixed) = &self.fixed {
            return Ok(fixed.clone());
        }

        let g = i64::from(granularity.seconds());
        let mut from = start.timestamp();
        if let Some(earliest) = self.earliest {
            from = from.max(earliest.timestamp());
        }
        let first = (from + g - 1).div_euclid(g) * g;

        let mut records = Vec::new();
        let mut ts = first;
        while ts <= end.timestamp() {
            records.push(serde_json::from_value(json!([ts, 19500, 21000, 20000, 20500, 1000.5])).unwrap());
            ts += g;
        }
        records.reverse();
        Ok(records)
    }

    async fn product(&self, symbol: &str) -> Result<Option<ProductInfo>, FeedError> {
        let (base, quote) = symbol.split_once('-').unwrap_or((symbol, ""));
        Ok(Some(ProductInfo {
            id: symbol.to_string(),
            base_currency: base.to_string(),
            quote_currency: quote.to_string(),
            display_name: symbol.replace('-', "/"),
            status: if self.tradeable {
                ProductStatus::Online
            } else {
                ProductStatus::Delisted
            },
            base_min_size: None,
            base_max_size: None,
        }))
    }

    async fn products(&self) -> Result<Vec<ProductInfo>, FeedError> {
        Ok(self.product("BTC-USD").await?.into_iter().collect())
    }
}
