use crate::historical::{AUTO_DETECT_MAX_YEARS, HistoricalRetriever};
use chrono::{DateTime, Utc};
use cohida_core::common::Granularity;
use cohida_core::market::entity::RetrievalResult;
use cohida_core::store::error::StoreError;
use cohida_core::store::port::CandleStore;
use std::sync::Arc;
use tracing::{info, warn};

/// 一次同步（回补或增量）的汇总。
#[derive(Debug, Clone)]
pub struct SyncReport {
    pub granularity: Granularity,
    pub start: Option<DateTime<Utc>>,
    pub end: DateTime<Utc>,
    pub result: RetrievalResult,
    pub written: usize,
}

impl SyncReport {
    pub fn fetched(&self) -> usize {
        self.result.count()
    }
}

/// # Summary
/// 把检索结果写入存储的编排服务。
///
/// # Invariants
/// - 写入依赖存储的 upsert 幂等性，重复运行只会补齐缺口、覆盖已有行。
/// - 检索失败不写入；存储错误直接向上传播。
pub struct CandleSync {
    retriever: Arc<HistoricalRetriever>,
    store: Arc<dyn CandleStore>,
}

impl CandleSync {
    pub fn new(retriever: Arc<HistoricalRetriever>, store: Arc<dyn CandleStore>) -> Self {
        Self { retriever, store }
    }

    /// # Summary
    /// 完整回补并落库。
    ///
    /// # Logic
    /// 1. 指定 `max_years` 时回补最近若干年。
    /// 2. 未指定时先做前置检查，再探测最早可用数据，从该时间回补到当前。
    /// 3. 成功且有数据时批量写入。
    pub async fn backfill(
        &self,
        symbol: &str,
        granularity: Granularity,
        max_years: Option<u32>,
    ) -> Result<SyncReport, StoreError> {
        let (start, result) = match max_years {
            Some(years) => (
                None,
                self.retriever.retrieve_all(symbol, granularity, years).await,
            ),
            None => {
                if let Err(reason) = self.retriever.check_symbol(symbol).await {
                    warn!("Skipping backfill of {}: {}", symbol, reason);
                    let result = RetrievalResult::failed(symbol, reason, self.retriever.now());
                    return Ok(self.report(granularity, None, result, 0));
                }
                let start = self
                    .retriever
                    .find_earliest_available(symbol, granularity, AUTO_DETECT_MAX_YEARS)
                    .await;
                info!("Auto-detected earliest data for {}: {}", symbol, start);
                let end = self.retriever.now();
                (
                    Some(start),
                    self.retriever
                        .retrieve_range(symbol, granularity, start, end)
                        .await,
                )
            }
        };

        self.persist(granularity, start, result).await
    }

    /// # Summary
    /// 从库中最新时间戳继续增量同步。
    ///
    /// # Logic
    /// 1. 表中无该交易对数据时，退化为回补最近 `fallback_years` 年。
    /// 2. 否则从最新时间戳（含）同步到当前，最后一根可能未收盘的 K 线会被覆盖刷新。
    pub async fn top_up(
        &self,
        symbol: &str,
        granularity: Granularity,
        fallback_years: u32,
    ) -> Result<SyncReport, StoreError> {
        let Some(latest) = self.store.latest_timestamp(symbol, granularity).await? else {
            info!(
                "No stored {} data for {}, falling back to a {} year backfill",
                granularity, symbol, fallback_years
            );
            return self.backfill(symbol, granularity, Some(fallback_years)).await;
        };

        let now = self.retriever.now();
        if latest >= now {
            info!("{} {} data is already up to date", symbol, granularity);
            let result = RetrievalResult::succeeded(symbol, Vec::new(), now);
            return Ok(self.report(granularity, Some(latest), result, 0));
        }

        info!("Topping up {} {} data from {}", symbol, granularity, latest);
        let result = self
            .retriever
            .retrieve_range(symbol, granularity, latest, now)
            .await;
        self.persist(granularity, Some(latest), result).await
    }

    async fn persist(
        &self,
        granularity: Granularity,
        start: Option<DateTime<Utc>>,
        result: RetrievalResult,
    ) -> Result<SyncReport, StoreError> {
        let written = if result.success && !result.is_empty() {
            self.store.write(granularity, &result.points).await?
        } else {
            0
        };
        Ok(self.report(granularity, start, result, written))
    }

    fn report(
        &self,
        granularity: Granularity,
        start: Option<DateTime<Utc>>,
        result: RetrievalResult,
        written: usize,
    ) -> SyncReport {
        SyncReport {
            granularity,
            start,
            end: result.retrieved_at,
            result,
            written,
        }
    }
}
