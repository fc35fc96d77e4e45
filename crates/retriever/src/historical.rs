use crate::chunk::ChunkPlan;
use crate::retry::{RetryPolicy, with_retry};
use crate::transform::transform;
use chrono::{DateTime, Duration, Utc};
use cohida_core::common::Granularity;
use cohida_core::common::symbol;
use cohida_core::common::time::TimeProvider;
use cohida_core::config::RetrieverConfig;
use cohida_core::market::entity::{CandlePoint, RetrievalRequest, RetrievalResult};
use cohida_core::market::error::FeedError;
use cohida_core::market::port::CandleSource;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// 自动探测最早数据时向前回溯的最大年数。
pub const AUTO_DETECT_MAX_YEARS: u32 = 10;

/// 探测窗口的最大宽度。
const PROBE_WINDOW_DAYS: i64 = 7;

/// `now` 之前 `years` 年（每年 365 天）；超出 chrono 可表示范围时为 `None`。
fn years_before(now: DateTime<Utc>, years: u32) -> Option<DateTime<Utc>> {
    Duration::try_days(365 * i64::from(years)).and_then(|span| now.checked_sub_signed(span))
}

/// # Summary
/// 分块历史 K 线检索器。
///
/// # Invariants
/// - 串行执行：同一时刻至多一个在途请求，块间固定等待 `chunk_delay_ms`。
/// - 重试只发生在单次接口调用粒度；块级失败记录后跳过，不重试。
/// - 返回的 K 线严格按时间升序且无重复。
pub struct HistoricalRetriever {
    source: Arc<dyn CandleSource>,
    clock: Arc<dyn TimeProvider>,
    config: RetrieverConfig,
    retry: RetryPolicy,
}

impl HistoricalRetriever {
    pub fn new(
        source: Arc<dyn CandleSource>,
        clock: Arc<dyn TimeProvider>,
        config: RetrieverConfig,
    ) -> Self {
        let retry = RetryPolicy::from(&config.retry);
        Self {
            source,
            clock,
            config,
            retry,
        }
    }

    /// 检索器使用的当前时间。
    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// # Summary
    /// 检索单个区间。
    ///
    /// # Logic
    /// 1. 校验 symbol 形态并确认交易对在线。
    /// 2. 带重试地抓取 `[start, end)`，转换后按时间升序返回。
    /// 3. 重试用尽或不可重试的错误转为失败结果，错误信息写入 `error`。
    ///
    /// # Arguments
    /// * `request` - 已通过构造期校验的检索请求。
    ///
    /// # Returns
    /// 检索结果；零条数据的成功结果与失败结果相互区分。
    pub async fn retrieve(&self, request: &RetrievalRequest) -> RetrievalResult {
        let symbol = request.symbol();
        info!(
            "Retrieving data for {} from {} to {}",
            symbol,
            request.start(),
            request.end()
        );

        if let Err(reason) = self.check_symbol(symbol).await {
            error!("{}", reason);
            return RetrievalResult::failed(symbol, reason, self.clock.now());
        }

        match self
            .fetch_chunk(symbol, request.start(), request.end(), request.granularity())
            .await
        {
            Ok(points) => {
                info!("Retrieved {} data points for {}", points.len(), symbol);
                RetrievalResult::succeeded(symbol, points, self.clock.now())
            }
            Err(e) => {
                error!("Failed to retrieve data for {}: {}", symbol, e);
                RetrievalResult::failed(symbol, e.to_string(), self.clock.now())
            }
        }
    }

    /// # Summary
    /// 回补最近 `max_years_back` 年（每年按 365 天计）的全部数据。
    ///
    /// # Logic
    /// 窗口为 `[now - max_years_back * 365d, now)`，其余同 `retrieve_range`。
    /// 窗口起点超出可表示的时间范围时返回失败结果。
    pub async fn retrieve_all(
        &self,
        symbol: &str,
        granularity: Granularity,
        max_years_back: u32,
    ) -> RetrievalResult {
        let end = self.clock.now();
        let Some(start) = years_before(end, max_years_back) else {
            let reason = format!("Cannot go back {} years from {}", max_years_back, end);
            error!("{}", reason);
            return RetrievalResult::failed(symbol, reason, self.clock.now());
        };
        info!(
            "Starting complete historical data retrieval for {} ({} years back)",
            symbol, max_years_back
        );
        self.retrieve_range(symbol, granularity, start, end).await
    }

    /// # Summary
    /// 分块回补任意窗口 `[start, end)`。
    ///
    /// # Logic
    /// 1. 与 `retrieve` 相同的前置检查，只做一次。
    /// 2. 以 `granularity * max_candles_per_request` 为块宽从左到右切分窗口。
    /// 3. 每块独立构造请求并抓取；失败的块告警后跳过，整体仍为成功。
    /// 4. 每块结束后（无论成败）固定等待 `chunk_delay_ms`。
    /// 5. 块请求无法构造时中止循环，整体返回失败。
    ///
    /// 空窗口（`start == end`）没有任何块，直接返回零条数据的成功结果；
    /// `start > end` 为失败。
    pub async fn retrieve_range(
        &self,
        symbol: &str,
        granularity: Granularity,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> RetrievalResult {
        if let Err(reason) = self.check_symbol(symbol).await {
            error!("{}", reason);
            return RetrievalResult::failed(symbol, reason, self.clock.now());
        }
        if start == end {
            info!("Empty retrieval window for {} at {}", symbol, start);
            return RetrievalResult::succeeded(symbol, Vec::new(), self.clock.now());
        }
        if start > end {
            let reason = format!("Invalid retrieval window: {} > {}", start, end);
            error!("{}", reason);
            return RetrievalResult::failed(symbol, reason, self.clock.now());
        }

        let plan = ChunkPlan::new(start, end, granularity, self.config.max_candles_per_request);
        info!(
            "Retrieving {} from {} to {} in chunks of {}s",
            symbol,
            start,
            end,
            plan.width().num_seconds()
        );

        let delay = std::time::Duration::from_millis(self.config.chunk_delay_ms);
        let mut all_points: Vec<CandlePoint> = Vec::new();
        let mut failed_chunks = 0usize;
        let mut chunk_count = 0usize;

        for (index, (chunk_start, chunk_end)) in plan.enumerate() {
            chunk_count = index + 1;
            let request = match RetrievalRequest::with_candle_limit(
                symbol,
                chunk_start,
                chunk_end,
                granularity,
                self.config.max_candles_per_request,
            ) {
                Ok(request) => request,
                Err(e) => {
                    error!("Aborting retrieval of {} at chunk {}: {}", symbol, chunk_count, e);
                    return RetrievalResult::failed(symbol, e.to_string(), self.clock.now());
                }
            };

            debug!(
                "Processing chunk {}: {} to {}",
                chunk_count,
                request.start(),
                request.end()
            );

            match self
                .fetch_chunk(symbol, request.start(), request.end(), granularity)
                .await
            {
                Ok(points) => {
                    debug!("Chunk {} retrieved {} data points", chunk_count, points.len());
                    all_points.extend(points);
                }
                Err(e) => {
                    failed_chunks += 1;
                    warn!("Chunk {} failed for {}: {}", chunk_count, symbol, e);
                }
            }

            tokio::time::sleep(delay).await;
        }

        info!(
            "Complete historical data retrieval finished for {}: {} data points, {} of {} chunks failed",
            symbol,
            all_points.len(),
            failed_chunks,
            chunk_count
        );
        RetrievalResult::succeeded(symbol, all_points, self.clock.now())
    }

    /// # Summary
    /// 探测交易对可获取的最早数据时间。
    ///
    /// # Logic
    /// 1. 从 `max_years_back` 年前开始，逐年向当前时间靠近。
    /// 2. 每年抓取一个不超过一周（且不超过单请求上限）的探测窗口。
    /// 3. 第一个有数据的窗口中最早的时间戳即为结果。
    /// 4. 全部探测无数据时退回到一年前。
    pub async fn find_earliest_available(
        &self,
        symbol: &str,
        granularity: Granularity,
        max_years_back: u32,
    ) -> DateTime<Utc> {
        info!("Finding earliest available data for {}", symbol);
        let now = self.clock.now();
        let max_width = Duration::seconds(
            i64::from(granularity.seconds())
                * i64::from(self.config.max_candles_per_request.max(1)),
        );
        let window = Duration::days(PROBE_WINDOW_DAYS).min(max_width);
        let delay = std::time::Duration::from_millis(self.config.chunk_delay_ms);

        for years_back in (1..=max_years_back).rev() {
            let Some(probe_start) = years_before(now, years_back) else {
                continue;
            };
            let probe_end = probe_start
                .checked_add_signed(window)
                .map_or(now, |t| t.min(now));

            let Ok(request) = RetrievalRequest::unchecked(symbol, probe_start, probe_end, granularity)
            else {
                continue;
            };

            debug!(
                "Testing data availability from {} to {}",
                request.start(),
                request.end()
            );
            let probe = self
                .fetch_chunk(symbol, request.start(), request.end(), granularity)
                .await;
            tokio::time::sleep(delay).await;

            match probe {
                Ok(points) => {
                    if let Some(first) = points.first() {
                        info!(
                            "Found data for {} from {} years back: {}",
                            symbol,
                            years_back,
                            first.timestamp()
                        );
                        return first.timestamp();
                    }
                    debug!("No data found from {} years back", years_back);
                }
                Err(e) => debug!("Probe {} years back failed: {}", years_back, e),
            }
        }

        warn!(
            "Failed to find earliest available data for {}, using default 1 year back",
            symbol
        );
        now - Duration::days(365)
    }

    /// # Summary
    /// 前置检查：symbol 形态合法且交易对在线。
    ///
    /// # Returns
    /// 不通过时返回可直接展示给用户的原因。
    pub async fn check_symbol(&self, symbol: &str) -> Result<(), String> {
        if !symbol::is_valid(symbol) {
            return Err(format!("Invalid symbol format: {}", symbol));
        }

        let label = format!("Availability check for {}", symbol);
        match with_retry(&self.retry, &label, || self.source.is_tradeable(symbol)).await {
            Ok(true) => Ok(()),
            Ok(false) => Err(format!("Symbol {} is not available for trading", symbol)),
            Err(e) => Err(format!(
                "Failed to check availability of {}: {}",
                symbol, e
            )),
        }
    }

    /// # Summary
    /// 抓取并规范化单个 `[start, end)` 区间。
    ///
    /// # Logic
    /// 1. 带重试地调用数据源。
    /// 2. 逐条转换原始记录。
    /// 3. 丢弃区间外的点，按时间升序排列并去重（交易所通常倒序返回）。
    async fn fetch_chunk(
        &self,
        symbol: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        granularity: Granularity,
    ) -> Result<Vec<CandlePoint>, FeedError> {
        let label = format!("Fetching {} candles [{}, {})", symbol, start, end);
        let raw = with_retry(&self.retry, &label, || {
            self.source.fetch_candles(symbol, start, end, granularity)
        })
        .await?;

        let mut points = transform(symbol, &raw);
        let before = points.len();
        points.retain(|p| p.timestamp() >= start && p.timestamp() < end);
        if points.len() < before {
            debug!(
                "Dropped {} data points outside [{}, {})",
                before - points.len(),
                start,
                end
            );
        }
        points.sort_by_key(CandlePoint::timestamp);
        points.dedup_by_key(|p| p.timestamp());
        Ok(points)
    }
}
