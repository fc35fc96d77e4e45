use crate::cli::{Command, OutputArgs, OutputFormat};
use crate::error::AppError;
use chrono::{DateTime, Duration, NaiveDate, Utc};
use cohida_core::common::Granularity;
use cohida_core::common::error::ValidationError;
use cohida_core::common::symbol;
use cohida_core::common::time::RealTimeProvider;
use cohida_core::config::AppConfig;
use cohida_core::market::entity::{CandlePoint, ProductStatus, RetrievalRequest, RetrievalResult};
use cohida_core::market::port::CandleSource;
use cohida_core::store::port::CandleStore;
use cohida_feed::coinbase::CoinbaseProvider;
use cohida_retriever::historical::{AUTO_DETECT_MAX_YEARS, HistoricalRetriever};
use cohida_retriever::sync::{CandleSync, SyncReport};
use cohida_store::candle::SqliteCandleStore;
use cohida_store::file::FileSink;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

/// 回显读取结果时最多打印的行数。
const PREVIEW_ROWS: usize = 5;

/// # Summary
/// 命令执行上下文，按需组装行情源、存储与检索器。
///
/// # Invariants
/// - 每个组件在单次命令内至多构造一次，以显式依赖注入方式传递。
/// - 不需要数据库的命令不会打开数据库。
pub struct App {
    config: AppConfig,
    output_dir: PathBuf,
}

impl App {
    pub fn new(config: AppConfig, output_dir: Option<PathBuf>) -> Self {
        let output_dir = output_dir.unwrap_or_else(|| PathBuf::from(&config.output.dir));
        Self { config, output_dir }
    }

    pub async fn run(&self, command: Command) -> Result<(), AppError> {
        match command {
            Command::Retrieve {
                symbol,
                start,
                end,
                days,
                granularity,
                output,
            } => {
                self.retrieve(&symbol, start, end, days, granularity.granularity, output)
                    .await
            }
            Command::RetrieveAll {
                symbol,
                max_years,
                granularity,
                output,
            } => {
                self.retrieve_all(&symbol, max_years, granularity.granularity, output)
                    .await
            }
            Command::TopUp {
                symbol,
                fallback_years,
                granularity,
            } => {
                self.top_up(&symbol, granularity.granularity, fallback_years)
                    .await
            }
            Command::Read {
                symbol,
                start,
                end,
                days,
                granularity,
                format,
            } => {
                self.read(&symbol, start, end, days, granularity.granularity, format)
                    .await
            }
            Command::Count {
                symbol,
                granularity,
            } => self.count(&symbol, granularity.granularity).await,
            Command::Test => self.test().await,
            Command::Symbols { quote, limit } => self.symbols(&quote, limit).await,
            Command::Info { symbol } => self.info(&symbol).await,
        }
    }

    fn feed(&self) -> Result<Arc<CoinbaseProvider>, AppError> {
        Ok(Arc::new(CoinbaseProvider::new(&self.config.feed)?))
    }

    async fn store(&self) -> Result<Arc<SqliteCandleStore>, AppError> {
        Ok(Arc::new(
            SqliteCandleStore::connect(&self.config.database).await?,
        ))
    }

    fn retriever(&self) -> Result<Arc<HistoricalRetriever>, AppError> {
        Ok(Arc::new(HistoricalRetriever::new(
            self.feed()?,
            Arc::new(RealTimeProvider),
            self.config.retriever.clone(),
        )))
    }

    async fn retrieve(
        &self,
        symbol: &str,
        start: Option<String>,
        end: Option<String>,
        days: u32,
        granularity: Granularity,
        output: OutputArgs,
    ) -> Result<(), AppError> {
        let symbol = symbol::normalize(symbol)?;
        let (start, end) = resolve_window(start, end, days)?;
        let retriever = self.retriever()?;

        let result = match RetrievalRequest::with_candle_limit(
            &symbol,
            start,
            end,
            granularity,
            self.config.retriever.max_candles_per_request,
        ) {
            Ok(request) => retriever.retrieve(&request).await,
            Err(ValidationError::RangeTooLarge { .. }) => {
                info!("Range exceeds a single request, retrieving in chunks");
                retriever
                    .retrieve_range(&symbol, granularity, start, end)
                    .await
            }
            Err(e) => return Err(e.into()),
        };

        self.finish(result, granularity, "historical", output).await
    }

    async fn retrieve_all(
        &self,
        symbol: &str,
        max_years: Option<u32>,
        granularity: Granularity,
        output: OutputArgs,
    ) -> Result<(), AppError> {
        let symbol = symbol::normalize(symbol)?;
        let retriever = self.retriever()?;

        if !output.no_db {
            let store = self.store().await?;
            let sync = CandleSync::new(retriever, store.clone());
            let report = sync.backfill(&symbol, granularity, max_years).await;
            store.close().await;
            let report = report?;
            print_report(&report);
            ensure_success(&report.result)?;
            return self.export(&symbol, "complete", &report.result.points, output.format);
        }

        let result = match max_years {
            Some(years) => retriever.retrieve_all(&symbol, granularity, years).await,
            None => {
                retriever
                    .check_symbol(&symbol)
                    .await
                    .map_err(AppError::Retrieval)?;
                let start = retriever
                    .find_earliest_available(&symbol, granularity, AUTO_DETECT_MAX_YEARS)
                    .await;
                let end = retriever.now();
                retriever
                    .retrieve_range(&symbol, granularity, start, end)
                    .await
            }
        };
        self.finish(result, granularity, "complete", output).await
    }

    async fn top_up(
        &self,
        symbol: &str,
        granularity: Granularity,
        fallback_years: u32,
    ) -> Result<(), AppError> {
        let symbol = symbol::normalize(symbol)?;
        let store = self.store().await?;
        let sync = CandleSync::new(self.retriever()?, store.clone());
        let report = sync.top_up(&symbol, granularity, fallback_years).await;
        store.close().await;
        let report = report?;
        print_report(&report);
        ensure_success(&report.result)
    }

    async fn read(
        &self,
        symbol: &str,
        start: Option<String>,
        end: Option<String>,
        days: u32,
        granularity: Granularity,
        format: OutputFormat,
    ) -> Result<(), AppError> {
        let symbol = symbol::normalize(symbol)?;
        let (start, end) = resolve_window(start, end, days)?;
        let store = self.store().await?;

        let points = store.read(&symbol, granularity, start, end).await;
        store.close().await;
        let points = points?;
        println!(
            "Found {} {} data points for {} between {} and {}",
            points.len(),
            granularity,
            symbol,
            start,
            end
        );
        for point in points.iter().take(PREVIEW_ROWS) {
            print_point(point);
        }
        if points.len() > PREVIEW_ROWS {
            println!("... {} more", points.len() - PREVIEW_ROWS);
        }

        self.export(&symbol, granularity.tag(), &points, format)
    }

    async fn count(&self, symbol: &str, granularity: Granularity) -> Result<(), AppError> {
        let symbol = symbol::normalize(symbol)?;
        let store = self.store().await?;

        let count = store.count(&symbol, granularity).await;
        let latest = store.latest_timestamp(&symbol, granularity).await;
        store.close().await;

        println!("{} {} data points stored for {}", count?, granularity, symbol);
        match latest? {
            Some(latest) => println!("Latest timestamp: {}", latest),
            None => println!("No data stored"),
        }
        Ok(())
    }

    /// # Summary
    /// 连通性自检。
    ///
    /// # Logic
    /// 1. 数据库 `SELECT 1`。
    /// 2. 拉取交易对列表。
    /// 3. 打印几个样例代码的格式校验结果。
    /// 任一连通性检查失败时返回错误，但会先跑完全部检查。
    async fn test(&self) -> Result<(), AppError> {
        let mut failures = Vec::new();

        match self.store().await {
            Ok(store) => {
                match store.ping().await {
                    Ok(()) => println!("Database: OK"),
                    Err(e) => {
                        println!("Database: FAILED ({})", e);
                        failures.push("database");
                    }
                }
                store.close().await;
            }
            Err(e) => {
                println!("Database: FAILED ({})", e);
                failures.push("database");
            }
        }

        match self.feed()?.products().await {
            Ok(products) => println!("Exchange API: OK ({} products)", products.len()),
            Err(e) => {
                println!("Exchange API: FAILED ({})", e);
                failures.push("exchange api");
            }
        }

        for sample in ["BTC-USD", "ETH-USD", "btc-usd", "BTCUSD", "BTC-USDT"] {
            println!(
                "Symbol {:<10} valid: {}",
                sample,
                symbol::is_valid(sample)
            );
        }

        if failures.is_empty() {
            Ok(())
        } else {
            Err(AppError::HealthCheck(failures.join(", ")))
        }
    }

    async fn symbols(&self, quote: &str, limit: usize) -> Result<(), AppError> {
        let mut products: Vec<_> = self
            .feed()?
            .products()
            .await?
            .into_iter()
            .filter(|p| p.quote_currency.eq_ignore_ascii_case(quote))
            .filter(|p| p.status == ProductStatus::Online)
            .collect();
        products.sort_by(|a, b| a.id.cmp(&b.id));

        println!("{} online {} pairs", products.len(), quote.to_uppercase());
        for product in products.iter().take(limit) {
            println!("  {:<12} {}", product.id, product.display_name);
        }
        Ok(())
    }

    async fn info(&self, symbol: &str) -> Result<(), AppError> {
        let symbol = symbol::normalize(symbol)?;
        if !symbol::is_valid(&symbol) {
            return Err(ValidationError::InvalidSymbol(symbol).into());
        }

        match self.feed()?.product(&symbol).await? {
            Some(product) => {
                println!("Symbol:         {}", product.id);
                println!("Name:           {}", product.display_name);
                println!("Base currency:  {}", product.base_currency);
                println!("Quote currency: {}", product.quote_currency);
                println!("Status:         {}", product.status);
                if let Some(min) = &product.base_min_size {
                    println!("Min size:       {}", min);
                }
                if let Some(max) = &product.base_max_size {
                    println!("Max size:       {}", max);
                }
            }
            None => println!("Symbol {} not found", symbol),
        }
        Ok(())
    }

    /// 检索结果的统一收尾：校验成功、按需入库、按需导出。
    async fn finish(
        &self,
        result: RetrievalResult,
        granularity: Granularity,
        label: &str,
        output: OutputArgs,
    ) -> Result<(), AppError> {
        ensure_success(&result)?;
        println!(
            "Retrieved {} {} data points for {}",
            result.count(),
            granularity,
            result.symbol
        );

        if output.no_db {
            info!("Database storage disabled");
        } else if result.is_empty() {
            warn!("Nothing to store for {}", result.symbol);
        } else {
            let store = self.store().await?;
            let written = store.write(granularity, &result.points).await;
            store.close().await;
            println!("Stored {} data points", written?);
        }

        self.export(&result.symbol, label, &result.points, output.format)
    }

    fn export(
        &self,
        symbol: &str,
        label: &str,
        points: &[CandlePoint],
        format: OutputFormat,
    ) -> Result<(), AppError> {
        if let Some(format) = format.export() {
            let path = FileSink::new(&self.output_dir).write(symbol, label, points, format)?;
            println!("Saved {} to {}", format, path.display());
        }
        Ok(())
    }
}

fn ensure_success(result: &RetrievalResult) -> Result<(), AppError> {
    if result.success {
        Ok(())
    } else {
        Err(AppError::Retrieval(
            result
                .error
                .clone()
                .unwrap_or_else(|| "unknown error".to_string()),
        ))
    }
}

fn print_report(report: &SyncReport) {
    if let Some(start) = report.start {
        println!("Window start: {}", start);
    }
    println!(
        "Retrieved {} {} data points for {}, stored {}",
        report.fetched(),
        report.granularity,
        report.result.symbol,
        report.written
    );
}

fn print_point(point: &CandlePoint) {
    println!(
        "  {}  O {}  H {}  L {}  C {}  V {}",
        point.timestamp(),
        point.open(),
        point.high(),
        point.low(),
        point.close(),
        point.volume()
    );
}

/// 解析 `YYYY-MM-DD`（按 UTC 零点）或 RFC 3339 时间。
pub fn parse_date(input: &str) -> Result<DateTime<Utc>, AppError> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(input) {
        return Ok(ts.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(input, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc())
        .ok_or_else(|| AppError::InvalidDate(input.to_string()))
}

/// 结束时间缺省为当前时间，开始时间缺省为结束前 `days` 天。
fn resolve_window(
    start: Option<String>,
    end: Option<String>,
    days: u32,
) -> Result<(DateTime<Utc>, DateTime<Utc>), AppError> {
    let end = match end {
        Some(s) => parse_date(&s)?,
        None => Utc::now(),
    };
    let start = match start {
        Some(s) => parse_date(&s)?,
        None => Duration::try_days(i64::from(days))
            .and_then(|span| end.checked_sub_signed(span))
            .ok_or_else(|| {
                AppError::InvalidDate(format!("{} days before {}", days, end.to_rfc3339()))
            })?,
    };
    if start >= end {
        return Err(ValidationError::InvalidRange {
            start: start.to_rfc3339(),
            end: end.to_rfc3339(),
        }
        .into());
    }
    Ok((start, end))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_parse_date_formats() {
        assert_eq!(
            parse_date("2023-01-01").unwrap(),
            Utc.with_ymd_and_hms(2023, 1, 1, 0, 0, 0).unwrap()
        );
        assert_eq!(
            parse_date("2023-01-01T02:00:00+02:00").unwrap(),
            Utc.with_ymd_and_hms(2023, 1, 1, 0, 0, 0).unwrap()
        );
        assert!(matches!(parse_date("01/01/2023"), Err(AppError::InvalidDate(_))));
    }

    #[test]
    fn test_resolve_window() {
        let (start, end) =
            resolve_window(None, Some("2023-01-31".to_string()), 30).unwrap();
        assert_eq!(end - start, Duration::days(30));
        assert_eq!(start, Utc.with_ymd_and_hms(2023, 1, 1, 0, 0, 0).unwrap());

        assert!(
            resolve_window(
                Some("2023-02-01".to_string()),
                Some("2023-01-01".to_string()),
                7
            )
            .is_err()
        );
    }

    #[test]
    fn test_resolve_window_out_of_range_days() {
        let window = resolve_window(None, Some("2023-01-31".to_string()), u32::MAX);
        assert!(matches!(window, Err(AppError::InvalidDate(_))));
    }

    #[test]
    fn test_output_dir_override() {
        let app = App::new(AppConfig::default(), None);
        assert_eq!(app.output_dir, PathBuf::from("outputs"));
        let app = App::new(AppConfig::default(), Some(PathBuf::from("/tmp/x")));
        assert_eq!(app.output_dir, PathBuf::from("/tmp/x"));
    }
}
