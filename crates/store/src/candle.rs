use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, SubsecRound, Utc};
use cohida_core::common::Granularity;
use cohida_core::config::DatabaseConfig;
use cohida_core::market::entity::CandlePoint;
use cohida_core::store::error::StoreError;
use cohida_core::store::port::CandleStore;
use dashmap::DashSet;
use rust_decimal::Decimal;
use sqlx::sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteRow, SqliteSynchronous,
};
use sqlx::{Row, SqlitePool};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// CandleStore 的 SQLite 实现，采用"一粒度一表"策略。
///
/// # Summary
/// 所有粒度共享同一个数据库文件与连接池，每个粒度使用独立的表
/// `{table}_{粒度标签}`，表在首次访问时建立。
///
/// # Invariants
/// * `(symbol, timestamp)` 上有唯一约束，写入为 upsert。
/// * 价格与成交量以十进制字符串存储，读写全程不经过浮点。
/// * 时间戳统一编码为 `YYYY-MM-DDTHH:MM:SSZ`，字典序即时间序。
pub struct SqliteCandleStore {
    pool: SqlitePool,
    table: String,
    initialized: DashSet<Granularity>,
}

impl SqliteCandleStore {
    /// 连接（必要时创建）数据库并建立连接池。
    ///
    /// # Logic
    /// 1. 校验基础表名是合法的 SQL 标识符。
    /// 2. 确保数据目录存在。
    /// 3. 以 WAL 模式、配置的最小/最大连接数建立 `SqlitePool`。
    ///
    /// # Arguments
    /// * `config` - 数据库配置。
    ///
    /// # Returns
    /// * `Result<Self, StoreError>` - 存储实例或初始化错误。
    pub async fn connect(config: &DatabaseConfig) -> Result<Self, StoreError> {
        if !is_identifier(&config.table) {
            return Err(StoreError::InitError(format!(
                "Invalid table name: {}",
                config.table
            )));
        }
        if config.min_connections > config.max_connections {
            return Err(StoreError::InitError(format!(
                "min_connections ({}) exceeds max_connections ({})",
                config.min_connections, config.max_connections
            )));
        }

        let base_path = PathBuf::from(&config.data_dir);
        std::fs::create_dir_all(&base_path).map_err(|e| StoreError::InitError(e.to_string()))?;
        let db_path = base_path.join(&config.file_name);

        let options = SqliteConnectOptions::new()
            .filename(&db_path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .busy_timeout(Duration::from_secs(config.busy_timeout_secs));

        let pool = SqlitePoolOptions::new()
            .min_connections(config.min_connections)
            .max_connections(config.max_connections)
            .acquire_timeout(Duration::from_secs(config.busy_timeout_secs))
            .connect_with(options)
            .await
            .map_err(|e| StoreError::InitError(e.to_string()))?;

        info!(
            "Database connection pool initialized at {} (min {}, max {})",
            db_path.display(),
            config.min_connections,
            config.max_connections
        );

        Ok(Self {
            pool,
            table: config.table.clone(),
            initialized: DashSet::new(),
        })
    }

    /// 指定粒度对应的物理表名。
    pub fn table_name(&self, granularity: Granularity) -> String {
        format!("{}_{}", self.table, granularity.tag())
    }

    /// 关闭连接池中的全部连接。
    pub async fn close(&self) {
        self.pool.close().await;
        info!("All database connections closed");
    }

    /// 确保粒度对应的表及索引存在，返回表名。
    async fn ensure_table(&self, granularity: Granularity) -> Result<String, StoreError> {
        let table = self.table_name(granularity);
        if self.initialized.contains(&granularity) {
            return Ok(table);
        }

        sqlx::query(&format!(
            r#"
            CREATE TABLE IF NOT EXISTS {table} (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                symbol TEXT NOT NULL,
                timestamp TEXT NOT NULL,
                open_price TEXT NOT NULL,
                high_price TEXT NOT NULL,
                low_price TEXT NOT NULL,
                close_price TEXT NOT NULL,
                volume TEXT NOT NULL,
                created_at TEXT NOT NULL,
                UNIQUE (symbol, timestamp)
            );

            CREATE INDEX IF NOT EXISTS idx_{table}_symbol ON {table} (symbol);
            CREATE INDEX IF NOT EXISTS idx_{table}_timestamp ON {table} (timestamp);
            CREATE INDEX IF NOT EXISTS idx_{table}_symbol_timestamp ON {table} (symbol, timestamp);
            "#
        ))
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::Database(e.to_string()))?;

        debug!("Schema verified for table {}", table);
        self.initialized.insert(granularity);
        Ok(table)
    }
}

/// 表名只允许字母、数字、下划线，且不能以数字开头。
fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

fn encode_ts(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// 闭区间下界：带小数秒时进到下一整秒，存储的时间戳均为整秒。
fn encode_lower_bound(ts: DateTime<Utc>) -> String {
    let floor = ts.trunc_subsecs(0);
    if floor < ts {
        encode_ts(floor + chrono::Duration::seconds(1))
    } else {
        encode_ts(floor)
    }
}

fn decode_ts(raw: &str) -> Result<DateTime<Utc>, String> {
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| format!("bad timestamp '{}': {}", raw, e))
}

fn decode_decimal(row: &SqliteRow, column: &str) -> Result<Decimal, String> {
    let raw: String = row.try_get(column).map_err(|e| e.to_string())?;
    Decimal::from_str(&raw).map_err(|e| format!("bad {} '{}': {}", column, raw, e))
}

/// 把一行还原为 K 线；任何字段失败都返回错误描述，由调用方跳过该行。
fn decode_row(row: &SqliteRow) -> Result<CandlePoint, String> {
    let symbol: String = row.try_get("symbol").map_err(|e| e.to_string())?;
    let raw_ts: String = row.try_get("timestamp").map_err(|e| e.to_string())?;

    CandlePoint::new(
        symbol,
        decode_ts(&raw_ts)?,
        decode_decimal(row, "open_price")?,
        decode_decimal(row, "high_price")?,
        decode_decimal(row, "low_price")?,
        decode_decimal(row, "close_price")?,
        decode_decimal(row, "volume")?,
    )
    .map_err(|e| e.to_string())
}

#[async_trait]
impl CandleStore for SqliteCandleStore {
    /// # Summary
    /// 以单个事务批量 upsert K 线。
    ///
    /// # Logic
    /// 1. 空批次直接返回 0。
    /// 2. 逐行执行 `INSERT ... ON CONFLICT(symbol, timestamp) DO UPDATE`，
    ///    冲突时覆盖价格、成交量并刷新 `created_at`。
    /// 3. 单行失败只记录错误并继续。
    /// 4. 批次末尾提交一次；提交失败向上传播。
    ///
    /// # Arguments
    /// * `granularity` - 目标表对应的粒度。
    /// * `points` - 待写入的数据。
    ///
    /// # Returns
    /// * `Result<usize, StoreError>` - 未抛错的行数。
    async fn write(
        &self,
        granularity: Granularity,
        points: &[CandlePoint],
    ) -> Result<usize, StoreError> {
        if points.is_empty() {
            warn!("No data points provided for writing");
            return Ok(0);
        }

        let table = self.ensure_table(granularity).await?;
        let sql = format!(
            r#"
            INSERT INTO {table} (symbol, timestamp, open_price, high_price, low_price, close_price, volume, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT (symbol, timestamp) DO UPDATE SET
                open_price = excluded.open_price,
                high_price = excluded.high_price,
                low_price = excluded.low_price,
                close_price = excluded.close_price,
                volume = excluded.volume,
                created_at = excluded.created_at
            "#
        );

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| StoreError::Database(e.to_string()))?;
        let updated_at = encode_ts(Utc::now());
        let mut written = 0usize;

        for point in points {
            let result = sqlx::query(&sql)
                .bind(point.symbol())
                .bind(encode_ts(point.timestamp()))
                .bind(point.open().to_string())
                .bind(point.high().to_string())
                .bind(point.low().to_string())
                .bind(point.close().to_string())
                .bind(point.volume().to_string())
                .bind(&updated_at)
                .execute(&mut *tx)
                .await;

            match result {
                Ok(_) => {
                    written += 1;
                    debug!(
                        "Written data point for {} at {}",
                        point.symbol(),
                        point.timestamp()
                    );
                }
                Err(e) => {
                    error!(
                        "Failed to write data point for {} at {}: {}",
                        point.symbol(),
                        point.timestamp(),
                        e
                    );
                }
            }
        }

        tx.commit()
            .await
            .map_err(|e| StoreError::Database(e.to_string()))?;
        info!("Successfully wrote {} data points to {}", written, table);
        Ok(written)
    }

    /// # Summary
    /// 按闭区间读取 K 线。
    ///
    /// # Logic
    /// 1. 以 `timestamp >= start AND timestamp <= end` 过滤并升序排列。
    /// 2. 逐行解码，失败的行记录告警后跳过。
    async fn read(
        &self,
        symbol: &str,
        granularity: Granularity,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<CandlePoint>, StoreError> {
        let table = self.ensure_table(granularity).await?;

        let rows = sqlx::query(&format!(
            r#"
            SELECT symbol, timestamp, open_price, high_price, low_price, close_price, volume
            FROM {table}
            WHERE symbol = ? AND timestamp >= ? AND timestamp <= ?
            ORDER BY timestamp ASC
            "#
        ))
        .bind(symbol)
        .bind(encode_lower_bound(start))
        .bind(encode_ts(end.trunc_subsecs(0)))
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StoreError::Database(e.to_string()))?;

        let total = rows.len();
        let points: Vec<CandlePoint> = rows
            .iter()
            .filter_map(|row| match decode_row(row) {
                Ok(point) => Some(point),
                Err(e) => {
                    warn!("Failed to parse data row in {}: {}", table, e);
                    None
                }
            })
            .collect();

        info!(
            "Retrieved {} data points for {} from {} ({} rows skipped)",
            points.len(),
            symbol,
            table,
            total - points.len()
        );
        Ok(points)
    }

    async fn count(&self, symbol: &str, granularity: Granularity) -> Result<u64, StoreError> {
        let table = self.ensure_table(granularity).await?;
        let count: i64 = sqlx::query_scalar(&format!(
            "SELECT COUNT(*) FROM {table} WHERE symbol = ?"
        ))
        .bind(symbol)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| StoreError::Database(e.to_string()))?;

        debug!("Data count for {} in {}: {}", symbol, table, count);
        u64::try_from(count).map_err(|e| StoreError::Database(e.to_string()))
    }

    async fn latest_timestamp(
        &self,
        symbol: &str,
        granularity: Granularity,
    ) -> Result<Option<DateTime<Utc>>, StoreError> {
        let table = self.ensure_table(granularity).await?;
        let latest: Option<String> = sqlx::query_scalar(&format!(
            "SELECT MAX(timestamp) FROM {table} WHERE symbol = ?"
        ))
        .bind(symbol)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| StoreError::Database(e.to_string()))?;

        debug!("Latest timestamp for {} in {}: {:?}", symbol, table, latest);
        latest
            .map(|raw| decode_ts(&raw).map_err(StoreError::Database))
            .transpose()
    }

    async fn ping(&self) -> Result<(), StoreError> {
        let one: i64 = sqlx::query_scalar("SELECT 1")
            .fetch_one(&self.pool)
            .await
            .map_err(|e| StoreError::Database(e.to_string()))?;
        if one == 1 {
            Ok(())
        } else {
            Err(StoreError::Database(format!("SELECT 1 returned {}", one)))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_identifier_validation() {
        assert!(is_identifier("crypto_data"));
        assert!(is_identifier("_candles2"));
        assert!(!is_identifier(""));
        assert!(!is_identifier("2candles"));
        assert!(!is_identifier("candles; DROP TABLE x"));
        assert!(!is_identifier("crypto-data"));
    }

    #[test]
    fn test_timestamp_encoding_sorts_chronologically() {
        let a = Utc.with_ymd_and_hms(2023, 1, 1, 9, 0, 0).unwrap();
        let b = Utc.with_ymd_and_hms(2023, 1, 1, 10, 0, 0).unwrap();
        assert_eq!(encode_ts(a), "2023-01-01T09:00:00Z");
        assert!(encode_ts(a) < encode_ts(b));
        assert_eq!(decode_ts(&encode_ts(b)).unwrap(), b);
    }

    #[test]
    fn test_lower_bound_rounds_up_fractional_seconds() {
        let t = Utc.with_ymd_and_hms(2023, 1, 1, 9, 0, 0).unwrap();
        assert_eq!(encode_lower_bound(t), "2023-01-01T09:00:00Z");
        let frac = t + chrono::Duration::milliseconds(1);
        assert_eq!(encode_lower_bound(frac), "2023-01-01T09:00:01Z");
    }
}
