use super::error::StoreError;
use crate::common::Granularity;
use crate::market::entity::CandlePoint;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// # Summary
/// K 线持久化接口（写即读存储）。
///
/// # Invariants
/// - 每个粒度一张独立的表，`(symbol, timestamp)` 只在同一粒度内唯一。
/// - 同一 `(symbol, timestamp)` 至多一行；重复写入覆盖价格与成交量，不产生新行。
/// - 每个操作独占一个连接并在返回前归还，事务不跨操作。
#[async_trait]
pub trait CandleStore: Send + Sync {
    /// # Summary
    /// 批量写入 K 线（按 `(symbol, timestamp)` upsert）。
    ///
    /// # Logic
    /// 1. 在单个事务内逐行执行 upsert。
    /// 2. 单行失败记录日志后跳过，不回滚同批次已写入的行。
    /// 3. 批次结束时统一提交一次；提交失败作为错误返回。
    ///
    /// # Returns
    /// 未抛错的行数。
    async fn write(
        &self,
        granularity: Granularity,
        points: &[CandlePoint],
    ) -> Result<usize, StoreError>;

    /// # Summary
    /// 读取 `symbol` 在 `[start, end]`（闭区间）内的全部 K 线，按时间升序。
    ///
    /// # Logic
    /// 无法反序列化的行逐条跳过。
    async fn read(
        &self,
        symbol: &str,
        granularity: Granularity,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<CandlePoint>, StoreError>;

    /// 交易对在该粒度下的行数。
    async fn count(&self, symbol: &str, granularity: Granularity) -> Result<u64, StoreError>;

    /// 交易对在该粒度下的最新时间戳，无数据时为 `None`。
    async fn latest_timestamp(
        &self,
        symbol: &str,
        granularity: Granularity,
    ) -> Result<Option<DateTime<Utc>>, StoreError>;

    /// 连通性检查。
    async fn ping(&self) -> Result<(), StoreError>;
}
