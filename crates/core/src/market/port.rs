use crate::common::Granularity;
use crate::market::entity::{ProductInfo, ProductStatus, RawCandle};
use crate::market::error::FeedError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// # Summary
/// 交易所行情接口适配器（原始数据源）。
///
/// # Invariants
/// - 实现者只负责单次网络调用，不做重试；重试策略由检索器统一施加。
/// - 返回的原始记录形态由实现者决定，检索器的转换步骤负责兼容。
#[async_trait]
pub trait CandleSource: Send + Sync {
    /// # Summary
    /// 获取交易对在 `[start, end)` 区间、指定粒度下的原始 K 线。
    ///
    /// # Arguments
    /// * `symbol`: 交易对代码。
    /// * `start`: 开始时间。
    /// * `end`: 结束时间。
    /// * `granularity`: K 线粒度。
    ///
    /// # Returns
    /// 成功返回原始记录列表（可能为空），失败返回 `FeedError`。
    async fn fetch_candles(
        &self,
        symbol: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        granularity: Granularity,
    ) -> Result<Vec<RawCandle>, FeedError>;

    /// # Summary
    /// 查询单个交易对的元数据。
    ///
    /// # Returns
    /// 交易对不存在时返回 `Ok(None)`。
    async fn product(&self, symbol: &str) -> Result<Option<ProductInfo>, FeedError>;

    /// 列出交易所全部交易对。
    async fn products(&self) -> Result<Vec<ProductInfo>, FeedError>;

    /// # Summary
    /// 判断交易对当前是否可交易。
    ///
    /// # Logic
    /// 1. 查询元数据。
    /// 2. 仅当状态为 `online` 时返回 true。
    async fn is_tradeable(&self, symbol: &str) -> Result<bool, FeedError> {
        Ok(self
            .product(symbol)
            .await?
            .is_some_and(|p| p.status == ProductStatus::Online))
    }
}
