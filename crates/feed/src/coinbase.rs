use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use cohida_core::common::Granularity;
use cohida_core::config::FeedConfig;
use cohida_core::market::entity::{ProductInfo, ProductStatus, RawCandle};
use cohida_core::market::error::FeedError;
use cohida_core::market::port::CandleSource;
use reqwest::{Client, Response, StatusCode};
use serde::Deserialize;
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, warn};

/// # Summary
/// Coinbase 公共行情接口适配器。
///
/// # Invariants
/// - 使用 `reqwest` 异步客户端，仅访问无需鉴权的公共端点。
/// - 每次调用只发出一个 HTTP 请求，不做重试。
#[derive(Clone)]
pub struct CoinbaseProvider {
    /// 内部使用的 HTTP 客户端
    client: Client,
    /// 接口根地址，不含结尾斜杠
    base_url: String,
}

impl CoinbaseProvider {
    /// # Summary
    /// 根据配置创建适配器。
    ///
    /// # Logic
    /// 1. 安装 rustls 的 ring 加密后端（已安装则跳过）。
    /// 2. 配置超时与 User-Agent（Coinbase 拒绝没有 User-Agent 的请求）。
    /// 3. 初始化 reqwest 客户端。
    ///
    /// # Arguments
    /// * `config`: 行情接口配置。
    ///
    /// # Returns
    /// 成功返回适配器，客户端构建失败返回 `FeedError::Unknown`。
    pub fn new(config: &FeedConfig) -> Result<Self, FeedError> {
        if rustls::crypto::ring::default_provider()
            .install_default()
            .is_err()
        {
            debug!("rustls crypto provider already installed");
        }

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .user_agent(config.user_agent.clone())
            .build()
            .map_err(|e| FeedError::Unknown(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }

    async fn get(&self, path: &str, query: &[(&str, String)]) -> Result<Response, FeedError> {
        let url = format!("{}{}", self.base_url, path);
        let resp = self
            .client
            .get(&url)
            .query(query)
            .send()
            .await
            .map_err(map_transport_error)?;
        check_status(resp).await
    }
}

/// 将 reqwest 传输层错误映射为可分类的 `FeedError`。
fn map_transport_error(e: reqwest::Error) -> FeedError {
    if e.is_timeout() {
        FeedError::Timeout(e.to_string())
    } else if e.is_connect() || e.is_request() || e.is_body() {
        FeedError::Connection(e.to_string())
    } else if e.is_decode() {
        FeedError::Parse(e.to_string())
    } else {
        FeedError::Unknown(e.to_string())
    }
}

/// 非 2xx 状态码映射：429 限流、401/403 鉴权、404 不存在，其余保留状态码。
async fn check_status(resp: Response) -> Result<Response, FeedError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }

    let body = resp.text().await.unwrap_or_default();
    Err(match status {
        StatusCode::TOO_MANY_REQUESTS => FeedError::RateLimited,
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => FeedError::Auth(body),
        StatusCode::NOT_FOUND => FeedError::NotFound(body),
        _ => FeedError::Http {
            status: status.as_u16(),
            message: body,
        },
    })
}

/// # Summary
/// K 线响应的两种外层形态：裸数组，或 `{"candles": [...]}`。
#[derive(Deserialize, Debug)]
#[serde(untagged)]
enum CandlesResponse {
    Bare(Vec<Value>),
    Wrapped { candles: Vec<Value> },
}

impl CandlesResponse {
    fn into_records(self) -> Vec<Value> {
        match self {
            CandlesResponse::Bare(v) | CandlesResponse::Wrapped { candles: v } => v,
        }
    }
}

/// Coinbase 交易对元数据。
#[derive(Deserialize, Debug)]
struct CoinbaseProduct {
    id: String,
    base_currency: String,
    quote_currency: String,
    #[serde(default)]
    display_name: Option<String>,
    status: String,
    #[serde(default)]
    base_min_size: Option<String>,
    #[serde(default)]
    base_max_size: Option<String>,
}

impl From<CoinbaseProduct> for ProductInfo {
    fn from(p: CoinbaseProduct) -> Self {
        ProductInfo {
            display_name: p.display_name.unwrap_or_else(|| p.id.clone()),
            status: ProductStatus::from(p.status.as_str()),
            id: p.id,
            base_currency: p.base_currency,
            quote_currency: p.quote_currency,
            base_min_size: p.base_min_size,
            base_max_size: p.base_max_size,
        }
    }
}

/// # Summary
/// 把响应体解析为原始记录列表。
///
/// # Logic
/// 1. 兼容裸数组与 `candles` 包装两种外层形态。
/// 2. 无法归入 `RawCandle` 任一形态的单条记录记录告警后丢弃，不影响其余记录。
fn parse_candles(body: &str) -> Result<Vec<RawCandle>, FeedError> {
    let response: CandlesResponse =
        serde_json::from_str(body).map_err(|e| FeedError::Parse(e.to_string()))?;

    let records = response.into_records();
    let total = records.len();
    let candles: Vec<RawCandle> = records
        .into_iter()
        .filter_map(|v| match serde_json::from_value::<RawCandle>(v.clone()) {
            Ok(raw) => Some(raw),
            Err(e) => {
                warn!("Dropping unrecognised candle record {}: {}", v, e);
                None
            }
        })
        .collect();

    debug!("Parsed {} of {} raw candle records", candles.len(), total);
    Ok(candles)
}

#[async_trait]
impl CandleSource for CoinbaseProvider {
    /// # Summary
    /// 从 Coinbase 抓取 K 线。
    ///
    /// # Logic
    /// 1. 以 RFC 3339 传递 start/end，粒度以秒传递。
    /// 2. 解析响应为原始记录；Coinbase 按时间倒序返回，排序交给检索器。
    async fn fetch_candles(
        &self,
        symbol: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        granularity: Granularity,
    ) -> Result<Vec<RawCandle>, FeedError> {
        debug!(
            "Fetching candles for {} from {} to {} at {}s",
            symbol,
            start,
            end,
            granularity.seconds()
        );

        let resp = self
            .get(
                &format!("/products/{}/candles", symbol),
                &[
                    ("start", start.to_rfc3339_opts(SecondsFormat::Secs, true)),
                    ("end", end.to_rfc3339_opts(SecondsFormat::Secs, true)),
                    ("granularity", granularity.seconds().to_string()),
                ],
            )
            .await?;

        let body = resp.text().await.map_err(map_transport_error)?;
        parse_candles(&body)
    }

    async fn product(&self, symbol: &str) -> Result<Option<ProductInfo>, FeedError> {
        let resp = match self.get(&format!("/products/{}", symbol), &[]).await {
            Ok(resp) => resp,
            Err(FeedError::NotFound(_)) => return Ok(None),
            Err(e) => return Err(e),
        };

        let product: CoinbaseProduct = resp
            .json()
            .await
            .map_err(|e| FeedError::Parse(e.to_string()))?;
        Ok(Some(product.into()))
    }

    async fn products(&self) -> Result<Vec<ProductInfo>, FeedError> {
        let resp = self.get("/products", &[]).await?;
        let products: Vec<CoinbaseProduct> = resp
            .json()
            .await
            .map_err(|e| FeedError::Parse(e.to_string()))?;
        Ok(products.into_iter().map(ProductInfo::from).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_bare_positional_candles() {
        let body = "[[1672534800, 20000, 21500, 20500, 21000, 1200.75], [1672531200, 19500, 21000, 20000, 20500, 1000.5]]";
        let candles = parse_candles(body).unwrap();
        assert_eq!(candles.len(), 2);
        assert!(matches!(candles[0], RawCandle::Positional(ref v) if v.len() == 6));
    }

    #[test]
    fn test_parse_keeps_number_text() {
        let body = "[[1672531200, 19500.123456789012345, 21000, 20000, 20500, 1000.12345678901234567]]";
        let candles = parse_candles(body).unwrap();
        match &candles[0] {
            RawCandle::Positional(v) => {
                assert_eq!(v[1].to_string(), "19500.123456789012345");
                assert_eq!(v[5].to_string(), "1000.12345678901234567");
            }
            RawCandle::Keyed(_) => panic!("expected positional candle"),
        }
    }

    #[test]
    fn test_parse_wrapped_keyed_candles() {
        let body = r#"{"candles": [
            {"start": "1672531200", "low": "19500", "high": "21000", "open": "20000", "close": "20500", "volume": "1000.5"}
        ]}"#;
        let candles = parse_candles(body).unwrap();
        assert_eq!(candles.len(), 1);
        assert!(matches!(candles[0], RawCandle::Keyed(_)));
    }

    #[test]
    fn test_parse_drops_unrecognised_records_only() {
        let body = r#"[[1672531200, 1, 1, 1, 1, 1], "garbage", 42]"#;
        let candles = parse_candles(body).unwrap();
        assert_eq!(candles.len(), 1);
    }

    #[test]
    fn test_parse_rejects_non_json_body() {
        assert!(matches!(parse_candles("<html>"), Err(FeedError::Parse(_))));
    }

    #[test]
    fn test_product_conversion() {
        let product: CoinbaseProduct = serde_json::from_str(
            r#"{"id":"BTC-USD","base_currency":"BTC","quote_currency":"USD","status":"online","base_min_size":"0.0001"}"#,
        )
        .unwrap();
        let info = ProductInfo::from(product);
        assert_eq!(info.display_name, "BTC-USD");
        assert_eq!(info.status, ProductStatus::Online);
        assert_eq!(info.base_min_size.as_deref(), Some("0.0001"));
        assert_eq!(info.base_max_size, None);
    }
}
