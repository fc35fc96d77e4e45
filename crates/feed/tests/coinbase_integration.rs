use chrono::{Duration as ChronoDuration, Utc};
use cohida_core::common::Granularity;
use cohida_core::config::FeedConfig;
use cohida_core::market::error::FeedError;
use cohida_core::market::port::CandleSource;
use cohida_feed::coinbase::CoinbaseProvider;

/// # Summary
/// Coinbase 真实抓取的集成测试（需要外网，默认忽略）。
///
/// # Logic
/// 1. 初始化 CoinbaseProvider。
/// 2. 抓取 BTC-USD 过去 24 小时的小时线。
/// 3. 断言返回非空。
#[tokio::test]
#[ignore = "requires network access to api.exchange.coinbase.com"]
async fn test_coinbase_real_fetch() {
    let provider = CoinbaseProvider::new(&FeedConfig::default()).unwrap();
    let end = Utc::now();
    let start = end - ChronoDuration::hours(24);

    let result = provider
        .fetch_candles("BTC-USD", start, end, Granularity::OneHour)
        .await;

    assert!(result.is_ok(), "Failed to fetch from Coinbase: {:?}", result.err());
    let candles = result.unwrap();
    assert!(!candles.is_empty(), "Candles list should not be empty");
    println!("Fetched {} raw candles for BTC-USD", candles.len());
}

#[tokio::test]
#[ignore = "requires network access to api.exchange.coinbase.com"]
async fn test_coinbase_product_lookup() {
    let provider = CoinbaseProvider::new(&FeedConfig::default()).unwrap();

    assert!(provider.is_tradeable("BTC-USD").await.unwrap());

    let missing = provider.product("NOPE-XYZ").await.unwrap();
    assert!(missing.is_none());
}

/// 不可达地址应映射为可重试的连接类错误。
#[tokio::test]
async fn test_unreachable_host_maps_to_retryable_error() {
    let config = FeedConfig {
        base_url: "http://127.0.0.1:9".to_string(),
        timeout_secs: 2,
        ..FeedConfig::default()
    };
    let provider = CoinbaseProvider::new(&config).unwrap();
    let end = Utc::now();

    let err = provider
        .fetch_candles("BTC-USD", end - ChronoDuration::hours(1), end, Granularity::OneHour)
        .await
        .unwrap_err();

    assert!(
        matches!(err, FeedError::Connection(_) | FeedError::Timeout(_)),
        "unexpected error: {:?}",
        err
    );
    assert!(err.is_retryable());
}
