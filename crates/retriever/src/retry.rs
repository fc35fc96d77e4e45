use cohida_core::config::RetryConfig;
use cohida_core::market::error::FeedError;
use std::future::Future;
use std::time::Duration;
use tracing::warn;

/// # Summary
/// 单次接口调用的有界重试策略。
///
/// # Invariants
/// - 第 n 次失败后的等待为 `min(base * 2^(n-1), max)`。
/// - 只重试 `FeedError::is_retryable` 为真的错误，其余立即返回。
/// - 总尝试次数至少为 1。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    max_attempts: u32,
    base_delay: Duration,
    max_delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
            max_delay,
        }
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// 第 `attempt` 次（从 1 开始）失败后的退避时长。
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(31);
        self.base_delay
            .saturating_mul(1u32 << exp)
            .min(self.max_delay)
    }
}

impl From<&RetryConfig> for RetryPolicy {
    fn from(config: &RetryConfig) -> Self {
        Self::new(
            config.max_attempts,
            Duration::from_millis(config.base_delay_ms),
            Duration::from_millis(config.max_delay_ms),
        )
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from(&RetryConfig::default())
    }
}

/// # Summary
/// 按策略执行异步操作，失败时指数退避重试。
///
/// # Logic
/// 1. 执行 `op`，成功立即返回。
/// 2. 可重试错误且未用尽次数时，记录告警、等待退避时长后再次执行。
/// 3. 不可重试错误或次数用尽时返回最后一次的错误。
///
/// # Arguments
/// * `policy` - 重试策略。
/// * `label` - 日志中标识该操作的描述。
/// * `op` - 每次调用产生一个新 Future 的闭包。
pub async fn with_retry<T, F, Fut>(
    policy: &RetryPolicy,
    label: &str,
    mut op: F,
) -> Result<T, FeedError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, FeedError>>,
{
    let mut attempt = 1;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) if e.is_retryable() && attempt < policy.max_attempts => {
                let delay = policy.delay_for(attempt);
                warn!(
                    "{} failed (attempt {}/{}): {}; retrying in {:?}",
                    label, attempt, policy.max_attempts, e, delay
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn test_backoff_doubles_and_caps() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_attempts(), 3);
        assert_eq!(policy.delay_for(1), Duration::from_secs(2));
        assert_eq!(policy.delay_for(2), Duration::from_secs(4));
        assert_eq!(policy.delay_for(3), Duration::from_secs(8));
        assert_eq!(policy.delay_for(4), Duration::from_secs(10));
        assert_eq!(policy.delay_for(100), Duration::from_secs(10));
    }

    #[test]
    fn test_zero_attempts_means_one() {
        let policy = RetryPolicy::new(0, Duration::ZERO, Duration::ZERO);
        assert_eq!(policy.max_attempts(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retries_transient_errors_until_success() {
        let calls = AtomicU32::new(0);
        let counter = &calls;
        let result = with_retry(&RetryPolicy::default(), "fetch", move || async move {
            if counter.fetch_add(1, Ordering::SeqCst) < 2 {
                Err(FeedError::Timeout("slow".into()))
            } else {
                Ok(7)
            }
        })
        .await;
        assert_eq!(result, Ok(7));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_gives_up_after_max_attempts() {
        let calls = AtomicU32::new(0);
        let counter = &calls;
        let result: Result<(), _> = with_retry(&RetryPolicy::default(), "fetch", move || async move {
            counter.fetch_add(1, Ordering::SeqCst);
            Err(FeedError::Connection("reset".into()))
        })
        .await;
        assert_eq!(result, Err(FeedError::Connection("reset".into())));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_non_retryable_fails_fast() {
        let calls = AtomicU32::new(0);
        let counter = &calls;
        let result: Result<(), _> = with_retry(&RetryPolicy::default(), "fetch", move || async move {
            counter.fetch_add(1, Ordering::SeqCst);
            Err(FeedError::NotFound("BTC-XYZ".into()))
        })
        .await;
        assert!(matches!(result, Err(FeedError::NotFound(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
