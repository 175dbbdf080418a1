use super::{DataError, MarketDataProvider};
use crate::config::MarketDataConfig;
use crate::models::{MarketSnapshot, PriceHistory};
use async_trait::async_trait;
use std::future::Future;
use std::time::Duration;
use tracing::warn;

/// Retries transient provider failures with exponential backoff.
///
/// `NotFound` and `Malformed` are returned immediately.
pub struct RetryingProvider<P> {
    inner: P,
    max_retries: u32,
    base_delay: Duration,
}

impl<P: MarketDataProvider> RetryingProvider<P> {
    pub fn new(inner: P) -> Self {
        Self {
            inner,
            max_retries: 3,
            base_delay: Duration::from_secs(1),
        }
    }

    pub fn from_config(inner: P, config: &MarketDataConfig) -> Self {
        Self::new(inner)
            .with_max_retries(config.max_retries)
            .with_base_delay(config.retry_delay())
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_base_delay(mut self, base_delay: Duration) -> Self {
        self.base_delay = base_delay;
        self
    }

    /// Delay before retry number `attempt` (0-based): base, 2x base, 4x base...
    fn backoff(&self, attempt: u32) -> Duration {
        self.base_delay.saturating_mul(2u32.saturating_pow(attempt))
    }

    async fn with_retries<T, F, Fut>(&self, ticker: &str, operation: &str, mut call: F) -> Result<T, DataError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, DataError>>,
    {
        let mut attempt = 0;
        loop {
            match call().await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_retryable() && attempt < self.max_retries => {
                    let delay = self.backoff(attempt);
                    warn!(
                        ticker,
                        operation,
                        attempt = attempt + 1,
                        max_retries = self.max_retries,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Retrying market data request"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

#[async_trait]
impl<P: MarketDataProvider> MarketDataProvider for RetryingProvider<P> {
    async fn fetch_snapshot(&self, ticker: &str) -> Result<MarketSnapshot, DataError> {
        self.with_retries(ticker, "snapshot", || self.inner.fetch_snapshot(ticker))
            .await
    }

    async fn fetch_history(&self, ticker: &str, min_days: u32) -> Result<PriceHistory, DataError> {
        self.with_retries(ticker, "history", || self.inner.fetch_history(ticker, min_days))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;

    /// Fails with the scripted errors in order, then succeeds
    struct Flaky {
        errors: Mutex<Vec<DataError>>,
        calls: AtomicU32,
    }

    impl Flaky {
        fn new(mut errors: Vec<DataError>) -> Self {
            errors.reverse();
            Self {
                errors: Mutex::new(errors),
                calls: AtomicU32::new(0),
            }
        }
    }

    #[async_trait]
    impl MarketDataProvider for Flaky {
        async fn fetch_snapshot(&self, ticker: &str) -> Result<MarketSnapshot, DataError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if let Some(e) = self.errors.lock().unwrap().pop() {
                return Err(e);
            }
            Ok(MarketSnapshot {
                ticker: ticker.to_string(),
                price: 1.0,
                open: 1.0,
                high: 1.0,
                low: 1.0,
                previous_close: 1.0,
                volume: 1,
                timestamp: Utc::now(),
            })
        }

        async fn fetch_history(&self, ticker: &str, _min_days: u32) -> Result<PriceHistory, DataError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if let Some(e) = self.errors.lock().unwrap().pop() {
                return Err(e);
            }
            Ok(PriceHistory::new(ticker, vec![]))
        }
    }

    fn transient() -> DataError {
        DataError::Transient("HTTP 503".to_string())
    }

    #[tokio::test]
    async fn test_recovers_after_transient_errors() {
        let provider = RetryingProvider::new(Flaky::new(vec![transient(), transient()]))
            .with_base_delay(Duration::from_millis(1));

        assert!(provider.fetch_snapshot("AAPL").await.is_ok());
        assert_eq!(provider.inner.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_gives_up_after_max_retries() {
        let provider = RetryingProvider::new(Flaky::new(vec![transient(); 5]))
            .with_base_delay(Duration::from_millis(1));

        let err = provider.fetch_history("AAPL", 30).await.unwrap_err();
        assert!(err.is_retryable());
        assert_eq!(provider.inner.calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn test_not_found_is_not_retried() {
        let provider = RetryingProvider::new(Flaky::new(vec![DataError::NotFound("ZZZZ".to_string())]))
            .with_base_delay(Duration::from_millis(1));

        let err = provider.fetch_snapshot("ZZZZ").await.unwrap_err();
        assert_eq!(err, DataError::NotFound("ZZZZ".to_string()));
        assert_eq!(provider.inner.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_backoff_doubles() {
        let provider = RetryingProvider::new(Flaky::new(vec![])).with_base_delay(Duration::from_millis(100));
        assert_eq!(provider.backoff(0), Duration::from_millis(100));
        assert_eq!(provider.backoff(1), Duration::from_millis(200));
        assert_eq!(provider.backoff(2), Duration::from_millis(400));
    }
}
