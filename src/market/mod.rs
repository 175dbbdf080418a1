//! Market data access: the provider seam, the Yahoo chart client, the retry
//! wrapper and the exchange symbol directory.

pub mod retry;
pub mod symbols;
pub mod yahoo;

pub use retry::RetryingProvider;
pub use symbols::SymbolDirectory;
pub use yahoo::YahooProvider;

use crate::models::{MarketSnapshot, PriceHistory};
use async_trait::async_trait;
use thiserror::Error;

/// Errors from a market data source
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DataError {
    /// The ticker is unknown to the provider; retrying will not help
    #[error("No market data for {0}")]
    NotFound(String),

    /// Network failures, rate limits and upstream 5xx responses
    #[error("Transient market data error: {0}")]
    Transient(String),

    /// The provider answered but the payload was unusable
    #[error("Malformed market data: {0}")]
    Malformed(String),
}

impl DataError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, DataError::Transient(_))
    }
}

impl From<reqwest::Error> for DataError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            DataError::Malformed(err.to_string())
        } else {
            DataError::Transient(err.to_string())
        }
    }
}

/// Source of current snapshots and daily history
#[async_trait]
pub trait MarketDataProvider: Send + Sync {
    async fn fetch_snapshot(&self, ticker: &str) -> Result<MarketSnapshot, DataError>;

    /// Daily history covering at least the trailing `min_days` calendar days
    async fn fetch_history(&self, ticker: &str, min_days: u32) -> Result<PriceHistory, DataError>;
}

#[async_trait]
impl<P: MarketDataProvider + ?Sized> MarketDataProvider for std::sync::Arc<P> {
    async fn fetch_snapshot(&self, ticker: &str) -> Result<MarketSnapshot, DataError> {
        (**self).fetch_snapshot(ticker).await
    }

    async fn fetch_history(&self, ticker: &str, min_days: u32) -> Result<PriceHistory, DataError> {
        (**self).fetch_history(ticker, min_days).await
    }
}
