//! Yahoo Finance chart API client.
//!
//! One `/v8/finance/chart/{ticker}` response carries both the regular
//! market quote (in `meta`) and the daily bars, so snapshot and history
//! share the same parser.

use super::{DataError, MarketDataProvider};
use crate::config::MarketDataConfig;
use crate::models::{DailyBar, MarketSnapshot, PriceHistory};
use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use reqwest::StatusCode;
use serde::Deserialize;
use tracing::debug;

#[derive(Debug, Deserialize)]
struct ChartEnvelope {
    chart: Chart,
}

#[derive(Debug, Deserialize)]
struct Chart {
    result: Option<Vec<ChartResult>>,
    error: Option<ChartError>,
}

#[derive(Debug, Deserialize)]
struct ChartError {
    code: String,
    description: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChartResult {
    meta: ChartMeta,
    #[serde(default)]
    timestamp: Vec<i64>,
    #[serde(default)]
    indicators: Indicators,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ChartMeta {
    symbol: Option<String>,
    regular_market_price: Option<f64>,
    previous_close: Option<f64>,
    chart_previous_close: Option<f64>,
    regular_market_day_high: Option<f64>,
    regular_market_day_low: Option<f64>,
    regular_market_volume: Option<u64>,
    regular_market_time: Option<i64>,
}

#[derive(Debug, Default, Deserialize)]
struct Indicators {
    #[serde(default)]
    quote: Vec<Quote>,
}

#[derive(Debug, Default, Deserialize)]
struct Quote {
    #[serde(default)]
    open: Vec<Option<f64>>,
    #[serde(default)]
    close: Vec<Option<f64>>,
    #[serde(default)]
    volume: Vec<Option<u64>>,
}

/// Market data from the public Yahoo Finance chart endpoint
pub struct YahooProvider {
    client: reqwest::Client,
    base_url: String,
}

impl YahooProvider {
    pub fn new(config: &MarketDataConfig) -> Result<Self, DataError> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout())
            .user_agent("Mozilla/5.0 (compatible; modo-alerts)")
            .build()
            .map_err(|e| DataError::Transient(e.to_string()))?;

        Ok(Self {
            client,
            base_url: config.base_url.clone(),
        })
    }

    async fn fetch_chart(&self, ticker: &str, query: &[(&str, String)]) -> Result<ChartResult, DataError> {
        let url = format!("{}/v8/finance/chart/{}", self.base_url, ticker);
        debug!(ticker, url = %url, "Fetching chart");

        let response = self.client.get(&url).query(query).send().await?;
        let status = response.status();
        let body = response.text().await?;

        classify_status(ticker, status, &body)?;
        parse_chart(ticker, &body)
    }
}

#[async_trait]
impl MarketDataProvider for YahooProvider {
    async fn fetch_snapshot(&self, ticker: &str) -> Result<MarketSnapshot, DataError> {
        let query = [("range", "5d".to_string()), ("interval", "1d".to_string())];
        let chart = self.fetch_chart(ticker, &query).await?;
        snapshot_from_chart(ticker, &chart)
    }

    async fn fetch_history(&self, ticker: &str, min_days: u32) -> Result<PriceHistory, DataError> {
        let now = Utc::now();
        let start = now - chrono::Duration::days(i64::from(min_days));
        let query = [
            ("period1", start.timestamp().to_string()),
            ("period2", now.timestamp().to_string()),
            ("interval", "1d".to_string()),
        ];
        let chart = self.fetch_chart(ticker, &query).await?;
        Ok(history_from_chart(ticker, &chart))
    }
}

/// Map HTTP status to the provider error taxonomy
fn classify_status(ticker: &str, status: StatusCode, body: &str) -> Result<(), DataError> {
    if status.is_success() {
        return Ok(());
    }
    if status == StatusCode::NOT_FOUND || body.contains("Not Found") {
        return Err(DataError::NotFound(ticker.to_string()));
    }
    if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
        return Err(DataError::Transient(format!("{} returned HTTP {}", ticker, status)));
    }
    Err(DataError::Malformed(format!("{} returned HTTP {}", ticker, status)))
}

fn parse_chart(ticker: &str, body: &str) -> Result<ChartResult, DataError> {
    let envelope: ChartEnvelope =
        serde_json::from_str(body).map_err(|e| DataError::Malformed(format!("{}: {}", ticker, e)))?;

    if let Some(error) = envelope.chart.error {
        if error.code == "Not Found" {
            return Err(DataError::NotFound(ticker.to_string()));
        }
        return Err(DataError::Malformed(format!(
            "{}: {} {}",
            ticker,
            error.code,
            error.description.unwrap_or_default()
        )));
    }

    envelope
        .chart
        .result
        .and_then(|results| results.into_iter().next())
        .ok_or_else(|| DataError::NotFound(ticker.to_string()))
}

fn snapshot_from_chart(ticker: &str, chart: &ChartResult) -> Result<MarketSnapshot, DataError> {
    let meta = &chart.meta;
    let quote = chart.indicators.quote.first();
    let last = |series: Option<&Vec<Option<f64>>>| series.and_then(|s| s.iter().rev().find_map(|v| *v));

    let price = meta
        .regular_market_price
        .or(meta.previous_close)
        .or_else(|| last(quote.map(|q| &q.close)))
        .filter(|p| p.is_finite())
        .ok_or_else(|| DataError::Malformed(format!("{}: no market price", ticker)))?;

    // Multi-day ranges omit previousClose and chartPreviousClose predates the range
    let prior_bar = quote.and_then(|q| q.close.iter().rev().filter_map(|v| *v).nth(1));
    let previous_close = meta
        .previous_close
        .or(prior_bar)
        .or(meta.chart_previous_close)
        .unwrap_or(price);

    let timestamp = meta
        .regular_market_time
        .and_then(|secs| Utc.timestamp_opt(secs, 0).single())
        .unwrap_or_else(Utc::now);

    Ok(MarketSnapshot {
        ticker: meta.symbol.clone().unwrap_or_else(|| ticker.to_string()),
        price,
        open: last(quote.map(|q| &q.open)).unwrap_or(price),
        high: meta.regular_market_day_high.unwrap_or(price),
        low: meta.regular_market_day_low.unwrap_or(price),
        previous_close,
        volume: meta
            .regular_market_volume
            .or_else(|| quote.and_then(|q| q.volume.iter().rev().find_map(|v| *v)))
            .unwrap_or(0),
        timestamp,
    })
}

/// Daily bars oldest to newest; days with no close are dropped
fn history_from_chart(ticker: &str, chart: &ChartResult) -> PriceHistory {
    let Some(quote) = chart.indicators.quote.first() else {
        return PriceHistory::new(ticker, Vec::new());
    };

    let bars = chart
        .timestamp
        .iter()
        .enumerate()
        .filter_map(|(i, secs)| {
            let close = quote.close.get(i).copied().flatten()?;
            let date: DateTime<Utc> = Utc.timestamp_opt(*secs, 0).single()?;
            Some(DailyBar {
                date: date.date_naive(),
                close,
                volume: quote.volume.get(i).copied().flatten().unwrap_or(0),
            })
        })
        .collect();

    PriceHistory::new(ticker, bars)
}

#[cfg(test)]
mod tests {
    use super::*;

    const CHART: &str = r#"{
        "chart": {
            "result": [{
                "meta": {
                    "symbol": "AAPL",
                    "regularMarketPrice": 175.5,
                    "previousClose": 173.25,
                    "chartPreviousClose": 170.0,
                    "regularMarketDayHigh": 176.0,
                    "regularMarketDayLow": 173.0,
                    "regularMarketVolume": 50000000,
                    "regularMarketTime": 1710532800
                },
                "timestamp": [1710250200, 1710336600, 1710423000, 1710509400],
                "indicators": {
                    "quote": [{
                        "open": [170.1, 171.0, null, 174.0],
                        "high": [171.0, 172.0, null, 176.0],
                        "low": [169.0, 170.5, null, 173.0],
                        "close": [170.5, 172.75, null, 175.5],
                        "volume": [40000000, 45000000, null, 50000000]
                    }]
                }
            }],
            "error": null
        }
    }"#;

    #[test]
    fn test_snapshot_from_chart() {
        let chart = parse_chart("AAPL", CHART).unwrap();
        let snapshot = snapshot_from_chart("AAPL", &chart).unwrap();

        assert_eq!(snapshot.ticker, "AAPL");
        assert_eq!(snapshot.price, 175.5);
        assert_eq!(snapshot.previous_close, 173.25);
        assert_eq!(snapshot.open, 174.0);
        assert_eq!(snapshot.high, 176.0);
        assert_eq!(snapshot.low, 173.0);
        assert_eq!(snapshot.volume, 50_000_000);
        assert_eq!(snapshot.timestamp.timestamp(), 1710532800);
    }

    #[test]
    fn test_previous_close_from_prior_bar() {
        let body = CHART.replace(r#""previousClose": 173.25,"#, "");
        let chart = parse_chart("AAPL", &body).unwrap();
        let snapshot = snapshot_from_chart("AAPL", &chart).unwrap();
        assert_eq!(snapshot.previous_close, 172.75);
    }

    #[test]
    fn test_history_skips_missing_days() {
        let chart = parse_chart("AAPL", CHART).unwrap();
        let history = history_from_chart("AAPL", &chart);

        assert_eq!(history.bars.len(), 3);
        assert_eq!(history.monthly_high(), Some(175.5));
        assert_eq!(history.monthly_low(), Some(170.5));
        assert!(history.bars.windows(2).all(|w| w[0].date < w[1].date));
    }

    #[test]
    fn test_not_found_payload() {
        let body = r#"{"chart":{"result":null,"error":{"code":"Not Found","description":"No data found, symbol may be delisted"}}}"#;
        assert_eq!(
            parse_chart("ZZZZ", body).unwrap_err(),
            DataError::NotFound("ZZZZ".to_string())
        );
        assert_eq!(
            classify_status("ZZZZ", StatusCode::NOT_FOUND, body).unwrap_err(),
            DataError::NotFound("ZZZZ".to_string())
        );
    }

    #[test]
    fn test_status_classification() {
        assert!(classify_status("AAPL", StatusCode::OK, "").is_ok());
        assert!(classify_status("AAPL", StatusCode::TOO_MANY_REQUESTS, "").unwrap_err().is_retryable());
        assert!(classify_status("AAPL", StatusCode::BAD_GATEWAY, "").unwrap_err().is_retryable());
        assert!(!classify_status("AAPL", StatusCode::BAD_REQUEST, "").unwrap_err().is_retryable());
    }

    #[test]
    fn test_malformed_body() {
        assert!(matches!(parse_chart("AAPL", "<html>"), Err(DataError::Malformed(_))));
    }

    #[test]
    fn test_price_falls_back_to_previous_close() {
        let body = r#"{"chart":{"result":[{"meta":{"previousClose":99.0}}],"error":null}}"#;
        let chart = parse_chart("X", body).unwrap();
        let snapshot = snapshot_from_chart("X", &chart).unwrap();
        assert_eq!(snapshot.price, 99.0);
        assert_eq!(snapshot.previous_close, 99.0);
        assert_eq!(snapshot.volume, 0);
        assert!(history_from_chart("X", &chart).is_empty());
    }
}
