use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Calendar days, counted back from the newest bar, treated as "the month"
pub const MONTHLY_WINDOW_DAYS: i64 = 30;

/// Point-in-time read of a symbol's current trading data
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketSnapshot {
    pub ticker: String,
    pub price: f64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub previous_close: f64,
    pub volume: u64,
    pub timestamp: DateTime<Utc>,
}

impl MarketSnapshot {
    /// Percentage change from the previous close, `None` when there is no usable close
    pub fn daily_change_pct(&self) -> Option<f64> {
        if self.previous_close == 0.0 || !self.previous_close.is_finite() {
            return None;
        }
        Some((self.price - self.previous_close) / self.previous_close * 100.0)
    }
}

/// One trading day of history
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyBar {
    pub date: NaiveDate,
    pub close: f64,
    pub volume: u64,
}

/// Trailing daily closes and volumes, ordered oldest to newest.
/// Missing days are simply absent.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct PriceHistory {
    pub ticker: String,
    pub bars: Vec<DailyBar>,
}

impl PriceHistory {
    pub fn new(ticker: impl Into<String>, bars: Vec<DailyBar>) -> Self {
        Self {
            ticker: ticker.into(),
            bars,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.bars.is_empty()
    }

    fn trailing(&self, count: usize) -> &[DailyBar] {
        let start = self.bars.len().saturating_sub(count);
        &self.bars[start..]
    }

    /// Bars dated within the month ending at the newest bar. Longer
    /// histories fetched for volume averages do not widen it.
    fn month(&self) -> &[DailyBar] {
        let Some(newest) = self.bars.last().map(|bar| bar.date) else {
            return &[];
        };
        let cutoff = newest - chrono::Duration::days(MONTHLY_WINDOW_DAYS);
        let start = self.bars.partition_point(|bar| bar.date <= cutoff);
        &self.bars[start..]
    }

    /// Highest close over the trailing month
    pub fn monthly_high(&self) -> Option<f64> {
        self.month()
            .iter()
            .map(|bar| bar.close)
            .filter(|close| close.is_finite())
            .fold(None, |acc: Option<f64>, close| {
                Some(acc.map_or(close, |high| high.max(close)))
            })
    }

    /// Lowest close over the trailing month
    pub fn monthly_low(&self) -> Option<f64> {
        self.month()
            .iter()
            .map(|bar| bar.close)
            .filter(|close| close.is_finite())
            .fold(None, |acc: Option<f64>, close| {
                Some(acc.map_or(close, |low| low.min(close)))
            })
    }

    /// Mean volume over the trailing `days` entries (fewer if history is shorter)
    pub fn average_volume(&self, days: usize) -> f64 {
        let window = self.trailing(days);
        if window.is_empty() {
            return 0.0;
        }
        let total: f64 = window.iter().map(|bar| bar.volume as f64).sum();
        total / window.len() as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn history(closes: &[f64], volumes: &[u64]) -> PriceHistory {
        let start = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        let bars = closes
            .iter()
            .zip(volumes)
            .enumerate()
            .map(|(i, (close, volume))| DailyBar {
                date: start + chrono::Duration::days(i as i64),
                close: *close,
                volume: *volume,
            })
            .collect();
        PriceHistory::new("TEST", bars)
    }

    #[test]
    fn test_monthly_high_uses_trailing_window() {
        let mut closes = vec![500.0];
        closes.extend(std::iter::repeat(100.0).take(30));
        let volumes = vec![1; closes.len()];
        let history = history(&closes, &volumes);

        // The 500 close is 30 days before the newest bar and falls outside the window
        assert_eq!(history.monthly_high(), Some(100.0));
    }

    #[test]
    fn test_month_ignores_older_bars_fetched_for_averages() {
        let mut closes = vec![300.0; 60];
        closes.extend(std::iter::repeat(100.0).take(40));
        let volumes = vec![1_000; closes.len()];
        let history = history(&closes, &volumes);

        assert_eq!(history.monthly_high(), Some(100.0));
        assert_eq!(history.monthly_low(), Some(100.0));
        assert_eq!(history.average_volume(60), 1_000.0);
    }

    #[test]
    fn test_empty_history_has_no_extremes() {
        let history = PriceHistory::new("TEST", vec![]);
        assert_eq!(history.monthly_high(), None);
        assert_eq!(history.monthly_low(), None);
        assert_eq!(history.average_volume(20), 0.0);
    }

    #[test]
    fn test_average_volume_short_history() {
        let history = history(&[1.0, 2.0], &[10, 30]);
        assert_eq!(history.average_volume(20), 20.0);
        assert_eq!(history.average_volume(1), 30.0);
    }

    #[test]
    fn test_daily_change_pct() {
        let snapshot = MarketSnapshot {
            ticker: "TEST".to_string(),
            price: 94.0,
            open: 99.0,
            high: 100.0,
            low: 93.0,
            previous_close: 100.0,
            volume: 1,
            timestamp: Utc::now(),
        };
        assert_eq!(snapshot.daily_change_pct(), Some(-6.0));

        let zero = MarketSnapshot {
            previous_close: 0.0,
            ..snapshot
        };
        assert_eq!(zero.daily_change_pct(), None);
    }
}
