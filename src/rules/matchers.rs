//! One pure matcher per rule kind.
//!
//! Each maps `(parameters, snapshot, history)` to at most one [`Candidate`]
//! carrying its severity, message and discriminant. Matchers never touch
//! storage; deduplication happens afterwards in the gate.

use super::definition::{Direction, RuleParams};
use super::expression::{Bindings, ExpressionResult, Expression};
use super::severity::SeverityConfig;
use crate::models::{MarketSnapshot, PriceHistory, Severity};
use sha2::{Digest, Sha256};

/// Trailing window used for the `avg_volume_20` binding
pub const AVG_VOLUME_DAYS: usize = 20;

/// A rule that fired, before deduplication
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    pub severity: Severity,
    pub message: String,
    pub discriminant: i64,
}

/// Run the matcher for a rule's parameters.
///
/// Only custom rules can fail; built-in kinds return `Ok(None)` when the
/// inputs cannot support a decision (no history, zero previous close, zero
/// average volume).
pub fn evaluate_rule(
    params: &RuleParams,
    snapshot: &MarketSnapshot,
    history: &PriceHistory,
    severity: &SeverityConfig,
) -> ExpressionResult<Option<Candidate>> {
    let candidate = match params {
        RuleParams::MonthlyHighDrop { thresholds } => {
            monthly_high_drop(thresholds, snapshot, history, severity)
        }
        RuleParams::DailyChange {
            threshold,
            direction,
        } => daily_change(*threshold, *direction, snapshot, severity),
        RuleParams::VolumeSpike {
            multiplier,
            average_days,
        } => volume_spike(*multiplier, *average_days, snapshot, history, severity),
        RuleParams::Custom { name, condition } => return custom(name, condition, snapshot, history),
    };
    Ok(candidate)
}

/// Fires at the deepest threshold the drop from the monthly high has reached
pub fn monthly_high_drop(
    thresholds: &[f64],
    snapshot: &MarketSnapshot,
    history: &PriceHistory,
    severity: &SeverityConfig,
) -> Option<Candidate> {
    let monthly_high = history.monthly_high()?;
    if monthly_high <= 0.0 {
        return None;
    }

    let drop_pct = (snapshot.price - monthly_high) * 100.0 / monthly_high;
    let level = thresholds
        .iter()
        .copied()
        .filter(|threshold| drop_pct <= *threshold)
        .fold(None, |deepest: Option<f64>, t| Some(deepest.map_or(t, |d| d.min(t))))?;

    Some(Candidate {
        severity: severity.for_drop(level),
        message: format!(
            "{} is down {:.2}% from its monthly high of ${:.2} (now ${:.2}, past the {}% level)",
            snapshot.ticker,
            drop_pct.abs(),
            monthly_high,
            snapshot.price,
            level
        ),
        discriminant: level.round() as i64,
    })
}

pub fn daily_change(
    threshold: f64,
    direction: Direction,
    snapshot: &MarketSnapshot,
    severity: &SeverityConfig,
) -> Option<Candidate> {
    if snapshot.previous_close == 0.0 || !snapshot.previous_close.is_finite() {
        return None;
    }
    let change_pct = (snapshot.price - snapshot.previous_close) * 100.0 / snapshot.previous_close;

    let fires = match direction {
        Direction::Both => change_pct.abs() >= threshold,
        Direction::Up => change_pct >= threshold,
        Direction::Down => change_pct <= -threshold,
    };
    if !fires {
        return None;
    }

    let word = if change_pct >= 0.0 { "surged" } else { "dropped" };
    Some(Candidate {
        severity: severity.for_change(change_pct),
        message: format!(
            "{} {} {:+.2}% today (${:.2} -> ${:.2})",
            snapshot.ticker, word, change_pct, snapshot.previous_close, snapshot.price
        ),
        discriminant: threshold.round() as i64,
    })
}

pub fn volume_spike(
    multiplier: f64,
    average_days: usize,
    snapshot: &MarketSnapshot,
    history: &PriceHistory,
    severity: &SeverityConfig,
) -> Option<Candidate> {
    let avg_volume = history.average_volume(average_days);
    if avg_volume <= 0.0 {
        return None;
    }

    let volume = snapshot.volume as f64;
    if volume < avg_volume * multiplier {
        return None;
    }

    let ratio = volume / avg_volume;
    Some(Candidate {
        severity: severity.for_volume_ratio(ratio),
        message: format!(
            "{} volume spike: {:.2}x the {}-day average ({} vs {})",
            snapshot.ticker,
            ratio,
            average_days,
            format_volume(snapshot.volume),
            format_volume(avg_volume.round() as u64)
        ),
        discriminant: multiplier.floor() as i64,
    })
}

pub fn custom(
    name: &str,
    condition: &Expression,
    snapshot: &MarketSnapshot,
    history: &PriceHistory,
) -> ExpressionResult<Option<Candidate>> {
    if !condition.evaluate(&bindings(snapshot, history))? {
        return Ok(None);
    }

    Ok(Some(Candidate {
        severity: Severity::Info,
        message: format!(
            "{}: {} triggered ({}) at ${:.2}",
            snapshot.ticker,
            name,
            condition.source(),
            snapshot.price
        ),
        discriminant: condition_discriminant(condition.source()),
    }))
}

/// Bindings for custom conditions. Without history the monthly extremes
/// fall back to today's range.
pub fn bindings(snapshot: &MarketSnapshot, history: &PriceHistory) -> Bindings {
    let values = [
        ("price", snapshot.price),
        ("open", snapshot.open),
        ("high", snapshot.high),
        ("low", snapshot.low),
        ("close", snapshot.previous_close),
        ("volume", snapshot.volume as f64),
        ("avg_volume_20", history.average_volume(AVG_VOLUME_DAYS)),
        ("monthly_high", history.monthly_high().unwrap_or(snapshot.high)),
        ("monthly_low", history.monthly_low().unwrap_or(snapshot.low)),
        ("daily_change_pct", snapshot.daily_change_pct().unwrap_or(0.0)),
    ];
    values
        .into_iter()
        .map(|(name, value)| (name.to_string(), value))
        .collect()
}

/// Stable discriminant for a condition: editing the text starts a new alert class
pub fn condition_discriminant(condition: &str) -> i64 {
    let digest = Sha256::digest(condition.trim().as_bytes());
    let mut prefix = [0u8; 8];
    prefix.copy_from_slice(&digest[..8]);
    i64::from_be_bytes(prefix)
}

fn format_volume(volume: u64) -> String {
    let digits = volume.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }
    out
}
