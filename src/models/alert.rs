use super::rule::RuleKind;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Alert severity, ordered from least to most urgent
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warning,
    Critical,
}

impl Severity {
    /// Convert from database string
    pub fn from_str(s: &str) -> Result<Self, String> {
        match s.to_lowercase().as_str() {
            "info" => Ok(Severity::Info),
            "warning" => Ok(Severity::Warning),
            "critical" => Ok(Severity::Critical),
            _ => Err(format!("Invalid severity: {}", s)),
        }
    }

    /// Convert to database string
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Info => "info",
            Severity::Warning => "warning",
            Severity::Critical => "critical",
        }
    }
}

/// Deduplication key: alerts sharing a key share one cooldown clock
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DedupKey {
    pub user_id: i64,
    pub symbol_id: i64,
    pub rule_kind: RuleKind,
    pub discriminant: i64,
}

impl DedupKey {
    /// Stable textual form, used as the advisory lock key in storage
    pub fn lock_key(&self) -> String {
        format!(
            "alert:{}:{}:{}:{}",
            self.user_id,
            self.symbol_id,
            self.rule_kind.as_str(),
            self.discriminant
        )
    }
}

/// An alert produced by one evaluation pass. Never mutated after creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    pub user_id: i64,
    pub symbol_id: i64,
    pub ticker: String,
    pub rule_id: i64,
    pub rule_kind: RuleKind,
    pub severity: Severity,
    pub message: String,
    /// Distinguishes independent sub-triggers of the same rule
    pub discriminant: i64,
    pub current_price: f64,
    pub triggered_at: DateTime<Utc>,
}

impl Alert {
    pub fn dedup_key(&self) -> DedupKey {
        DedupKey {
            user_id: self.user_id,
            symbol_id: self.symbol_id,
            rule_kind: self.rule_kind,
            discriminant: self.discriminant,
        }
    }
}

/// Alert history entry, written once an alert has been delivered
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct AlertRecord {
    pub id: i64,
    pub user_id: i64,
    pub symbol_id: i64,
    pub rule_id: Option<i64>,
    pub rule_type: String,
    pub discriminant: i64,
    pub severity: String,
    pub message: String,
    pub current_price: f64,
    pub triggered_at: DateTime<Utc>,
    pub sent_at: DateTime<Utc>,
}

impl AlertRecord {
    /// Build the history entry for a delivered alert (id is assigned by storage)
    pub fn delivered(alert: &Alert, sent_at: DateTime<Utc>) -> Self {
        Self {
            id: 0,
            user_id: alert.user_id,
            symbol_id: alert.symbol_id,
            rule_id: Some(alert.rule_id),
            rule_type: alert.rule_kind.as_str().to_string(),
            discriminant: alert.discriminant,
            severity: alert.severity.as_str().to_string(),
            message: alert.message.clone(),
            current_price: alert.current_price,
            triggered_at: alert.triggered_at,
            sent_at,
        }
    }

    /// Check whether this record belongs to the given dedup key
    /// Key of the stored record; fails on an unknown `rule_type`
    pub fn dedup_key(&self) -> Result<DedupKey, String> {
        Ok(DedupKey {
            user_id: self.user_id,
            symbol_id: self.symbol_id,
            rule_kind: RuleKind::from_str(&self.rule_type)?,
            discriminant: self.discriminant,
        })
    }

    pub fn matches(&self, key: &DedupKey) -> bool {
        self.user_id == key.user_id
            && self.symbol_id == key.symbol_id
            && self.rule_type == key.rule_kind.as_str()
            && self.discriminant == key.discriminant
    }
}
