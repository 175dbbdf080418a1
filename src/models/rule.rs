use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::FromRow;

/// Kind of alert rule
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleKind {
    MonthlyHighDrop,
    DailyChange,
    VolumeSpike,
    Custom,
}

impl RuleKind {
    /// Convert from database string
    pub fn from_str(s: &str) -> Result<Self, String> {
        match s.to_lowercase().as_str() {
            "monthly_high_drop" => Ok(RuleKind::MonthlyHighDrop),
            "daily_change" => Ok(RuleKind::DailyChange),
            "volume_spike" => Ok(RuleKind::VolumeSpike),
            "custom" => Ok(RuleKind::Custom),
            _ => Err(format!("Unknown rule type: {}", s)),
        }
    }

    /// Convert to database string
    pub fn as_str(&self) -> &'static str {
        match self {
            RuleKind::MonthlyHighDrop => "monthly_high_drop",
            RuleKind::DailyChange => "daily_change",
            RuleKind::VolumeSpike => "volume_spike",
            RuleKind::Custom => "custom",
        }
    }
}

impl std::fmt::Display for RuleKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// User rule as stored: kind-specific parameters are an untyped JSONB blob
/// until they are validated by `rules::RuleDefinition::from_user_rule`.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct UserRule {
    pub id: i64,
    pub user_id: i64,
    pub rule_type: String,
    pub parameters: Value,
    pub enabled: bool,
    pub symbol_id: Option<i64>, // None = applies to every watched symbol
    pub created_at: DateTime<Utc>,
}

impl UserRule {
    /// Create a new in-memory UserRule
    pub fn new(id: i64, user_id: i64, kind: RuleKind, parameters: Value) -> Self {
        Self {
            id,
            user_id,
            rule_type: kind.as_str().to_string(),
            parameters,
            enabled: true,
            symbol_id: None,
            created_at: Utc::now(),
        }
    }

    /// Restrict the rule to a single symbol
    pub fn for_symbol(mut self, symbol_id: i64) -> Self {
        self.symbol_id = Some(symbol_id);
        self
    }

    /// Mark the rule disabled
    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    /// Get the rule kind as an enum
    pub fn kind(&self) -> Result<RuleKind, String> {
        RuleKind::from_str(&self.rule_type)
    }

    /// Check whether the rule applies to the given symbol
    pub fn applies_to(&self, symbol_id: i64) -> bool {
        self.symbol_id.map_or(true, |scoped| scoped == symbol_id)
    }
}
