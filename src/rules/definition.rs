use super::expression::{Expression, ExpressionError};
use crate::models::{RuleKind, UserRule};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashSet;
use thiserror::Error;

/// Errors raised while validating stored rule parameters.
/// A rule that fails validation is treated as disabled.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RuleConfigError {
    #[error("Unknown rule type: {0}")]
    UnknownKind(String),

    #[error("Invalid parameters for {kind} rule: {message}")]
    InvalidParameters { kind: RuleKind, message: String },

    #[error("Invalid custom condition: {0}")]
    InvalidCondition(#[from] ExpressionError),
}

fn invalid(kind: RuleKind, message: impl Into<String>) -> RuleConfigError {
    RuleConfigError::InvalidParameters {
        kind,
        message: message.into(),
    }
}

/// Price direction a daily change rule watches
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Up,
    Down,
    #[default]
    Both,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Up => "up",
            Direction::Down => "down",
            Direction::Both => "both",
        }
    }
}

fn default_thresholds() -> Vec<f64> {
    vec![-5.0, -10.0, -15.0, -20.0]
}

fn default_daily_threshold() -> f64 {
    5.0
}

fn default_multiplier() -> f64 {
    3.0
}

fn default_average_days() -> i64 {
    20
}

/// Longest volume average a rule may ask for, about one trading year
pub const MAX_AVERAGE_DAYS: i64 = 250;

fn default_custom_name() -> String {
    "Custom Rule".to_string()
}

#[derive(Deserialize)]
struct MonthlyHighDropParams {
    #[serde(default = "default_thresholds")]
    thresholds: Vec<f64>,
}

#[derive(Deserialize)]
struct DailyChangeParams {
    #[serde(default = "default_daily_threshold")]
    threshold: f64,
    #[serde(default)]
    direction: Direction,
}

#[derive(Deserialize)]
struct VolumeSpikeParams {
    #[serde(default = "default_multiplier")]
    multiplier: f64,
    #[serde(default = "default_average_days")]
    average_days: i64,
}

#[derive(Deserialize)]
struct CustomParams {
    #[serde(default = "default_custom_name")]
    name: String,
    condition: Option<String>,
}

/// Validated, kind-specific rule parameters
#[derive(Debug, Clone, PartialEq)]
pub enum RuleParams {
    /// Thresholds are negative percentages, sorted deepest first
    MonthlyHighDrop { thresholds: Vec<f64> },
    DailyChange { threshold: f64, direction: Direction },
    VolumeSpike { multiplier: f64, average_days: usize },
    Custom { name: String, condition: Expression },
}

impl RuleParams {
    /// Validate a stored JSON parameter blob against the kind's schema
    pub fn from_json(kind: RuleKind, parameters: &Value) -> Result<Self, RuleConfigError> {
        let parameters = if parameters.is_null() {
            Value::Object(Default::default())
        } else {
            parameters.clone()
        };

        match kind {
            RuleKind::MonthlyHighDrop => {
                let raw: MonthlyHighDropParams = serde_json::from_value(parameters)
                    .map_err(|e| invalid(kind, e.to_string()))?;
                Self::monthly_high_drop(raw.thresholds)
            }
            RuleKind::DailyChange => {
                let raw: DailyChangeParams = serde_json::from_value(parameters)
                    .map_err(|e| invalid(kind, e.to_string()))?;
                Self::daily_change(raw.threshold, raw.direction)
            }
            RuleKind::VolumeSpike => {
                let raw: VolumeSpikeParams = serde_json::from_value(parameters)
                    .map_err(|e| invalid(kind, e.to_string()))?;
                Self::volume_spike(raw.multiplier, raw.average_days)
            }
            RuleKind::Custom => {
                let raw: CustomParams = serde_json::from_value(parameters)
                    .map_err(|e| invalid(kind, e.to_string()))?;
                let condition = raw
                    .condition
                    .ok_or_else(|| invalid(kind, "missing field `condition`"))?;
                Self::custom(raw.name, &condition)
            }
        }
    }

    pub fn monthly_high_drop(mut thresholds: Vec<f64>) -> Result<Self, RuleConfigError> {
        let kind = RuleKind::MonthlyHighDrop;
        if thresholds.is_empty() {
            return Err(invalid(kind, "at least one threshold is required"));
        }
        if let Some(bad) = thresholds.iter().find(|t| !t.is_finite() || **t >= 0.0) {
            return Err(invalid(kind, format!("threshold {} must be a negative percentage", bad)));
        }

        // Thresholds double as discriminants, so they must stay distinct once rounded
        let mut seen = HashSet::new();
        for threshold in &thresholds {
            if !seen.insert(threshold.round() as i64) {
                return Err(invalid(kind, format!("duplicate threshold {}", threshold)));
            }
        }

        thresholds.sort_by(|a, b| a.total_cmp(b));
        Ok(RuleParams::MonthlyHighDrop { thresholds })
    }

    pub fn daily_change(threshold: f64, direction: Direction) -> Result<Self, RuleConfigError> {
        if !threshold.is_finite() || threshold <= 0.0 {
            return Err(invalid(
                RuleKind::DailyChange,
                format!("threshold {} must be a positive percentage", threshold),
            ));
        }
        Ok(RuleParams::DailyChange {
            threshold,
            direction,
        })
    }

    pub fn volume_spike(multiplier: f64, average_days: i64) -> Result<Self, RuleConfigError> {
        let kind = RuleKind::VolumeSpike;
        if !multiplier.is_finite() || multiplier <= 0.0 {
            return Err(invalid(kind, format!("multiplier {} must be positive", multiplier)));
        }
        if !(1..=MAX_AVERAGE_DAYS).contains(&average_days) {
            return Err(invalid(
                kind,
                format!("average_days {} must be between 1 and {}", average_days, MAX_AVERAGE_DAYS),
            ));
        }
        Ok(RuleParams::VolumeSpike {
            multiplier,
            average_days: average_days as usize,
        })
    }

    pub fn custom(name: impl Into<String>, condition: &str) -> Result<Self, RuleConfigError> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(invalid(RuleKind::Custom, "name cannot be empty"));
        }
        let condition = Expression::compile(condition)?;
        Ok(RuleParams::Custom { name, condition })
    }

    pub fn kind(&self) -> RuleKind {
        match self {
            RuleParams::MonthlyHighDrop { .. } => RuleKind::MonthlyHighDrop,
            RuleParams::DailyChange { .. } => RuleKind::DailyChange,
            RuleParams::VolumeSpike { .. } => RuleKind::VolumeSpike,
            RuleParams::Custom { .. } => RuleKind::Custom,
        }
    }

    /// Short human readable description, used in status reports
    pub fn describe(&self) -> String {
        match self {
            RuleParams::MonthlyHighDrop { thresholds } => {
                let levels: Vec<String> = thresholds.iter().rev().map(|t| format!("{}%", t)).collect();
                format!("Monthly High Drop: {}", levels.join(", "))
            }
            RuleParams::DailyChange {
                threshold,
                direction,
            } => format!("Daily Change: ±{}% ({})", threshold, direction.as_str()),
            RuleParams::VolumeSpike {
                multiplier,
                average_days,
            } => format!("Volume Spike: {}x {}-day avg", multiplier, average_days),
            RuleParams::Custom { name, condition } => format!("{}: {}", name, condition.source()),
        }
    }
}

/// A stored rule whose parameters passed validation
#[derive(Debug, Clone, PartialEq)]
pub struct RuleDefinition {
    pub id: i64,
    pub user_id: i64,
    pub symbol_id: Option<i64>,
    pub params: RuleParams,
}

impl RuleDefinition {
    pub fn from_user_rule(rule: &UserRule) -> Result<Self, RuleConfigError> {
        let kind = rule.kind().map_err(|_| RuleConfigError::UnknownKind(rule.rule_type.clone()))?;
        let params = RuleParams::from_json(kind, &rule.parameters)?;
        Ok(Self {
            id: rule.id,
            user_id: rule.user_id,
            symbol_id: rule.symbol_id,
            params,
        })
    }

    pub fn kind(&self) -> RuleKind {
        self.params.kind()
    }

    pub fn applies_to(&self, symbol_id: i64) -> bool {
        self.symbol_id.map_or(true, |scoped| scoped == symbol_id)
    }
}

/// Outcome of validating a user's stored rules
#[derive(Debug, Default)]
pub struct RuleSet {
    /// Valid, enabled rules in stored definition order
    pub rules: Vec<RuleDefinition>,
    /// Rules degraded to disabled because their parameters are invalid
    pub rejected: Vec<(i64, RuleConfigError)>,
}

impl RuleSet {
    /// Validate stored rules once at load time. Disabled rows are dropped
    /// silently, invalid ones are reported and never evaluated.
    pub fn compile(rules: &[UserRule]) -> Self {
        let mut set = RuleSet::default();
        for rule in rules.iter().filter(|r| r.enabled) {
            match RuleDefinition::from_user_rule(rule) {
                Ok(definition) => set.rules.push(definition),
                Err(e) => set.rejected.push((rule.id, e)),
            }
        }
        set
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Rules that apply to a symbol, in definition order
    pub fn for_symbol(&self, symbol_id: i64) -> impl Iterator<Item = &RuleDefinition> {
        self.rules.iter().filter(move |r| r.applies_to(symbol_id))
    }
}
