use crate::models::Severity;
use serde::{Deserialize, Serialize};

/// Warning / critical boundaries for one rule kind. Both are inclusive.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SeverityThresholds {
    pub warning: f64,
    pub critical: f64,
}

/// Per-kind severity boundaries. Custom rules are always `Info`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SeverityConfig {
    /// Drop levels (negative percentages): `level <= critical` is critical
    pub monthly_high_drop: SeverityThresholds,
    /// Absolute daily change percentages
    pub daily_change: SeverityThresholds,
    /// Current volume divided by average volume
    pub volume_spike: SeverityThresholds,
}

impl Default for SeverityConfig {
    fn default() -> Self {
        Self {
            monthly_high_drop: SeverityThresholds {
                warning: -10.0,
                critical: -15.0,
            },
            daily_change: SeverityThresholds {
                warning: 5.0,
                critical: 10.0,
            },
            volume_spike: SeverityThresholds {
                warning: 5.0,
                critical: 10.0,
            },
        }
    }
}

impl SeverityConfig {
    /// Severity for a breached drop level
    pub fn for_drop(&self, level: f64) -> Severity {
        let t = self.monthly_high_drop;
        if level <= t.critical {
            Severity::Critical
        } else if level <= t.warning {
            Severity::Warning
        } else {
            Severity::Info
        }
    }

    /// Severity for a daily change percentage (sign ignored)
    pub fn for_change(&self, change_pct: f64) -> Severity {
        Self::ascending(self.daily_change, change_pct.abs())
    }

    /// Severity for a volume ratio
    pub fn for_volume_ratio(&self, ratio: f64) -> Severity {
        Self::ascending(self.volume_spike, ratio)
    }

    fn ascending(t: SeverityThresholds, magnitude: f64) -> Severity {
        if magnitude >= t.critical {
            Severity::Critical
        } else if magnitude >= t.warning {
            Severity::Warning
        } else {
            Severity::Info
        }
    }

    /// Check that each kind's boundaries are ordered sensibly
    pub fn validate(&self) -> Result<(), String> {
        let drop = self.monthly_high_drop;
        if !(drop.critical < drop.warning && drop.warning < 0.0) {
            return Err(format!(
                "monthly_high_drop severity requires critical < warning < 0 (got warning={}, critical={})",
                drop.warning, drop.critical
            ));
        }
        for (name, t) in [("daily_change", self.daily_change), ("volume_spike", self.volume_spike)] {
            if !(0.0 < t.warning && t.warning < t.critical) {
                return Err(format!(
                    "{} severity requires 0 < warning < critical (got warning={}, critical={})",
                    name, t.warning, t.critical
                ));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_drop_boundaries_inclusive() {
        let config = SeverityConfig::default();
        assert_eq!(config.for_drop(-5.0), Severity::Info);
        assert_eq!(config.for_drop(-9.99), Severity::Info);
        assert_eq!(config.for_drop(-10.0), Severity::Warning);
        assert_eq!(config.for_drop(-14.99), Severity::Warning);
        assert_eq!(config.for_drop(-15.0), Severity::Critical);
        assert_eq!(config.for_drop(-20.0), Severity::Critical);
    }

    #[test]
    fn test_change_boundaries_inclusive() {
        let config = SeverityConfig::default();
        assert_eq!(config.for_change(4.99), Severity::Info);
        assert_eq!(config.for_change(-5.0), Severity::Warning);
        assert_eq!(config.for_change(9.99), Severity::Warning);
        assert_eq!(config.for_change(-10.0), Severity::Critical);
    }

    #[test]
    fn test_volume_ratio_boundaries() {
        let config = SeverityConfig::default();
        assert_eq!(config.for_volume_ratio(4.2), Severity::Info);
        assert_eq!(config.for_volume_ratio(5.0), Severity::Warning);
        assert_eq!(config.for_volume_ratio(10.0), Severity::Critical);
    }

    #[test]
    fn test_validate() {
        assert!(SeverityConfig::default().validate().is_ok());

        let mut config = SeverityConfig::default();
        config.daily_change.critical = 2.0;
        assert!(config.validate().is_err());

        let mut config = SeverityConfig::default();
        config.monthly_high_drop.warning = 5.0;
        assert!(config.validate().is_err());
    }
}
