use crate::models::{Alert, AlertRecord, DedupKey};
use chrono::{DateTime, Duration, Utc};
use std::collections::HashSet;

/// Cooldown gate over delivered alert history.
///
/// An alert is admitted unless a record with the same dedup key was sent
/// less than `cooldown` ago. Exactly `cooldown` after the last send, it is
/// admitted again.
#[derive(Debug, Clone, Copy)]
pub struct DedupGate {
    cooldown: Duration,
}

impl DedupGate {
    pub fn new(cooldown: Duration) -> Self {
        Self { cooldown }
    }

    pub fn cooldown(&self) -> Duration {
        self.cooldown
    }

    /// Oldest `sent_at` that can still suppress an alert at `now`
    pub fn window_start(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        now - self.cooldown
    }

    pub fn admit(&self, alert: &Alert, recent: &[AlertRecord], now: DateTime<Utc>) -> bool {
        let key = alert.dedup_key();
        !recent
            .iter()
            .any(|record| record.matches(&key) && now - record.sent_at < self.cooldown)
    }
}

impl Default for DedupGate {
    fn default() -> Self {
        Self::new(Duration::hours(24))
    }
}

/// Keys admitted so far within one (user, symbol) evaluation
#[derive(Debug, Default)]
pub struct PassKeys {
    seen: HashSet<DedupKey>,
}

impl PassKeys {
    /// Returns false if the key was already admitted in this pass
    pub fn claim(&mut self, key: DedupKey) -> bool {
        self.seen.insert(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{RuleKind, Severity};
    use chrono::TimeZone;

    fn alert(discriminant: i64, at: DateTime<Utc>) -> Alert {
        Alert {
            user_id: 1,
            symbol_id: 10,
            ticker: "AAPL".to_string(),
            rule_id: 5,
            rule_kind: RuleKind::MonthlyHighDrop,
            severity: Severity::Warning,
            message: "AAPL is down".to_string(),
            discriminant,
            current_price: 82.0,
            triggered_at: at,
        }
    }

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 15, 14, 0, 0).unwrap()
    }

    #[test]
    fn test_cooldown_window() {
        let gate = DedupGate::default();
        let history = vec![AlertRecord::delivered(&alert(-10, t0()), t0())];

        let at = |hours| t0() + Duration::hours(hours);
        assert!(!gate.admit(&alert(-10, at(23)), &history, at(23)));
        assert!(gate.admit(&alert(-10, at(25)), &history, at(25)));
        assert!(gate.admit(&alert(-10, at(24)), &history, at(24)));
    }

    #[test]
    fn test_other_discriminant_is_independent() {
        let gate = DedupGate::default();
        let history = vec![AlertRecord::delivered(&alert(-10, t0()), t0())];
        let later = t0() + Duration::hours(1);

        assert!(gate.admit(&alert(-20, later), &history, later));
    }

    #[test]
    fn test_empty_history_admits() {
        assert!(DedupGate::default().admit(&alert(-5, t0()), &[], t0()));
    }

    #[test]
    fn test_pass_keys() {
        let mut keys = PassKeys::default();
        let key = alert(-10, t0()).dedup_key();
        assert!(keys.claim(key));
        assert!(!keys.claim(key));
    }
}
