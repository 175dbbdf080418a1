use super::AlertStore;
use crate::error::RepositoryError;
use crate::models::{AlertRecord, DedupKey, Symbol, User, UserRule};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

#[derive(Default)]
struct Inner {
    users: Vec<User>,
    watchlists: HashMap<i64, Vec<Symbol>>,
    rules: HashMap<i64, Vec<UserRule>>,
    records: Vec<AlertRecord>,
    failing_users: HashSet<i64>,
    next_record_id: i64,
}

/// Process-local store for tests and dry runs
#[derive(Default)]
pub struct InMemoryStore {
    inner: Mutex<Inner>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Inner>, RepositoryError> {
        self.inner
            .lock()
            .map_err(|_| RepositoryError::InvalidInput("in-memory store poisoned".to_string()))
    }

    pub fn add_user(&self, user: User) {
        if let Ok(mut inner) = self.lock() {
            inner.users.push(user);
        }
    }

    pub fn watch(&self, user_id: i64, symbol: Symbol) {
        if let Ok(mut inner) = self.lock() {
            inner.watchlists.entry(user_id).or_default().push(symbol);
        }
    }

    pub fn add_rule(&self, rule: UserRule) {
        if let Ok(mut inner) = self.lock() {
            inner.rules.entry(rule.user_id).or_default().push(rule);
        }
    }

    /// Make every read for this user fail
    pub fn fail_user(&self, user_id: i64) {
        if let Ok(mut inner) = self.lock() {
            inner.failing_users.insert(user_id);
        }
    }

    /// Seed history as if an alert had been delivered earlier
    pub fn insert_record(&self, record: AlertRecord) {
        if let Ok(mut inner) = self.lock() {
            inner.next_record_id += 1;
            let id = inner.next_record_id;
            inner.records.push(AlertRecord { id, ..record });
        }
    }

    pub fn records(&self) -> Vec<AlertRecord> {
        self.lock().map(|inner| inner.records.clone()).unwrap_or_default()
    }

    fn check_user(inner: &Inner, user_id: i64) -> Result<(), RepositoryError> {
        if inner.failing_users.contains(&user_id) {
            return Err(RepositoryError::InvalidInput(format!(
                "storage unavailable for user {}",
                user_id
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl AlertStore for InMemoryStore {
    async fn list_enabled_users(&self) -> Result<Vec<User>, RepositoryError> {
        let inner = self.lock()?;
        let mut users: Vec<User> = inner.users.iter().filter(|u| u.enabled).cloned().collect();
        users.sort_by_key(|u| u.id);
        Ok(users)
    }

    async fn load_watchlist(&self, user_id: i64) -> Result<Vec<Symbol>, RepositoryError> {
        let inner = self.lock()?;
        Self::check_user(&inner, user_id)?;
        Ok(inner.watchlists.get(&user_id).cloned().unwrap_or_default())
    }

    async fn load_enabled_rules(&self, user_id: i64) -> Result<Vec<UserRule>, RepositoryError> {
        let inner = self.lock()?;
        Self::check_user(&inner, user_id)?;
        let mut rules: Vec<UserRule> = inner
            .rules
            .get(&user_id)
            .map(|rules| rules.iter().filter(|r| r.enabled).cloned().collect())
            .unwrap_or_default();
        rules.sort_by_key(|r| r.id);
        Ok(rules)
    }

    async fn load_recent_alerts(
        &self,
        key: &DedupKey,
        since: DateTime<Utc>,
    ) -> Result<Vec<AlertRecord>, RepositoryError> {
        let inner = self.lock()?;
        Ok(inner
            .records
            .iter()
            .filter(|r| r.matches(key) && r.sent_at >= since)
            .cloned()
            .collect())
    }

    async fn append_alert_record(
        &self,
        record: &AlertRecord,
        cooldown: Duration,
    ) -> Result<Option<AlertRecord>, RepositoryError> {
        let mut inner = self.lock()?;
        let key = record.dedup_key().map_err(RepositoryError::InvalidInput)?;
        let window_start = record.sent_at - cooldown;
        if inner
            .records
            .iter()
            .any(|r| r.matches(&key) && r.sent_at > window_start)
        {
            return Ok(None);
        }

        inner.next_record_id += 1;
        let stored = AlertRecord {
            id: inner.next_record_id,
            ..record.clone()
        };
        inner.records.push(stored.clone());
        Ok(Some(stored))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Alert, RuleKind, Severity};

    fn record(discriminant: i64, sent_at: DateTime<Utc>) -> AlertRecord {
        let alert = Alert {
            user_id: 1,
            symbol_id: 2,
            ticker: "AAPL".to_string(),
            rule_id: 3,
            rule_kind: RuleKind::MonthlyHighDrop,
            severity: Severity::Warning,
            message: "drop".to_string(),
            discriminant,
            current_price: 82.0,
            triggered_at: sent_at,
        };
        AlertRecord::delivered(&alert, sent_at)
    }

    #[tokio::test]
    async fn test_recent_alerts_filter_by_key_and_time() {
        let store = InMemoryStore::new();
        let now = Utc::now();
        store.insert_record(record(-10, now - Duration::hours(2)));
        store.insert_record(record(-10, now - Duration::hours(30)));
        store.insert_record(record(-20, now - Duration::hours(1)));

        let key = DedupKey {
            user_id: 1,
            symbol_id: 2,
            rule_kind: RuleKind::MonthlyHighDrop,
            discriminant: -10,
        };
        let recent = store.load_recent_alerts(&key, now - Duration::hours(24)).await.unwrap();
        assert_eq!(recent.len(), 1);
        assert_eq!(recent[0].discriminant, -10);
    }

    #[tokio::test]
    async fn test_append_assigns_ids() {
        let store = InMemoryStore::new();
        let now = Utc::now();
        let cooldown = Duration::hours(24);
        let first = store.append_alert_record(&record(-5, now), cooldown).await.unwrap();
        let second = store.append_alert_record(&record(-10, now), cooldown).await.unwrap();
        assert_eq!(first.map(|r| r.id), Some(1));
        assert_eq!(second.map(|r| r.id), Some(2));
        assert_eq!(store.records().len(), 2);
    }

    #[tokio::test]
    async fn test_append_rejects_key_inside_cooldown() {
        let store = InMemoryStore::new();
        let now = Utc::now();
        let cooldown = Duration::hours(24);

        assert!(store.append_alert_record(&record(-5, now), cooldown).await.unwrap().is_some());
        assert!(store
            .append_alert_record(&record(-5, now + Duration::hours(1)), cooldown)
            .await
            .unwrap()
            .is_none());
        assert!(store
            .append_alert_record(&record(-5, now + Duration::hours(24)), cooldown)
            .await
            .unwrap()
            .is_some());
        assert_eq!(store.records().len(), 2);
    }

    #[tokio::test]
    async fn test_failing_user() {
        let store = InMemoryStore::new();
        store.fail_user(9);
        assert!(store.load_watchlist(9).await.is_err());
        assert!(store.load_enabled_rules(9).await.is_err());
        assert!(store.load_watchlist(1).await.unwrap().is_empty());
    }
}
