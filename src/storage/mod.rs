//! Storage seam used by the evaluation engine.

pub mod memory;

pub use memory::InMemoryStore;

use crate::error::RepositoryError;
use crate::models::{AlertRecord, DedupKey, Symbol, User, UserRule};
use crate::repositories::{AlertRepository, RuleRepository, UserRepository, WatchlistRepository};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use sqlx::PgPool;
use std::sync::Arc;

/// Everything the engine reads and the single thing it writes
#[async_trait]
pub trait AlertStore: Send + Sync {
    async fn list_enabled_users(&self) -> Result<Vec<User>, RepositoryError>;

    async fn load_watchlist(&self, user_id: i64) -> Result<Vec<Symbol>, RepositoryError>;

    /// Enabled rules in definition order
    async fn load_enabled_rules(&self, user_id: i64) -> Result<Vec<UserRule>, RepositoryError>;

    /// Records for `key` sent at or after `since`
    async fn load_recent_alerts(
        &self,
        key: &DedupKey,
        since: DateTime<Utc>,
    ) -> Result<Vec<AlertRecord>, RepositoryError>;

    /// Append unless the key has a record sent less than `cooldown` before
    /// `record.sent_at`. `None` means another writer got there first.
    async fn append_alert_record(
        &self,
        record: &AlertRecord,
        cooldown: Duration,
    ) -> Result<Option<AlertRecord>, RepositoryError>;
}

/// PostgreSQL-backed store delegating to the repositories
#[derive(Clone)]
pub struct PgAlertStore {
    users: Arc<UserRepository>,
    watchlists: Arc<WatchlistRepository>,
    rules: Arc<RuleRepository>,
    alerts: Arc<AlertRepository>,
}

impl PgAlertStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            users: Arc::new(UserRepository::new(pool.clone())),
            watchlists: Arc::new(WatchlistRepository::new(pool.clone())),
            rules: Arc::new(RuleRepository::new(pool.clone())),
            alerts: Arc::new(AlertRepository::new(pool)),
        }
    }

    pub fn from_repositories(
        users: Arc<UserRepository>,
        watchlists: Arc<WatchlistRepository>,
        rules: Arc<RuleRepository>,
        alerts: Arc<AlertRepository>,
    ) -> Self {
        Self {
            users,
            watchlists,
            rules,
            alerts,
        }
    }
}

#[async_trait]
impl AlertStore for PgAlertStore {
    async fn list_enabled_users(&self) -> Result<Vec<User>, RepositoryError> {
        self.users.list_enabled().await
    }

    async fn load_watchlist(&self, user_id: i64) -> Result<Vec<Symbol>, RepositoryError> {
        self.watchlists.symbols_for_user(user_id).await
    }

    async fn load_enabled_rules(&self, user_id: i64) -> Result<Vec<UserRule>, RepositoryError> {
        self.rules.find_enabled_by_user(user_id).await
    }

    async fn load_recent_alerts(
        &self,
        key: &DedupKey,
        since: DateTime<Utc>,
    ) -> Result<Vec<AlertRecord>, RepositoryError> {
        self.alerts.find_recent(key, since).await
    }

    async fn append_alert_record(
        &self,
        record: &AlertRecord,
        cooldown: Duration,
    ) -> Result<Option<AlertRecord>, RepositoryError> {
        self.alerts.append(record, cooldown).await
    }
}

#[async_trait]
impl<S: AlertStore + ?Sized> AlertStore for Arc<S> {
    async fn list_enabled_users(&self) -> Result<Vec<User>, RepositoryError> {
        (**self).list_enabled_users().await
    }

    async fn load_watchlist(&self, user_id: i64) -> Result<Vec<Symbol>, RepositoryError> {
        (**self).load_watchlist(user_id).await
    }

    async fn load_enabled_rules(&self, user_id: i64) -> Result<Vec<UserRule>, RepositoryError> {
        (**self).load_enabled_rules(user_id).await
    }

    async fn load_recent_alerts(
        &self,
        key: &DedupKey,
        since: DateTime<Utc>,
    ) -> Result<Vec<AlertRecord>, RepositoryError> {
        (**self).load_recent_alerts(key, since).await
    }

    async fn append_alert_record(
        &self,
        record: &AlertRecord,
        cooldown: Duration,
    ) -> Result<Option<AlertRecord>, RepositoryError> {
        (**self).append_alert_record(record, cooldown).await
    }
}
