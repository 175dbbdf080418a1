//! Modo Alerts Library
//!
//! Market alert rule engine: users watch symbols, attach rules, and get a
//! Discord notification when a rule fires, at most once per cooldown window.
//! Exposed as a library for the binary and the integration tests.

pub mod config;
pub mod database;
pub mod error;
pub mod market;
pub mod models;
pub mod notifiers;
pub mod repositories;
pub mod rules;
pub mod services;
pub mod storage;

// Re-export commonly used types
pub use config::AppConfig;
pub use error::{AppError, AppResult, EvaluationError};

use database::Database;
use repositories::*;
use std::sync::Arc;
use storage::PgAlertStore;

/// Application state containing all repositories
pub struct AppState {
    pub database: Database,
    pub user_repo: Arc<UserRepository>,
    pub symbol_repo: Arc<SymbolRepository>,
    pub watchlist_repo: Arc<WatchlistRepository>,
    pub rule_repo: Arc<RuleRepository>,
    pub alert_repo: Arc<AlertRepository>,
}

impl AppState {
    /// Create a new AppState with initialized repositories
    pub fn new(pool: sqlx::PgPool) -> Self {
        let database = Database::new(pool.clone());

        Self {
            database,
            user_repo: Arc::new(UserRepository::new(pool.clone())),
            symbol_repo: Arc::new(SymbolRepository::new(pool.clone())),
            watchlist_repo: Arc::new(WatchlistRepository::new(pool.clone())),
            rule_repo: Arc::new(RuleRepository::new(pool.clone())),
            alert_repo: Arc::new(AlertRepository::new(pool)),
        }
    }

    /// Engine-facing store sharing this state's repositories
    pub fn alert_store(&self) -> PgAlertStore {
        PgAlertStore::from_repositories(
            self.user_repo.clone(),
            self.watchlist_repo.clone(),
            self.rule_repo.clone(),
            self.alert_repo.clone(),
        )
    }
}
