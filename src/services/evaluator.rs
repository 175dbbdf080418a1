//! Evaluation orchestrator.
//!
//! A run has two phases. `evaluate` walks every enabled user's watchlist,
//! runs the matchers and passes candidates through the dedup gate, producing
//! alerts in (user, symbol, rule definition) order. `dispatch` hands those
//! alerts to the user's channels and appends history only for alerts at
//! least one channel confirmed. Failures are contained to the rule, symbol
//! or user they belong to and reported in the [`RunSummary`].

use super::dedup::{DedupGate, PassKeys};
use crate::config::EngineConfig;
use crate::error::EvaluationError;
use crate::market::MarketDataProvider;
use crate::models::{Alert, AlertRecord, PriceHistory, Symbol, User};
use crate::notifiers::{DeliveryOutcome, NotifierProvider};
use crate::rules::{evaluate_rule, RuleDefinition, RuleParams, RuleSet, SeverityConfig, AVG_VOLUME_DAYS};
use crate::storage::AlertStore;
use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// A contained failure and where it happened
#[derive(Debug)]
pub struct RunError {
    /// None when the failure hit the whole run
    pub user_id: Option<i64>,
    pub ticker: Option<String>,
    pub rule_id: Option<i64>,
    pub error: EvaluationError,
}

impl RunError {
    fn run(error: impl Into<EvaluationError>) -> Self {
        Self {
            user_id: None,
            ticker: None,
            rule_id: None,
            error: error.into(),
        }
    }

    fn user(user_id: i64, error: impl Into<EvaluationError>) -> Self {
        Self {
            user_id: Some(user_id),
            ticker: None,
            rule_id: None,
            error: error.into(),
        }
    }

    fn symbol(user_id: i64, ticker: &str, error: impl Into<EvaluationError>) -> Self {
        Self {
            user_id: Some(user_id),
            ticker: Some(ticker.to_string()),
            rule_id: None,
            error: error.into(),
        }
    }

    fn rule(user_id: i64, ticker: Option<&str>, rule_id: i64, error: impl Into<EvaluationError>) -> Self {
        Self {
            user_id: Some(user_id),
            ticker: ticker.map(str::to_string),
            rule_id: Some(rule_id),
            error: error.into(),
        }
    }
}

impl std::fmt::Display for RunError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.user_id {
            Some(user_id) => write!(f, "user {}", user_id)?,
            None => f.write_str("run")?,
        }
        if let Some(ticker) = &self.ticker {
            write!(f, " {}", ticker)?;
        }
        if let Some(rule_id) = self.rule_id {
            write!(f, " rule {}", rule_id)?;
        }
        write!(f, ": {}", self.error)
    }
}

/// Admitted alerts for one user, awaiting delivery
#[derive(Debug)]
pub struct UserAlerts {
    pub user: User,
    pub alerts: Vec<Alert>,
}

/// Output of the evaluation phase
#[derive(Debug)]
pub struct EvaluationRun {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub users_evaluated: usize,
    pub symbols_evaluated: usize,
    pub batches: Vec<UserAlerts>,
    pub suppressed: usize,
    pub errors: Vec<RunError>,
}

impl EvaluationRun {
    fn new(started_at: DateTime<Utc>) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            started_at,
            users_evaluated: 0,
            symbols_evaluated: 0,
            batches: Vec::new(),
            suppressed: 0,
            errors: Vec::new(),
        }
    }

    /// All admitted alerts in run order
    pub fn alerts(&self) -> impl Iterator<Item = &Alert> {
        self.batches.iter().flat_map(|batch| batch.alerts.iter())
    }

    pub fn alert_count(&self) -> usize {
        self.batches.iter().map(|batch| batch.alerts.len()).sum()
    }
}

/// Outcome of a full run
#[derive(Debug)]
pub struct RunSummary {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub users_evaluated: usize,
    pub symbols_evaluated: usize,
    /// Alerts confirmed by at least one channel. A failed history write is
    /// also reported in `errors`.
    pub sent: usize,
    /// Candidates held back by the cooldown or an earlier duplicate in the
    /// pass, plus delivered alerts another writer had already recorded
    pub suppressed: usize,
    /// Alerts no channel confirmed
    pub failed: usize,
    pub errors: Vec<RunError>,
}

impl RunSummary {
    pub fn error_count(&self) -> usize {
        self.errors.len()
    }
}

#[derive(Debug, Default)]
struct SymbolOutcome {
    alerts: Vec<Alert>,
    suppressed: usize,
    errors: Vec<RunError>,
}

fn needs_history(params: &RuleParams) -> bool {
    !matches!(params, RuleParams::DailyChange { .. })
}

/// Calendar days spanning `trading_days` sessions, with room for holidays
fn calendar_days(trading_days: usize) -> u32 {
    u32::try_from(trading_days * 7 / 5 + 10).unwrap_or(u32::MAX)
}

/// Calendar days of history the rules for one symbol need. Never less than
/// the configured window, which covers the monthly extremes.
fn history_window(rules: &[&RuleDefinition], configured: u32) -> u32 {
    rules
        .iter()
        .map(|rule| match &rule.params {
            RuleParams::VolumeSpike { average_days, .. } => calendar_days(*average_days),
            RuleParams::Custom { .. } => calendar_days(AVG_VOLUME_DAYS),
            _ => 0,
        })
        .fold(configured, u32::max)
}

/// Runs rules for every user against live market data
pub struct AlertEngine {
    provider: Arc<dyn MarketDataProvider>,
    store: Arc<dyn AlertStore>,
    notifiers: Arc<dyn NotifierProvider>,
    severity: SeverityConfig,
    gate: DedupGate,
    max_concurrency: usize,
    history_days: u32,
}

impl AlertEngine {
    pub fn new(
        provider: Arc<dyn MarketDataProvider>,
        store: Arc<dyn AlertStore>,
        notifiers: Arc<dyn NotifierProvider>,
    ) -> Self {
        let defaults = EngineConfig::default();
        Self {
            provider,
            store,
            notifiers,
            severity: defaults.severity,
            gate: DedupGate::new(defaults.cooldown()),
            max_concurrency: defaults.max_concurrent_symbols,
            history_days: defaults.history_days,
        }
    }

    pub fn with_config(mut self, config: &EngineConfig) -> Self {
        self.severity = config.severity;
        self.gate = DedupGate::new(config.cooldown());
        self.max_concurrency = config.max_concurrent_symbols.max(1);
        self.history_days = config.history_days;
        self
    }

    pub fn with_cooldown(mut self, cooldown: chrono::Duration) -> Self {
        self.gate = DedupGate::new(cooldown);
        self
    }

    pub fn with_max_concurrency(mut self, max_concurrency: usize) -> Self {
        self.max_concurrency = max_concurrency.max(1);
        self
    }

    /// Evaluate and deliver in one go
    pub async fn run(&self) -> RunSummary {
        let evaluation = self.evaluate(Utc::now()).await;
        self.dispatch(evaluation).await
    }

    /// Evaluation phase: nothing is delivered or written
    pub async fn evaluate(&self, now: DateTime<Utc>) -> EvaluationRun {
        let mut run = EvaluationRun::new(now);

        let users = match self.store.list_enabled_users().await {
            Ok(users) => users,
            Err(e) => {
                warn!(run_id = %run.run_id, error = %e, "Could not list users, nothing evaluated");
                run.errors.push(RunError::run(e));
                return run;
            }
        };

        for user in users {
            self.evaluate_user(user, now, &mut run).await;
        }

        info!(
            run_id = %run.run_id,
            users = run.users_evaluated,
            symbols = run.symbols_evaluated,
            admitted = run.alert_count(),
            suppressed = run.suppressed,
            errors = run.errors.len(),
            "Evaluation finished"
        );
        run
    }

    async fn evaluate_user(&self, user: User, now: DateTime<Utc>, run: &mut EvaluationRun) {
        let user_id = user.id;

        if self.notifiers.for_user(&user).is_empty() {
            debug!(user_id, "Skipping user without notification channels");
            return;
        }

        let watchlist = match self.store.load_watchlist(user_id).await {
            Ok(symbols) => symbols,
            Err(e) => {
                warn!(user_id, error = %e, "Failed to load watchlist");
                run.errors.push(RunError::user(user_id, e));
                return;
            }
        };
        if watchlist.is_empty() {
            debug!(user_id, "Skipping user with empty watchlist");
            return;
        }

        let stored_rules = match self.store.load_enabled_rules(user_id).await {
            Ok(rules) => rules,
            Err(e) => {
                warn!(user_id, error = %e, "Failed to load rules");
                run.errors.push(RunError::user(user_id, e));
                return;
            }
        };

        let RuleSet { rules, rejected } = RuleSet::compile(&stored_rules);
        for (rule_id, e) in rejected {
            warn!(user_id, rule_id, error = %e, "Rule disabled: invalid parameters");
            run.errors.push(RunError::rule(user_id, None, rule_id, e));
        }
        if rules.is_empty() {
            debug!(user_id, "Skipping user without valid rules");
            return;
        }

        let targets: Vec<(Symbol, Vec<&RuleDefinition>)> = watchlist
            .into_iter()
            .filter_map(|symbol| {
                let applicable: Vec<&RuleDefinition> = rules.iter().filter(|r| r.applies_to(symbol.id)).collect();
                (!applicable.is_empty()).then_some((symbol, applicable))
            })
            .collect();

        run.users_evaluated += 1;
        run.symbols_evaluated += targets.len();

        // Futures are built up front so the stream holds no borrowing closure
        let pending: Vec<_> = targets
            .iter()
            .map(|(symbol, applicable)| self.evaluate_symbol(user_id, symbol, applicable, now))
            .collect();
        let outcomes: Vec<SymbolOutcome> = stream::iter(pending)
            .buffered(self.max_concurrency)
            .collect()
            .await;

        let mut alerts = Vec::new();
        for outcome in outcomes {
            alerts.extend(outcome.alerts);
            run.suppressed += outcome.suppressed;
            run.errors.extend(outcome.errors);
        }

        if !alerts.is_empty() {
            run.batches.push(UserAlerts { user, alerts });
        }
    }

    async fn evaluate_symbol(
        &self,
        user_id: i64,
        symbol: &Symbol,
        rules: &[&RuleDefinition],
        now: DateTime<Utc>,
    ) -> SymbolOutcome {
        let ticker = symbol.ticker.as_str();
        let mut outcome = SymbolOutcome::default();

        let snapshot = match self.provider.fetch_snapshot(ticker).await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                warn!(user_id, ticker, error = %e, "Skipping symbol: snapshot unavailable");
                outcome.errors.push(RunError::symbol(user_id, ticker, e));
                return outcome;
            }
        };

        let history = if rules.iter().any(|r| needs_history(&r.params)) {
            let days = history_window(rules, self.history_days);
            match self.provider.fetch_history(ticker, days).await {
                Ok(history) => history,
                Err(e) => {
                    warn!(user_id, ticker, error = %e, "Skipping symbol: history unavailable");
                    outcome.errors.push(RunError::symbol(user_id, ticker, e));
                    return outcome;
                }
            }
        } else {
            PriceHistory::new(ticker, Vec::new())
        };

        let mut pass = PassKeys::default();
        for rule in rules {
            let candidate = match evaluate_rule(&rule.params, &snapshot, &history, &self.severity) {
                Ok(Some(candidate)) => candidate,
                Ok(None) => continue,
                Err(e) => {
                    warn!(user_id, ticker, rule_id = rule.id, error = %e, "Custom condition failed");
                    outcome.errors.push(RunError::rule(user_id, Some(ticker), rule.id, e));
                    continue;
                }
            };

            let alert = Alert {
                user_id,
                symbol_id: symbol.id,
                ticker: symbol.ticker.clone(),
                rule_id: rule.id,
                rule_kind: rule.kind(),
                severity: candidate.severity,
                message: candidate.message,
                discriminant: candidate.discriminant,
                current_price: snapshot.price,
                triggered_at: now,
            };

            let key = alert.dedup_key();
            if !pass.claim(key) {
                debug!(user_id, ticker, rule_id = rule.id, "Duplicate key within pass");
                outcome.suppressed += 1;
                continue;
            }

            let recent = match self.store.load_recent_alerts(&key, self.gate.window_start(now)).await {
                Ok(records) => records,
                Err(e) => {
                    warn!(user_id, ticker, rule_id = rule.id, error = %e, "Failed to load alert history");
                    outcome.errors.push(RunError::rule(user_id, Some(ticker), rule.id, e));
                    continue;
                }
            };

            if self.gate.admit(&alert, &recent, now) {
                debug!(user_id, ticker, rule_id = rule.id, severity = alert.severity.as_str(), "Alert admitted");
                outcome.alerts.push(alert);
            } else {
                debug!(user_id, ticker, rule_id = rule.id, "Alert suppressed by cooldown");
                outcome.suppressed += 1;
            }
        }

        outcome
    }

    /// Delivery phase: history is appended only for confirmed alerts
    pub async fn dispatch(&self, run: EvaluationRun) -> RunSummary {
        let EvaluationRun {
            run_id,
            started_at,
            users_evaluated,
            symbols_evaluated,
            batches,
            mut suppressed,
            mut errors,
        } = run;
        let mut sent = 0;
        let mut failed = 0;

        for UserAlerts { user, alerts } in batches {
            let channels = self.notifiers.for_user(&user);

            for alert in alerts {
                let mut delivered = false;
                for channel in &channels {
                    match channel.deliver(&alert).await {
                        DeliveryOutcome::Delivered => delivered = true,
                        DeliveryOutcome::Failed(e) => {
                            warn!(
                                user_id = user.id,
                                ticker = %alert.ticker,
                                channel = channel.channel(),
                                error = %e,
                                "Delivery failed"
                            );
                            errors.push(RunError::rule(user.id, Some(&alert.ticker), alert.rule_id, e));
                        }
                    }
                }

                if !delivered {
                    failed += 1;
                    continue;
                }

                let record = AlertRecord::delivered(&alert, Utc::now());
                match self.store.append_alert_record(&record, self.gate.cooldown()).await {
                    Ok(Some(_)) => sent += 1,
                    Ok(None) => {
                        warn!(
                            user_id = user.id,
                            ticker = %alert.ticker,
                            rule_id = alert.rule_id,
                            "Another writer recorded this key inside the cooldown"
                        );
                        suppressed += 1;
                    }
                    Err(e) => {
                        sent += 1;
                        warn!(user_id = user.id, ticker = %alert.ticker, error = %e, "Delivered alert not recorded");
                        errors.push(RunError::rule(user.id, Some(&alert.ticker), alert.rule_id, e));
                    }
                }
            }
        }

        let summary = RunSummary {
            run_id,
            started_at,
            finished_at: Utc::now(),
            users_evaluated,
            symbols_evaluated,
            sent,
            suppressed,
            failed,
            errors,
        };

        info!(
            run_id = %summary.run_id,
            sent = summary.sent,
            suppressed = summary.suppressed,
            failed = summary.failed,
            errors = summary.error_count(),
            "Alert run complete"
        );
        summary
    }
}
