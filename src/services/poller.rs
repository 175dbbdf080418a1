use super::evaluator::{AlertEngine, RunSummary};
use crate::repositories::AlertRepository;
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::time;
use tracing::{error, info, warn};

/// Runs the alert engine on a fixed interval
pub struct AlertPoller {
    engine: Arc<AlertEngine>,
    poll_interval: Duration,
    retention: Option<(Arc<AlertRepository>, chrono::Duration)>,
}

impl AlertPoller {
    pub fn new(engine: Arc<AlertEngine>) -> Self {
        Self {
            engine,
            poll_interval: Duration::from_secs(900), // Default: 15 minutes
            retention: None,
        }
    }

    /// Set poll interval
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Prune alert history older than `keep` after each run
    pub fn with_retention(mut self, alerts: Arc<AlertRepository>, keep: chrono::Duration) -> Self {
        self.retention = Some((alerts, keep));
        self
    }

    /// Start polling. Never returns; cancel the task to stop.
    pub async fn start(self) {
        let mut interval = time::interval(self.poll_interval);
        interval.set_missed_tick_behavior(time::MissedTickBehavior::Delay);
        info!("Alert poller started, checking every {:?}", self.poll_interval);

        loop {
            interval.tick().await;

            let summary = self.engine.run().await;
            log_summary(&summary);

            if let Some((alerts, keep)) = &self.retention {
                match alerts.prune_older_than(Utc::now() - *keep).await {
                    Ok(0) => {}
                    Ok(pruned) => info!(pruned, "Pruned old alert history"),
                    Err(e) => error!("Error pruning alert history: {}", e),
                }
            }
        }
    }
}

/// One log line per contained error, then the totals
pub fn log_summary(summary: &RunSummary) {
    for err in &summary.errors {
        warn!(
            run_id = %summary.run_id,
            category = err.error.category(),
            "{}",
            err
        );
    }
    info!(
        run_id = %summary.run_id,
        users = summary.users_evaluated,
        symbols = summary.symbols_evaluated,
        sent = summary.sent,
        suppressed = summary.suppressed,
        failed = summary.failed,
        errors = summary.error_count(),
        elapsed_ms = (summary.finished_at - summary.started_at).num_milliseconds(),
        "Run summary"
    );
}
