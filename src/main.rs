//! Modo Alerts Service
//!
//! Entry point for the market alert checker. Modes:
//! - `check` (default): evaluate every user's rules once, or on an interval
//!   when CHECK_INTERVAL_SECS is set
//! - `healthcheck`: post a status summary to HEALTHCHECK_WEBHOOK_URL
//! - `sync-symbols`: refresh the symbol table from the NASDAQ Trader directory

use anyhow::Context;
use modo_alerts::database::{create_pool, run_migrations};
use modo_alerts::market::{MarketDataProvider, RetryingProvider, SymbolDirectory, YahooProvider};
use modo_alerts::notifiers::{ChannelNotifiers, DiscordNotifier};
use modo_alerts::services::{log_summary, AlertEngine, AlertPoller, HealthReport, SymbolSyncService};
use modo_alerts::storage::AlertStore;
use modo_alerts::{AppConfig, AppError, AppState};
use std::sync::Arc;
use tracing::{error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Check,
    HealthCheck,
    SyncSymbols,
}

impl Mode {
    fn from_str(s: &str) -> Result<Self, String> {
        match s {
            "check" => Ok(Mode::Check),
            "healthcheck" => Ok(Mode::HealthCheck),
            "sync-symbols" => Ok(Mode::SyncSymbols),
            _ => Err(format!(
                "Unknown mode: {}. Expected one of: check, healthcheck, sync-symbols",
                s
            )),
        }
    }
}

fn init_tracing(config: &AppConfig) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| format!("modo_alerts={},sqlx=warn", config.log_level).into());

    if config.json_logs() {
        tracing_subscriber::fmt().json().with_env_filter(filter).init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

/// Map a startup or run failure to the process exit code
fn exit_code(err: &anyhow::Error) -> i32 {
    match err.downcast_ref::<AppError>() {
        Some(app_err) => {
            if app_err.is_connection_error() {
                eprintln!("Hint: check that PostgreSQL is reachable at DATABASE_URL");
            }
            app_err.exit_code()
        }
        None => 1,
    }
}

#[tokio::main]
async fn main() {
    // Load environment variables first
    dotenv::dotenv().ok();

    if let Err(e) = run().await {
        error!("{:#}", e);
        eprintln!("Error: {:#}", e);
        std::process::exit(exit_code(&e));
    }
}

async fn run() -> anyhow::Result<()> {
    let mode = match std::env::args().nth(1) {
        Some(arg) => Mode::from_str(&arg).map_err(AppError::Config)?,
        None => Mode::Check,
    };

    let config = AppConfig::from_env().map_err(AppError::Config)?;

    init_tracing(&config);

    info!("Modo alerts starting ({:?})", mode);
    info!("Environment: {}", config.environment);
    info!("Log level: {}", config.log_level);

    // =========================================================================
    // DATABASE SETUP
    // =========================================================================
    info!("Connecting to database...");
    let pool = create_pool(&config.database)
        .await
        .map_err(AppError::from)
        .context("failed to create database pool")?;

    run_migrations(&pool, None)
        .await
        .map_err(AppError::from)
        .context("database migration failed")?;

    let app_state = Arc::new(AppState::new(pool));

    match mode {
        Mode::Check => run_check(&config, &app_state).await,
        Mode::HealthCheck => run_healthcheck(&config, &app_state).await,
        Mode::SyncSymbols => run_symbol_sync(&app_state).await,
    }
}

async fn run_check(config: &AppConfig, app_state: &Arc<AppState>) -> anyhow::Result<()> {
    let yahoo = YahooProvider::new(&config.market_data).context("failed to build market data client")?;
    let provider: Arc<dyn MarketDataProvider> =
        Arc::new(RetryingProvider::from_config(yahoo, &config.market_data));
    let store: Arc<dyn AlertStore> = Arc::new(app_state.alert_store());
    let notifiers = Arc::new(
        ChannelNotifiers::new(config.notification.clone()).context("failed to build notification client")?,
    );

    let engine = Arc::new(AlertEngine::new(provider, store, notifiers).with_config(&config.engine));

    if config.dry_run {
        if config.check_interval().is_some() {
            warn!("DRY_RUN ignores CHECK_INTERVAL_SECS: running a single pass");
        }
        let evaluation = engine.evaluate(chrono::Utc::now()).await;
        for alert in evaluation.alerts() {
            info!(
                user_id = alert.user_id,
                ticker = %alert.ticker,
                rule_id = alert.rule_id,
                severity = alert.severity.as_str(),
                "[dry run] {}",
                alert.message
            );
        }
        for err in &evaluation.errors {
            warn!(category = err.error.category(), "{}", err);
        }
        info!(
            admitted = evaluation.alert_count(),
            suppressed = evaluation.suppressed,
            "Dry run finished, nothing delivered or recorded"
        );
        return Ok(());
    }

    let Some(interval) = config.check_interval() else {
        let summary = engine.run().await;
        log_summary(&summary);
        return Ok(());
    };

    // =========================================================================
    // POLL LOOP
    // =========================================================================
    let poller = AlertPoller::new(engine)
        .with_poll_interval(interval)
        .with_retention(app_state.alert_repo.clone(), config.engine.retention());

    let poller_handle = tokio::spawn(async move {
        poller.start().await;
    });
    info!("Press Ctrl+C to shutdown gracefully");

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("Shutdown signal received, shutting down gracefully...");
        }
        _ = poller_handle => {
            error!("Alert poller exited unexpectedly");
        }
    }

    info!("Modo alerts shutdown complete");
    Ok(())
}

async fn run_healthcheck(config: &AppConfig, app_state: &Arc<AppState>) -> anyhow::Result<()> {
    let webhook_url = config
        .notification
        .healthcheck_webhook_url
        .as_deref()
        .ok_or_else(|| AppError::Config("HEALTHCHECK_WEBHOOK_URL is not set".to_string()))?;

    let latency = app_state
        .database
        .ping()
        .await
        .map_err(AppError::from)
        .context("database ping failed")?;
    info!(latency_ms = latency.as_millis() as u64, "Database reachable");

    let store = app_state.alert_store();
    let report = HealthReport::collect(&store).await?;
    let notifier = DiscordNotifier::new(webhook_url, &config.notification)?;
    report.send(&notifier).await?;
    Ok(())
}

async fn run_symbol_sync(app_state: &Arc<AppState>) -> anyhow::Result<()> {
    let directory = SymbolDirectory::new().context("failed to build symbol directory client")?;
    let service = SymbolSyncService::new(directory, app_state.symbol_repo.clone());
    let written = service.sync().await?;
    let total = app_state.symbol_repo.count().await?;
    info!(written, total, "Symbols synced");
    Ok(())
}
