use crate::rules::{SeverityConfig, SeverityThresholds};
use std::env;
use std::str::FromStr;
use std::time::Duration;

/// Database configuration
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub acquire_timeout_secs: u64,
    pub idle_timeout_secs: u64,
    pub max_lifetime_secs: u64,
    pub test_before_acquire: bool,
}

/// Rule engine tuning
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub cooldown_hours: i64,
    pub severity: SeverityConfig,
    /// Symbols of one user evaluated concurrently
    pub max_concurrent_symbols: usize,
    /// Calendar days of history requested per symbol
    pub history_days: u32,
    /// Alert history older than this is pruned by the poller
    pub retention_days: i64,
}

/// Market data provider settings
#[derive(Debug, Clone)]
pub struct MarketDataConfig {
    pub base_url: String,
    pub max_retries: u32,
    pub retry_delay_ms: u64,
    pub timeout_secs: u64,
}

/// SMTP relay used for email alerts (STARTTLS)
#[derive(Clone)]
pub struct SmtpConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    /// Sender address, defaults to the username
    pub from: String,
}

impl std::fmt::Debug for SmtpConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SmtpConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &"***")
            .field("from", &self.from)
            .finish()
    }
}

/// Notification channel settings
#[derive(Debug, Clone)]
pub struct NotificationConfig {
    pub mention_on_critical: bool,
    pub include_chart_link: bool,
    pub healthcheck_webhook_url: Option<String>,
    /// Email delivery is off unless SMTP_USERNAME is set
    pub smtp: Option<SmtpConfig>,
}

/// Application configuration
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub engine: EngineConfig,
    pub market_data: MarketDataConfig,
    pub notification: NotificationConfig,
    /// Run a poll loop at this interval instead of a single pass
    pub check_interval_secs: Option<u64>,
    /// Evaluate and log only: nothing is delivered or persisted
    pub dry_run: bool,
    pub log_level: String,
    pub log_format: String,
    pub environment: String,
}

/// Read and parse a variable, falling back to `default` when unset or unparsable
fn parse_var<T: FromStr>(get: &impl Fn(&str) -> Option<String>, name: &str, default: T) -> T {
    get(name)
        .and_then(|s| s.trim().parse::<T>().ok())
        .unwrap_or(default)
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|s| !s.trim().is_empty())
}

impl DatabaseConfig {
    /// Create database config from environment variables
    pub fn from_env() -> Result<Self, String> {
        Self::from_source(|name| env::var(name).ok())
    }

    /// Create database config from any variable source
    pub fn from_source(get: impl Fn(&str) -> Option<String>) -> Result<Self, String> {
        let url = non_empty(get("DATABASE_URL"))
            .ok_or("DATABASE_URL environment variable is required")?;

        let max_connections = parse_var(&get, "DATABASE_MAX_CONNECTIONS", 10u32);
        let acquire_timeout_secs = parse_var(&get, "DATABASE_ACQUIRE_TIMEOUT_SECS", 30u64);
        let idle_timeout_secs = parse_var(&get, "DATABASE_IDLE_TIMEOUT_SECS", 600u64); // 10 minutes
        let max_lifetime_secs = parse_var(&get, "DATABASE_MAX_LIFETIME_SECS", 1800u64); // 30 minutes
        let test_before_acquire = parse_var(&get, "DATABASE_TEST_BEFORE_ACQUIRE", true);

        if max_connections == 0 {
            return Err("DATABASE_MAX_CONNECTIONS must be greater than 0".to_string());
        }

        if acquire_timeout_secs == 0 {
            return Err("DATABASE_ACQUIRE_TIMEOUT_SECS must be greater than 0".to_string());
        }

        Ok(Self {
            url,
            max_connections,
            acquire_timeout_secs,
            idle_timeout_secs,
            max_lifetime_secs,
            test_before_acquire,
        })
    }

    /// Get acquire timeout as Duration
    pub fn acquire_timeout(&self) -> Duration {
        Duration::from_secs(self.acquire_timeout_secs)
    }

    /// Get idle timeout as Duration
    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs)
    }

    /// Get max lifetime as Duration
    pub fn max_lifetime(&self) -> Duration {
        Duration::from_secs(self.max_lifetime_secs)
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "postgresql://localhost/modo_alerts".to_string(),
            max_connections: 10,
            acquire_timeout_secs: 30,
            idle_timeout_secs: 600,
            max_lifetime_secs: 1800,
            test_before_acquire: true,
        }
    }
}

impl EngineConfig {
    pub fn from_source(get: impl Fn(&str) -> Option<String>) -> Result<Self, String> {
        let defaults = Self::default();
        let cooldown_hours = parse_var(&get, "ALERT_COOLDOWN_HOURS", defaults.cooldown_hours);
        let max_concurrent_symbols =
            parse_var(&get, "MAX_CONCURRENT_SYMBOLS", defaults.max_concurrent_symbols);
        let history_days = parse_var(&get, "HISTORY_DAYS", defaults.history_days);
        let retention_days = parse_var(&get, "ALERT_RETENTION_DAYS", defaults.retention_days);

        let base = defaults.severity;
        let thresholds = |prefix: &str, current: SeverityThresholds| SeverityThresholds {
            warning: parse_var(&get, &format!("SEVERITY_{}_WARNING", prefix), current.warning),
            critical: parse_var(&get, &format!("SEVERITY_{}_CRITICAL", prefix), current.critical),
        };
        let severity = SeverityConfig {
            monthly_high_drop: thresholds("DROP", base.monthly_high_drop),
            daily_change: thresholds("CHANGE", base.daily_change),
            volume_spike: thresholds("VOLUME", base.volume_spike),
        };

        if cooldown_hours < 0 {
            return Err("ALERT_COOLDOWN_HOURS must not be negative".to_string());
        }
        if max_concurrent_symbols == 0 {
            return Err("MAX_CONCURRENT_SYMBOLS must be greater than 0".to_string());
        }
        if history_days == 0 {
            return Err("HISTORY_DAYS must be greater than 0".to_string());
        }
        if retention_days * 24 < cooldown_hours {
            return Err("ALERT_RETENTION_DAYS must cover ALERT_COOLDOWN_HOURS".to_string());
        }
        severity.validate()?;

        Ok(Self {
            cooldown_hours,
            severity,
            max_concurrent_symbols,
            history_days,
            retention_days,
        })
    }

    /// Get cooldown as a chrono Duration
    pub fn cooldown(&self) -> chrono::Duration {
        chrono::Duration::hours(self.cooldown_hours)
    }

    pub fn retention(&self) -> chrono::Duration {
        chrono::Duration::days(self.retention_days)
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            cooldown_hours: 24,
            severity: SeverityConfig::default(),
            max_concurrent_symbols: 4,
            history_days: 30,
            retention_days: 30,
        }
    }
}

impl MarketDataConfig {
    pub fn from_source(get: impl Fn(&str) -> Option<String>) -> Result<Self, String> {
        let defaults = Self::default();
        let base_url = non_empty(get("MARKET_DATA_URL")).unwrap_or(defaults.base_url);
        let max_retries = parse_var(&get, "MARKET_DATA_MAX_RETRIES", defaults.max_retries);
        let retry_delay_ms = parse_var(&get, "MARKET_DATA_RETRY_DELAY_MS", defaults.retry_delay_ms);
        let timeout_secs = parse_var(&get, "MARKET_DATA_TIMEOUT_SECS", defaults.timeout_secs);

        if timeout_secs == 0 {
            return Err("MARKET_DATA_TIMEOUT_SECS must be greater than 0".to_string());
        }

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            max_retries,
            retry_delay_ms,
            timeout_secs,
        })
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for MarketDataConfig {
    fn default() -> Self {
        Self {
            base_url: "https://query1.finance.yahoo.com".to_string(),
            max_retries: 3,
            retry_delay_ms: 1000,
            timeout_secs: 10,
        }
    }
}

impl SmtpConfig {
    /// `None` when SMTP_USERNAME is unset
    pub fn from_source(get: impl Fn(&str) -> Option<String>) -> Option<Self> {
        let username = non_empty(get("SMTP_USERNAME"))?;
        let from = non_empty(get("SMTP_FROM")).unwrap_or_else(|| username.clone());
        Some(Self {
            host: non_empty(get("SMTP_HOST")).unwrap_or_else(|| "smtp.gmail.com".to_string()),
            port: parse_var(&get, "SMTP_PORT", 587u16),
            username,
            password: get("SMTP_PASSWORD").unwrap_or_default(),
            from,
        })
    }
}

impl NotificationConfig {
    pub fn from_source(get: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        Self {
            mention_on_critical: parse_var(&get, "DISCORD_MENTION_ON_CRITICAL", defaults.mention_on_critical),
            include_chart_link: parse_var(&get, "DISCORD_INCLUDE_CHART_LINK", defaults.include_chart_link),
            healthcheck_webhook_url: non_empty(get("HEALTHCHECK_WEBHOOK_URL")),
            smtp: SmtpConfig::from_source(&get),
        }
    }
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            mention_on_critical: true,
            include_chart_link: true,
            healthcheck_webhook_url: None,
            smtp: None,
        }
    }
}

impl AppConfig {
    /// Create application config from environment variables
    pub fn from_env() -> Result<Self, String> {
        Self::from_source(|name| env::var(name).ok())
    }

    /// Create application config from any variable source
    pub fn from_source(get: impl Fn(&str) -> Option<String>) -> Result<Self, String> {
        let database = DatabaseConfig::from_source(&get)?;
        let engine = EngineConfig::from_source(&get)?;
        let market_data = MarketDataConfig::from_source(&get)?;
        let notification = NotificationConfig::from_source(&get);

        let check_interval_secs = get("CHECK_INTERVAL_SECS").and_then(|s| s.trim().parse::<u64>().ok());
        if check_interval_secs == Some(0) {
            return Err("CHECK_INTERVAL_SECS must be greater than 0".to_string());
        }

        let dry_run = parse_var(&get, "DRY_RUN", false);
        let log_level = get("LOG_LEVEL").unwrap_or_else(|| "info".to_string());
        let log_format = get("LOG_FORMAT").unwrap_or_else(|| "text".to_string());
        let environment = get("ENVIRONMENT").unwrap_or_else(|| "development".to_string());

        // Validate log level
        let valid_log_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_log_levels.contains(&log_level.to_lowercase().as_str()) {
            return Err(format!(
                "Invalid LOG_LEVEL: {}. Must be one of: {:?}",
                log_level, valid_log_levels
            ));
        }

        let valid_log_formats = ["text", "json"];
        if !valid_log_formats.contains(&log_format.to_lowercase().as_str()) {
            return Err(format!(
                "Invalid LOG_FORMAT: {}. Must be one of: {:?}",
                log_format, valid_log_formats
            ));
        }

        // Validate environment
        let valid_environments = ["development", "staging", "production"];
        if !valid_environments.contains(&environment.to_lowercase().as_str()) {
            return Err(format!(
                "Invalid ENVIRONMENT: {}. Must be one of: {:?}",
                environment, valid_environments
            ));
        }

        Ok(Self {
            database,
            engine,
            market_data,
            notification,
            check_interval_secs,
            dry_run,
            log_level: log_level.to_lowercase(),
            log_format: log_format.to_lowercase(),
            environment: environment.to_lowercase(),
        })
    }

    /// Check if running in production
    pub fn is_production(&self) -> bool {
        self.environment == "production"
    }

    /// Check if running in development
    pub fn is_development(&self) -> bool {
        self.environment == "development"
    }

    pub fn json_logs(&self) -> bool {
        self.log_format == "json"
    }

    pub fn check_interval(&self) -> Option<Duration> {
        self.check_interval_secs.map(Duration::from_secs)
    }

    /// Get database URL (convenience method)
    pub fn database_url(&self) -> &str {
        &self.database.url
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database: DatabaseConfig::default(),
            engine: EngineConfig::default(),
            market_data: MarketDataConfig::default(),
            notification: NotificationConfig::default(),
            check_interval_secs: None,
            dry_run: false,
            log_level: "info".to_string(),
            log_format: "text".to_string(),
            environment: "development".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn source(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| vars.get(name).cloned()
    }

    #[test]
    fn test_database_config_default() {
        let config = DatabaseConfig::default();
        assert_eq!(config.max_connections, 10);
        assert_eq!(config.acquire_timeout_secs, 30);
    }

    #[test]
    fn test_app_config_default() {
        let config = AppConfig::default();
        assert_eq!(config.engine.cooldown_hours, 24);
        assert_eq!(config.engine.max_concurrent_symbols, 4);
        assert_eq!(config.market_data.max_retries, 3);
        assert!(config.is_development());
        assert!(!config.is_production());
        assert!(!config.dry_run);
    }

    #[test]
    fn test_database_url_required() {
        assert!(AppConfig::from_source(source(&[])).is_err());
    }

    #[test]
    fn test_from_source_overrides() {
        let config = AppConfig::from_source(source(&[
            ("DATABASE_URL", "postgresql://db/alerts"),
            ("ALERT_COOLDOWN_HOURS", "12"),
            ("SEVERITY_CHANGE_WARNING", "3"),
            ("MAX_CONCURRENT_SYMBOLS", "8"),
            ("MARKET_DATA_URL", "http://localhost:9000/"),
            ("CHECK_INTERVAL_SECS", "300"),
            ("DRY_RUN", "true"),
            ("LOG_FORMAT", "JSON"),
            ("HEALTHCHECK_WEBHOOK_URL", "  "),
        ]))
        .unwrap();

        assert_eq!(config.database_url(), "postgresql://db/alerts");
        assert_eq!(config.engine.cooldown(), chrono::Duration::hours(12));
        assert_eq!(config.engine.severity.daily_change.warning, 3.0);
        assert_eq!(config.engine.severity.daily_change.critical, 10.0);
        assert_eq!(config.engine.max_concurrent_symbols, 8);
        assert_eq!(config.market_data.base_url, "http://localhost:9000");
        assert_eq!(config.check_interval(), Some(Duration::from_secs(300)));
        assert!(config.dry_run);
        assert!(config.json_logs());
        assert!(config.notification.healthcheck_webhook_url.is_none());
    }

    #[test]
    fn test_smtp_settings() {
        let config = AppConfig::from_source(source(&[("DATABASE_URL", "postgresql://db/alerts")])).unwrap();
        assert!(config.notification.smtp.is_none());

        let config = AppConfig::from_source(source(&[
            ("DATABASE_URL", "postgresql://db/alerts"),
            ("SMTP_USERNAME", "alerts@example.com"),
            ("SMTP_PASSWORD", "hunter2"),
            ("SMTP_PORT", "2525"),
        ]))
        .unwrap();
        let smtp = config.notification.smtp.unwrap();
        assert_eq!(smtp.host, "smtp.gmail.com");
        assert_eq!(smtp.port, 2525);
        assert_eq!(smtp.from, "alerts@example.com");
        assert!(!format!("{:?}", smtp).contains("hunter2"));
    }

    #[test]
    fn test_invalid_values_rejected() {
        let base = [("DATABASE_URL", "postgresql://db/alerts")];

        let mut vars = base.to_vec();
        vars.push(("LOG_LEVEL", "loud"));
        assert!(AppConfig::from_source(source(&vars)).is_err());

        let mut vars = base.to_vec();
        vars.push(("MAX_CONCURRENT_SYMBOLS", "0"));
        assert!(AppConfig::from_source(source(&vars)).is_err());

        let mut vars = base.to_vec();
        vars.push(("SEVERITY_DROP_CRITICAL", "-5"));
        assert!(AppConfig::from_source(source(&vars)).is_err());

        let mut vars = base.to_vec();
        vars.push(("CHECK_INTERVAL_SECS", "0"));
        assert!(AppConfig::from_source(source(&vars)).is_err());

        let mut vars = base.to_vec();
        vars.push(("ALERT_COOLDOWN_HOURS", "72"));
        vars.push(("ALERT_RETENTION_DAYS", "2"));
        assert!(AppConfig::from_source(source(&vars)).is_err());
    }
}
