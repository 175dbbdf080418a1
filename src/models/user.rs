use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// User model holding the notification channels alerts are delivered to
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct User {
    pub id: i64,
    pub email: Option<String>,
    pub discord_webhook_url: Option<String>,
    pub enabled: bool,
    pub created_at: DateTime<Utc>,
}

impl User {
    /// Create a new in-memory User (ids are assigned by storage)
    pub fn new(id: i64, discord_webhook_url: Option<String>) -> Self {
        Self {
            id,
            email: None,
            discord_webhook_url,
            enabled: true,
            created_at: Utc::now(),
        }
    }

    /// Discord webhook, if one is set
    pub fn webhook(&self) -> Option<&str> {
        self.discord_webhook_url.as_deref().filter(|url| !url.trim().is_empty())
    }

    /// Email address, if one is set
    pub fn email_address(&self) -> Option<&str> {
        self.email.as_deref().map(str::trim).filter(|address| !address.is_empty())
    }

    /// Check whether the user has any channel an alert can be delivered to
    pub fn has_channel(&self) -> bool {
        self.webhook().is_some() || self.email_address().is_some()
    }
}
