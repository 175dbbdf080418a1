//! Alert delivery channels.

pub mod discord;
pub mod email;

pub use discord::DiscordNotifier;
pub use email::{EmailNotifier, SmtpMailer};

use crate::config::NotificationConfig;
use crate::models::{Alert, User};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Why a delivery attempt failed. The alert stays eligible for the next run.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DeliveryError {
    #[error("HTTP {status}: {body}")]
    Http { status: u16, body: String },

    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Rate limited after retry")]
    RateLimited,

    #[error("Channel misconfigured: {0}")]
    Misconfigured(String),

    #[error("SMTP error: {0}")]
    Smtp(String),
}

impl From<reqwest::Error> for DeliveryError {
    fn from(err: reqwest::Error) -> Self {
        DeliveryError::Connection(err.to_string())
    }
}

/// Result of handing one alert to one channel
#[derive(Debug, Clone, PartialEq)]
pub enum DeliveryOutcome {
    Delivered,
    Failed(DeliveryError),
}

impl DeliveryOutcome {
    pub fn is_delivered(&self) -> bool {
        matches!(self, DeliveryOutcome::Delivered)
    }
}

#[async_trait]
pub trait Notifier: Send + Sync {
    /// Channel name used in logs ("discord")
    fn channel(&self) -> &str;

    async fn deliver(&self, alert: &Alert) -> DeliveryOutcome;
}

/// Resolves the channels an alert for a user goes to
pub trait NotifierProvider: Send + Sync {
    fn for_user(&self, user: &User) -> Vec<Arc<dyn Notifier>>;
}

/// Builds channels from the webhook and email settings stored on each user.
/// Email is only offered when an SMTP relay is configured.
pub struct ChannelNotifiers {
    client: reqwest::Client,
    mailer: Option<Arc<SmtpMailer>>,
    config: NotificationConfig,
}

impl ChannelNotifiers {
    pub fn new(config: NotificationConfig) -> Result<Self, DeliveryError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()?;
        let mailer = config.smtp.as_ref().map(SmtpMailer::new).transpose()?.map(Arc::new);
        Ok(Self { client, mailer, config })
    }

    pub fn email_enabled(&self) -> bool {
        self.mailer.is_some()
    }
}

impl NotifierProvider for ChannelNotifiers {
    fn for_user(&self, user: &User) -> Vec<Arc<dyn Notifier>> {
        let mut channels: Vec<Arc<dyn Notifier>> = Vec::new();
        if let Some(url) = user.webhook() {
            channels.push(Arc::new(DiscordNotifier::with_client(
                self.client.clone(),
                url,
                &self.config,
            )));
        }
        if let (Some(mailer), Some(address)) = (&self.mailer, user.email_address()) {
            channels.push(Arc::new(EmailNotifier::new(
                mailer.clone(),
                address,
                self.config.include_chart_link,
            )));
        }
        channels
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SmtpConfig;

    #[test]
    fn test_channels_follow_user_settings() {
        let provider = ChannelNotifiers::new(NotificationConfig::default()).unwrap();

        let with_webhook = User::new(1, Some("https://discord.com/api/webhooks/1/abc".to_string()));
        let channels = provider.for_user(&with_webhook);
        assert_eq!(channels.len(), 1);
        assert_eq!(channels[0].channel(), "discord");

        assert!(provider.for_user(&User::new(2, None)).is_empty());
        assert!(provider.for_user(&User::new(3, Some(" ".to_string()))).is_empty());

        // No SMTP relay configured: the address alone is not a channel
        let mut email_only = User::new(4, None);
        email_only.email = Some("trader@example.com".to_string());
        assert!(!provider.email_enabled());
        assert!(provider.for_user(&email_only).is_empty());
    }

    #[test]
    fn test_email_channel_when_smtp_configured() {
        let config = NotificationConfig {
            smtp: Some(SmtpConfig {
                host: "smtp.example.com".to_string(),
                port: 587,
                username: "alerts@example.com".to_string(),
                password: "secret".to_string(),
                from: "alerts@example.com".to_string(),
            }),
            ..NotificationConfig::default()
        };
        let provider = ChannelNotifiers::new(config).unwrap();
        assert!(provider.email_enabled());

        let mut user = User::new(1, Some("https://discord.com/api/webhooks/1/abc".to_string()));
        user.email = Some("trader@example.com".to_string());
        let names: Vec<String> = provider
            .for_user(&user)
            .iter()
            .map(|c| c.channel().to_string())
            .collect();
        assert_eq!(names, vec!["discord".to_string(), "email".to_string()]);

        user.discord_webhook_url = None;
        assert_eq!(provider.for_user(&user).len(), 1);
    }
}
