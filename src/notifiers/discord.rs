use super::{DeliveryError, DeliveryOutcome, Notifier};
use crate::config::NotificationConfig;
use crate::models::{Alert, RuleKind, Severity};
use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Serialize;
use std::time::Duration;
use tracing::{debug, warn};

pub const COLOR_INFO: u32 = 0x3498DB;
pub const COLOR_WARNING: u32 = 0xFFA500;
pub const COLOR_CRITICAL: u32 = 0xFF0000;

/// Longest Retry-After we are willing to sleep for
const MAX_RETRY_AFTER: Duration = Duration::from_secs(30);

#[derive(Debug, Serialize)]
pub struct WebhookPayload {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub embeds: Vec<Embed>,
}

#[derive(Debug, Serialize)]
pub struct Embed {
    pub title: String,
    pub description: String,
    pub color: u32,
    pub fields: Vec<EmbedField>,
    pub timestamp: String,
}

#[derive(Debug, Serialize)]
pub struct EmbedField {
    pub name: String,
    pub value: String,
    pub inline: bool,
}

/// Discord webhook channel
pub struct DiscordNotifier {
    client: reqwest::Client,
    webhook_url: String,
    mention_on_critical: bool,
    include_chart_link: bool,
}

impl DiscordNotifier {
    pub fn new(webhook_url: impl Into<String>, config: &NotificationConfig) -> Result<Self, DeliveryError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()?;
        Ok(Self::with_client(client, webhook_url, config))
    }

    pub fn with_client(
        client: reqwest::Client,
        webhook_url: impl Into<String>,
        config: &NotificationConfig,
    ) -> Self {
        Self {
            client,
            webhook_url: webhook_url.into(),
            mention_on_critical: config.mention_on_critical,
            include_chart_link: config.include_chart_link,
        }
    }

    pub fn payload(&self, alert: &Alert) -> WebhookPayload {
        let mut fields = vec![
            EmbedField {
                name: "Current Price".to_string(),
                value: format!("${:.2}", alert.current_price),
                inline: true,
            },
            EmbedField {
                name: "Rule".to_string(),
                value: rule_title(alert.rule_kind),
                inline: true,
            },
        ];
        if self.include_chart_link {
            fields.push(EmbedField {
                name: "Chart".to_string(),
                value: format!("[TradingView](https://www.tradingview.com/symbols/{})", alert.ticker),
                inline: true,
            });
        }

        let content = (self.mention_on_critical && alert.severity == Severity::Critical)
            .then(|| "@here".to_string());

        WebhookPayload {
            content,
            embeds: vec![Embed {
                title: format!("{} {} Alert", severity_icon(alert.severity), alert.ticker),
                description: alert.message.clone(),
                color: severity_color(alert.severity),
                fields,
                timestamp: alert.triggered_at.to_rfc3339(),
            }],
        }
    }

    /// POST with a single retry when Discord rate limits us
    pub async fn post(&self, payload: &WebhookPayload) -> Result<(), DeliveryError> {
        let mut response = self.client.post(&self.webhook_url).json(payload).send().await?;

        if response.status() == StatusCode::TOO_MANY_REQUESTS {
            let wait = retry_after(response.headers().get(reqwest::header::RETRY_AFTER));
            warn!(wait_ms = wait.as_millis() as u64, "Discord rate limited, retrying once");
            tokio::time::sleep(wait).await;
            response = self.client.post(&self.webhook_url).json(payload).send().await?;
            if response.status() == StatusCode::TOO_MANY_REQUESTS {
                return Err(DeliveryError::RateLimited);
            }
        }

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }
        let body = response.text().await.unwrap_or_default();
        Err(DeliveryError::Http {
            status: status.as_u16(),
            body,
        })
    }
}

#[async_trait]
impl Notifier for DiscordNotifier {
    fn channel(&self) -> &str {
        "discord"
    }

    async fn deliver(&self, alert: &Alert) -> DeliveryOutcome {
        let payload = self.payload(alert);
        match self.post(&payload).await {
            Ok(()) => {
                debug!(user_id = alert.user_id, ticker = %alert.ticker, "Discord alert delivered");
                DeliveryOutcome::Delivered
            }
            Err(e) => DeliveryOutcome::Failed(e),
        }
    }
}

pub fn severity_color(severity: Severity) -> u32 {
    match severity {
        Severity::Info => COLOR_INFO,
        Severity::Warning => COLOR_WARNING,
        Severity::Critical => COLOR_CRITICAL,
    }
}

fn severity_icon(severity: Severity) -> &'static str {
    match severity {
        Severity::Info => "\u{2139}\u{fe0f}",
        Severity::Warning => "\u{26a0}\u{fe0f}",
        Severity::Critical => "\u{1f6a8}",
    }
}

/// "monthly_high_drop" -> "Monthly High Drop"
pub(crate) fn rule_title(kind: RuleKind) -> String {
    kind.as_str()
        .split('_')
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

fn retry_after(header: Option<&reqwest::header::HeaderValue>) -> Duration {
    header
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<f64>().ok())
        .filter(|secs| secs.is_finite() && *secs >= 0.0)
        .map(Duration::from_secs_f64)
        .unwrap_or(Duration::from_secs(1))
        .min(MAX_RETRY_AFTER)
}
