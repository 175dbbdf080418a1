use super::discord::{rule_title, severity_color};
use super::{DeliveryError, DeliveryOutcome, Notifier};
use crate::config::SmtpConfig;
use crate::models::{Alert, Severity};
use async_trait::async_trait;
use lettre::message::{Mailbox, MultiPart};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use std::sync::Arc;
use tracing::debug;

/// STARTTLS relay and sender address shared by every email channel
pub struct SmtpMailer {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
}

impl SmtpMailer {
    /// No connection is opened until the first message is sent
    pub fn new(config: &SmtpConfig) -> Result<Self, DeliveryError> {
        let from = config
            .from
            .parse::<Mailbox>()
            .map_err(|e| DeliveryError::Misconfigured(format!("sender '{}': {}", config.from, e)))?;

        let transport = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.host)
            .map_err(|e| DeliveryError::Misconfigured(format!("SMTP relay '{}': {}", config.host, e)))?
            .port(config.port)
            .credentials(Credentials::new(config.username.clone(), config.password.clone()))
            .build();

        Ok(Self { transport, from })
    }
}

/// Email channel for one recipient
pub struct EmailNotifier {
    mailer: Arc<SmtpMailer>,
    to: String,
    include_chart_link: bool,
}

impl EmailNotifier {
    pub fn new(mailer: Arc<SmtpMailer>, to: impl Into<String>, include_chart_link: bool) -> Self {
        Self {
            mailer,
            to: to.into(),
            include_chart_link,
        }
    }

    /// Multipart message with a plain text and an HTML body
    pub fn message(&self, alert: &Alert) -> Result<Message, DeliveryError> {
        let to = self
            .to
            .parse::<Mailbox>()
            .map_err(|e| DeliveryError::Misconfigured(format!("recipient '{}': {}", self.to, e)))?;

        Message::builder()
            .from(self.mailer.from.clone())
            .to(to)
            .subject(subject(alert))
            .multipart(MultiPart::alternative_plain_html(
                text_body(alert),
                html_body(alert, self.include_chart_link),
            ))
            .map_err(|e| DeliveryError::Misconfigured(e.to_string()))
    }
}

#[async_trait]
impl Notifier for EmailNotifier {
    fn channel(&self) -> &str {
        "email"
    }

    async fn deliver(&self, alert: &Alert) -> DeliveryOutcome {
        let message = match self.message(alert) {
            Ok(message) => message,
            Err(e) => return DeliveryOutcome::Failed(e),
        };

        match self.mailer.transport.send(message).await {
            Ok(_) => {
                debug!(user_id = alert.user_id, ticker = %alert.ticker, "Email alert delivered");
                DeliveryOutcome::Delivered
            }
            Err(e) => DeliveryOutcome::Failed(DeliveryError::Smtp(e.to_string())),
        }
    }
}

/// "[Warning] Modo Alert: AAPL"
pub fn subject(alert: &Alert) -> String {
    let prefix = match alert.severity {
        Severity::Info => "[Info]",
        Severity::Warning => "[Warning]",
        Severity::Critical => "[CRITICAL]",
    };
    format!("{} Modo Alert: {}", prefix, alert.ticker)
}

pub fn text_body(alert: &Alert) -> String {
    format!(
        "Modo Stock Alert\n\nTicker: {}\nRule: {}\nPrice: ${:.2}\n\n{}\n\nTime: {}\n",
        alert.ticker,
        rule_title(alert.rule_kind),
        alert.current_price,
        alert.message,
        alert.triggered_at.format("%Y-%m-%d %H:%M:%S"),
    )
}

/// HTML body accented with the severity colour
pub fn html_body(alert: &Alert, include_chart_link: bool) -> String {
    let color = format!("#{:06X}", severity_color(alert.severity));
    let chart = if include_chart_link {
        format!(
            r#"<div class="chart-link"><a href="https://www.tradingview.com/symbols/{ticker}" style="color: {color};">View Chart on TradingView</a></div>"#,
            ticker = escape(&alert.ticker),
            color = color,
        )
    } else {
        String::new()
    };

    format!(
        r#"<!DOCTYPE html>
<html>
<body style="font-family: Arial, sans-serif; margin: 0; padding: 20px;">
<div class="alert-box" style="border-left: 4px solid {color}; padding: 15px; background-color: #f9f9f9;">
<div class="ticker" style="font-size: 24px; font-weight: bold; color: {color};">{ticker}</div>
<div class="price" style="font-size: 18px; color: #333;">Current Price: ${price:.2}</div>
<div class="message" style="margin: 15px 0; color: #555;">{message}</div>
<div class="meta" style="color: #888; font-size: 12px;">Rule: {rule}<br>Time: {time}</div>
{chart}
</div>
</body>
</html>
"#,
        color = color,
        ticker = escape(&alert.ticker),
        price = alert.current_price,
        message = escape(&alert.message),
        rule = rule_title(alert.rule_kind),
        time = alert.triggered_at.format("%Y-%m-%d %H:%M:%S"),
        chart = chart,
    )
}

/// Custom rule names end up in messages, so they are escaped
fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}
