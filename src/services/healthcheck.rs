use crate::error::AppResult;
use crate::notifiers::discord::{Embed, EmbedField, WebhookPayload};
use crate::notifiers::DiscordNotifier;
use crate::rules::RuleSet;
use crate::storage::AlertStore;
use chrono::{DateTime, Utc};
use std::collections::BTreeSet;
use tracing::info;

const COLOR_HEALTHY: u32 = 0x2ECC71;
const COLOR_DEGRADED: u32 = 0xFFA500;

/// Snapshot of what the service is watching
#[derive(Debug, Clone, PartialEq)]
pub struct HealthReport {
    pub users: usize,
    /// Distinct watched tickers, sorted
    pub tickers: Vec<String>,
    pub rules: Vec<String>,
    pub invalid_rules: usize,
    pub generated_at: DateTime<Utc>,
}

impl HealthReport {
    pub async fn collect(store: &dyn AlertStore) -> AppResult<Self> {
        let users = store.list_enabled_users().await?;
        let mut tickers = BTreeSet::new();
        let mut rules = Vec::new();
        let mut invalid_rules = 0;

        for user in &users {
            for symbol in store.load_watchlist(user.id).await? {
                tickers.insert(symbol.ticker);
            }
            let set = RuleSet::compile(&store.load_enabled_rules(user.id).await?);
            rules.extend(set.rules.iter().map(|rule| rule.params.describe()));
            invalid_rules += set.rejected.len();
        }

        Ok(Self {
            users: users.len(),
            tickers: tickers.into_iter().collect(),
            rules,
            invalid_rules,
            generated_at: Utc::now(),
        })
    }

    pub fn is_healthy(&self) -> bool {
        self.invalid_rules == 0
    }

    pub fn to_payload(&self) -> WebhookPayload {
        let or_none = |s: String| if s.is_empty() { "None".to_string() } else { s };

        let description = if self.is_healthy() {
            "System is running normally.".to_string()
        } else {
            format!("{} rule(s) have invalid parameters and are disabled.", self.invalid_rules)
        };

        WebhookPayload {
            content: None,
            embeds: vec![Embed {
                title: "Modo Health Check".to_string(),
                description,
                color: if self.is_healthy() { COLOR_HEALTHY } else { COLOR_DEGRADED },
                fields: vec![
                    EmbedField {
                        name: "Users".to_string(),
                        value: self.users.to_string(),
                        inline: true,
                    },
                    EmbedField {
                        name: "Watchlist".to_string(),
                        value: or_none(self.tickers.join(", ")),
                        inline: true,
                    },
                    EmbedField {
                        name: "Rules".to_string(),
                        value: or_none(self.rules.join("\n")),
                        inline: false,
                    },
                ],
                timestamp: self.generated_at.to_rfc3339(),
            }],
        }
    }

    pub async fn send(&self, notifier: &DiscordNotifier) -> AppResult<()> {
        notifier.post(&self.to_payload()).await?;
        info!(users = self.users, tickers = self.tickers.len(), "Health check sent");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{InstrumentType, RuleKind, Symbol, User, UserRule};
    use crate::storage::InMemoryStore;
    use serde_json::json;

    #[tokio::test]
    async fn test_collect_report() {
        let store = InMemoryStore::new();
        store.add_user(User::new(1, Some("https://discord.test/1".to_string())));
        store.add_user(User::new(2, None));
        let aapl = Symbol::new(10, "AAPL", "Apple Inc.", InstrumentType::Stock, "NASDAQ");
        let spy = Symbol::new(11, "SPY", "SPDR S&P 500", InstrumentType::Etf, "NYSE Arca");
        store.watch(1, aapl.clone());
        store.watch(1, spy);
        store.watch(2, aapl);
        store.add_rule(UserRule::new(1, 1, RuleKind::DailyChange, json!({"threshold": 5})));
        store.add_rule(UserRule::new(2, 2, RuleKind::VolumeSpike, json!({"multiplier": -1})));

        let report = HealthReport::collect(&store).await.unwrap();
        assert_eq!(report.users, 2);
        assert_eq!(report.tickers, vec!["AAPL".to_string(), "SPY".to_string()]);
        assert_eq!(report.rules.len(), 1);
        assert_eq!(report.invalid_rules, 1);
        assert!(!report.is_healthy());

        let payload = report.to_payload();
        assert_eq!(payload.embeds[0].color, COLOR_DEGRADED);
        assert_eq!(payload.embeds[0].fields[1].value, "AAPL, SPY");
    }

    #[tokio::test]
    async fn test_empty_report() {
        let report = HealthReport::collect(&InMemoryStore::new()).await.unwrap();
        let payload = report.to_payload();
        assert_eq!(payload.embeds[0].color, COLOR_HEALTHY);
        assert_eq!(payload.embeds[0].fields[1].value, "None");
        assert_eq!(payload.embeds[0].fields[2].value, "None");
    }
}
