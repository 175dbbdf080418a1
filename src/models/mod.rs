//! Domain models for the alert service.
//!
//! Database-backed entities (users, symbols, rules, alert history) and the
//! market data values the rule engine evaluates against.

pub mod alert;
pub mod market;
pub mod rule;
pub mod symbol;
pub mod user;

// Re-export all models for convenient access
pub use alert::{Alert, AlertRecord, DedupKey, Severity};
pub use market::{DailyBar, MarketSnapshot, PriceHistory, MONTHLY_WINDOW_DAYS};
pub use rule::{RuleKind, UserRule};
pub use symbol::{InstrumentType, Symbol, SymbolListing};
pub use user::User;
