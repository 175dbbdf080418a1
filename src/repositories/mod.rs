pub mod alert_repository;
pub mod rule_repository;
pub mod symbol_repository;
pub mod user_repository;
pub mod watchlist_repository;

// Re-export all repositories for convenient access
pub use alert_repository::AlertRepository;
pub use rule_repository::RuleRepository;
pub use symbol_repository::SymbolRepository;
pub use user_repository::UserRepository;
pub use watchlist_repository::WatchlistRepository;
