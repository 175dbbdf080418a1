pub mod dedup;
pub mod evaluator;
pub mod healthcheck;
pub mod poller;
pub mod symbol_sync;

pub use dedup::{DedupGate, PassKeys};
pub use evaluator::{AlertEngine, EvaluationRun, RunError, RunSummary, UserAlerts};
pub use healthcheck::HealthReport;
pub use poller::{log_summary, AlertPoller};
pub use symbol_sync::SymbolSyncService;
