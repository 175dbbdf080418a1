use crate::database::DatabaseError;
use crate::market::DataError;
use crate::notifiers::DeliveryError;
use crate::rules::{ExpressionError, RuleConfigError};
use sqlx::Error as SqlxError;
use thiserror::Error;

/// Errors that end a binary mode (check, healthcheck, sync-symbols).
/// Failures inside an evaluation run are [`EvaluationError`]s instead.
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    #[error("Storage error: {0}")]
    Storage(#[from] RepositoryError),

    #[error("Configuration error: {0}")]
    Config(String),

    /// Market data errors outside a run (symbol sync)
    #[error("Market data error: {0}")]
    MarketData(#[from] DataError),

    /// Webhook errors outside a run (health check)
    #[error("Delivery error: {0}")]
    Delivery(#[from] DeliveryError),
}

/// Result type alias for application errors
pub type AppResult<T> = Result<T, AppError>;

impl AppError {
    /// Check if error is a database connection error
    pub fn is_connection_error(&self) -> bool {
        matches!(
            self,
            AppError::Database(DatabaseError::Connect { .. })
                | AppError::Database(DatabaseError::ConnectionTimeout)
        )
    }

    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            AppError::Storage(RepositoryError::NotFound(_)) | AppError::MarketData(DataError::NotFound(_))
        )
    }

    /// Process exit code: 2 configuration, 3 database, 4 upstream service
    pub fn exit_code(&self) -> i32 {
        match self {
            AppError::Config(_) => 2,
            AppError::Database(_) | AppError::Storage(_) => 3,
            AppError::MarketData(_) | AppError::Delivery(_) => 4,
        }
    }
}

/// Repository-specific error types
#[derive(Error, Debug)]
pub enum RepositoryError {
    /// Database query error
    #[error("Query error: {0}")]
    Query(SqlxError),

    /// Record not found
    #[error("Record not found")]
    NotFound(String),

    /// Duplicate record
    #[error("Duplicate record: {0}")]
    Duplicate(String),

    /// Constraint violation
    #[error("Constraint violation: {0}")]
    ConstraintViolation(String),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

impl From<SqlxError> for RepositoryError {
    fn from(err: SqlxError) -> Self {
        match &err {
            SqlxError::RowNotFound => RepositoryError::NotFound("Record not found".to_string()),
            SqlxError::Database(db_err) => {
                // Check for common PostgreSQL error codes
                let code = db_err.code().map(|c| c.to_string());
                if code.as_deref() == Some("23505") {
                    // Unique violation
                    RepositoryError::Duplicate(db_err.message().to_string())
                } else if code.as_deref() == Some("23503") {
                    // Foreign key violation
                    RepositoryError::ConstraintViolation(db_err.message().to_string())
                } else if code.as_deref() == Some("23514") {
                    // Check constraint violation
                    RepositoryError::ConstraintViolation(db_err.message().to_string())
                } else {
                    RepositoryError::Query(err)
                }
            }
            _ => RepositoryError::Query(err),
        }
    }
}

/// A failure contained to one rule, symbol or user during an evaluation run
#[derive(Error, Debug)]
pub enum EvaluationError {
    /// Custom condition could not be evaluated; the rule is skipped this run
    #[error("Condition error: {0}")]
    Expression(#[from] ExpressionError),

    /// Market data unavailable; the symbol is skipped this run
    #[error("{0}")]
    Data(#[from] DataError),

    /// Invalid stored parameters; the rule is treated as disabled
    #[error("Invalid rule: {0}")]
    RuleConfig(#[from] RuleConfigError),

    /// Delivery failed; nothing was recorded and the alert stays eligible
    #[error("Delivery failed: {0}")]
    Delivery(#[from] DeliveryError),

    /// Reading rules/history or appending a record failed
    #[error("Storage error: {0}")]
    Storage(#[from] RepositoryError),
}

impl EvaluationError {
    /// Short category label used in logs and run summaries
    pub fn category(&self) -> &'static str {
        match self {
            EvaluationError::Expression(_) => "expression",
            EvaluationError::Data(_) => "data",
            EvaluationError::RuleConfig(_) => "rule_config",
            EvaluationError::Delivery(_) => "delivery",
            EvaluationError::Storage(_) => "storage",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_repository_error_wraps_into_app_error() {
        let err: AppError = RepositoryError::NotFound("user 7".to_string()).into();
        assert!(err.is_not_found());
        assert_eq!(err.exit_code(), 3);

        let err: AppError = DataError::NotFound("ZZZZ".to_string()).into();
        assert!(err.is_not_found());
        assert_eq!(err.exit_code(), 4);
    }

    #[test]
    fn test_row_not_found_maps_to_not_found() {
        let err: RepositoryError = SqlxError::RowNotFound.into();
        assert!(matches!(err, RepositoryError::NotFound(_)));
    }

    #[test]
    fn test_evaluation_error_categories() {
        let err: EvaluationError = DataError::NotFound("ZZZZ".to_string()).into();
        assert_eq!(err.category(), "data");
        assert_eq!(err.to_string(), "No market data for ZZZZ");

        let err: EvaluationError = ExpressionError::DivisionByZero.into();
        assert_eq!(err.category(), "expression");
    }

    #[test]
    fn test_exit_codes() {
        assert_eq!(AppError::Config("x".to_string()).exit_code(), 2);
        assert_eq!(AppError::Database(DatabaseError::ConnectionTimeout).exit_code(), 3);
        assert!(AppError::Database(DatabaseError::ConnectionTimeout).is_connection_error());
    }
}
