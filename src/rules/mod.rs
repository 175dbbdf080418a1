//! Rule engine: parameter validation, condition expressions, severity
//! classification and the per-kind matchers.

pub mod definition;
pub mod expression;
pub mod matchers;
pub mod severity;

pub use definition::{Direction, RuleConfigError, RuleDefinition, RuleParams, RuleSet};
pub use expression::{Bindings, Expression, ExpressionError, ExpressionResult, VARIABLES};
pub use matchers::{condition_discriminant, evaluate_rule, Candidate, AVG_VOLUME_DAYS};
pub use severity::{SeverityConfig, SeverityThresholds};
