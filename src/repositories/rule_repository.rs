use crate::error::RepositoryError;
use crate::models::{RuleKind, UserRule};
use serde_json::Value;
use sqlx::PgPool;

const RULE_COLUMNS: &str = "id, user_id, rule_type, parameters, enabled, symbol_id, created_at";

/// Repository for user alert rules.
///
/// Parameters are stored as given; validation happens when the engine
/// loads them.
pub struct RuleRepository {
    pool: PgPool,
}

impl RuleRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn create(
        &self,
        user_id: i64,
        kind: RuleKind,
        parameters: &Value,
        symbol_id: Option<i64>,
    ) -> Result<UserRule, RepositoryError> {
        let rule = sqlx::query_as::<_, UserRule>(&format!(
            r#"
            INSERT INTO user_rules (user_id, rule_type, parameters, symbol_id)
            VALUES ($1, $2, $3, $4)
            RETURNING {}
            "#,
            RULE_COLUMNS
        ))
        .bind(user_id)
        .bind(kind.as_str())
        .bind(parameters)
        .bind(symbol_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(rule)
    }

    /// Enabled rules in definition order
    pub async fn find_enabled_by_user(&self, user_id: i64) -> Result<Vec<UserRule>, RepositoryError> {
        let rules = sqlx::query_as::<_, UserRule>(&format!(
            "SELECT {} FROM user_rules WHERE user_id = $1 AND enabled = TRUE ORDER BY id",
            RULE_COLUMNS
        ))
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rules)
    }

    pub async fn find_by_user(&self, user_id: i64) -> Result<Vec<UserRule>, RepositoryError> {
        let rules = sqlx::query_as::<_, UserRule>(&format!(
            "SELECT {} FROM user_rules WHERE user_id = $1 ORDER BY id",
            RULE_COLUMNS
        ))
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rules)
    }

    pub async fn set_enabled(&self, id: i64, enabled: bool) -> Result<bool, RepositoryError> {
        let rows_affected = sqlx::query("UPDATE user_rules SET enabled = $2 WHERE id = $1")
            .bind(id)
            .bind(enabled)
            .execute(&self.pool)
            .await?
            .rows_affected();

        Ok(rows_affected > 0)
    }

    pub async fn delete(&self, id: i64) -> Result<bool, RepositoryError> {
        let rows_affected = sqlx::query("DELETE FROM user_rules WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?
            .rows_affected();

        Ok(rows_affected > 0)
    }
}
