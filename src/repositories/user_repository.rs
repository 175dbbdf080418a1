use crate::error::RepositoryError;
use crate::models::User;
use sqlx::PgPool;

const USER_COLUMNS: &str = "id, email, discord_webhook_url, enabled, created_at";

/// Repository for user data access
pub struct UserRepository {
    pool: PgPool,
}

impl UserRepository {
    /// Create a new UserRepository
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Insert a new user
    pub async fn create(
        &self,
        email: Option<&str>,
        discord_webhook_url: Option<&str>,
    ) -> Result<User, RepositoryError> {
        let user = sqlx::query_as::<_, User>(&format!(
            r#"
            INSERT INTO users (email, discord_webhook_url)
            VALUES ($1, $2)
            RETURNING {}
            "#,
            USER_COLUMNS
        ))
        .bind(email)
        .bind(discord_webhook_url)
        .fetch_one(&self.pool)
        .await?;

        Ok(user)
    }

    /// Find a user by id
    pub async fn find_by_id(&self, id: i64) -> Result<Option<User>, RepositoryError> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {} FROM users WHERE id = $1",
            USER_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(user)
    }

    /// Enabled users in id order
    pub async fn list_enabled(&self) -> Result<Vec<User>, RepositoryError> {
        let users = sqlx::query_as::<_, User>(&format!(
            "SELECT {} FROM users WHERE enabled = TRUE ORDER BY id",
            USER_COLUMNS
        ))
        .fetch_all(&self.pool)
        .await?;

        Ok(users)
    }

    /// Replace a user's Discord webhook (None clears it)
    pub async fn set_discord_webhook(
        &self,
        id: i64,
        discord_webhook_url: Option<&str>,
    ) -> Result<bool, RepositoryError> {
        let rows_affected = sqlx::query("UPDATE users SET discord_webhook_url = $2 WHERE id = $1")
            .bind(id)
            .bind(discord_webhook_url)
            .execute(&self.pool)
            .await?
            .rows_affected();

        Ok(rows_affected > 0)
    }

    pub async fn set_enabled(&self, id: i64, enabled: bool) -> Result<bool, RepositoryError> {
        let rows_affected = sqlx::query("UPDATE users SET enabled = $2 WHERE id = $1")
            .bind(id)
            .bind(enabled)
            .execute(&self.pool)
            .await?
            .rows_affected();

        Ok(rows_affected > 0)
    }
}
