use crate::error::RepositoryError;
use crate::models::Symbol;
use sqlx::PgPool;

/// Repository for user watchlists
pub struct WatchlistRepository {
    pool: PgPool,
}

impl WatchlistRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Add a symbol to a watchlist. Returns false if it was already there.
    pub async fn add(&self, user_id: i64, symbol_id: i64) -> Result<bool, RepositoryError> {
        let rows_affected = sqlx::query(
            r#"
            INSERT INTO user_watchlist (user_id, symbol_id)
            VALUES ($1, $2)
            ON CONFLICT (user_id, symbol_id) DO NOTHING
            "#,
        )
        .bind(user_id)
        .bind(symbol_id)
        .execute(&self.pool)
        .await?
        .rows_affected();

        Ok(rows_affected > 0)
    }

    pub async fn remove(&self, user_id: i64, symbol_id: i64) -> Result<bool, RepositoryError> {
        let rows_affected = sqlx::query("DELETE FROM user_watchlist WHERE user_id = $1 AND symbol_id = $2")
            .bind(user_id)
            .bind(symbol_id)
            .execute(&self.pool)
            .await?
            .rows_affected();

        Ok(rows_affected > 0)
    }

    /// Watched symbols in the order they were added
    pub async fn symbols_for_user(&self, user_id: i64) -> Result<Vec<Symbol>, RepositoryError> {
        let symbols = sqlx::query_as::<_, Symbol>(
            r#"
            SELECT s.id, s.ticker, s.name, s.instrument_type, s.exchange, s.updated_at
            FROM user_watchlist w
            JOIN symbols s ON s.id = w.symbol_id
            WHERE w.user_id = $1
            ORDER BY w.id
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(symbols)
    }
}
