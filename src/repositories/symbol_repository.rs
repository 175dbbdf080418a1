use crate::error::RepositoryError;
use crate::models::{Symbol, SymbolListing};
use sqlx::PgPool;

const SYMBOL_COLUMNS: &str = "id, ticker, name, instrument_type, exchange, updated_at";

/// Repository for the symbol directory
pub struct SymbolRepository {
    pool: PgPool,
}

impl SymbolRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Insert a symbol or refresh its name, type and exchange
    pub async fn upsert(&self, listing: &SymbolListing) -> Result<Symbol, RepositoryError> {
        let symbol = sqlx::query_as::<_, Symbol>(&format!(
            r#"
            INSERT INTO symbols (ticker, name, instrument_type, exchange)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (ticker) DO UPDATE
            SET name = EXCLUDED.name,
                instrument_type = EXCLUDED.instrument_type,
                exchange = EXCLUDED.exchange,
                updated_at = NOW()
            RETURNING {}
            "#,
            SYMBOL_COLUMNS
        ))
        .bind(listing.ticker.to_uppercase())
        .bind(&listing.name)
        .bind(listing.instrument_type.as_str())
        .bind(&listing.exchange)
        .fetch_one(&self.pool)
        .await?;

        Ok(symbol)
    }

    /// Upsert a whole directory in one transaction, returns rows written
    pub async fn bulk_upsert(&self, listings: &[SymbolListing]) -> Result<u64, RepositoryError> {
        let mut tx = self.pool.begin().await?;
        let mut written = 0;

        for listing in listings {
            written += sqlx::query(
                r#"
                INSERT INTO symbols (ticker, name, instrument_type, exchange)
                VALUES ($1, $2, $3, $4)
                ON CONFLICT (ticker) DO UPDATE
                SET name = EXCLUDED.name,
                    instrument_type = EXCLUDED.instrument_type,
                    exchange = EXCLUDED.exchange,
                    updated_at = NOW()
                "#,
            )
            .bind(listing.ticker.to_uppercase())
            .bind(&listing.name)
            .bind(listing.instrument_type.as_str())
            .bind(&listing.exchange)
            .execute(&mut *tx)
            .await?
            .rows_affected();
        }

        tx.commit().await?;
        Ok(written)
    }

    pub async fn find_by_id(&self, id: i64) -> Result<Option<Symbol>, RepositoryError> {
        let symbol = sqlx::query_as::<_, Symbol>(&format!(
            "SELECT {} FROM symbols WHERE id = $1",
            SYMBOL_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(symbol)
    }

    /// Case-insensitive ticker lookup
    pub async fn find_by_ticker(&self, ticker: &str) -> Result<Option<Symbol>, RepositoryError> {
        let symbol = sqlx::query_as::<_, Symbol>(&format!(
            "SELECT {} FROM symbols WHERE ticker = $1",
            SYMBOL_COLUMNS
        ))
        .bind(ticker.trim().to_uppercase())
        .fetch_optional(&self.pool)
        .await?;

        Ok(symbol)
    }

    pub async fn count(&self) -> Result<i64, RepositoryError> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM symbols")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }
}
