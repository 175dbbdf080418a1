use crate::error::RepositoryError;
use crate::models::{AlertRecord, DedupKey};
use chrono::{DateTime, Duration, Utc};
use sqlx::PgPool;

const ALERT_COLUMNS: &str = "id, user_id, symbol_id, rule_id, rule_type, discriminant, severity, \
                             message, current_price, triggered_at, sent_at";

/// Append-only alert history
pub struct AlertRepository {
    pool: PgPool,
}

impl AlertRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Append a delivered alert unless the key already has a record sent
    /// less than `cooldown` before this one.
    ///
    /// Writers for the same dedup key are serialized by a transaction
    /// scoped advisory lock and the cooldown is re-checked under it, so of
    /// two concurrent writers only the first appends. The other gets `None`.
    pub async fn append(
        &self,
        record: &AlertRecord,
        cooldown: Duration,
    ) -> Result<Option<AlertRecord>, RepositoryError> {
        let key = record.dedup_key().map_err(RepositoryError::InvalidInput)?;

        let mut tx = self.pool.begin().await?;

        sqlx::query("SELECT pg_advisory_xact_lock(hashtext($1))")
            .bind(key.lock_key())
            .execute(&mut *tx)
            .await?;

        let (already_sent,): (bool,) = sqlx::query_as(
            r#"
            SELECT EXISTS (
                SELECT 1 FROM alert_history
                WHERE user_id = $1 AND symbol_id = $2 AND rule_type = $3
                  AND discriminant = $4 AND sent_at > $5
            )
            "#,
        )
        .bind(key.user_id)
        .bind(key.symbol_id)
        .bind(key.rule_kind.as_str())
        .bind(key.discriminant)
        .bind(record.sent_at - cooldown)
        .fetch_one(&mut *tx)
        .await?;

        if already_sent {
            tx.rollback().await?;
            return Ok(None);
        }

        let inserted = sqlx::query_as::<_, AlertRecord>(&format!(
            r#"
            INSERT INTO alert_history
                (user_id, symbol_id, rule_id, rule_type, discriminant, severity,
                 message, current_price, triggered_at, sent_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            RETURNING {}
            "#,
            ALERT_COLUMNS
        ))
        .bind(record.user_id)
        .bind(record.symbol_id)
        .bind(record.rule_id)
        .bind(&record.rule_type)
        .bind(record.discriminant)
        .bind(&record.severity)
        .bind(&record.message)
        .bind(record.current_price)
        .bind(record.triggered_at)
        .bind(record.sent_at)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(Some(inserted))
    }

    /// Records for a dedup key sent at or after `since`, newest first
    pub async fn find_recent(
        &self,
        key: &DedupKey,
        since: DateTime<Utc>,
    ) -> Result<Vec<AlertRecord>, RepositoryError> {
        let records = sqlx::query_as::<_, AlertRecord>(&format!(
            r#"
            SELECT {}
            FROM alert_history
            WHERE user_id = $1 AND symbol_id = $2 AND rule_type = $3
              AND discriminant = $4 AND sent_at >= $5
            ORDER BY sent_at DESC
            "#,
            ALERT_COLUMNS
        ))
        .bind(key.user_id)
        .bind(key.symbol_id)
        .bind(key.rule_kind.as_str())
        .bind(key.discriminant)
        .bind(since)
        .fetch_all(&self.pool)
        .await?;

        Ok(records)
    }

    /// Most recent alerts for a user
    pub async fn find_by_user(&self, user_id: i64, limit: i64) -> Result<Vec<AlertRecord>, RepositoryError> {
        let records = sqlx::query_as::<_, AlertRecord>(&format!(
            "SELECT {} FROM alert_history WHERE user_id = $1 ORDER BY sent_at DESC LIMIT $2",
            ALERT_COLUMNS
        ))
        .bind(user_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(records)
    }

    /// Delete history older than the cutoff, returns rows removed
    pub async fn prune_older_than(&self, cutoff: DateTime<Utc>) -> Result<u64, RepositoryError> {
        let rows_affected = sqlx::query("DELETE FROM alert_history WHERE sent_at < $1")
            .bind(cutoff)
            .execute(&self.pool)
            .await?
            .rows_affected();

        Ok(rows_affected)
    }
}
