use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use tracing::debug;
use uuid::Uuid;

use crate::error::StoreError;
use crate::types::Opportunity;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScanSessionStatus {
    Running,
    Completed,
    Failed,
}

impl ScanSessionStatus {
    fn as_str(&self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }
}

/// Correlates a batch of durable writes back to the scan that produced it.
#[derive(Debug, Clone, PartialEq)]
pub struct ScanSession {
    pub id: Uuid,
    pub strategy: String,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub status: ScanSessionStatus,
    pub opportunities_found: i64,
}

/// Durable tier contract. Every write is a single upsert inside its own
/// commit boundary; the cache treats any error here as the tier being
/// unavailable and keeps serving.
#[async_trait]
pub trait SnapshotStore: Send + Sync {
    /// Idempotent per-opportunity upsert: an existing row's payload and
    /// expiry are refreshed, never duplicated.
    async fn upsert_snapshots(
        &self,
        opportunities: &[Opportunity],
        expires_at: DateTime<Utc>,
    ) -> Result<(), StoreError>;

    /// Active, non-expired snapshots matching the filter, newest first.
    async fn fetch_active(
        &self,
        strategy: Option<&str>,
        symbols: &[String],
        now: DateTime<Utc>,
    ) -> Result<Vec<Opportunity>, StoreError>;

    /// Telemetry only; never consulted for eviction.
    async fn record_hits(&self, ids: &[Uuid]) -> Result<(), StoreError>;

    async fn delete_expired(&self, now: DateTime<Utc>) -> Result<u64, StoreError>;

    async fn record_scan_session(&self, session: &ScanSession) -> Result<(), StoreError>;
}

/// Postgres-backed snapshot store.
pub struct PostgresSnapshotStore {
    pool: PgPool,
}

impl PostgresSnapshotStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn row_to_opportunity(row: PgRow) -> Result<Opportunity, StoreError> {
    let payload: serde_json::Value = row.try_get("payload").map_err(StoreError::Database)?;
    Ok(serde_json::from_value(payload)?)
}

#[async_trait]
impl SnapshotStore for PostgresSnapshotStore {
    async fn upsert_snapshots(
        &self,
        opportunities: &[Opportunity],
        expires_at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        for opportunity in opportunities {
            let payload = serde_json::to_value(opportunity)?;
            sqlx::query(
                r#"
                INSERT INTO opportunity_snapshots
                    (opportunity_id, symbol, strategy_type, payload, created_at, expires_at, is_active, hit_count)
                VALUES ($1, $2, $3, $4, $5, $6, TRUE, 0)
                ON CONFLICT (opportunity_id) DO UPDATE
                    SET payload = EXCLUDED.payload,
                        expires_at = EXCLUDED.expires_at,
                        is_active = TRUE
                "#,
            )
            .bind(opportunity.id)
            .bind(&opportunity.symbol)
            .bind(&opportunity.strategy)
            .bind(payload)
            .bind(opportunity.generated_at)
            .bind(expires_at)
            .execute(&self.pool)
            .await?;
        }
        Ok(())
    }

    async fn fetch_active(
        &self,
        strategy: Option<&str>,
        symbols: &[String],
        now: DateTime<Utc>,
    ) -> Result<Vec<Opportunity>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT payload
            FROM opportunity_snapshots
            WHERE is_active = TRUE
              AND expires_at > $1
              AND ($2::text IS NULL OR strategy_type = $2)
              AND (cardinality($3::text[]) = 0 OR symbol = ANY($3))
            ORDER BY created_at DESC
            "#,
        )
        .bind(now)
        .bind(strategy)
        .bind(symbols)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(row_to_opportunity).collect()
    }

    async fn record_hits(&self, ids: &[Uuid]) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            UPDATE opportunity_snapshots
            SET hit_count = hit_count + 1
            WHERE opportunity_id = ANY($1)
            "#,
        )
        .bind(ids)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn delete_expired(&self, now: DateTime<Utc>) -> Result<u64, StoreError> {
        let result = sqlx::query(
            r#"
            DELETE FROM opportunity_snapshots
            WHERE expires_at <= $1
            "#,
        )
        .bind(now)
        .execute(&self.pool)
        .await?;

        let removed = result.rows_affected();
        if removed > 0 {
            debug!("Deleted {} expired snapshots", removed);
        }
        Ok(removed)
    }

    async fn record_scan_session(&self, session: &ScanSession) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO scan_sessions
                (id, strategy, started_at, completed_at, status, opportunities_found)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (id) DO UPDATE
                SET completed_at = EXCLUDED.completed_at,
                    status = EXCLUDED.status,
                    opportunities_found = EXCLUDED.opportunities_found
            "#,
        )
        .bind(session.id)
        .bind(&session.strategy)
        .bind(session.started_at)
        .bind(session.completed_at)
        .bind(session.status.as_str())
        .bind(session.opportunities_found)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
