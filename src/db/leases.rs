//! Lease locks for singleton background work
//!
//! A lease is a named row with an owner id and an expiry. Acquiring inserts
//! the row, or steals it once expired; the holder renews it periodically while
//! working and releases it when done. Used for the per-rule scan guard and the
//! action-executor singleton pass, so only one replica does a given piece of
//! work at a time.

use std::time::Duration;

use anyhow::Result;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, SqlitePool};

/// Lease record from database
#[derive(Debug, Clone, FromRow)]
pub struct LeaseRecord {
    pub name: String,
    pub owner: String,
    pub expires_at: DateTime<Utc>,
}

/// Worker leases database repository
pub struct LeaseRepository {
    pool: SqlitePool,
}

impl LeaseRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Try to take the lease. Succeeds only when the lease is free or
    /// expired; an unexpired lease refuses everyone, its own holder included,
    /// so a second fire of the same job cannot overlap the first. The holder
    /// extends its claim through `renew`, never by re-acquiring.
    pub async fn acquire(&self, name: &str, owner: &str, ttl: Duration) -> Result<bool> {
        let now = Utc::now();
        let expires_at = now + chrono::Duration::from_std(ttl)?;

        let result = sqlx::query(
            r#"
            INSERT INTO worker_leases (name, owner, expires_at)
            VALUES ($1, $2, $3)
            ON CONFLICT (name) DO UPDATE SET
                owner = excluded.owner,
                expires_at = excluded.expires_at
            WHERE worker_leases.expires_at <= $4
            "#,
        )
        .bind(name)
        .bind(owner)
        .bind(expires_at)
        .bind(now)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Push the expiry forward while still holding the lease
    pub async fn renew(&self, name: &str, owner: &str, ttl: Duration) -> Result<bool> {
        let expires_at = Utc::now() + chrono::Duration::from_std(ttl)?;

        let result = sqlx::query(
            "UPDATE worker_leases SET expires_at = $3 WHERE name = $1 AND owner = $2",
        )
        .bind(name)
        .bind(owner)
        .bind(expires_at)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Give the lease up; only the current owner can release it
    pub async fn release(&self, name: &str, owner: &str) -> Result<()> {
        sqlx::query("DELETE FROM worker_leases WHERE name = $1 AND owner = $2")
            .bind(name)
            .bind(owner)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    pub async fn get(&self, name: &str) -> Result<Option<LeaseRecord>> {
        let record = sqlx::query_as::<_, LeaseRecord>(
            "SELECT name, owner, expires_at FROM worker_leases WHERE name = $1",
        )
        .bind(name)
        .fetch_optional(&self.pool)
        .await?;

        Ok(record)
    }
}

/// Lease name for one rule's scan guard
pub fn scan_lease_name(rule_id: uuid::Uuid) -> String {
    format!("scan:{}", rule_id)
}

/// Lease name for the singleton action-executor pass
pub const ACTION_EXECUTOR_LEASE: &str = "action-executor";
