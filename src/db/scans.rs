//! Scan run database repository
//!
//! One row per scheduled firing of a rule. Terminal state is completed or
//! failed; a failed scan is never resumed, only superseded by the next fire.

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqlitePool};
use uuid::Uuid;

/// Lifecycle state of a scan run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScanStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

impl std::fmt::Display for ScanStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ScanStatus::Pending => "pending",
            ScanStatus::Running => "running",
            ScanStatus::Completed => "completed",
            ScanStatus::Failed => "failed",
        };
        write!(f, "{}", s)
    }
}

impl std::str::FromStr for ScanStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "pending" => Ok(ScanStatus::Pending),
            "running" => Ok(ScanStatus::Running),
            "completed" => Ok(ScanStatus::Completed),
            "failed" => Ok(ScanStatus::Failed),
            _ => Err(anyhow::anyhow!("Unknown scan status: {}", s)),
        }
    }
}

/// Item counts accumulated while a scan runs
#[derive(Debug, Clone, Copy, Default)]
pub struct ScanCounts {
    pub evaluated: i64,
    pub matched: i64,
    pub errored: i64,
}

/// Scan record from database
#[derive(Debug, Clone, FromRow)]
pub struct ScanRecord {
    pub id: Uuid,
    pub rule_id: Uuid,
    pub status: String,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub evaluated: i64,
    pub matched: i64,
    pub errored: i64,
    pub failure_reason: Option<String>,
}

impl ScanRecord {
    pub fn scan_status(&self) -> Result<ScanStatus> {
        self.status.parse()
    }
}

const SCAN_COLUMNS: &str = "id, rule_id, status, started_at, finished_at, evaluated, matched, \
                            errored, failure_reason";

/// Scans database repository
pub struct ScanRepository {
    pool: SqlitePool,
}

impl ScanRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Create a pending scan for a rule firing
    pub async fn create(&self, rule_id: Uuid) -> Result<ScanRecord> {
        let record = sqlx::query_as::<_, ScanRecord>(&format!(
            r#"
            INSERT INTO scans (id, rule_id, status)
            VALUES ($1, $2, 'pending')
            RETURNING {SCAN_COLUMNS}
            "#
        ))
        .bind(Uuid::new_v4())
        .bind(rule_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(record)
    }

    pub async fn mark_running(&self, id: Uuid) -> Result<()> {
        sqlx::query("UPDATE scans SET status = 'running', started_at = $2 WHERE id = $1")
            .bind(id)
            .bind(Utc::now())
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    pub async fn complete(&self, id: Uuid, counts: ScanCounts) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE scans
            SET status = 'completed', finished_at = $2,
                evaluated = $3, matched = $4, errored = $5
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(Utc::now())
        .bind(counts.evaluated)
        .bind(counts.matched)
        .bind(counts.errored)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn fail(&self, id: Uuid, reason: &str, counts: ScanCounts) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE scans
            SET status = 'failed', finished_at = $2, failure_reason = $3,
                evaluated = $4, matched = $5, errored = $6
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(Utc::now())
        .bind(reason)
        .bind(counts.evaluated)
        .bind(counts.matched)
        .bind(counts.errored)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn get(&self, id: Uuid) -> Result<Option<ScanRecord>> {
        let record = sqlx::query_as::<_, ScanRecord>(&format!(
            "SELECT {SCAN_COLUMNS} FROM scans WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(record)
    }

    /// Recent scan outcomes for one rule, newest first
    pub async fn list_for_rule(&self, rule_id: Uuid, limit: i64) -> Result<Vec<ScanRecord>> {
        let records = sqlx::query_as::<_, ScanRecord>(&format!(
            r#"
            SELECT {SCAN_COLUMNS} FROM scans
            WHERE rule_id = $1
            ORDER BY started_at DESC
            LIMIT $2
            "#
        ))
        .bind(rule_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(records)
    }
}
