//! Candidate database repository
//!
//! A candidate is a media item flagged by a scan as matching a rule. Its
//! review status only advances forward: pending → approved/rejected →
//! deleted. Transitions are guarded at the SQL level so repeated submissions
//! and concurrent executor passes are safe.

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqlitePool};
use uuid::Uuid;

use crate::media::MediaKind;

/// Review state of a candidate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReviewStatus {
    Pending,
    Approved,
    Rejected,
    Deleted,
}

impl std::fmt::Display for ReviewStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ReviewStatus::Pending => "pending",
            ReviewStatus::Approved => "approved",
            ReviewStatus::Rejected => "rejected",
            ReviewStatus::Deleted => "deleted",
        };
        write!(f, "{}", s)
    }
}

impl std::str::FromStr for ReviewStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "pending" => Ok(ReviewStatus::Pending),
            "approved" => Ok(ReviewStatus::Approved),
            "rejected" => Ok(ReviewStatus::Rejected),
            "deleted" => Ok(ReviewStatus::Deleted),
            _ => Err(anyhow::anyhow!("Unknown review status: {}", s)),
        }
    }
}

/// Candidate record from database
#[derive(Debug, Clone, FromRow)]
pub struct CandidateRecord {
    pub id: Uuid,
    pub scan_id: Uuid,
    pub rule_id: Uuid,
    pub media_kind: String,
    pub title: String,
    pub year: Option<i32>,
    pub servarr_id: i64,
    pub external_catalog_id: Option<i64>,
    pub review_status: String,
    pub flagged_at: DateTime<Utc>,
    pub reviewed_at: Option<DateTime<Utc>>,
}

impl CandidateRecord {
    pub fn status(&self) -> Result<ReviewStatus> {
        self.review_status.parse()
    }
}

/// Data for flagging a new candidate
#[derive(Debug, Clone)]
pub struct CreateCandidate {
    pub scan_id: Uuid,
    pub rule_id: Uuid,
    pub media_kind: MediaKind,
    pub title: String,
    pub year: Option<i32>,
    pub servarr_id: i64,
    pub external_catalog_id: Option<i64>,
}

/// Filter for candidate listing
#[derive(Debug, Clone, Default)]
pub struct CandidateFilter {
    pub review_status: Option<ReviewStatus>,
    pub media_kind: Option<MediaKind>,
    pub rule_id: Option<Uuid>,
    pub limit: i64,
    pub offset: i64,
}

const CANDIDATE_COLUMNS: &str = "id, scan_id, rule_id, media_kind, title, year, servarr_id, \
                                 external_catalog_id, review_status, flagged_at, reviewed_at";

/// Candidates database repository
pub struct CandidateRepository {
    pool: SqlitePool,
}

impl CandidateRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Flag a matched item, once.
    ///
    /// The (rule_id, servarr_id) unique key makes re-scans idempotent: an
    /// existing candidate, pending or already reviewed, is left untouched.
    /// Returns whether a new candidate was created.
    pub async fn flag(&self, data: CreateCandidate) -> Result<bool> {
        let result = sqlx::query(
            r#"
            INSERT INTO candidates (
                id, scan_id, rule_id, media_kind, title, year,
                servarr_id, external_catalog_id, review_status, flagged_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, 'pending', $9)
            ON CONFLICT (rule_id, servarr_id) DO NOTHING
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(data.scan_id)
        .bind(data.rule_id)
        .bind(data.media_kind.to_string())
        .bind(&data.title)
        .bind(data.year)
        .bind(data.servarr_id)
        .bind(data.external_catalog_id)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    pub async fn get(&self, id: Uuid) -> Result<Option<CandidateRecord>> {
        let record = sqlx::query_as::<_, CandidateRecord>(&format!(
            "SELECT {CANDIDATE_COLUMNS} FROM candidates WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(record)
    }

    pub async fn list(&self, filter: &CandidateFilter) -> Result<Vec<CandidateRecord>> {
        // Build dynamic filter query
        let mut conditions = Vec::new();
        let mut param_idx = 1;

        if filter.review_status.is_some() {
            conditions.push(format!("review_status = ${}", param_idx));
            param_idx += 1;
        }
        if filter.media_kind.is_some() {
            conditions.push(format!("media_kind = ${}", param_idx));
            param_idx += 1;
        }
        if filter.rule_id.is_some() {
            conditions.push(format!("rule_id = ${}", param_idx));
            param_idx += 1;
        }

        let where_clause = if conditions.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", conditions.join(" AND "))
        };

        let query = format!(
            r#"
            SELECT {CANDIDATE_COLUMNS} FROM candidates
            {where_clause}
            ORDER BY flagged_at DESC
            LIMIT ${} OFFSET ${}
            "#,
            param_idx,
            param_idx + 1
        );

        let mut query_builder = sqlx::query_as::<_, CandidateRecord>(&query);
        if let Some(status) = filter.review_status {
            query_builder = query_builder.bind(status.to_string());
        }
        if let Some(kind) = filter.media_kind {
            query_builder = query_builder.bind(kind.to_string());
        }
        if let Some(rule_id) = filter.rule_id {
            query_builder = query_builder.bind(rule_id);
        }
        let records = query_builder
            .bind(if filter.limit > 0 { filter.limit } else { 50 })
            .bind(filter.offset.max(0))
            .fetch_all(&self.pool)
            .await?;

        Ok(records)
    }

    /// Guarded forward transition from `from` to `to`.
    ///
    /// Returns whether the row moved; a candidate not in `from` is left
    /// untouched, which makes repeated submissions a no-op rather than an
    /// error.
    pub async fn transition(&self, id: Uuid, from: ReviewStatus, to: ReviewStatus) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE candidates
            SET review_status = $3, reviewed_at = $4
            WHERE id = $1 AND review_status = $2
            "#,
        )
        .bind(id)
        .bind(from.to_string())
        .bind(to.to_string())
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    pub async fn approve(&self, id: Uuid) -> Result<bool> {
        self.transition(id, ReviewStatus::Pending, ReviewStatus::Approved)
            .await
    }

    pub async fn reject(&self, id: Uuid) -> Result<bool> {
        self.transition(id, ReviewStatus::Pending, ReviewStatus::Rejected)
            .await
    }

    /// Explicit operator reset: a rejected candidate becomes pending again so
    /// a later scan or review can pick it back up.
    pub async fn reset(&self, id: Uuid) -> Result<bool> {
        self.transition(id, ReviewStatus::Rejected, ReviewStatus::Pending)
            .await
    }

    pub async fn bulk_approve(&self, ids: &[Uuid]) -> Result<u64> {
        let mut moved = 0;
        for id in ids {
            if self.approve(*id).await? {
                moved += 1;
            }
        }
        Ok(moved)
    }

    pub async fn bulk_reject(&self, ids: &[Uuid]) -> Result<u64> {
        let mut moved = 0;
        for id in ids {
            if self.reject(*id).await? {
                moved += 1;
            }
        }
        Ok(moved)
    }

    /// Candidates of one rule in `status` flagged at or before `cutoff`,
    /// i.e. whose action delay has elapsed.
    pub async fn eligible_for_action(
        &self,
        rule_id: Uuid,
        status: ReviewStatus,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<CandidateRecord>> {
        let records = sqlx::query_as::<_, CandidateRecord>(&format!(
            r#"
            SELECT {CANDIDATE_COLUMNS} FROM candidates
            WHERE rule_id = $1 AND review_status = $2 AND flagged_at <= $3
            ORDER BY flagged_at
            "#
        ))
        .bind(rule_id)
        .bind(status.to_string())
        .bind(cutoff)
        .fetch_all(&self.pool)
        .await?;

        Ok(records)
    }
}
