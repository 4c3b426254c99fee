//! Candidate review endpoints
//!
//! Review transitions are compare-and-swap at the database layer; a stale
//! request (e.g. approving an already rejected candidate) comes back as a 409
//! rather than silently clobbering the other reviewer's decision.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::db::{CandidateFilter, CandidateRecord, ReviewStatus, RuleRecord};
use crate::media::MediaKind;
use crate::AppState;

#[derive(Debug, Serialize)]
pub struct CandidateResponse {
    pub id: Uuid,
    pub scan_id: Uuid,
    pub rule_id: Uuid,
    /// Absent when the flagging rule has since been deleted
    pub rule_name: Option<String>,
    pub media_kind: String,
    pub title: String,
    pub year: Option<i32>,
    pub servarr_id: i64,
    pub external_catalog_id: Option<i64>,
    pub review_status: String,
    pub flagged_at: DateTime<Utc>,
    pub reviewed_at: Option<DateTime<Utc>>,
    /// Whole days until the rule's action delay elapses; 0 once eligible
    pub days_until_action: Option<i64>,
}

impl CandidateResponse {
    fn build(record: CandidateRecord, rule: Option<&RuleRecord>, now: DateTime<Utc>) -> Self {
        let days_until_action = rule.map(|r| {
            let delay = r.action_delay_days.unwrap_or(0);
            let eligible_at = record.flagged_at + chrono::Duration::days(delay);
            (eligible_at - now).num_days().max(0)
        });
        Self {
            id: record.id,
            scan_id: record.scan_id,
            rule_id: record.rule_id,
            rule_name: rule.map(|r| r.name.clone()),
            media_kind: record.media_kind,
            title: record.title,
            year: record.year,
            servarr_id: record.servarr_id,
            external_catalog_id: record.external_catalog_id,
            review_status: record.review_status,
            flagged_at: record.flagged_at,
            reviewed_at: record.reviewed_at,
            days_until_action,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ListCandidatesQuery {
    pub status: Option<ReviewStatus>,
    pub media_kind: Option<MediaKind>,
    pub rule_id: Option<Uuid>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct ReviewResponse {
    pub success: bool,
    pub message: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BulkAction {
    Approve,
    Reject,
}

#[derive(Debug, Deserialize)]
pub struct BulkReviewRequest {
    pub action: BulkAction,
    pub ids: Vec<Uuid>,
}

#[derive(Debug, Serialize)]
pub struct BulkReviewResponse {
    pub requested: usize,
    pub updated: u64,
}

async fn list_candidates(
    State(state): State<AppState>,
    Query(query): Query<ListCandidatesQuery>,
) -> Result<Json<Vec<CandidateResponse>>, StatusCode> {
    let filter = CandidateFilter {
        review_status: query.status,
        media_kind: query.media_kind,
        rule_id: query.rule_id,
        limit: query.limit.unwrap_or(100).clamp(1, 500),
        offset: query.offset.unwrap_or(0).max(0),
    };
    let candidates = state.db.candidates().list(&filter).await.map_err(|e| {
        tracing::error!("Failed to list candidates: {}", e);
        StatusCode::INTERNAL_SERVER_ERROR
    })?;
    let rules = state.db.rules().list().await.map_err(|e| {
        tracing::error!("Failed to list rules: {}", e);
        StatusCode::INTERNAL_SERVER_ERROR
    })?;

    let now = Utc::now();
    Ok(Json(
        candidates
            .into_iter()
            .map(|record| {
                let rule = rules.iter().find(|r| r.id == record.rule_id);
                CandidateResponse::build(record, rule, now)
            })
            .collect(),
    ))
}

async fn get_candidate(
    State(state): State<AppState>,
    Path(candidate_id): Path<Uuid>,
) -> Result<Json<CandidateResponse>, StatusCode> {
    let record = state.db.candidates().get(candidate_id).await.map_err(|e| {
        tracing::error!("Failed to load candidate: {}", e);
        StatusCode::INTERNAL_SERVER_ERROR
    })?;
    let Some(record) = record else {
        return Err(StatusCode::NOT_FOUND);
    };
    let rule = state.db.rules().get(record.rule_id).await.map_err(|e| {
        tracing::error!("Failed to load rule: {}", e);
        StatusCode::INTERNAL_SERVER_ERROR
    })?;
    Ok(Json(CandidateResponse::build(
        record,
        rule.as_ref(),
        Utc::now(),
    )))
}

/// Shared shape of the three single-candidate review handlers.
///
/// Re-submitting a decision the candidate already carries is a success, so a
/// double-clicked approve button stays harmless; 409 is reserved for a
/// genuinely contradictory state (e.g. rejecting an approved candidate).
async fn review(
    state: &AppState,
    candidate_id: Uuid,
    verb: &str,
    target: ReviewStatus,
    op: impl std::future::Future<Output = anyhow::Result<bool>>,
) -> Response {
    let exists = match state.db.candidates().get(candidate_id).await {
        Ok(record) => record.is_some(),
        Err(e) => {
            tracing::error!("Failed to load candidate: {}", e);
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };
    if !exists {
        return StatusCode::NOT_FOUND.into_response();
    }

    match op.await {
        Ok(true) => Json(ReviewResponse {
            success: true,
            message: format!("candidate {}", verb),
        })
        .into_response(),
        Ok(false) => {
            let current = match state.db.candidates().get(candidate_id).await {
                Ok(record) => record.and_then(|r| r.status().ok()),
                Err(e) => {
                    tracing::error!("Failed to load candidate: {}", e);
                    return StatusCode::INTERNAL_SERVER_ERROR.into_response();
                }
            };
            if current == Some(target) {
                return Json(ReviewResponse {
                    success: true,
                    message: format!("candidate already {}", verb),
                })
                .into_response();
            }
            (
                StatusCode::CONFLICT,
                Json(ReviewResponse {
                    success: false,
                    message: format!("candidate not in a state that can be {}", verb),
                }),
            )
                .into_response()
        }
        Err(e) => {
            tracing::error!("Review transition failed: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

async fn approve_candidate(
    State(state): State<AppState>,
    Path(candidate_id): Path<Uuid>,
) -> Response {
    let candidates = state.db.candidates();
    review(
        &state,
        candidate_id,
        "approved",
        ReviewStatus::Approved,
        candidates.approve(candidate_id),
    )
    .await
}

async fn reject_candidate(
    State(state): State<AppState>,
    Path(candidate_id): Path<Uuid>,
) -> Response {
    let candidates = state.db.candidates();
    review(
        &state,
        candidate_id,
        "rejected",
        ReviewStatus::Rejected,
        candidates.reject(candidate_id),
    )
    .await
}

/// Put a rejected candidate back under review
async fn reset_candidate(
    State(state): State<AppState>,
    Path(candidate_id): Path<Uuid>,
) -> Response {
    let candidates = state.db.candidates();
    review(
        &state,
        candidate_id,
        "reset",
        ReviewStatus::Pending,
        candidates.reset(candidate_id),
    )
    .await
}

async fn bulk_review(
    State(state): State<AppState>,
    Json(req): Json<BulkReviewRequest>,
) -> Result<Json<BulkReviewResponse>, StatusCode> {
    let candidates = state.db.candidates();
    let updated = match req.action {
        BulkAction::Approve => candidates.bulk_approve(&req.ids).await,
        BulkAction::Reject => candidates.bulk_reject(&req.ids).await,
    }
    .map_err(|e| {
        tracing::error!("Bulk review failed: {}", e);
        StatusCode::INTERNAL_SERVER_ERROR
    })?;

    Ok(Json(BulkReviewResponse {
        requested: req.ids.len(),
        updated,
    }))
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/candidates", get(list_candidates))
        .route("/candidates/bulk", post(bulk_review))
        .route("/candidates/{candidate_id}", get(get_candidate))
        .route("/candidates/{candidate_id}/approve", post(approve_candidate))
        .route("/candidates/{candidate_id}/reject", post(reject_candidate))
        .route("/candidates/{candidate_id}/reset", post(reset_candidate))
}
