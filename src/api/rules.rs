//! Rule management endpoints
//!
//! Criteria are validated on every write; an invalid tree is rejected with a
//! 422 carrying the full per-node error report, so a client can surface every
//! problem at once.

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

use crate::db::{CreateRule, RuleAction, RuleRecord, ScanRecord, UpdateRule};
use crate::media::MediaKind;
use crate::rules::{migrate, validate, Group, LegacyRule};
use crate::AppState;

#[derive(Debug, Serialize)]
pub struct RuleResponse {
    pub id: Uuid,
    pub name: String,
    pub enabled: bool,
    pub media_kind: String,
    pub criteria: Group,
    pub action: String,
    pub action_delay_days: Option<i64>,
    pub schedule: Option<String>,
    pub library_instance: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub last_run_at: Option<DateTime<Utc>>,
}

impl From<RuleRecord> for RuleResponse {
    fn from(record: RuleRecord) -> Self {
        Self {
            id: record.id,
            name: record.name,
            enabled: record.enabled,
            media_kind: record.media_kind,
            criteria: record.criteria.0,
            action: record.action,
            action_delay_days: record.action_delay_days,
            schedule: record.schedule,
            library_instance: record.library_instance,
            created_at: record.created_at,
            updated_at: record.updated_at,
            last_run_at: record.last_run_at,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct CreateRuleRequest {
    pub name: String,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    pub media_kind: MediaKind,
    pub criteria: Group,
    pub action: RuleAction,
    #[serde(default)]
    pub action_delay_days: Option<i64>,
    #[serde(default)]
    pub schedule: Option<String>,
    #[serde(default)]
    pub library_instance: Option<String>,
}

fn default_enabled() -> bool {
    true
}

#[derive(Debug, Deserialize)]
pub struct UpdateRuleRequest {
    pub name: Option<String>,
    pub enabled: Option<bool>,
    pub criteria: Option<Group>,
    pub action: Option<RuleAction>,
    pub action_delay_days: Option<i64>,
    pub schedule: Option<String>,
    pub library_instance: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct TestRuleRequest {
    pub media_kind: MediaKind,
    pub criteria: Group,
}

#[derive(Debug, Serialize)]
pub struct TestRuleResponse {
    pub evaluated: usize,
    pub matched: usize,
    pub matches: Vec<TestMatch>,
}

#[derive(Debug, Serialize)]
pub struct TestMatch {
    pub servarr_id: i64,
    pub title: String,
    pub year: Option<i32>,
}

#[derive(Debug, Deserialize)]
pub struct ImportRuleRequest {
    pub name: String,
    pub media_kind: MediaKind,
    /// Defaults to flag_for_review, the least destructive action
    #[serde(default)]
    pub action: Option<RuleAction>,
    pub rule: LegacyRule,
}

#[derive(Debug, Serialize)]
pub struct ScanResponse {
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

impl From<ScanRecord> for ScanResponse {
    fn from(record: ScanRecord) -> Self {
        Self {
            id: record.id,
            rule_id: record.rule_id,
            status: record.status,
            started_at: record.started_at,
            finished_at: record.finished_at,
            evaluated: record.evaluated,
            matched: record.matched,
            errored: record.errored,
            failure_reason: record.failure_reason,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ScanHistoryQuery {
    pub limit: Option<i64>,
}

async fn list_rules(State(state): State<AppState>) -> Result<Json<Vec<RuleResponse>>, StatusCode> {
    let rules = state.db.rules().list().await.map_err(|e| {
        tracing::error!("Failed to list rules: {}", e);
        StatusCode::INTERNAL_SERVER_ERROR
    })?;
    Ok(Json(rules.into_iter().map(Into::into).collect()))
}

async fn create_rule(
    State(state): State<AppState>,
    Json(req): Json<CreateRuleRequest>,
) -> Response {
    let report = validate(&req.criteria, req.media_kind);
    if !report.valid {
        return (StatusCode::UNPROCESSABLE_ENTITY, Json(report)).into_response();
    }

    let created = state
        .db
        .rules()
        .create(CreateRule {
            name: req.name,
            enabled: req.enabled,
            media_kind: req.media_kind,
            criteria: req.criteria,
            action: req.action,
            action_delay_days: req.action_delay_days,
            schedule: req.schedule,
            library_instance: req.library_instance,
        })
        .await;

    match created {
        Ok(record) => (StatusCode::CREATED, Json(RuleResponse::from(record))).into_response(),
        Err(e) => {
            tracing::error!("Failed to create rule: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

async fn get_rule(
    State(state): State<AppState>,
    Path(rule_id): Path<Uuid>,
) -> Result<Json<RuleResponse>, StatusCode> {
    let record = state.db.rules().get(rule_id).await.map_err(|e| {
        tracing::error!("Failed to load rule: {}", e);
        StatusCode::INTERNAL_SERVER_ERROR
    })?;
    record
        .map(|r| Json(RuleResponse::from(r)))
        .ok_or(StatusCode::NOT_FOUND)
}

async fn update_rule(
    State(state): State<AppState>,
    Path(rule_id): Path<Uuid>,
    Json(req): Json<UpdateRuleRequest>,
) -> Response {
    let rules = state.db.rules();
    let Ok(existing) = rules.get(rule_id).await else {
        return StatusCode::INTERNAL_SERVER_ERROR.into_response();
    };
    let Some(existing) = existing else {
        return StatusCode::NOT_FOUND.into_response();
    };

    // The media kind is fixed at creation, so new criteria validate against it
    if let Some(criteria) = &req.criteria {
        let Ok(kind) = existing.kind() else {
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        };
        let report = validate(criteria, kind);
        if !report.valid {
            return (StatusCode::UNPROCESSABLE_ENTITY, Json(report)).into_response();
        }
    }

    let updated = rules
        .update(
            rule_id,
            UpdateRule {
                name: req.name,
                enabled: req.enabled,
                criteria: req.criteria,
                action: req.action,
                action_delay_days: req.action_delay_days,
                schedule: req.schedule,
                library_instance: req.library_instance,
            },
        )
        .await;

    match updated {
        Ok(record) => Json(RuleResponse::from(record)).into_response(),
        Err(e) => {
            tracing::error!("Failed to update rule: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

async fn delete_rule(
    State(state): State<AppState>,
    Path(rule_id): Path<Uuid>,
) -> Result<StatusCode, StatusCode> {
    let deleted = state.db.rules().delete(rule_id).await.map_err(|e| {
        tracing::error!("Failed to delete rule: {}", e);
        StatusCode::INTERNAL_SERVER_ERROR
    })?;
    if deleted {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(StatusCode::NOT_FOUND)
    }
}

/// Dry-run a criteria tree against the live library.
///
/// Reconciles and evaluates exactly like a scan, but nothing is flagged.
async fn test_rule(State(state): State<AppState>, Json(req): Json<TestRuleRequest>) -> Response {
    let report = validate(&req.criteria, req.media_kind);
    if !report.valid {
        return (StatusCode::UNPROCESSABLE_ENTITY, Json(report)).into_response();
    }

    let items = match state.reconciler.reconcile(req.media_kind, None).await {
        Ok(items) => items,
        Err(e) => {
            tracing::error!("Rule test reconciliation failed: {}", e);
            return StatusCode::BAD_GATEWAY.into_response();
        }
    };

    let now = Utc::now();
    let matches: Vec<TestMatch> = items
        .iter()
        .filter(|item| crate::rules::evaluate(&req.criteria, item, now))
        .map(|item| TestMatch {
            servarr_id: item.identity.servarr_id,
            title: item.identity.title.clone(),
            year: item.identity.year,
        })
        .collect();

    Json(TestRuleResponse {
        evaluated: items.len(),
        matched: matches.len(),
        matches,
    })
    .into_response()
}

/// Import a legacy collection rule, converting it to a criteria tree.
///
/// Imported rules start disabled so the converted tree can be reviewed first.
async fn import_rule(
    State(state): State<AppState>,
    Json(req): Json<ImportRuleRequest>,
) -> Response {
    if !req.rule.library_ids.is_empty() {
        tracing::warn!(
            rule = %req.name,
            "Legacy library scoping is not imported; set the rule's library instance instead"
        );
    }

    let criteria = migrate(&req.rule);
    let report = validate(&criteria, req.media_kind);
    if !report.valid {
        return (StatusCode::UNPROCESSABLE_ENTITY, Json(report)).into_response();
    }

    let created = state
        .db
        .rules()
        .create(CreateRule {
            name: req.name,
            enabled: false,
            media_kind: req.media_kind,
            criteria,
            action: req.action.unwrap_or(RuleAction::FlagForReview),
            action_delay_days: None,
            schedule: None,
            library_instance: None,
        })
        .await;

    match created {
        Ok(record) => (StatusCode::CREATED, Json(RuleResponse::from(record))).into_response(),
        Err(e) => {
            tracing::error!("Failed to import rule: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

async fn scan_history(
    State(state): State<AppState>,
    Path(rule_id): Path<Uuid>,
    Query(query): Query<ScanHistoryQuery>,
) -> Result<Json<Vec<ScanResponse>>, StatusCode> {
    if state
        .db
        .rules()
        .get(rule_id)
        .await
        .map_err(|e| {
            tracing::error!("Failed to load rule: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR
        })?
        .is_none()
    {
        return Err(StatusCode::NOT_FOUND);
    }

    let limit = query.limit.unwrap_or(50).clamp(1, 500);
    let scans = state
        .db
        .scans()
        .list_for_rule(rule_id, limit)
        .await
        .map_err(|e| {
            tracing::error!("Failed to list scans: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR
        })?;
    Ok(Json(scans.into_iter().map(Into::into).collect()))
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/rules", get(list_rules).post(create_rule))
        .route("/rules/test", post(test_rule))
        .route("/rules/import", post(import_rule))
        .route(
            "/rules/{rule_id}",
            get(get_rule).put(update_rule).delete(delete_rule),
        )
        .route("/rules/{rule_id}/scans", get(scan_history))
}
