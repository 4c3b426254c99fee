//! HTTP-level tests of the candidate review endpoints: idempotent
//! resubmission, conflicting decisions, and unknown ids.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use pretty_assertions::assert_eq;
use serde_json::Value;
use sqlx::sqlite::SqlitePoolOptions;
use tokio_cron_scheduler::JobScheduler;
use tower::ServiceExt;
use uuid::Uuid;

use custodian::config::Config;
use custodian::db::{CreateCandidate, CreateRule, Database, ReviewStatus, RuleAction};
use custodian::jobs::ScheduleRegistry;
use custodian::media::{
    LibraryItem, LibraryManager, MediaKind, MediaReconciler, ReconcilerConfig,
};
use custodian::rules::{BoolOp, Condition, CriteriaNode, CriteriaValue, Group, Operator};
use custodian::{api, AppState};

struct EmptyLibrary;

#[async_trait]
impl LibraryManager for EmptyLibrary {
    async fn list_items(&self, _kind: MediaKind) -> Result<Vec<LibraryItem>> {
        Ok(Vec::new())
    }

    async fn delete_file(&self, _kind: MediaKind, _id: i64) -> Result<()> {
        Ok(())
    }

    async fn set_monitored(&self, _kind: MediaKind, _id: i64, _monitored: bool) -> Result<()> {
        Ok(())
    }
}

async fn test_app() -> (Router, Database) {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .unwrap();
    let db = Database::new(pool);
    db.migrate().await.unwrap();

    let config = Arc::new(Config {
        port: 0,
        database_path: ":memory:".to_string(),
        radarr_url: None,
        radarr_api_key: None,
        sonarr_url: None,
        sonarr_api_key: None,
        tautulli_url: None,
        tautulli_api_key: None,
        plex_url: None,
        plex_token: None,
        overseerr_url: None,
        overseerr_api_key: None,
        qbittorrent_url: None,
        qbittorrent_username: None,
        qbittorrent_password: None,
        scan_concurrency: 2,
        source_timeout_secs: 1,
        scan_default_cron: "0 0 3 * * *".to_string(),
        executor_cron: "0 */15 * * * *".to_string(),
        lease_ttl_secs: 60,
    });
    let library: Arc<EmptyLibrary> = Arc::new(EmptyLibrary);
    let reconciler = Arc::new(MediaReconciler::new(
        library,
        ReconcilerConfig {
            concurrency: config.scan_concurrency,
            source_timeout: Duration::from_secs(config.source_timeout_secs),
        },
    ));

    let state = AppState {
        config,
        db: db.clone(),
        reconciler,
        registry: Arc::new(ScheduleRegistry::new()),
        scheduler: JobScheduler::new().await.unwrap(),
    };

    (api::router().with_state(state), db)
}

/// One pending candidate straight into the database, bypassing a scan
async fn flagged_candidate(db: &Database) -> Uuid {
    let rule = db
        .rules()
        .create(CreateRule {
            name: "Unmonitored movies".to_string(),
            enabled: true,
            media_kind: MediaKind::Movie,
            criteria: Group::new(
                BoolOp::And,
                vec![CriteriaNode::Condition(Condition::new(
                    "monitored",
                    Operator::Equals,
                    CriteriaValue::Bool(false),
                ))],
            ),
            action: RuleAction::FlagForReview,
            action_delay_days: None,
            schedule: None,
            library_instance: None,
        })
        .await
        .unwrap();
    let scan = db.scans().create(rule.id).await.unwrap();

    let candidates = db.candidates();
    candidates
        .flag(CreateCandidate {
            scan_id: scan.id,
            rule_id: rule.id,
            media_kind: MediaKind::Movie,
            title: "Old Movie".to_string(),
            year: Some(2001),
            servarr_id: 7,
            external_catalog_id: Some(700),
        })
        .await
        .unwrap();
    candidates
        .list(&Default::default())
        .await
        .unwrap()[0]
        .id
}

async fn post(app: &Router, uri: &str) -> (StatusCode, Value) {
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri(uri)
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, body)
}

#[tokio::test]
async fn repeated_approve_succeeds_both_times() {
    let (app, db) = test_app().await;
    let id = flagged_candidate(&db).await;

    let (status, body) = post(&app, &format!("/api/candidates/{}/approve", id)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], Value::Bool(true));

    // A double-clicked approve button resubmits the same decision
    let (status, body) = post(&app, &format!("/api/candidates/{}/approve", id)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], Value::Bool(true));

    let record = db.candidates().get(id).await.unwrap().unwrap();
    assert_eq!(record.status().unwrap(), ReviewStatus::Approved);
    assert!(record.reviewed_at.is_some());
}

#[tokio::test]
async fn contradictory_review_is_a_conflict() {
    let (app, db) = test_app().await;
    let id = flagged_candidate(&db).await;

    let (status, _) = post(&app, &format!("/api/candidates/{}/approve", id)).await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = post(&app, &format!("/api/candidates/{}/reject", id)).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["success"], Value::Bool(false));

    // The first reviewer's decision stands
    let record = db.candidates().get(id).await.unwrap().unwrap();
    assert_eq!(record.status().unwrap(), ReviewStatus::Approved);
}

#[tokio::test]
async fn reset_flow_is_idempotent_too() {
    let (app, db) = test_app().await;
    let id = flagged_candidate(&db).await;

    let (status, _) = post(&app, &format!("/api/candidates/{}/reject", id)).await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = post(&app, &format!("/api/candidates/{}/reset", id)).await;
    assert_eq!(status, StatusCode::OK);

    // Already pending again; a repeat reset is still a success
    let (status, body) = post(&app, &format!("/api/candidates/{}/reset", id)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], Value::Bool(true));

    let record = db.candidates().get(id).await.unwrap().unwrap();
    assert_eq!(record.status().unwrap(), ReviewStatus::Pending);
}

#[tokio::test]
async fn review_of_unknown_candidate_is_not_found() {
    let (app, _db) = test_app().await;

    let (status, _) = post(
        &app,
        &format!("/api/candidates/{}/approve", Uuid::new_v4()),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}
