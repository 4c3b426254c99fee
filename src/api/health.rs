//! Liveness and readiness probes

use axum::extract::State;
use axum::{routing::get, Json, Router};
use serde::Serialize;

use crate::AppState;

#[derive(Serialize)]
struct Liveness {
    status: &'static str,
    version: &'static str,
}

#[derive(Serialize)]
struct Readiness {
    ready: bool,
    database: bool,
    /// Scan schedules currently registered with the scheduler
    scheduled_rules: usize,
}

async fn healthz() -> Json<Liveness> {
    Json(Liveness {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// Ready once the database answers; also reports how many scan schedules
/// the registry currently holds
async fn readyz(State(state): State<AppState>) -> Json<Readiness> {
    let database = sqlx::query("SELECT 1")
        .fetch_one(state.db.pool())
        .await
        .is_ok();
    let scheduled_rules = state.registry.list_active(&state.scheduler).await.len();

    Json(Readiness {
        ready: database,
        database,
        scheduled_rules,
    })
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
}
