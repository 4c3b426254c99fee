//! Schedule introspection endpoints

use axum::{extract::State, routing::get, Json, Router};

use crate::jobs::registry::ActiveSchedule;
use crate::AppState;

/// List the registered scan schedules with their next fire times
async fn list_schedules(State(state): State<AppState>) -> Json<Vec<ActiveSchedule>> {
    Json(state.registry.list_active(&state.scheduler).await)
}

pub fn router() -> Router<AppState> {
    Router::new().route("/schedules", get(list_schedules))
}
