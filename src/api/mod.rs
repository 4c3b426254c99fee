//! API route definitions
//!
//! REST only: rule CRUD plus validation, candidate review, schedule
//! introspection and health probes. Everything except the health probes is
//! mounted under /api.

pub mod candidates;
pub mod health;
pub mod rules;
pub mod schedules;

use axum::Router;

use crate::AppState;

pub fn router() -> Router<AppState> {
    Router::new().merge(health::router()).nest(
        "/api",
        Router::new()
            .merge(rules::router())
            .merge(candidates::router())
            .merge(schedules::router()),
    )
}
