//! Custodian - rule-driven media library maintenance
//!
//! Rules pair a criteria tree with an action and a schedule. Scans reconcile
//! the library manager's item list with watch, server, request and download
//! facets, evaluate each item against the tree and flag matches as review
//! candidates; a separate executor pass carries out the configured action once
//! review state and the action delay allow it.

pub mod api;
pub mod config;
pub mod db;
pub mod jobs;
pub mod media;
pub mod rules;
pub mod services;

use std::sync::Arc;

use tokio_cron_scheduler::JobScheduler;

use crate::config::Config;
use crate::db::Database;
use crate::jobs::ScheduleRegistry;
use crate::media::MediaReconciler;

/// Application state shared across all handlers
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub db: Database,
    pub reconciler: Arc<MediaReconciler>,
    pub registry: Arc<ScheduleRegistry>,
    pub scheduler: JobScheduler,
}
