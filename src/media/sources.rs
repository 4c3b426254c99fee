//! Facet provider traits
//!
//! The reconciler talks to every external system through these seams so tests
//! can substitute in-memory providers. Concrete implementations live in
//! `crate::services`.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::item::{DownloadFacet, MediaKind, RequestFacet, ServerFacet, WatchFacet};

/// One item as listed by the library manager
#[derive(Debug, Clone)]
pub struct LibraryItem {
    pub id: i64,
    pub title: String,
    pub year: Option<i32>,
    pub external_catalog_id: Option<i64>,
    pub monitored: bool,
    pub has_file: bool,
    pub file_size_bytes: Option<i64>,
    pub quality_profile: Option<String>,
    pub tags: Vec<String>,
    pub added_at: Option<DateTime<Utc>>,
    /// Series only
    pub season_count: Option<i64>,
}

/// Identity handed to the secondary sources for matching.
///
/// Matching precedence is exact identifier first, normalized title + year
/// second; fuzzy similarity is deliberately never attempted because a wrong
/// match here gates deletion.
#[derive(Debug, Clone)]
pub struct FacetQuery {
    pub kind: MediaKind,
    pub external_catalog_id: Option<i64>,
    pub title: String,
    pub year: Option<i32>,
}

/// Library manager (Radarr/Sonarr): identity source of truth, plus the only
/// party allowed to touch files.
#[async_trait]
pub trait LibraryManager: Send + Sync {
    async fn list_items(&self, kind: MediaKind) -> Result<Vec<LibraryItem>>;

    /// Delete the item and its files from the owning instance
    async fn delete_file(&self, kind: MediaKind, id: i64) -> Result<()>;

    async fn set_monitored(&self, kind: MediaKind, id: i64, monitored: bool) -> Result<()>;
}

/// Watch-history tracker (Tautulli), read-only
#[async_trait]
pub trait WatchTracker: Send + Sync {
    async fn lookup(&self, query: &FacetQuery) -> Result<Option<WatchFacet>>;
}

/// Media server (Plex), read-only
#[async_trait]
pub trait MediaServer: Send + Sync {
    async fn lookup(&self, query: &FacetQuery) -> Result<Option<ServerFacet>>;
}

/// Request broker (Overseerr), read-only and optional
#[async_trait]
pub trait RequestBroker: Send + Sync {
    async fn lookup(&self, query: &FacetQuery) -> Result<Option<RequestFacet>>;
}

/// Download manager (qBittorrent), read-only
#[async_trait]
pub trait DownloadManager: Send + Sync {
    async fn lookup(&self, query: &FacetQuery) -> Result<Option<DownloadFacet>>;
}
