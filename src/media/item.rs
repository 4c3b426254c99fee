//! Unified media item model
//!
//! A `UnifiedMediaItem` is the reconciliation output: one record per logical
//! title, with identity owned by the library manager and optional facets
//! contributed by the other sources. Items are rebuilt on every scan and never
//! persisted.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Kind of media a library, rule or item refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MediaKind {
    Movie,
    Series,
}

impl std::fmt::Display for MediaKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MediaKind::Movie => write!(f, "movie"),
            MediaKind::Series => write!(f, "series"),
        }
    }
}

impl std::str::FromStr for MediaKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<Self> {
        match s.to_lowercase().as_str() {
            "movie" | "movies" => Ok(MediaKind::Movie),
            "series" | "tv" | "show" => Ok(MediaKind::Series),
            _ => Err(anyhow::anyhow!("Unknown media kind: {}", s)),
        }
    }
}

/// Identity of a unified item, owned by the library manager
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MediaIdentity {
    pub kind: MediaKind,
    pub title: String,
    pub year: Option<i32>,
    /// Item id inside the owning Radarr/Sonarr instance
    pub servarr_id: i64,
    /// TMDB id for movies, TVDB id for series, when the library manager has one
    pub external_catalog_id: Option<i64>,
}

/// Facet contributed by the library manager (Radarr/Sonarr)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LibraryFacet {
    pub monitored: bool,
    pub has_file: bool,
    pub file_size_bytes: Option<i64>,
    pub quality_profile: Option<String>,
    pub tags: Vec<String>,
    pub added_at: Option<DateTime<Utc>>,
    /// Series only
    pub season_count: Option<i64>,
}

/// Facet contributed by the watch-history tracker (Tautulli)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WatchFacet {
    pub play_count: i64,
    pub last_watched_at: Option<DateTime<Utc>>,
    pub added_at: Option<DateTime<Utc>>,
    pub file_size_bytes: Option<i64>,
    pub codec: Option<String>,
    pub resolution: Option<String>,
}

/// Facet contributed by the media server (Plex)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServerFacet {
    pub view_count: i64,
    pub last_viewed_at: Option<DateTime<Utc>>,
    pub rating: Option<f64>,
    pub thumb: Option<String>,
    pub collections: Vec<String>,
}

/// Facet contributed by the request broker (Overseerr), best-effort
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RequestFacet {
    pub status: Option<String>,
    pub has_request: bool,
    pub requested_by: Option<String>,
    pub requested_at: Option<DateTime<Utc>>,
}

/// Facet contributed by the download manager (qBittorrent)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DownloadFacet {
    pub downloading: bool,
    pub progress: Option<f64>,
}

/// One logical title with every facet the sources could contribute.
///
/// A missing facet means the source had no match or was unavailable; it is a
/// fully valid, evaluable state ("never watched" is a common match condition).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnifiedMediaItem {
    pub identity: MediaIdentity,
    pub library: Option<LibraryFacet>,
    pub watch: Option<WatchFacet>,
    pub server: Option<ServerFacet>,
    pub request: Option<RequestFacet>,
    pub download: Option<DownloadFacet>,
}

/// A field value resolved from a unified item for rule evaluation
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Null,
    Bool(bool),
    Number(f64),
    Text(String),
    TextList(Vec<String>),
    Date(DateTime<Utc>),
}

impl FieldValue {
    pub fn is_null(&self) -> bool {
        matches!(self, FieldValue::Null)
    }

    fn opt_date(d: Option<DateTime<Utc>>) -> FieldValue {
        d.map(FieldValue::Date).unwrap_or(FieldValue::Null)
    }

    fn opt_text(t: Option<&String>) -> FieldValue {
        t.map(|s| FieldValue::Text(s.clone()))
            .unwrap_or(FieldValue::Null)
    }

    fn opt_number(n: Option<f64>) -> FieldValue {
        n.map(FieldValue::Number).unwrap_or(FieldValue::Null)
    }
}

impl UnifiedMediaItem {
    pub fn new(identity: MediaIdentity) -> Self {
        Self {
            identity,
            library: None,
            watch: None,
            server: None,
            request: None,
            download: None,
        }
    }

    /// True when neither the watch tracker nor the media server has any
    /// recorded playback for this item. An absent facet counts as no playback.
    pub fn never_watched(&self) -> bool {
        let plays = self.watch.as_ref().map(|w| w.play_count).unwrap_or(0);
        let views = self.server.as_ref().map(|s| s.view_count).unwrap_or(0);
        plays == 0 && views == 0
    }

    /// Resolve a registry field key against this item.
    ///
    /// Unknown keys and absent facets resolve to `FieldValue::Null`; the
    /// evaluator's null policy decides what that means per operator.
    pub fn field(&self, key: &str) -> FieldValue {
        let library = self.library.as_ref();
        let watch = self.watch.as_ref();
        let server = self.server.as_ref();
        let request = self.request.as_ref();
        let download = self.download.as_ref();

        match key {
            "title" => FieldValue::Text(self.identity.title.clone()),
            "year" => FieldValue::opt_number(self.identity.year.map(|y| y as f64)),

            "monitored" => library
                .map(|l| FieldValue::Bool(l.monitored))
                .unwrap_or(FieldValue::Null),
            "has_file" => library
                .map(|l| FieldValue::Bool(l.has_file))
                .unwrap_or(FieldValue::Null),
            "file_size_bytes" => FieldValue::opt_number(
                library
                    .and_then(|l| l.file_size_bytes)
                    .or_else(|| watch.and_then(|w| w.file_size_bytes))
                    .map(|b| b as f64),
            ),
            "quality_profile" => {
                FieldValue::opt_text(library.and_then(|l| l.quality_profile.as_ref()))
            }
            "tags" => library
                .map(|l| FieldValue::TextList(l.tags.clone()))
                .unwrap_or(FieldValue::Null),
            "season_count" => {
                FieldValue::opt_number(library.and_then(|l| l.season_count).map(|c| c as f64))
            }
            "added_at" => FieldValue::opt_date(
                library
                    .and_then(|l| l.added_at)
                    .or_else(|| watch.and_then(|w| w.added_at)),
            ),

            "play_count" => FieldValue::opt_number(watch.map(|w| w.play_count as f64)),
            "last_watched_at" => FieldValue::opt_date(watch.and_then(|w| w.last_watched_at)),
            "codec" => FieldValue::opt_text(watch.and_then(|w| w.codec.as_ref())),
            "resolution" => FieldValue::opt_text(watch.and_then(|w| w.resolution.as_ref())),
            "never_watched" => FieldValue::Bool(self.never_watched()),

            "view_count" => FieldValue::opt_number(server.map(|s| s.view_count as f64)),
            "last_viewed_at" => FieldValue::opt_date(server.and_then(|s| s.last_viewed_at)),
            "rating" => FieldValue::opt_number(server.and_then(|s| s.rating)),
            "collections" => server
                .map(|s| FieldValue::TextList(s.collections.clone()))
                .unwrap_or(FieldValue::Null),

            "request_status" => FieldValue::opt_text(request.and_then(|r| r.status.as_ref())),
            "has_request" => request
                .map(|r| FieldValue::Bool(r.has_request))
                .unwrap_or(FieldValue::Bool(false)),
            "requested_by" => FieldValue::opt_text(request.and_then(|r| r.requested_by.as_ref())),
            "requested_at" => FieldValue::opt_date(request.and_then(|r| r.requested_at)),

            "downloading" => download
                .map(|d| FieldValue::Bool(d.downloading))
                .unwrap_or(FieldValue::Bool(false)),

            _ => FieldValue::Null,
        }
    }
}
