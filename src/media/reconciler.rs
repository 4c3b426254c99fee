//! Media reconciler
//!
//! Merges per-source records into one `UnifiedMediaItem` per logical title.
//! The library manager is the identity source of truth: its failure fails the
//! whole reconciliation. Every other source is looked up per item with a
//! timeout and degrades to an absent facet on error, so a slow or down source
//! never blocks a scan.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use futures::stream::{self, StreamExt};
use tracing::{debug, warn};

use super::item::{MediaIdentity, MediaKind, UnifiedMediaItem};
use super::sources::{
    DownloadManager, FacetQuery, LibraryItem, LibraryManager, MediaServer, RequestBroker,
    WatchTracker,
};

/// Normalize a title for cross-source equality: lowercase, alphanumerics only.
pub fn normalize_title(title: &str) -> String {
    title
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .collect::<String>()
        .to_lowercase()
}

/// Tuning for per-item facet lookups
#[derive(Debug, Clone)]
pub struct ReconcilerConfig {
    /// How many items have their facets fetched at once
    pub concurrency: usize,
    /// Per-source call budget for one item
    pub source_timeout: Duration,
}

impl Default for ReconcilerConfig {
    fn default() -> Self {
        Self {
            concurrency: 8,
            source_timeout: Duration::from_secs(15),
        }
    }
}

/// Reconciles the library manager's item list with the secondary sources
pub struct MediaReconciler {
    library: Arc<dyn LibraryManager>,
    watch: Option<Arc<dyn WatchTracker>>,
    server: Option<Arc<dyn MediaServer>>,
    requests: Option<Arc<dyn RequestBroker>>,
    downloads: Option<Arc<dyn DownloadManager>>,
    config: ReconcilerConfig,
}

impl MediaReconciler {
    pub fn new(library: Arc<dyn LibraryManager>, config: ReconcilerConfig) -> Self {
        Self {
            library,
            watch: None,
            server: None,
            requests: None,
            downloads: None,
            config,
        }
    }

    pub fn with_watch_tracker(mut self, tracker: Arc<dyn WatchTracker>) -> Self {
        self.watch = Some(tracker);
        self
    }

    pub fn with_media_server(mut self, server: Arc<dyn MediaServer>) -> Self {
        self.server = Some(server);
        self
    }

    pub fn with_request_broker(mut self, broker: Arc<dyn RequestBroker>) -> Self {
        self.requests = Some(broker);
        self
    }

    pub fn with_download_manager(mut self, downloads: Arc<dyn DownloadManager>) -> Self {
        self.downloads = Some(downloads);
        self
    }

    /// Build the current unified item set for one media kind.
    ///
    /// `filter`, when present, keeps only titles containing it
    /// (case-insensitive). Errors only when the library manager itself is
    /// unreachable; secondary sources degrade per item.
    pub async fn reconcile(
        &self,
        kind: MediaKind,
        filter: Option<&str>,
    ) -> Result<Vec<UnifiedMediaItem>> {
        let mut items = self
            .library
            .list_items(kind)
            .await
            .context("library manager listing failed")?;

        if let Some(needle) = filter {
            let needle = needle.to_lowercase();
            items.retain(|i| i.title.to_lowercase().contains(&needle));
        }

        debug!(kind = %kind, count = items.len(), "Reconciling library items");

        let unified = stream::iter(items)
            .map(|item| self.assemble(kind, item))
            .buffer_unordered(self.config.concurrency.max(1))
            .collect::<Vec<_>>()
            .await;

        Ok(unified)
    }

    /// Attach every available facet to one library item
    async fn assemble(&self, kind: MediaKind, item: LibraryItem) -> UnifiedMediaItem {
        let query = FacetQuery {
            kind,
            external_catalog_id: item.external_catalog_id,
            title: item.title.clone(),
            year: item.year,
        };

        let mut unified = UnifiedMediaItem::new(MediaIdentity {
            kind,
            title: item.title.clone(),
            year: item.year,
            servarr_id: item.id,
            external_catalog_id: item.external_catalog_id,
        });

        unified.library = Some(super::item::LibraryFacet {
            monitored: item.monitored,
            has_file: item.has_file,
            file_size_bytes: item.file_size_bytes,
            quality_profile: item.quality_profile,
            tags: item.tags,
            added_at: item.added_at,
            season_count: item.season_count,
        });

        if let Some(tracker) = &self.watch {
            unified.watch = self.facet("watch_tracker", tracker.lookup(&query)).await;
        }
        if let Some(server) = &self.server {
            unified.server = self.facet("media_server", server.lookup(&query)).await;
        }
        if let Some(broker) = &self.requests {
            unified.request = self.facet("request_broker", broker.lookup(&query)).await;
        }
        if let Some(downloads) = &self.downloads {
            unified.download = self
                .facet("download_manager", downloads.lookup(&query))
                .await;
        }

        unified
    }

    /// Run one facet lookup under the source timeout, degrading any failure
    /// to an absent facet with a warning.
    async fn facet<T>(
        &self,
        source: &str,
        lookup: impl std::future::Future<Output = Result<Option<T>>>,
    ) -> Option<T> {
        match tokio::time::timeout(self.config.source_timeout, lookup).await {
            Ok(Ok(facet)) => facet,
            Ok(Err(e)) => {
                warn!(source = source, error = %e, "Facet lookup failed, facet left unknown");
                None
            }
            Err(_) => {
                warn!(source = source, "Facet lookup timed out, facet left unknown");
                None
            }
        }
    }
}
