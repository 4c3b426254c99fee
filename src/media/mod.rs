//! Unified media model and reconciliation

pub mod item;
pub mod reconciler;
pub mod sources;

pub use item::{
    DownloadFacet, FieldValue, LibraryFacet, MediaIdentity, MediaKind, RequestFacet, ServerFacet,
    UnifiedMediaItem, WatchFacet,
};
pub use reconciler::{normalize_title, MediaReconciler, ReconcilerConfig};
pub use sources::{
    DownloadManager, FacetQuery, LibraryItem, LibraryManager, MediaServer, RequestBroker,
    WatchTracker,
};
