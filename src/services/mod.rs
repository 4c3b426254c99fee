//! External system integrations
//!
//! One client per system custodian talks to, each implementing the matching
//! facet-provider trait from `crate::media::sources`.

pub mod overseerr;
pub mod plex;
pub mod qbittorrent;
pub mod rate_limiter;
pub mod servarr;
pub mod tautulli;

pub use overseerr::OverseerrClient;
pub use plex::PlexClient;
pub use qbittorrent::QbittorrentClient;
pub use rate_limiter::{retry_async, RateLimitConfig, RateLimitedClient, RetryConfig};
pub use servarr::{ServarrClient, ServarrEndpoint};
pub use tautulli::TautulliClient;
