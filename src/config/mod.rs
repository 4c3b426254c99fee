//! Application configuration management

use std::env;

use anyhow::{Context, Result};

/// Application configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    /// Server port
    pub port: u16,

    /// SQLite database path
    pub database_path: String,

    /// Radarr base URL (movie library manager)
    pub radarr_url: Option<String>,

    /// Radarr API key
    pub radarr_api_key: Option<String>,

    /// Sonarr base URL (series library manager)
    pub sonarr_url: Option<String>,

    /// Sonarr API key
    pub sonarr_api_key: Option<String>,

    /// Tautulli base URL (watch history)
    pub tautulli_url: Option<String>,

    /// Tautulli API key
    pub tautulli_api_key: Option<String>,

    /// Plex base URL (media server)
    pub plex_url: Option<String>,

    /// Plex authentication token
    pub plex_token: Option<String>,

    /// Overseerr base URL (request broker)
    pub overseerr_url: Option<String>,

    /// Overseerr API key
    pub overseerr_api_key: Option<String>,

    /// qBittorrent web UI base URL
    pub qbittorrent_url: Option<String>,

    /// qBittorrent web UI username
    pub qbittorrent_username: Option<String>,

    /// qBittorrent web UI password
    pub qbittorrent_password: Option<String>,

    /// How many items are assembled concurrently during a scan
    pub scan_concurrency: usize,

    /// Per-source timeout for facet lookups, in seconds
    pub source_timeout_secs: u64,

    /// Cron used for rules that carry no schedule of their own
    pub scan_default_cron: String,

    /// Cron for the action-executor pass
    pub executor_cron: String,

    /// Worker lease time-to-live, in seconds
    pub lease_ttl_secs: u64,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            port: env::var("PORT")
                .unwrap_or_else(|_| "3001".to_string())
                .parse()
                .context("Invalid PORT")?,

            database_path: env::var("DATABASE_PATH")
                .unwrap_or_else(|_| "./data/custodian.db".to_string()),

            radarr_url: env::var("RADARR_URL").ok(),
            radarr_api_key: env::var("RADARR_API_KEY").ok(),

            sonarr_url: env::var("SONARR_URL").ok(),
            sonarr_api_key: env::var("SONARR_API_KEY").ok(),

            tautulli_url: env::var("TAUTULLI_URL").ok(),
            tautulli_api_key: env::var("TAUTULLI_API_KEY").ok(),

            plex_url: env::var("PLEX_URL").ok(),
            plex_token: env::var("PLEX_TOKEN").ok(),

            overseerr_url: env::var("OVERSEERR_URL").ok(),
            overseerr_api_key: env::var("OVERSEERR_API_KEY").ok(),

            qbittorrent_url: env::var("QBITTORRENT_URL").ok(),
            qbittorrent_username: env::var("QBITTORRENT_USERNAME").ok(),
            qbittorrent_password: env::var("QBITTORRENT_PASSWORD").ok(),

            scan_concurrency: env::var("SCAN_CONCURRENCY")
                .unwrap_or_else(|_| "8".to_string())
                .parse()
                .context("Invalid SCAN_CONCURRENCY")?,

            source_timeout_secs: env::var("SOURCE_TIMEOUT_SECS")
                .unwrap_or_else(|_| "15".to_string())
                .parse()
                .context("Invalid SOURCE_TIMEOUT_SECS")?,

            // Daily at 03:00 unless the rule says otherwise
            scan_default_cron: env::var("SCAN_DEFAULT_CRON")
                .unwrap_or_else(|_| "0 0 3 * * *".to_string()),

            executor_cron: env::var("EXECUTOR_CRON")
                .unwrap_or_else(|_| "0 */15 * * * *".to_string()),

            lease_ttl_secs: env::var("LEASE_TTL_SECS")
                .unwrap_or_else(|_| "600".to_string())
                .parse()
                .context("Invalid LEASE_TTL_SECS")?,
        })
    }
}
