//! qBittorrent WebUI client
//!
//! Read-only: the download facet only says whether an item still has an
//! active download, so rules can avoid flagging something mid-replacement.
//! Torrent names are release names, so matching is containment of the
//! normalized title rather than equality.

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use serde::Deserialize;
use tokio::sync::Mutex;

use crate::media::{normalize_title, DownloadFacet, DownloadManager, FacetQuery};

use super::rate_limiter::RateLimitedClient;

#[derive(Debug, Deserialize)]
struct TorrentInfo {
    #[serde(default)]
    name: String,
    /// 0.0 to 1.0
    progress: Option<f64>,
}

/// qBittorrent WebUI API client
pub struct QbittorrentClient {
    base_url: String,
    username: String,
    password: String,
    client: Arc<RateLimitedClient>,
    // WebUI auth is a session cookie; log in once and again on expiry
    login: Mutex<bool>,
}

impl QbittorrentClient {
    pub fn new(base_url: String, username: String, password: String) -> Self {
        Self {
            base_url,
            username,
            password,
            client: Arc::new(RateLimitedClient::for_qbittorrent()),
            login: Mutex::new(false),
        }
    }

    async fn ensure_login(&self) -> Result<()> {
        let mut logged_in = self.login.lock().await;
        if *logged_in {
            return Ok(());
        }

        let url = format!("{}/api/v2/auth/login", self.base_url.trim_end_matches('/'));
        let resp = self
            .client
            .post_form(
                &url,
                &[
                    ("username", self.username.as_str()),
                    ("password", self.password.as_str()),
                ],
            )
            .await?;
        if !resp.status().is_success() {
            anyhow::bail!("qbittorrent login returned {}", resp.status());
        }

        *logged_in = true;
        Ok(())
    }

    async fn active_torrents(&self) -> Result<Vec<TorrentInfo>> {
        self.ensure_login().await?;

        let url = format!(
            "{}/api/v2/torrents/info",
            self.base_url.trim_end_matches('/')
        );
        let resp = self
            .client
            .get_with_headers_and_query(&url, &[], &[("filter", "downloading")])
            .await?;

        if resp.status() == reqwest::StatusCode::FORBIDDEN {
            // Session expired; force a fresh login on the next call
            *self.login.lock().await = false;
            anyhow::bail!("qbittorrent session expired");
        }
        if !resp.status().is_success() {
            anyhow::bail!("qbittorrent returned {}", resp.status());
        }

        Ok(resp.json().await?)
    }

    fn matches(query: &FacetQuery, torrent_name: &str) -> bool {
        let normalized = normalize_title(torrent_name);
        let title = normalize_title(&query.title);
        !title.is_empty() && normalized.contains(&title)
    }
}

#[async_trait]
impl DownloadManager for QbittorrentClient {
    async fn lookup(&self, query: &FacetQuery) -> Result<Option<DownloadFacet>> {
        let torrents = self.active_torrents().await?;
        let matched = torrents
            .iter()
            .find(|t| Self::matches(query, &t.name));

        Ok(matched.map(|t| DownloadFacet {
            downloading: true,
            progress: t.progress,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media::MediaKind;

    fn query(title: &str) -> FacetQuery {
        FacetQuery {
            kind: MediaKind::Movie,
            external_catalog_id: None,
            title: title.to_string(),
            year: None,
        }
    }

    #[test]
    fn test_release_name_containment() {
        assert!(QbittorrentClient::matches(
            &query("The Matrix"),
            "The.Matrix.1999.2160p.REMUX-GROUP"
        ));
        assert!(!QbittorrentClient::matches(
            &query("Heat"),
            "The.Matrix.1999.1080p"
        ));
    }

    #[test]
    fn test_empty_title_never_matches() {
        assert!(!QbittorrentClient::matches(&query(""), "anything"));
    }
}
