//! Radarr/Sonarr client
//!
//! The library manager is both the identity source of truth for
//! reconciliation and the only system custodian ever asks to delete or
//! unmonitor anything. One client fronts up to two v3 API instances: a Radarr
//! endpoint for movies and a Sonarr endpoint for series.

use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

use crate::media::{LibraryItem, LibraryManager, MediaKind};

use super::rate_limiter::{retry_async, RateLimitedClient, RetryConfig};

/// One Radarr or Sonarr instance
#[derive(Debug, Clone)]
pub struct ServarrEndpoint {
    pub base_url: String,
    pub api_key: String,
}

/// Radarr movie resource (the fields custodian cares about)
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MovieResource {
    id: i64,
    title: String,
    year: Option<i32>,
    monitored: bool,
    has_file: bool,
    size_on_disk: Option<i64>,
    tmdb_id: Option<i64>,
    quality_profile_id: Option<i64>,
    #[serde(default)]
    tags: Vec<i64>,
    added: Option<DateTime<Utc>>,
}

/// Sonarr series resource
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SeriesResource {
    id: i64,
    title: String,
    year: Option<i32>,
    monitored: bool,
    tvdb_id: Option<i64>,
    quality_profile_id: Option<i64>,
    #[serde(default)]
    tags: Vec<i64>,
    added: Option<DateTime<Utc>>,
    statistics: Option<SeriesStatistics>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SeriesStatistics {
    size_on_disk: Option<i64>,
    season_count: Option<i64>,
    episode_file_count: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct TagResource {
    id: i64,
    label: String,
}

#[derive(Debug, Deserialize)]
struct QualityProfileResource {
    id: i64,
    name: String,
}

/// Client for the owning Radarr/Sonarr instances
pub struct ServarrClient {
    radarr: Option<ServarrEndpoint>,
    sonarr: Option<ServarrEndpoint>,
    client: Arc<RateLimitedClient>,
    retry: RetryConfig,
}

impl ServarrClient {
    pub fn new(radarr: Option<ServarrEndpoint>, sonarr: Option<ServarrEndpoint>) -> Self {
        Self {
            radarr,
            sonarr,
            client: Arc::new(RateLimitedClient::for_servarr()),
            retry: RetryConfig::default(),
        }
    }

    fn endpoint(&self, kind: MediaKind) -> Result<&ServarrEndpoint> {
        match kind {
            MediaKind::Movie => self.radarr.as_ref(),
            MediaKind::Series => self.sonarr.as_ref(),
        }
        .ok_or_else(|| anyhow::anyhow!("no library manager configured for {}", kind))
    }

    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        endpoint: &ServarrEndpoint,
        path: &str,
    ) -> Result<T> {
        let url = format!("{}/api/v3/{}", endpoint.base_url.trim_end_matches('/'), path);
        let response = retry_async(
            || async {
                let resp = self
                    .client
                    .get_with_headers_and_query(
                        &url,
                        &[("X-Api-Key", endpoint.api_key.as_str())],
                        &[] as &[(&str, &str)],
                    )
                    .await?;
                if !resp.status().is_success() {
                    anyhow::bail!("{} returned {}", path, resp.status());
                }
                Ok(resp)
            },
            &self.retry,
            path,
        )
        .await?;

        response
            .json::<T>()
            .await
            .with_context(|| format!("failed to decode {} response", path))
    }

    /// Fetch tag id → label and profile id → name maps for one instance
    async fn lookup_tables(
        &self,
        endpoint: &ServarrEndpoint,
    ) -> Result<(
        std::collections::HashMap<i64, String>,
        std::collections::HashMap<i64, String>,
    )> {
        let tags: Vec<TagResource> = self.get_json(endpoint, "tag").await?;
        let profiles: Vec<QualityProfileResource> =
            self.get_json(endpoint, "qualityprofile").await?;
        Ok((
            tags.into_iter().map(|t| (t.id, t.label)).collect(),
            profiles.into_iter().map(|p| (p.id, p.name)).collect(),
        ))
    }
}

#[async_trait]
impl LibraryManager for ServarrClient {
    async fn list_items(&self, kind: MediaKind) -> Result<Vec<LibraryItem>> {
        let endpoint = self.endpoint(kind)?;
        let (tags, profiles) = self.lookup_tables(endpoint).await?;
        let resolve_tags = |ids: &[i64]| {
            ids.iter()
                .filter_map(|id| tags.get(id).cloned())
                .collect::<Vec<_>>()
        };

        let items = match kind {
            MediaKind::Movie => {
                let movies: Vec<MovieResource> = self.get_json(endpoint, "movie").await?;
                movies
                    .into_iter()
                    .map(|m| LibraryItem {
                        id: m.id,
                        title: m.title,
                        year: m.year,
                        external_catalog_id: m.tmdb_id,
                        monitored: m.monitored,
                        has_file: m.has_file,
                        file_size_bytes: m.size_on_disk,
                        quality_profile: m.quality_profile_id.and_then(|id| profiles.get(&id).cloned()),
                        tags: resolve_tags(&m.tags),
                        added_at: m.added,
                        season_count: None,
                    })
                    .collect()
            }
            MediaKind::Series => {
                let series: Vec<SeriesResource> = self.get_json(endpoint, "series").await?;
                series
                    .into_iter()
                    .map(|s| {
                        let stats = s.statistics.as_ref();
                        LibraryItem {
                            id: s.id,
                            title: s.title,
                            year: s.year,
                            external_catalog_id: s.tvdb_id,
                            monitored: s.monitored,
                            has_file: stats
                                .and_then(|st| st.episode_file_count)
                                .unwrap_or(0)
                                > 0,
                            file_size_bytes: stats.and_then(|st| st.size_on_disk),
                            quality_profile: s
                                .quality_profile_id
                                .and_then(|id| profiles.get(&id).cloned()),
                            tags: resolve_tags(&s.tags),
                            added_at: s.added,
                            season_count: stats.and_then(|st| st.season_count),
                        }
                    })
                    .collect()
            }
        };

        Ok(items)
    }

    async fn delete_file(&self, kind: MediaKind, id: i64) -> Result<()> {
        let endpoint = self.endpoint(kind)?;
        let (resource, query): (&str, &[(&str, &str)]) = match kind {
            MediaKind::Movie => (
                "movie",
                &[("deleteFiles", "true"), ("addImportExclusion", "false")],
            ),
            MediaKind::Series => ("series", &[("deleteFiles", "true")]),
        };
        let url = format!(
            "{}/api/v3/{}/{}",
            endpoint.base_url.trim_end_matches('/'),
            resource,
            id
        );

        debug!(kind = %kind, id = id, "Requesting deletion from library manager");
        let resp = self
            .client
            .delete_with_headers_and_query(&url, &[("X-Api-Key", endpoint.api_key.as_str())], query)
            .await?;
        if !resp.status().is_success() {
            anyhow::bail!("delete of {} {} returned {}", resource, id, resp.status());
        }

        Ok(())
    }

    async fn set_monitored(&self, kind: MediaKind, id: i64, monitored: bool) -> Result<()> {
        let endpoint = self.endpoint(kind)?;
        // The editor endpoints take a batch; a single id is just a batch of one
        let (resource, body) = match kind {
            MediaKind::Movie => ("movie/editor", json!({ "movieIds": [id], "monitored": monitored })),
            MediaKind::Series => ("series/editor", json!({ "seriesIds": [id], "monitored": monitored })),
        };
        let url = format!(
            "{}/api/v3/{}",
            endpoint.base_url.trim_end_matches('/'),
            resource
        );

        debug!(kind = %kind, id = id, monitored = monitored, "Updating monitored flag");
        let resp = self
            .client
            .put_json(&url, &[("X-Api-Key", endpoint.api_key.as_str())], &body)
            .await?;
        if !resp.status().is_success() {
            anyhow::bail!("monitor update of {} returned {}", id, resp.status());
        }

        Ok(())
    }
}
