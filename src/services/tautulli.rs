//! Tautulli watch-history client
//!
//! Read-only. Tautulli's history API has no notion of the catalog ids the
//! library manager uses, so matching is by normalized title (+ year for
//! movies); an item with no history rows legitimately has no watch facet.

use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use serde::Deserialize;

use crate::media::{normalize_title, FacetQuery, MediaKind, WatchFacet, WatchTracker};

use super::rate_limiter::{retry_async, RateLimitedClient, RetryConfig};

#[derive(Debug, Deserialize)]
struct ApiEnvelope<T> {
    response: ApiResponse<T>,
}

#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    result: String,
    data: Option<T>,
}

#[derive(Debug, Deserialize)]
struct HistoryData {
    #[serde(default)]
    data: Vec<HistoryRow>,
}

#[derive(Debug, Deserialize)]
struct HistoryRow {
    #[serde(default)]
    title: String,
    #[serde(default)]
    grandparent_title: String,
    year: Option<i32>,
    #[serde(default)]
    media_type: String,
    /// Key of the watched item; for episodes, the episode itself
    rating_key: Option<i64>,
    #[serde(default)]
    grandparent_rating_key: Option<i64>,
    /// Unix seconds of the session stop
    date: Option<i64>,
    /// 0 = partial, 1 = watched
    watched_status: Option<f64>,
}

// Tautulli serializes most metadata numbers as strings
#[derive(Debug, Deserialize)]
struct MetadataData {
    added_at: Option<String>,
    #[serde(default)]
    media_info: Vec<MediaInfo>,
}

#[derive(Debug, Deserialize)]
struct MediaInfo {
    video_codec: Option<String>,
    video_full_resolution: Option<String>,
    #[serde(default)]
    parts: Vec<MediaPart>,
}

#[derive(Debug, Deserialize)]
struct MediaPart {
    file_size: Option<String>,
}

/// Tautulli v2 API client
pub struct TautulliClient {
    base_url: String,
    api_key: String,
    client: Arc<RateLimitedClient>,
    retry: RetryConfig,
}

impl TautulliClient {
    pub fn new(base_url: String, api_key: String) -> Self {
        Self {
            base_url,
            api_key,
            client: Arc::new(RateLimitedClient::for_tautulli()),
            retry: RetryConfig::default(),
        }
    }

    async fn call<T: serde::de::DeserializeOwned>(
        &self,
        cmd: &'static str,
        extra: &[(&str, &str)],
    ) -> Result<Option<T>> {
        let url = format!("{}/api/v2", self.base_url.trim_end_matches('/'));
        let mut query = vec![("apikey", self.api_key.as_str()), ("cmd", cmd)];
        query.extend_from_slice(extra);

        let response = retry_async(
            || async {
                let resp = self
                    .client
                    .get_with_headers_and_query(&url, &[], &query)
                    .await?;
                if !resp.status().is_success() {
                    anyhow::bail!("tautulli returned {}", resp.status());
                }
                Ok(resp)
            },
            &self.retry,
            cmd,
        )
        .await?;

        let envelope: ApiEnvelope<T> = response
            .json()
            .await
            .context("failed to decode tautulli response")?;
        if envelope.response.result != "success" {
            anyhow::bail!("tautulli call was not successful");
        }

        Ok(envelope.response.data)
    }

    async fn history(&self, search: &str) -> Result<Vec<HistoryRow>> {
        let data: Option<HistoryData> = self
            .call("get_history", &[("search", search), ("length", "500")])
            .await?;
        Ok(data.map(|d| d.data).unwrap_or_default())
    }

    /// Codec, resolution and file size for one rating key, best effort
    async fn metadata(&self, rating_key: i64) -> Option<MetadataData> {
        let key = rating_key.to_string();
        match self.call("get_metadata", &[("rating_key", &key)]).await {
            Ok(data) => data,
            Err(e) => {
                tracing::debug!(error = %e, "Tautulli metadata lookup failed");
                None
            }
        }
    }

    /// Does this history row belong to the queried item?
    fn row_matches(query: &FacetQuery, row: &HistoryRow) -> bool {
        match query.kind {
            MediaKind::Movie => {
                row.media_type == "movie"
                    && normalize_title(&row.title) == normalize_title(&query.title)
                    && (query.year.is_none() || row.year.is_none() || query.year == row.year)
            }
            // Episode rows carry the series name as grandparent_title
            MediaKind::Series => {
                row.media_type == "episode"
                    && normalize_title(&row.grandparent_title) == normalize_title(&query.title)
            }
        }
    }
}

#[async_trait]
impl WatchTracker for TautulliClient {
    async fn lookup(&self, query: &FacetQuery) -> Result<Option<WatchFacet>> {
        let rows = self.history(&query.title).await?;

        let mut play_count = 0i64;
        let mut last_watched: Option<DateTime<Utc>> = None;
        let mut rating_key: Option<i64> = None;
        for row in rows.iter().filter(|r| Self::row_matches(query, r)) {
            if row.watched_status.unwrap_or(0.0) > 0.0 {
                play_count += 1;
            }
            if let Some(ts) = row.date
                && let Some(at) = Utc.timestamp_opt(ts, 0).single()
            {
                last_watched = Some(last_watched.map_or(at, |prev| prev.max(at)));
            }
            // For series, metadata hangs off the show, not the episode
            rating_key = rating_key
                .or(match query.kind {
                    MediaKind::Movie => row.rating_key,
                    MediaKind::Series => row.grandparent_rating_key,
                });
        }

        if play_count == 0 && last_watched.is_none() {
            return Ok(None);
        }

        let mut facet = WatchFacet {
            play_count,
            last_watched_at: last_watched,
            added_at: None,
            file_size_bytes: None,
            codec: None,
            resolution: None,
        };

        if let Some(key) = rating_key
            && let Some(meta) = self.metadata(key).await
        {
            facet.added_at = meta
                .added_at
                .and_then(|s| s.parse::<i64>().ok())
                .and_then(|ts| Utc.timestamp_opt(ts, 0).single());
            if let Some(info) = meta.media_info.first() {
                facet.codec = info.video_codec.clone();
                facet.resolution = info.video_full_resolution.clone();
                facet.file_size_bytes = info
                    .parts
                    .first()
                    .and_then(|p| p.file_size.as_ref())
                    .and_then(|s| s.parse().ok());
            }
        }

        Ok(Some(facet))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn query(kind: MediaKind, title: &str, year: Option<i32>) -> FacetQuery {
        FacetQuery {
            kind,
            external_catalog_id: None,
            title: title.to_string(),
            year,
        }
    }

    fn movie_row(title: &str, year: i32) -> HistoryRow {
        HistoryRow {
            title: title.to_string(),
            grandparent_title: String::new(),
            year: Some(year),
            media_type: "movie".to_string(),
            rating_key: Some(101),
            grandparent_rating_key: None,
            date: Some(1_700_000_000),
            watched_status: Some(1.0),
        }
    }

    #[test]
    fn test_movie_row_matches_title_and_year() {
        let q = query(MediaKind::Movie, "The Matrix", Some(1999));
        assert!(TautulliClient::row_matches(&q, &movie_row("The Matrix", 1999)));
        assert!(TautulliClient::row_matches(&q, &movie_row("the matrix!", 1999)));
        assert!(!TautulliClient::row_matches(&q, &movie_row("The Matrix", 2003)));
    }

    #[test]
    fn test_series_matches_on_grandparent_title() {
        let q = query(MediaKind::Series, "Severance", None);
        let row = HistoryRow {
            title: "Half Loop".to_string(),
            grandparent_title: "Severance".to_string(),
            year: Some(2022),
            media_type: "episode".to_string(),
            rating_key: Some(555),
            grandparent_rating_key: Some(500),
            date: None,
            watched_status: Some(1.0),
        };
        assert!(TautulliClient::row_matches(&q, &row));

        let movie = movie_row("Severance", 2022);
        assert!(!TautulliClient::row_matches(&q, &movie));
    }
}
