//! Overseerr request-broker client
//!
//! Read-only and strictly best-effort: Overseerr is keyed by catalog id, so
//! items the library manager has no catalog id for simply get no request
//! facet. A 404 is a normal answer, not an error.

use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::StatusCode;
use serde::Deserialize;

use crate::media::{FacetQuery, MediaKind, RequestBroker, RequestFacet};

use super::rate_limiter::{RateLimitedClient, RetryConfig, retry_async};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MediaDetails {
    media_info: Option<MediaInfo>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MediaInfo {
    /// 1 unknown, 2 pending, 3 processing, 4 partially available, 5 available
    status: Option<i32>,
    #[serde(default)]
    requests: Vec<MediaRequest>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MediaRequest {
    created_at: Option<DateTime<Utc>>,
    requested_by: Option<RequestUser>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RequestUser {
    display_name: Option<String>,
    email: Option<String>,
}

fn status_label(status: i32) -> &'static str {
    match status {
        2 => "pending",
        3 => "processing",
        4 => "partially_available",
        5 => "available",
        _ => "unknown",
    }
}

/// Overseerr API client
pub struct OverseerrClient {
    base_url: String,
    api_key: String,
    client: Arc<RateLimitedClient>,
    retry: RetryConfig,
}

impl OverseerrClient {
    pub fn new(base_url: String, api_key: String) -> Self {
        Self {
            base_url,
            api_key,
            client: Arc::new(RateLimitedClient::for_overseerr()),
            retry: RetryConfig::default(),
        }
    }
}

#[async_trait]
impl RequestBroker for OverseerrClient {
    async fn lookup(&self, query: &FacetQuery) -> Result<Option<RequestFacet>> {
        // Overseerr indexes by TMDB id. The library manager's catalog id is
        // TMDB for movies but TVDB for series; passing a TVDB id here could
        // attach another show's requests, so series get no request facet.
        if query.kind == MediaKind::Series {
            return Ok(None);
        }
        let Some(catalog_id) = query.external_catalog_id else {
            return Ok(None);
        };

        let url = format!(
            "{}/api/v1/movie/{}",
            self.base_url.trim_end_matches('/'),
            catalog_id
        );

        let response = retry_async(
            || async {
                let resp = self
                    .client
                    .get_with_headers_and_query(
                        &url,
                        &[("X-Api-Key", self.api_key.as_str())],
                        &[] as &[(&str, &str)],
                    )
                    .await?;
                if resp.status() != StatusCode::NOT_FOUND && !resp.status().is_success() {
                    anyhow::bail!("overseerr returned {}", resp.status());
                }
                Ok(resp)
            },
            &self.retry,
            "overseerr lookup",
        )
        .await?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }

        let details: MediaDetails = response
            .json()
            .await
            .context("failed to decode overseerr response")?;
        let Some(info) = details.media_info else {
            return Ok(None);
        };

        let newest = info
            .requests
            .iter()
            .max_by_key(|r| r.created_at.unwrap_or(DateTime::<Utc>::MIN_UTC));

        Ok(Some(RequestFacet {
            status: info.status.map(|s| status_label(s).to_string()),
            has_request: !info.requests.is_empty(),
            requested_by: newest.and_then(|r| {
                r.requested_by
                    .as_ref()
                    .and_then(|u| u.display_name.clone().or_else(|| u.email.clone()))
            }),
            requested_at: newest.and_then(|r| r.created_at),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_labels() {
        assert_eq!(status_label(5), "available");
        assert_eq!(status_label(2), "pending");
        assert_eq!(status_label(99), "unknown");
    }
}
