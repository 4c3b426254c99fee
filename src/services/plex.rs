//! Plex media-server client
//!
//! Read-only: view counts, last-viewed timestamps, ratings, artwork and
//! collection memberships. Items are matched by catalog guid (tmdb/tvdb)
//! when the library manager exposes one, falling back to normalized
//! title + year; anything more speculative is deliberately not attempted.

use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use parking_lot::RwLock;
use serde::Deserialize;

use crate::media::{normalize_title, FacetQuery, MediaKind, MediaServer, ServerFacet};

use super::rate_limiter::{retry_async, RateLimitedClient, RetryConfig};

#[derive(Debug, Deserialize)]
struct SectionsEnvelope {
    #[serde(rename = "MediaContainer")]
    container: SectionsContainer,
}

#[derive(Debug, Deserialize)]
struct SectionsContainer {
    #[serde(rename = "Directory", default)]
    directories: Vec<Section>,
}

#[derive(Debug, Clone, Deserialize)]
struct Section {
    key: String,
    #[serde(rename = "type")]
    kind: String,
}

#[derive(Debug, Deserialize)]
struct ItemsEnvelope {
    #[serde(rename = "MediaContainer")]
    container: ItemsContainer,
}

#[derive(Debug, Deserialize)]
struct ItemsContainer {
    #[serde(rename = "Metadata", default)]
    metadata: Vec<PlexItem>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PlexItem {
    #[serde(default)]
    title: String,
    year: Option<i32>,
    view_count: Option<i64>,
    /// Unix seconds
    last_viewed_at: Option<i64>,
    rating: Option<f64>,
    thumb: Option<String>,
    #[serde(rename = "Guid", default)]
    guids: Vec<Guid>,
    #[serde(rename = "Collection", default)]
    collections: Vec<Tagged>,
}

#[derive(Debug, Deserialize)]
struct Guid {
    id: String,
}

#[derive(Debug, Deserialize)]
struct Tagged {
    tag: String,
}

/// Plex HTTP API client
pub struct PlexClient {
    base_url: String,
    token: String,
    client: Arc<RateLimitedClient>,
    retry: RetryConfig,
    // Section keys are stable per server; fetched once and cached
    sections: RwLock<Option<Vec<Section>>>,
}

impl PlexClient {
    pub fn new(base_url: String, token: String) -> Self {
        Self {
            base_url,
            token,
            client: Arc::new(RateLimitedClient::for_plex()),
            retry: RetryConfig::default(),
            sections: RwLock::new(None),
        }
    }

    fn headers(&self) -> [(&str, &str); 2] {
        [
            ("X-Plex-Token", self.token.as_str()),
            ("Accept", "application/json"),
        ]
    }

    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, &str)],
    ) -> Result<T> {
        let url = format!("{}{}", self.base_url.trim_end_matches('/'), path);
        let response = retry_async(
            || async {
                let resp = self
                    .client
                    .get_with_headers_and_query(&url, &self.headers(), query)
                    .await?;
                if !resp.status().is_success() {
                    anyhow::bail!("plex {} returned {}", path, resp.status());
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
            .with_context(|| format!("failed to decode plex {} response", path))
    }

    /// Section keys for a media kind ("movie" or "show" libraries)
    async fn section_keys(&self, kind: MediaKind) -> Result<Vec<String>> {
        if self.sections.read().is_none() {
            let envelope: SectionsEnvelope = self.get_json("/library/sections", &[]).await?;
            *self.sections.write() = Some(envelope.container.directories);
        }

        let wanted = match kind {
            MediaKind::Movie => "movie",
            MediaKind::Series => "show",
        };
        Ok(self
            .sections
            .read()
            .as_ref()
            .map(|sections| {
                sections
                    .iter()
                    .filter(|s| s.kind == wanted)
                    .map(|s| s.key.clone())
                    .collect()
            })
            .unwrap_or_default())
    }

    /// Pick the item matching the query: guid first, title + year second
    fn select<'a>(query: &FacetQuery, items: &'a [PlexItem]) -> Option<&'a PlexItem> {
        if let Some(catalog_id) = query.external_catalog_id {
            let scheme = match query.kind {
                MediaKind::Movie => format!("tmdb://{}", catalog_id),
                MediaKind::Series => format!("tvdb://{}", catalog_id),
            };
            if let Some(item) = items.iter().find(|i| i.guids.iter().any(|g| g.id == scheme)) {
                return Some(item);
            }
        }

        let wanted = normalize_title(&query.title);
        items.iter().find(|i| {
            normalize_title(&i.title) == wanted
                && (query.year.is_none() || i.year.is_none() || query.year == i.year)
        })
    }
}

#[async_trait]
impl MediaServer for PlexClient {
    async fn lookup(&self, query: &FacetQuery) -> Result<Option<ServerFacet>> {
        for key in self.section_keys(query.kind).await? {
            let envelope: ItemsEnvelope = self
                .get_json(
                    &format!("/library/sections/{}/all", key),
                    &[("title", query.title.as_str()), ("includeGuids", "1")],
                )
                .await?;

            if let Some(item) = Self::select(query, &envelope.container.metadata) {
                return Ok(Some(ServerFacet {
                    view_count: item.view_count.unwrap_or(0),
                    last_viewed_at: item
                        .last_viewed_at
                        .and_then(|ts| Utc.timestamp_opt(ts, 0).single()),
                    rating: item.rating,
                    thumb: item.thumb.clone(),
                    collections: item.collections.iter().map(|c| c.tag.clone()).collect(),
                }));
            }
        }

        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn plex_item(title: &str, year: i32, guid: Option<&str>) -> PlexItem {
        PlexItem {
            title: title.to_string(),
            year: Some(year),
            view_count: Some(1),
            last_viewed_at: None,
            rating: None,
            thumb: None,
            guids: guid
                .map(|g| vec![Guid { id: g.to_string() }])
                .unwrap_or_default(),
            collections: vec![],
        }
    }

    fn query(catalog_id: Option<i64>, title: &str, year: Option<i32>) -> FacetQuery {
        FacetQuery {
            kind: MediaKind::Movie,
            external_catalog_id: catalog_id,
            title: title.to_string(),
            year,
        }
    }

    #[test]
    fn test_guid_match_beats_title_match() {
        let items = vec![
            plex_item("The Matrix", 1999, None),
            plex_item("Some Other Cut", 1999, Some("tmdb://603")),
        ];
        let selected = PlexClient::select(&query(Some(603), "The Matrix", Some(1999)), &items);
        assert_eq!(selected.unwrap().title, "Some Other Cut");
    }

    #[test]
    fn test_title_year_fallback_when_no_guid() {
        let items = vec![plex_item("The Matrix", 1999, None)];
        let selected = PlexClient::select(&query(Some(603), "The Matrix", Some(1999)), &items);
        assert_eq!(selected.unwrap().title, "The Matrix");
    }

    #[test]
    fn test_year_mismatch_is_no_match() {
        let items = vec![plex_item("Dune", 1984, None)];
        assert!(PlexClient::select(&query(None, "Dune", Some(2021)), &items).is_none());
    }
}
