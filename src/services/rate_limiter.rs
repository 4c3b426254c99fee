//! Rate limiting and retry logic for external API calls
//!
//! Every integration (servarr, Tautulli, Plex, Overseerr, qBittorrent) goes
//! through a rate-limited HTTP client so custodian never hammers the systems
//! it is supposed to be maintaining, plus retry utilities for transient
//! failures.

use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use backoff::backoff::Backoff;
use backoff::ExponentialBackoff;
use governor::{
    clock::DefaultClock,
    state::{InMemoryState, NotKeyed},
    Quota, RateLimiter,
};
use reqwest::{Client, Response};
use tracing::{debug, warn};

/// Per-client request rate settings
#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    pub requests_per_second: u32,
    /// Short bursts above the steady rate are allowed up to this many requests
    pub burst_size: u32,
}

impl RateLimitConfig {
    fn quota(&self) -> Quota {
        Quota::per_second(NonZeroU32::new(self.requests_per_second).unwrap_or(NonZeroU32::MIN))
            .allow_burst(NonZeroU32::new(self.burst_size).unwrap_or(NonZeroU32::MIN))
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            requests_per_second: 4,
            burst_size: 8,
        }
    }
}

/// HTTP client that waits for a rate-limit permit before every request
pub struct RateLimitedClient {
    client: Client,
    limiter: Arc<RateLimiter<NotKeyed, InMemoryState, DefaultClock>>,
    name: String,
}

impl RateLimitedClient {
    pub fn new(name: &str, config: RateLimitConfig) -> Self {
        Self {
            client: Client::builder()
                .timeout(Duration::from_secs(30))
                .cookie_store(true)
                .build()
                .expect("Failed to create HTTP client"),
            limiter: Arc::new(RateLimiter::direct(config.quota())),
            name: name.to_string(),
        }
    }

    /// Client for a Radarr/Sonarr instance (local, can take some load)
    pub fn for_servarr() -> Self {
        Self::new(
            "servarr",
            RateLimitConfig {
                requests_per_second: 5,
                burst_size: 10,
            },
        )
    }

    /// Client for Tautulli (single-threaded Python app, be gentle)
    pub fn for_tautulli() -> Self {
        Self::new(
            "tautulli",
            RateLimitConfig {
                requests_per_second: 2,
                burst_size: 5,
            },
        )
    }

    /// Client for the Plex server itself
    pub fn for_plex() -> Self {
        Self::new(
            "plex",
            RateLimitConfig {
                requests_per_second: 4,
                burst_size: 8,
            },
        )
    }

    /// Client for Overseerr
    pub fn for_overseerr() -> Self {
        Self::new(
            "overseerr",
            RateLimitConfig {
                requests_per_second: 3,
                burst_size: 6,
            },
        )
    }

    /// Client for the qBittorrent WebUI
    pub fn for_qbittorrent() -> Self {
        Self::new(
            "qbittorrent",
            RateLimitConfig {
                requests_per_second: 3,
                burst_size: 6,
            },
        )
    }

    pub async fn get(&self, url: &str) -> Result<Response> {
        self.wait_for_permit().await;
        debug!(client = %self.name, %url, "rate-limited GET");

        self.client
            .get(url)
            .send()
            .await
            .context("HTTP request failed")
    }

    pub async fn get_with_headers_and_query<T: serde::Serialize + ?Sized>(
        &self,
        url: &str,
        headers: &[(&str, &str)],
        query: &T,
    ) -> Result<Response> {
        self.wait_for_permit().await;
        debug!(client = %self.name, %url, "rate-limited GET");

        let mut request = self.client.get(url);
        for (key, value) in headers {
            request = request.header(*key, *value);
        }
        request
            .query(query)
            .send()
            .await
            .context("HTTP request failed")
    }

    pub async fn delete_with_headers_and_query<T: serde::Serialize + ?Sized>(
        &self,
        url: &str,
        headers: &[(&str, &str)],
        query: &T,
    ) -> Result<Response> {
        self.wait_for_permit().await;
        debug!(client = %self.name, %url, "rate-limited DELETE");

        let mut request = self.client.delete(url);
        for (key, value) in headers {
            request = request.header(*key, *value);
        }
        request
            .query(query)
            .send()
            .await
            .context("HTTP request failed")
    }

    /// PUT a JSON body with headers
    pub async fn put_json<B: serde::Serialize + ?Sized>(
        &self,
        url: &str,
        headers: &[(&str, &str)],
        body: &B,
    ) -> Result<Response> {
        self.wait_for_permit().await;
        debug!(client = %self.name, %url, "rate-limited PUT");

        let mut request = self.client.put(url);
        for (key, value) in headers {
            request = request.header(*key, *value);
        }
        request
            .json(body)
            .send()
            .await
            .context("HTTP request failed")
    }

    /// POST a form body (qBittorrent's WebUI API is form-encoded)
    pub async fn post_form<B: serde::Serialize + ?Sized>(
        &self,
        url: &str,
        form: &B,
    ) -> Result<Response> {
        self.wait_for_permit().await;
        debug!(client = %self.name, %url, "rate-limited POST");

        self.client
            .post(url)
            .form(form)
            .send()
            .await
            .context("HTTP request failed")
    }

    pub async fn wait_for_permit(&self) {
        self.limiter.until_ready().await;
    }
}

/// Retry policy for transient upstream failures
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Total attempts, including the first one
    pub max_retries: u32,
    pub initial_interval: Duration,
    pub max_interval: Duration,
    pub multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_interval: Duration::from_millis(500),
            max_interval: Duration::from_secs(30),
            multiplier: 2.0,
        }
    }
}

impl RetryConfig {
    fn to_backoff(&self) -> ExponentialBackoff {
        ExponentialBackoff {
            initial_interval: self.initial_interval,
            max_interval: self.max_interval,
            multiplier: self.multiplier,
            max_elapsed_time: Some(Duration::from_secs(120)),
            ..Default::default()
        }
    }
}

/// Run a fallible async operation, sleeping between attempts per `config`
pub async fn retry_async<T, E, Fut, F>(
    operation: F,
    config: &RetryConfig,
    operation_name: &str,
) -> Result<T, E>
where
    F: Fn() -> Fut,
    Fut: std::future::Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    let max_attempts = config.max_retries.max(1);
    let mut backoff = config.to_backoff();
    let mut attempt = 0;

    loop {
        attempt += 1;
        let err = match operation().await {
            Ok(value) => return Ok(value),
            Err(e) => e,
        };

        if attempt >= max_attempts {
            warn!(
                operation = %operation_name,
                attempts = attempt,
                error = %err,
                "Giving up after repeated failures"
            );
            return Err(err);
        }

        let Some(delay) = backoff.next_backoff() else {
            return Err(err);
        };
        warn!(
            operation = %operation_name,
            attempt,
            error = %err,
            retry_in_ms = delay.as_millis() as u64,
            "Transient failure, will retry"
        );
        tokio::time::sleep(delay).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rate_limit_config_default() {
        let config = RateLimitConfig::default();
        assert_eq!(config.requests_per_second, 4);
        assert_eq!(config.burst_size, 8);
    }

    #[test]
    fn test_retry_config_default() {
        let config = RetryConfig::default();
        assert_eq!(config.max_retries, 3);
    }

    #[tokio::test]
    async fn test_retry_async_gives_up_after_max_retries() {
        let config = RetryConfig {
            max_retries: 2,
            initial_interval: Duration::from_millis(1),
            max_interval: Duration::from_millis(2),
            multiplier: 1.0,
        };
        let calls = std::sync::atomic::AtomicU32::new(0);
        let result: Result<(), String> = retry_async(
            || {
                calls.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
                async { Err("nope".to_string()) }
            },
            &config,
            "test",
        )
        .await;
        assert!(result.is_err());
        assert_eq!(calls.load(std::sync::atomic::Ordering::SeqCst), 2);
    }
}
