//! Single-protocol HTTP fetcher: a hard timeout, a fixed user agent, a body
//! size cap, and tolerance for bad TLS certificates (the crawler is
//! read-only and does not act on the content it fetches).
//!
//! Fetching is behind the `PageFetch` trait, mirroring `crawlbot_robots`'s
//! `RobotsFetch`, so the crawl engine can be driven deterministically in
//! tests without a live HTTP origin.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::Utc;
use crawlbot_core::CrawlError;
use tracing::debug;
use url::Url;

const FETCH_TIMEOUT: Duration = Duration::from_secs(10);
const DEFAULT_MAX_BODY_BYTES: usize = 8 * 1024 * 1024;

#[derive(Debug, Clone)]
pub struct FetchResponse {
    pub url: Url,
    pub status: u16,
    pub body: String,
    pub content_type: Option<String>,
    pub fetched_at: chrono::DateTime<chrono::Utc>,
    pub response_time_ms: u64,
}

#[async_trait]
pub trait PageFetch: Send + Sync {
    async fn fetch(&self, url: &Url) -> Result<FetchResponse, CrawlError>;
}

#[derive(Clone)]
pub struct HttpPageFetch {
    client: reqwest::Client,
    max_body_bytes: usize,
}

impl HttpPageFetch {
    pub fn new(user_agent: impl Into<String>) -> Self {
        Self::with_max_body(user_agent, DEFAULT_MAX_BODY_BYTES)
    }

    pub fn with_max_body(user_agent: impl Into<String>, max_body_bytes: usize) -> Self {
        let client = reqwest::Client::builder()
            .timeout(FETCH_TIMEOUT)
            .user_agent(user_agent.into())
            .danger_accept_invalid_certs(true)
            .build()
            .expect("fetch http client");
        Self { client, max_body_bytes }
    }
}

#[async_trait]
impl PageFetch for HttpPageFetch {
    async fn fetch(&self, url: &Url) -> Result<FetchResponse, CrawlError> {
        let started = Instant::now();
        let resp = self.client.get(url.clone()).send().await?;
        let status = resp.status();
        if !status.is_success() {
            return Err(CrawlError::Network(format!("non-2xx status: {status}")));
        }

        let content_type = resp
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|s| s.to_string());

        let bytes = resp.bytes().await?;
        if bytes.len() > self.max_body_bytes {
            return Err(CrawlError::BodyTooLarge {
                size: bytes.len(),
                max: self.max_body_bytes,
            });
        }

        let body = String::from_utf8_lossy(&bytes).into_owned();
        let response_time_ms = started.elapsed().as_millis() as u64;
        debug!(url = %url, status = %status, response_time_ms, "fetched page");

        Ok(FetchResponse {
            url: url.clone(),
            status: status.as_u16(),
            body,
            content_type,
            fetched_at: Utc::now(),
            response_time_ms,
        })
    }
}

/// Test fake: an in-memory map of URL string to page body. Missing entries
/// fetch as a network error, matching the teacher's "skip on failure" rule.
#[derive(Default, Clone)]
pub struct FakePageFetch {
    pub pages: HashMap<String, String>,
}

impl FakePageFetch {
    pub fn with_page(mut self, url: impl Into<String>, body: impl Into<String>) -> Self {
        self.pages.insert(url.into(), body.into());
        self
    }
}

#[async_trait]
impl PageFetch for FakePageFetch {
    async fn fetch(&self, url: &Url) -> Result<FetchResponse, CrawlError> {
        match self.pages.get(url.as_str()) {
            Some(body) => Ok(FetchResponse {
                url: url.clone(),
                status: 200,
                body: body.clone(),
                content_type: Some("text/html".to_string()),
                fetched_at: Utc::now(),
                response_time_ms: 0,
            }),
            None => Err(CrawlError::Network(format!("no fake page registered for {url}"))),
        }
    }
}
