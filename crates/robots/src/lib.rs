//! Per-task robots.txt cache. One `RobotsCache` is owned exclusively by the
//! worker running a single crawl task; it is never shared across tasks.
//!
//! Fetching robots.txt itself is behind the `RobotsFetch` trait so the engine
//! can be driven deterministically in tests without a live HTTP origin.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use robotstxt::DefaultMatcher;
use tracing::{debug, warn};
use url::Url;

const ROBOTS_FETCH_TIMEOUT: Duration = Duration::from_secs(10);

#[async_trait]
pub trait RobotsFetch: Send + Sync {
    /// Fetch `{origin}/robots.txt`. `None` means unavailable (network
    /// failure, non-2xx, or unparseable body) — caller treats this as
    /// disallow-all for the origin.
    async fn fetch_robots(&self, origin: &str) -> Option<String>;
}

#[derive(Clone)]
pub struct HttpRobotsFetch {
    client: reqwest::Client,
}

impl HttpRobotsFetch {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(ROBOTS_FETCH_TIMEOUT)
                .danger_accept_invalid_certs(true)
                .build()
                .expect("robots http client"),
        }
    }
}

impl Default for HttpRobotsFetch {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RobotsFetch for HttpRobotsFetch {
    async fn fetch_robots(&self, origin: &str) -> Option<String> {
        let robots_url = format!("{origin}/robots.txt");
        match self.client.get(&robots_url).send().await {
            Ok(resp) if resp.status().is_success() => match resp.text().await {
                Ok(content) => Some(content),
                Err(e) => {
                    warn!(origin, error = %e, "failed to read robots.txt body");
                    None
                }
            },
            Ok(resp) => {
                debug!(origin, status = %resp.status(), "robots.txt not available");
                None
            }
            Err(e) => {
                warn!(origin, error = %e, "failed to fetch robots.txt");
                None
            }
        }
    }
}

/// Test fake: allows every origin by default, or returns preset robots.txt
/// bodies keyed by origin.
#[derive(Default, Clone)]
pub struct FakeRobotsFetch {
    pub bodies: HashMap<String, String>,
    pub allow_all_by_default: bool,
}

impl FakeRobotsFetch {
    pub fn allow_all() -> Self {
        Self {
            bodies: HashMap::new(),
            allow_all_by_default: true,
        }
    }

    pub fn with_body(mut self, origin: impl Into<String>, body: impl Into<String>) -> Self {
        self.bodies.insert(origin.into(), body.into());
        self
    }
}

#[async_trait]
impl RobotsFetch for FakeRobotsFetch {
    async fn fetch_robots(&self, origin: &str) -> Option<String> {
        if let Some(body) = self.bodies.get(origin) {
            return Some(body.clone());
        }
        if self.allow_all_by_default {
            return Some("User-agent: *\nAllow: /\n".to_string());
        }
        None
    }
}

#[derive(Debug, Clone)]
enum Entry {
    Loaded { content: String, crawl_delay: Option<u64> },
    Unknown,
}

pub struct RobotsCache<R: RobotsFetch> {
    user_agent: String,
    fetcher: R,
    entries: HashMap<String, Entry>,
}

impl<R: RobotsFetch> RobotsCache<R> {
    pub fn new(user_agent: impl Into<String>, fetcher: R) -> Self {
        Self {
            user_agent: user_agent.into(),
            fetcher,
            entries: HashMap::new(),
        }
    }

    fn origin(url: &Url) -> String {
        format!("{}://{}", url.scheme(), url.host_str().unwrap_or(""))
    }

    async fn ensure_loaded(&mut self, url: &Url) {
        let origin = Self::origin(url);
        if self.entries.contains_key(&origin) {
            return;
        }

        let entry = match self.fetcher.fetch_robots(&origin).await {
            Some(content) => {
                let crawl_delay = parse_crawl_delay(&content);
                Entry::Loaded { content, crawl_delay }
            }
            None => Entry::Unknown,
        };

        self.entries.insert(origin, entry);
    }

    /// Whether `url` may be fetched under the cached robots.txt for its
    /// origin. An origin whose robots.txt could not be retrieved is
    /// disallowed entirely.
    pub async fn is_allowed(&mut self, url: &Url) -> bool {
        self.ensure_loaded(url).await;
        let origin = Self::origin(url);
        match self.entries.get(&origin) {
            Some(Entry::Loaded { content, .. }) => {
                let mut matcher = DefaultMatcher::default();
                matcher.one_agent_allowed_by_robots(content, &self.user_agent, url.as_str())
            }
            _ => false,
        }
    }

    /// Delay to honor before requesting `url`, preferring the site's own
    /// Crawl-delay directive over the task's configured default.
    pub async fn delay_for(&mut self, url: &Url, default_politeness_seconds: f64) -> Duration {
        self.ensure_loaded(url).await;
        let origin = Self::origin(url);
        let seconds = match self.entries.get(&origin) {
            Some(Entry::Loaded { crawl_delay: Some(d), .. }) => *d as f64,
            _ => default_politeness_seconds,
        };
        Duration::from_secs_f64(seconds)
    }
}

/// Best-effort line-based parse of a `Crawl-delay` directive, since the
/// `robotstxt` crate only exposes the allow/deny decision.
fn parse_crawl_delay(content: &str) -> Option<u64> {
    for line in content.lines() {
        let line = line.trim();
        if let Some(rest) = line.to_lowercase().strip_prefix("crawl-delay:") {
            if let Ok(seconds) = rest.trim().parse::<f64>() {
                return Some(seconds.ceil() as u64);
            }
        }
    }
    None
}
