use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::CrawlError;

/// Status of a crawl task as it moves through the lifecycle store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Queued,
    Started,
    Completed,
    Failed,
    Timeout,
    Requeued,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Queued => "queued",
            TaskStatus::Started => "started",
            TaskStatus::Completed => "completed",
            TaskStatus::Failed => "failed",
            TaskStatus::Timeout => "timeout",
            TaskStatus::Requeued => "requeued",
        }
    }
}

impl std::str::FromStr for TaskStatus {
    type Err = CrawlError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "queued" => TaskStatus::Queued,
            "started" => TaskStatus::Started,
            "completed" => TaskStatus::Completed,
            "failed" => TaskStatus::Failed,
            "timeout" => TaskStatus::Timeout,
            "requeued" => TaskStatus::Requeued,
            other => return Err(CrawlError::Storage(format!("unknown task status: {other}"))),
        })
    }
}

/// A durable record of one crawl task's lifecycle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrawlTask {
    pub task_id: Uuid,
    pub seed_url: String,
    pub depth: u32,
    pub politeness_seconds: f64,
    pub status: TaskStatus,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub error: Option<String>,
    pub origin_task_id: Option<Uuid>,
}

impl CrawlTask {
    pub fn new(task_id: Uuid, seed_url: String, depth: u32, politeness_seconds: f64, now: DateTime<Utc>) -> Self {
        Self {
            task_id,
            seed_url,
            depth,
            politeness_seconds,
            status: TaskStatus::Queued,
            created_at: now,
            started_at: None,
            finished_at: None,
            error: None,
            origin_task_id: None,
        }
    }
}

/// Message shape placed on the broker's crawl queue by the dispatcher.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrawlMessage {
    pub task_id: Uuid,
    pub url: String,
    pub depth: u32,
    pub politeness: f64,
}

/// A crawled page's text snapshot, upserted by normalized URL.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrawledPage {
    pub url: String,
    pub text: String,
    pub depth: u32,
    pub timestamp: DateTime<Utc>,
}

/// A document handed to the full-text index. `doc_id` is a pure function of
/// `url` (see crawlbot_urlcanon + sha1), so repeated submissions collapse.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexDoc {
    pub doc_id: String,
    pub url: String,
    pub text: String,
}

/// Dead-letter record: either an index submission that exhausted its retries,
/// or a blob upload that failed outright.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexFailure {
    pub doc_id: String,
    pub body: String,
    pub error: String,
    pub retry_count: u32,
    pub timestamp: DateTime<Utc>,
}

/// Liveness record for a worker or collaborator, written by the supervisor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeHeartbeat {
    pub node_id: String,
    pub active: bool,
    pub last_seen: DateTime<Utc>,
}

/// One recorded search, kept for operator visibility via `status`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchRecord {
    pub keywords: String,
    pub mode: String,
    pub size: u32,
    pub results: Vec<String>,
    pub timestamp: DateTime<Utc>,
}

/// Query mode accepted by the search endpoint and the index client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchMode {
    Match,
    Phrase,
    Boolean,
}

impl Default for SearchMode {
    fn default() -> Self {
        SearchMode::Match
    }
}

impl std::str::FromStr for SearchMode {
    type Err = CrawlError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "match" => SearchMode::Match,
            "phrase" => SearchMode::Phrase,
            "boolean" => SearchMode::Boolean,
            other => return Err(CrawlError::Parse(format!("unknown search mode: {other}"))),
        })
    }
}

/// What the HTML extractor produces for one fetched page.
#[derive(Debug, Clone, Default)]
pub struct ExtractedPage {
    pub text: String,
    pub links: Vec<String>,
}

/// Abstraction over wall-clock time and sleeping, so politeness pacing and
/// staleness checks can be driven deterministically in tests.
#[async_trait]
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
    async fn sleep(&self, duration: Duration);
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

#[async_trait]
impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }

    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Opaque delivery handle returned by `Broker::consume`, passed back to `ack`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DeliveryId(pub String);

/// Durable FIFO work queue. At-least-once delivery: a message that is never
/// acked is redelivered to some consumer.
#[async_trait]
pub trait Broker: Send + Sync {
    async fn enqueue(&self, message: CrawlMessage) -> Result<(), CrawlError>;
    async fn consume(&self) -> Result<Option<(DeliveryId, CrawlMessage)>, CrawlError>;
    async fn ack(&self, id: DeliveryId) -> Result<(), CrawlError>;
    async fn ping(&self) -> bool;
}

/// External full-text index.
#[async_trait]
pub trait SearchIndex: Send + Sync {
    async fn index(&self, doc: IndexDoc) -> Result<(), CrawlError>;
    async fn search(&self, mode: SearchMode, query: &str, size: u32) -> Result<Vec<IndexDoc>, CrawlError>;
    async fn count(&self) -> Result<u64, CrawlError>;
    async fn ping(&self) -> bool;
}

/// External object store for raw HTML snapshots.
#[async_trait]
pub trait BlobStore: Send + Sync {
    async fn put(&self, key: &str, content_type: &str, bytes: Vec<u8>) -> Result<(), CrawlError>;
}
