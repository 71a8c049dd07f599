//! The message broker is an external collaborator: a durable FIFO queue with
//! at-least-once delivery. This crate provides a production HTTP client and
//! an in-memory fake used by tests and local development.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use crawlbot_core::{Broker, CrawlError, CrawlMessage, DeliveryId};
use tokio::sync::Mutex;

/// In-process FIFO queue. Acks are accepted but not required for delivery —
/// `consume` always pops the front, matching at-least-once semantics without
/// needing a separate in-flight/unacked tracking structure for tests.
pub struct InMemoryBroker {
    queue: Mutex<VecDeque<CrawlMessage>>,
    next_id: AtomicU64,
}

impl InMemoryBroker {
    pub fn new() -> Self {
        Self {
            queue: Mutex::new(VecDeque::new()),
            next_id: AtomicU64::new(0),
        }
    }

    pub async fn len(&self) -> usize {
        self.queue.lock().await.len()
    }
}

impl Default for InMemoryBroker {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Broker for InMemoryBroker {
    async fn enqueue(&self, message: CrawlMessage) -> Result<(), CrawlError> {
        self.queue.lock().await.push_back(message);
        Ok(())
    }

    async fn consume(&self) -> Result<Option<(DeliveryId, CrawlMessage)>, CrawlError> {
        let mut queue = self.queue.lock().await;
        Ok(queue.pop_front().map(|message| {
            let id = self.next_id.fetch_add(1, Ordering::Relaxed);
            (DeliveryId(id.to_string()), message)
        }))
    }

    async fn ack(&self, _id: DeliveryId) -> Result<(), CrawlError> {
        Ok(())
    }

    async fn ping(&self) -> bool {
        true
    }
}

/// HTTP-backed broker client. Assumes a service exposing:
/// `POST {base}/enqueue`, `POST {base}/consume`, `POST {base}/ack/{id}`, `GET {base}/healthz`.
pub struct HttpBroker {
    client: reqwest::Client,
    base_url: String,
}

impl HttpBroker {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
        }
    }
}

#[derive(serde::Deserialize)]
struct ConsumeResponse {
    delivery_id: Option<String>,
    message: Option<CrawlMessage>,
}

#[async_trait]
impl Broker for HttpBroker {
    async fn enqueue(&self, message: CrawlMessage) -> Result<(), CrawlError> {
        self.client
            .post(format!("{}/enqueue", self.base_url))
            .json(&message)
            .send()
            .await
            .map_err(|e| CrawlError::Broker(e.to_string()))?
            .error_for_status()
            .map_err(|e| CrawlError::Broker(e.to_string()))?;
        Ok(())
    }

    async fn consume(&self) -> Result<Option<(DeliveryId, CrawlMessage)>, CrawlError> {
        let resp: ConsumeResponse = self
            .client
            .post(format!("{}/consume", self.base_url))
            .send()
            .await
            .map_err(|e| CrawlError::Broker(e.to_string()))?
            .json()
            .await
            .map_err(|e| CrawlError::Broker(e.to_string()))?;
        Ok(match (resp.delivery_id, resp.message) {
            (Some(id), Some(message)) => Some((DeliveryId(id), message)),
            _ => None,
        })
    }

    async fn ack(&self, id: DeliveryId) -> Result<(), CrawlError> {
        self.client
            .post(format!("{}/ack/{}", self.base_url, id.0))
            .send()
            .await
            .map_err(|e| CrawlError::Broker(e.to_string()))?;
        Ok(())
    }

    async fn ping(&self) -> bool {
        self.client
            .get(format!("{}/healthz", self.base_url))
            .send()
            .await
            .map(|r| r.status().is_success())
            .unwrap_or(false)
    }
}

pub fn shared(broker: impl Broker + 'static) -> Arc<dyn Broker> {
    Arc::new(broker)
}
