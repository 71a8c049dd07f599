//! Dispatcher (C8): accepts crawl requests, allocates task ids, enqueues to
//! the broker, and seeds the lifecycle record. Never waits on completion.

use std::sync::Arc;

use crawlbot_core::{Broker, Clock, CrawlError, CrawlMessage, CrawlTask};
use crawlbot_storage::Storage;
use tracing::info;
use uuid::Uuid;

pub struct Dispatcher {
    broker: Arc<dyn Broker>,
    storage: Arc<Storage>,
    clock: Arc<dyn Clock>,
}

impl Dispatcher {
    pub fn new(broker: Arc<dyn Broker>, storage: Arc<Storage>, clock: Arc<dyn Clock>) -> Self {
        Self { broker, storage, clock }
    }

    pub async fn enqueue_crawl(&self, url: String, depth: u32, politeness: f64) -> Result<Uuid, CrawlError> {
        self.enqueue_crawl_inner(url, depth, politeness, None).await
    }

    /// Used by the supervisor to requeue a stale task, linking the new
    /// lifecycle record back to the one that timed out.
    pub async fn requeue(&self, origin: &CrawlTask) -> Result<Uuid, CrawlError> {
        self.enqueue_crawl_inner(
            origin.seed_url.clone(),
            origin.depth,
            origin.politeness_seconds,
            Some(origin.task_id),
        )
        .await
    }

    async fn enqueue_crawl_inner(
        &self,
        url: String,
        depth: u32,
        politeness: f64,
        origin_task_id: Option<Uuid>,
    ) -> Result<Uuid, CrawlError> {
        let task_id = Uuid::new_v4();
        let now = self.clock.now();

        let mut task = CrawlTask::new(task_id, url.clone(), depth, politeness, now);
        task.origin_task_id = origin_task_id;
        if origin_task_id.is_some() {
            task.status = crawlbot_core::TaskStatus::Requeued;
        }
        self.storage.insert_task(&task).await?;

        self.broker
            .enqueue(CrawlMessage {
                task_id,
                url,
                depth,
                politeness,
            })
            .await?;

        info!(task_id = %task_id, origin_task_id = ?origin_task_id, "enqueued crawl task");
        Ok(task_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crawlbot_broker::InMemoryBroker;
    use crawlbot_core::SystemClock;

    #[tokio::test]
    async fn enqueue_writes_lifecycle_record_and_broker_message() {
        let broker = Arc::new(InMemoryBroker::new());
        let storage = Arc::new(Storage::open_in_memory().await.unwrap());
        let dispatcher = Dispatcher::new(broker.clone(), storage.clone(), Arc::new(SystemClock));

        let task_id = dispatcher.enqueue_crawl("https://example.com/".to_string(), 2, 1.0).await.unwrap();

        let task = storage.get_task(task_id).await.unwrap().unwrap();
        assert_eq!(task.status, crawlbot_core::TaskStatus::Queued);
        assert_eq!(broker.len().await, 1);
    }

    #[tokio::test]
    async fn requeue_links_origin_task_id() {
        let broker = Arc::new(InMemoryBroker::new());
        let storage = Arc::new(Storage::open_in_memory().await.unwrap());
        let dispatcher = Dispatcher::new(broker, storage.clone(), Arc::new(SystemClock));

        let original = CrawlTask::new(Uuid::new_v4(), "https://example.com/".to_string(), 1, 1.0, chrono::Utc::now());
        storage.insert_task(&original).await.unwrap();

        let new_id = dispatcher.requeue(&original).await.unwrap();
        let requeued = storage.get_task(new_id).await.unwrap().unwrap();
        assert_eq!(requeued.origin_task_id, Some(original.task_id));
        assert_eq!(requeued.status, crawlbot_core::TaskStatus::Requeued);
    }
}
