//! End-to-end exercise of the dispatcher -> broker -> storage -> supervisor
//! path, independent of any live network. The crawl engine itself is tested
//! in crates/engine against in-memory fakes; this covers the ambient
//! lifecycle machinery that sits around it.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use crawlbot_broker::InMemoryBroker;
use crawlbot_core::{CrawlError, IndexDoc, SearchIndex, SearchMode, SystemClock, TaskStatus};
use crawlbot_dispatcher::Dispatcher;
use crawlbot_storage::Storage;
use crawlbot_supervisor::Supervisor;
use uuid::Uuid;

struct AlwaysAliveIndex;

#[async_trait]
impl SearchIndex for AlwaysAliveIndex {
    async fn index(&self, _doc: IndexDoc) -> Result<(), CrawlError> {
        Ok(())
    }
    async fn search(&self, _mode: SearchMode, _query: &str, _size: u32) -> Result<Vec<IndexDoc>, CrawlError> {
        Ok(Vec::new())
    }
    async fn count(&self) -> Result<u64, CrawlError> {
        Ok(0)
    }
    async fn ping(&self) -> bool {
        true
    }
}

/// Scenario 6: a task stuck in `started` past the staleness threshold is
/// marked `timeout` and a fresh `requeued` task appears, linked back by
/// `origin_task_id`.
#[tokio::test]
async fn stale_task_is_requeued_with_origin_link() {
    let storage = Arc::new(Storage::open_in_memory().await.unwrap());
    let broker = Arc::new(InMemoryBroker::new());
    let clock = Arc::new(SystemClock);
    let dispatcher = Arc::new(Dispatcher::new(broker.clone(), storage.clone(), clock.clone()));

    let task_id = dispatcher
        .enqueue_crawl("https://example.com/".to_string(), 2, 1.0)
        .await
        .unwrap();

    // Simulate a worker picking the task up, then let it go stale.
    storage
        .transition_task(task_id, TaskStatus::Queued, TaskStatus::Started, chrono::Utc::now(), None)
        .await
        .unwrap();

    let supervisor = Supervisor::new(
        storage.clone(),
        broker,
        Arc::new(AlwaysAliveIndex),
        dispatcher,
        clock,
        Duration::from_secs(10),
        Duration::from_secs(300),
        0, // anything started before "now" is immediately stale
    );

    tokio::time::sleep(Duration::from_millis(5)).await;
    let requeued = supervisor.stale_scan_once().await.unwrap();
    assert_eq!(requeued, 1);

    let original = storage.get_task(task_id).await.unwrap().unwrap();
    assert_eq!(original.status, TaskStatus::Timeout);

    let all_by_status = storage.count_tasks_by_status().await.unwrap();
    assert_eq!(*all_by_status.get("requeued").unwrap(), 1);
}

/// A fresh enqueue is never picked up by the stale scan.
#[tokio::test]
async fn fresh_task_survives_stale_scan() {
    let storage = Arc::new(Storage::open_in_memory().await.unwrap());
    let broker = Arc::new(InMemoryBroker::new());
    let clock = Arc::new(SystemClock);
    let dispatcher = Arc::new(Dispatcher::new(broker.clone(), storage.clone(), clock.clone()));

    dispatcher.enqueue_crawl("https://example.com/".to_string(), 1, 1.0).await.unwrap();

    let supervisor = Supervisor::new(
        storage.clone(),
        broker,
        Arc::new(AlwaysAliveIndex),
        dispatcher,
        clock,
        Duration::from_secs(10),
        Duration::from_secs(300),
        3600,
    );

    let requeued = supervisor.stale_scan_once().await.unwrap();
    assert_eq!(requeued, 0);
    assert_eq!(storage.count_tasks().await.unwrap(), 1);
}

/// A task requeued by the supervisor carries a non-null origin_task_id
/// pointing back at an existing lifecycle record.
#[tokio::test]
async fn requeued_task_origin_points_to_existing_record() {
    let storage = Arc::new(Storage::open_in_memory().await.unwrap());
    let broker = Arc::new(InMemoryBroker::new());
    let clock = Arc::new(SystemClock);
    let dispatcher = Dispatcher::new(broker, storage.clone(), clock);

    let origin = crawlbot_core::CrawlTask::new(Uuid::new_v4(), "https://example.com/".to_string(), 1, 1.0, chrono::Utc::now());
    storage.insert_task(&origin).await.unwrap();

    let new_id = dispatcher.requeue(&origin).await.unwrap();
    let requeued = storage.get_task(new_id).await.unwrap().unwrap();

    assert_eq!(requeued.origin_task_id, Some(origin.task_id));
    assert!(storage.get_task(requeued.origin_task_id.unwrap()).await.unwrap().is_some());
}
