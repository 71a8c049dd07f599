//! Supervisor (C9): heartbeats collaborator liveness and requeues stale
//! tasks. Two cooperating routines, run as background loops by the `monitor`
//! CLI command.

use std::sync::Arc;
use std::time::Duration;

use chrono::Duration as ChronoDuration;
use crawlbot_core::{Broker, Clock, CrawlError, NodeHeartbeat, SearchIndex, TaskStatus};
use crawlbot_dispatcher::Dispatcher;
use crawlbot_storage::Storage;
use tracing::{info, warn};

pub struct Supervisor {
    storage: Arc<Storage>,
    broker: Arc<dyn Broker>,
    index: Arc<dyn SearchIndex>,
    dispatcher: Arc<Dispatcher>,
    clock: Arc<dyn Clock>,
    heartbeat_interval: Duration,
    stale_scan_interval: Duration,
    stale_after: ChronoDuration,
}

impl Supervisor {
    pub fn new(
        storage: Arc<Storage>,
        broker: Arc<dyn Broker>,
        index: Arc<dyn SearchIndex>,
        dispatcher: Arc<Dispatcher>,
        clock: Arc<dyn Clock>,
        heartbeat_interval: Duration,
        stale_scan_interval: Duration,
        stale_after_seconds: u64,
    ) -> Self {
        Self {
            storage,
            broker,
            index,
            dispatcher,
            clock,
            heartbeat_interval,
            stale_scan_interval,
            stale_after: ChronoDuration::seconds(stale_after_seconds as i64),
        }
    }

    /// Run both routines forever (used by the `monitor` CLI command).
    pub async fn run_forever(&self) -> ! {
        let heartbeat = self.heartbeat_loop();
        let stale_scan = self.stale_scan_loop();
        tokio::join!(heartbeat, stale_scan);
        unreachable!("heartbeat and stale-scan loops never return")
    }

    async fn heartbeat_loop(&self) -> ! {
        loop {
            if let Err(e) = self.heartbeat_once().await {
                warn!(error = %e, "heartbeat round failed");
            }
            self.clock.sleep(self.heartbeat_interval).await;
        }
    }

    async fn stale_scan_loop(&self) -> ! {
        loop {
            if let Err(e) = self.stale_scan_once().await {
                warn!(error = %e, "stale scan round failed");
            }
            self.clock.sleep(self.stale_scan_interval).await;
        }
    }

    /// Ping the broker and index; record liveness for each.
    pub async fn heartbeat_once(&self) -> Result<(), CrawlError> {
        let now = self.clock.now();

        let broker_alive = self.broker.ping().await;
        self.storage
            .upsert_node_status(&NodeHeartbeat {
                node_id: "broker".to_string(),
                active: broker_alive,
                last_seen: now,
            })
            .await?;

        let index_alive = self.index.ping().await;
        self.storage
            .upsert_node_status(&NodeHeartbeat {
                node_id: "index".to_string(),
                active: index_alive,
                last_seen: now,
            })
            .await?;

        info!(broker_alive, index_alive, "heartbeat recorded");
        Ok(())
    }

    /// Find tasks stuck in `queued`/`started` past the staleness threshold,
    /// mark them `timeout`, and requeue each as a fresh task linked by
    /// `origin_task_id`.
    pub async fn stale_scan_once(&self) -> Result<usize, CrawlError> {
        let cutoff = self.clock.now() - self.stale_after;
        let stale = self.storage.find_stale_tasks(cutoff).await?;

        let mut requeued = 0;
        for task in &stale {
            let marked = self
                .storage
                .transition_task(task.task_id, task.status, TaskStatus::Timeout, self.clock.now(), None)
                .await?;
            if !marked {
                // The worker finished the task between our scan and this write; leave it alone.
                continue;
            }
            self.dispatcher.requeue(task).await?;
            requeued += 1;
        }

        if requeued > 0 {
            info!(requeued, "requeued stale tasks");
        }
        Ok(requeued)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crawlbot_broker::InMemoryBroker;
    use crawlbot_core::{CrawlTask, SystemClock};
    use uuid::Uuid;

    struct AlwaysAliveIndex;

    #[async_trait::async_trait]
    impl SearchIndex for AlwaysAliveIndex {
        async fn index(&self, _doc: crawlbot_core::IndexDoc) -> Result<(), CrawlError> {
            Ok(())
        }
        async fn search(&self, _mode: crawlbot_core::SearchMode, _query: &str, _size: u32) -> Result<Vec<crawlbot_core::IndexDoc>, CrawlError> {
            Ok(Vec::new())
        }
        async fn count(&self) -> Result<u64, CrawlError> {
            Ok(0)
        }
        async fn ping(&self) -> bool {
            true
        }
    }

    async fn setup() -> (Arc<Storage>, Supervisor) {
        let storage = Arc::new(Storage::open_in_memory().await.unwrap());
        let broker = Arc::new(InMemoryBroker::new());
        let dispatcher = Arc::new(Dispatcher::new(broker.clone(), storage.clone(), Arc::new(SystemClock)));
        let supervisor = Supervisor::new(
            storage.clone(),
            broker,
            Arc::new(AlwaysAliveIndex),
            dispatcher,
            Arc::new(SystemClock),
            Duration::from_secs(10),
            Duration::from_secs(300),
            3600,
        );
        (storage, supervisor)
    }

    #[tokio::test]
    async fn heartbeat_records_liveness_for_both_collaborators() {
        let (storage, supervisor) = setup().await;
        supervisor.heartbeat_once().await.unwrap();
        assert_eq!(storage.active_node_count().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn stale_scan_requeues_old_queued_task_with_origin_link() {
        let (storage, supervisor) = setup().await;
        let old = chrono::Utc::now() - chrono::Duration::hours(2);
        let task = CrawlTask::new(Uuid::new_v4(), "https://example.com/".to_string(), 1, 1.0, old);
        storage.insert_task(&task).await.unwrap();

        let requeued = supervisor.stale_scan_once().await.unwrap();
        assert_eq!(requeued, 1);

        let original = storage.get_task(task.task_id).await.unwrap().unwrap();
        assert_eq!(original.status, crawlbot_core::TaskStatus::Timeout);
    }

    #[tokio::test]
    async fn stale_scan_ignores_recent_tasks() {
        let (storage, supervisor) = setup().await;
        let task = CrawlTask::new(Uuid::new_v4(), "https://example.com/".to_string(), 1, 1.0, chrono::Utc::now());
        storage.insert_task(&task).await.unwrap();

        let requeued = supervisor.stale_scan_once().await.unwrap();
        assert_eq!(requeued, 0);
    }
}
