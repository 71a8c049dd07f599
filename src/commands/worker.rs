use std::sync::Arc;

use anyhow::Result;
use crawlbot_blob::HttpBlobStore;
use crawlbot_broker::HttpBroker;
use crawlbot_core::{config::AppConfig, Broker, SystemClock};
use crawlbot_engine::CrawlEngine;
use crawlbot_fetch::HttpPageFetch;
use crawlbot_indexclient::HttpSearchIndex;
use crawlbot_indexing::IndexingHandoff;
use crawlbot_robots::HttpRobotsFetch;
use crawlbot_storage::Storage;
use tracing::{info, warn};

pub async fn run(config: AppConfig) -> Result<()> {
    let storage = Arc::new(Storage::connect(&config.docstore.url).await?);
    storage.run_migrations().await?;
    let broker = Arc::new(HttpBroker::new(&config.broker.url));
    let index = Arc::new(HttpSearchIndex::new(&config.index.url));
    let blob = Arc::new(HttpBlobStore::new(&config.blob.url, &config.blob.bucket));
    let clock = Arc::new(SystemClock);

    let indexing = Arc::new(IndexingHandoff::new(index, storage.clone(), clock.clone()));
    let engine = CrawlEngine::new(
        storage.clone(),
        blob,
        indexing,
        clock,
        config.general.user_agent.clone(),
        HttpRobotsFetch::new(),
        HttpPageFetch::new(config.general.user_agent.clone()),
    );

    info!("worker started, polling broker for crawl tasks");
    loop {
        match broker.consume().await {
            Ok(Some((delivery_id, message))) => {
                let task = match storage.get_task(message.task_id).await {
                    Ok(Some(task)) => task,
                    Ok(None) => {
                        warn!(task_id = %message.task_id, "no lifecycle record for consumed message, skipping");
                        continue;
                    }
                    Err(e) => {
                        warn!(task_id = %message.task_id, error = %e, "failed to load task");
                        continue;
                    }
                };

                if let Err(e) = engine.run_task(&task).await {
                    warn!(task_id = %task.task_id, error = %e, "crawl task raised an error");
                }
                engine.reap_finished_submissions().await;
                broker.ack(delivery_id).await.ok();
            }
            Ok(None) => {
                tokio::time::sleep(std::time::Duration::from_secs(1)).await;
            }
            Err(e) => {
                warn!(error = %e, "broker consume failed");
                tokio::time::sleep(std::time::Duration::from_secs(5)).await;
            }
        }
    }
}
