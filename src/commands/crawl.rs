use std::sync::Arc;

use anyhow::Result;
use crawlbot_broker::HttpBroker;
use crawlbot_core::{config::AppConfig, SystemClock};
use crawlbot_dispatcher::Dispatcher;
use crawlbot_storage::Storage;

pub async fn run(config: AppConfig, url: String, depth: u32, politeness: f64) -> Result<()> {
    let storage = Arc::new(Storage::connect(&config.docstore.url).await?);
    storage.run_migrations().await?;
    let broker = Arc::new(HttpBroker::new(&config.broker.url));
    let dispatcher = Dispatcher::new(broker, storage, Arc::new(SystemClock));

    let task_id = dispatcher.enqueue_crawl(url.clone(), depth, politeness).await?;
    println!("enqueued crawl task {task_id} for {url} (depth={depth}, politeness={politeness}s)");

    Ok(())
}
