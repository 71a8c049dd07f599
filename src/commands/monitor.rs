use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use crawlbot_broker::HttpBroker;
use crawlbot_core::{config::AppConfig, SystemClock};
use crawlbot_dispatcher::Dispatcher;
use crawlbot_indexclient::HttpSearchIndex;
use crawlbot_storage::Storage;
use crawlbot_supervisor::Supervisor;

pub async fn run(config: AppConfig) -> Result<()> {
    let storage = Arc::new(Storage::connect(&config.docstore.url).await?);
    storage.run_migrations().await?;
    let broker = Arc::new(HttpBroker::new(&config.broker.url));
    let index = Arc::new(HttpSearchIndex::new(&config.index.url));
    let clock = Arc::new(SystemClock);

    let dispatcher = Arc::new(Dispatcher::new(broker.clone(), storage.clone(), clock.clone()));
    let supervisor = Supervisor::new(
        storage,
        broker,
        index,
        dispatcher,
        clock,
        Duration::from_secs(config.supervisor.heartbeat_interval_seconds),
        Duration::from_secs(config.supervisor.stale_scan_interval_seconds),
        config.supervisor.stale_after_seconds,
    );

    supervisor.run_forever().await
}
