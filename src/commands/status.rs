use anyhow::Result;
use crawlbot_core::{config::AppConfig, SearchIndex};
use crawlbot_indexclient::HttpSearchIndex;
use crawlbot_storage::Storage;

pub async fn run(config: AppConfig) -> Result<()> {
    let storage = Storage::connect(&config.docstore.url).await?;

    if !storage.check_connectivity().await {
        println!("Document store: ERROR - could not connect");
        return Ok(());
    }
    println!("Document store: connected");

    storage.run_migrations().await?;

    let pages = storage.get_page_count().await?;
    let total_tasks = storage.count_tasks().await?;
    let tasks_by_status = storage.count_tasks_by_status().await?;
    let index_failures = storage.count_index_failures().await?;
    let active_nodes = storage.active_node_count().await?;

    let index = HttpSearchIndex::new(&config.index.url);
    let indexed_pages = index.count().await.unwrap_or(0);
    let indexer_alive = index.ping().await;

    println!("\n╔══════════════════════════════════════════════╗");
    println!("║              crawlbot status                  ║");
    println!("╠══════════════════════════════════════════════╣");
    println!("║ Pages crawled:      {:>20}    ║", pages);
    println!("║ Pages indexed:      {:>20}    ║", indexed_pages);
    println!("║ Total tasks:        {:>20}    ║", total_tasks);
    println!("║ Active nodes:       {:>20}    ║", active_nodes);
    println!("║ Index failures:     {:>20}    ║", index_failures);
    println!("║ Indexer reachable:  {:>20}    ║", indexer_alive);
    println!("╠══════════════════════════════════════════════╣");
    for (status, count) in &tasks_by_status {
        println!("║   {:<17} {:>20}    ║", status, count);
    }
    println!("╚══════════════════════════════════════════════╝\n");

    Ok(())
}
