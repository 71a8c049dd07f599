use std::str::FromStr;

use anyhow::Result;
use crawlbot_core::{config::AppConfig, Clock, SearchIndex, SearchMode, SearchRecord, SystemClock};
use crawlbot_indexclient::HttpSearchIndex;
use crawlbot_storage::Storage;

pub async fn run(config: AppConfig, keywords: String, mode: String, size: u32) -> Result<()> {
    let storage = Storage::connect(&config.docstore.url).await?;
    storage.run_migrations().await?;
    let index = HttpSearchIndex::new(&config.index.url);
    let search_mode = SearchMode::from_str(&mode)?;

    let results = index.search(search_mode, &keywords, size).await?;

    let clock = SystemClock;
    storage
        .insert_search_record(&SearchRecord {
            keywords: keywords.clone(),
            mode,
            size,
            results: results.iter().map(|d| d.url.clone()).collect(),
            timestamp: clock.now(),
        })
        .await?;

    if results.is_empty() {
        println!("no results for \"{keywords}\"");
    }
    for doc in &results {
        println!("{}", doc.url);
    }

    Ok(())
}
