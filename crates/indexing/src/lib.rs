//! Indexing handoff (C6): submits documents to the external full-text index
//! as independent work, decoupled from crawl-task completion. Retries a fixed
//! number of times with a fixed backoff, then dead-letters to the lifecycle
//! store.

use std::sync::Arc;
use std::time::Duration;

use crawlbot_core::{Clock, CrawlError, IndexDoc, IndexFailure, SearchIndex};
use crawlbot_storage::Storage;
use tracing::warn;

pub const MAX_RETRIES: u32 = 5;
pub const BACKOFF: Duration = Duration::from_secs(60);

pub struct IndexingHandoff {
    index: Arc<dyn SearchIndex>,
    storage: Arc<Storage>,
    clock: Arc<dyn Clock>,
}

impl IndexingHandoff {
    pub fn new(index: Arc<dyn SearchIndex>, storage: Arc<Storage>, clock: Arc<dyn Clock>) -> Self {
        Self { index, storage, clock }
    }

    /// Submit one document, retrying up to `MAX_RETRIES` times with a fixed
    /// backoff between attempts. On exhaustion, writes an `IndexFailure`
    /// dead-letter record and returns `Ok(())` — a failed index submission
    /// never fails the crawl task that produced it.
    pub async fn submit(&self, doc: IndexDoc) -> Result<(), CrawlError> {
        let mut last_error = String::new();
        for attempt in 0..=MAX_RETRIES {
            match self.index.index(doc.clone()).await {
                Ok(()) => return Ok(()),
                Err(e) => {
                    last_error = e.to_string();
                    if attempt < MAX_RETRIES {
                        warn!(doc_id = %doc.doc_id, attempt, error = %last_error, "index submission failed, retrying");
                        self.clock.sleep(BACKOFF).await;
                    }
                }
            }
        }

        let failure = IndexFailure {
            doc_id: doc.doc_id.clone(),
            body: doc.text,
            error: last_error,
            retry_count: MAX_RETRIES,
            timestamp: self.clock.now(),
        };
        self.storage.insert_index_failure(&failure).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crawlbot_core::SystemClock;
    use crawlbot_indexclient::InMemorySearchIndex;

    fn doc() -> IndexDoc {
        IndexDoc {
            doc_id: "abc".to_string(),
            url: "https://example.com/".to_string(),
            text: "hello world".to_string(),
        }
    }

    #[tokio::test]
    async fn successful_submission_does_not_dead_letter() {
        let storage = Arc::new(Storage::open_in_memory().await.unwrap());
        let index = Arc::new(InMemorySearchIndex::new());
        let handoff = IndexingHandoff::new(index.clone(), storage.clone(), Arc::new(SystemClock));

        handoff.submit(doc()).await.unwrap();

        assert_eq!(index.count().await.unwrap(), 1);
        assert_eq!(storage.count_index_failures().await.unwrap(), 0);
    }
}
