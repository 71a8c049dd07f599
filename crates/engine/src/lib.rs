//! Crawl engine (C5): bounded-depth traversal of a single seed, with
//! dedup, robots-exclusion, politeness pacing, and indexing/blob handoff.
//!
//! Traversal state (`CrawlContext`) is owned exclusively by the task that
//! created it and threaded explicitly through every step — nothing lives in
//! statics or captured closures. Recursion is modeled as an explicit work
//! stack rather than actual call-stack recursion, so depth cannot exhaust
//! the stack on a deep or cyclic site.

use std::collections::HashSet;
use std::sync::Arc;

use crawlbot_core::{BlobStore, Clock, CrawlError, CrawlTask, CrawledPage, IndexDoc, IndexFailure, TaskStatus};
use crawlbot_fetch::PageFetch;
use crawlbot_indexing::IndexingHandoff;
use crawlbot_robots::{RobotsCache, RobotsFetch};
use crawlbot_storage::Storage;
use sha1::{Digest, Sha1};
use tokio::sync::Mutex;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};
use url::Url;

/// Per-task traversal state. Never shared across tasks.
struct CrawlContext<R: RobotsFetch> {
    visited: HashSet<String>,
    robots: RobotsCache<R>,
    seed_registered_domain_url: Url,
    politeness_seconds: f64,
}

pub struct CrawlEngine<R: RobotsFetch + Clone, F: PageFetch> {
    storage: Arc<Storage>,
    blob: Arc<dyn BlobStore>,
    indexing: Arc<IndexingHandoff>,
    fetcher: F,
    clock: Arc<dyn Clock>,
    user_agent: String,
    robots_fetch_template: R,
    submissions: Mutex<JoinSet<()>>,
}

impl<R: RobotsFetch + Clone, F: PageFetch> CrawlEngine<R, F> {
    pub fn new(
        storage: Arc<Storage>,
        blob: Arc<dyn BlobStore>,
        indexing: Arc<IndexingHandoff>,
        clock: Arc<dyn Clock>,
        user_agent: impl Into<String>,
        robots_fetch_template: R,
        fetcher: F,
    ) -> Self {
        Self {
            storage,
            blob,
            indexing,
            fetcher,
            clock,
            user_agent: user_agent.into(),
            robots_fetch_template,
            submissions: Mutex::new(JoinSet::new()),
        }
    }

    /// Non-blockingly reaps index submissions spawned by previous traversals.
    /// Does not wait for submissions still in flight; call periodically (e.g.
    /// after each task) so the worker still supervises them to completion.
    pub async fn reap_finished_submissions(&self) {
        let mut submissions = self.submissions.lock().await;
        while let Some(result) = submissions.try_join_next() {
            if let Err(e) = result {
                warn!(error = %e, "index submission task panicked");
            }
        }
    }

    /// Run one crawl task to completion, writing lifecycle transitions as it
    /// goes. A fatal error anywhere in the traversal marks the task `failed`;
    /// normal completion marks it `completed`. A per-URL failure never
    /// surfaces here — it's logged and the URL is skipped.
    pub async fn run_task(&self, task: &CrawlTask) -> Result<(), CrawlError> {
        let started = self.storage.start_task(task.task_id, self.clock.now()).await?;
        if !started {
            debug!(task_id = %task.task_id, "task already started by another delivery, skipping");
            return Ok(());
        }

        match self.traverse(task).await {
            Ok(()) => {
                self.storage
                    .transition_task(task.task_id, TaskStatus::Started, TaskStatus::Completed, self.clock.now(), None)
                    .await?;
            }
            Err(e) => {
                warn!(task_id = %task.task_id, error = %e, "crawl task failed");
                self.storage
                    .transition_task(
                        task.task_id,
                        TaskStatus::Started,
                        TaskStatus::Failed,
                        self.clock.now(),
                        Some(&e.to_string()),
                    )
                    .await?;
            }
        }
        Ok(())
    }

    async fn traverse(&self, task: &CrawlTask) -> Result<(), CrawlError> {
        let seed = crawlbot_urlcanon::normalize(&task.seed_url)?;
        let mut ctx = CrawlContext {
            visited: HashSet::new(),
            robots: RobotsCache::new(self.user_agent.clone(), self.robots_fetch_template.clone()),
            seed_registered_domain_url: seed.clone(),
            politeness_seconds: task.politeness_seconds,
        };

        let mut stack: Vec<(Url, u32)> = vec![(seed, task.depth)];

        while let Some((url, depth_remaining)) = stack.pop() {
            let normalized = match crawlbot_urlcanon::normalize(url.as_str()) {
                Ok(u) => u,
                Err(_) => continue,
            };

            if !crawlbot_urlcanon::same_registered_domain(&normalized, &ctx.seed_registered_domain_url) {
                continue;
            }

            if ctx.visited.contains(normalized.as_str()) {
                continue;
            }

            if !ctx.robots.is_allowed(&normalized).await {
                continue;
            }

            ctx.visited.insert(normalized.to_string());

            let delay = ctx.robots.delay_for(&normalized, ctx.politeness_seconds).await;
            self.clock.sleep(delay).await;

            let response = match self.fetcher.fetch(&normalized).await {
                Ok(r) => r,
                Err(e) => {
                    debug!(url = %normalized, error = %e, "fetch failed, skipping");
                    continue;
                }
            };

            let extracted = crawlbot_parser::extract(&response.body, &normalized);

            let page = CrawledPage {
                url: normalized.to_string(),
                text: extracted.text.clone(),
                depth: depth_remaining,
                timestamp: self.clock.now(),
            };
            self.storage.upsert_page(&page).await?;

            let doc_id = doc_id_for(&normalized);
            let index_doc = IndexDoc {
                doc_id: doc_id.clone(),
                url: normalized.to_string(),
                text: extracted.text,
            };
            let indexing = self.indexing.clone();
            let doc_id_for_log = doc_id.clone();
            self.submissions.lock().await.spawn(async move {
                if let Err(e) = indexing.submit(index_doc).await {
                    warn!(doc_id = %doc_id_for_log, error = %e, "index submission dead-letter write failed");
                }
            });

            if let Err(e) = self.blob.put(&format!("{doc_id}.html"), "text/html", response.body.into_bytes()).await {
                let failure = IndexFailure {
                    doc_id: doc_id.clone(),
                    body: String::new(),
                    error: format!("blob upload failed: {e}"),
                    retry_count: 0,
                    timestamp: self.clock.now(),
                };
                self.storage.insert_index_failure(&failure).await?;
            }

            if depth_remaining == 0 {
                continue;
            }

            for link in extracted.links.into_iter().rev() {
                stack.push((Url::parse(&link).unwrap_or_else(|_| normalized.clone()), depth_remaining - 1));
            }
        }

        info!(task_id = %task.task_id, visited = ctx.visited.len(), "crawl task traversal complete");
        Ok(())
    }
}

/// `doc_id = SHA-1(lowercase(normalized_url))`, a pure function of the URL so
/// repeated submissions of the same page collapse to one index entry.
pub fn doc_id_for(url: &Url) -> String {
    let mut hasher = Sha1::new();
    hasher.update(url.as_str().to_lowercase().as_bytes());
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crawlbot_blob::InMemoryBlobStore;
    use crawlbot_core::SystemClock;
    use crawlbot_fetch::FakePageFetch;
    use crawlbot_indexclient::InMemorySearchIndex;
    use crawlbot_robots::FakeRobotsFetch;
    use uuid::Uuid;

    #[test]
    fn doc_id_is_deterministic() {
        let a = Url::parse("https://example.com/page").unwrap();
        let b = Url::parse("https://example.com/page").unwrap();
        assert_eq!(doc_id_for(&a), doc_id_for(&b));
    }

    #[test]
    fn doc_id_differs_for_different_urls() {
        let a = Url::parse("https://example.com/a").unwrap();
        let b = Url::parse("https://example.com/b").unwrap();
        assert_ne!(doc_id_for(&a), doc_id_for(&b));
    }

    async fn build_engine(
        pages: FakePageFetch,
        robots: FakeRobotsFetch,
    ) -> (Arc<Storage>, CrawlEngine<FakeRobotsFetch, FakePageFetch>) {
        let storage = Arc::new(Storage::open_in_memory().await.unwrap());
        let blob = Arc::new(InMemoryBlobStore::new());
        let index = Arc::new(InMemorySearchIndex::new());
        let indexing = Arc::new(IndexingHandoff::new(index, storage.clone(), Arc::new(SystemClock)));
        let engine = CrawlEngine::new(
            storage.clone(),
            blob,
            indexing,
            Arc::new(SystemClock),
            "MyCrawlerBot",
            robots,
            pages,
        );
        (storage, engine)
    }

    fn task(seed: &str, depth: u32) -> CrawlTask {
        CrawlTask::new(Uuid::new_v4(), seed.to_string(), depth, 0.0, chrono::Utc::now())
    }

    /// Scenario 1: depth=0 seed, robots allows everything.
    #[tokio::test]
    async fn depth_zero_seed_fetches_exactly_one_page() {
        let pages = FakePageFetch::default().with_page("https://example.com/", "<html><body>hello</body></html>");
        let (storage, engine) = build_engine(pages, FakeRobotsFetch::allow_all()).await;

        let t = task("https://example.com/", 0);
        storage.insert_task(&t).await.unwrap();
        engine.run_task(&t).await.unwrap();

        assert_eq!(storage.get_page_count().await.unwrap(), 1);
        let completed = storage.get_task(t.task_id).await.unwrap().unwrap();
        assert_eq!(completed.status, TaskStatus::Completed);
    }

    /// Scenario 2: one internal link and one off-domain link at depth=1.
    #[tokio::test]
    async fn off_domain_links_are_never_fetched() {
        let pages = FakePageFetch::default()
            .with_page(
                "https://example.com/",
                r#"<html><body><a href="https://example.com/a">in</a><a href="https://other.com/">out</a></body></html>"#,
            )
            .with_page("https://example.com/a", "<html><body>leaf</body></html>");
        let (storage, engine) = build_engine(pages, FakeRobotsFetch::allow_all()).await;

        let t = task("https://example.com/", 1);
        storage.insert_task(&t).await.unwrap();
        engine.run_task(&t).await.unwrap();

        assert_eq!(storage.get_page_count().await.unwrap(), 2);
        assert!(storage.get_page("https://other.com/").await.unwrap().is_none());
    }

    /// Scenario 3: robots disallows the seed itself.
    #[tokio::test]
    async fn robots_disallow_on_seed_yields_zero_pages() {
        let pages = FakePageFetch::default().with_page("https://example.com/", "<html>nope</html>");
        let robots = FakeRobotsFetch::default().with_body("https://example.com", "User-agent: *\nDisallow: /\n");
        let (storage, engine) = build_engine(pages, robots).await;

        let t = task("https://example.com/", 2);
        storage.insert_task(&t).await.unwrap();
        engine.run_task(&t).await.unwrap();

        assert_eq!(storage.get_page_count().await.unwrap(), 0);
        let completed = storage.get_task(t.task_id).await.unwrap().unwrap();
        assert_eq!(completed.status, TaskStatus::Completed);
    }

    /// Scenario 4: robots.txt fetch fails outright (cached as unknown -> disallow-all).
    #[tokio::test]
    async fn robots_fetch_failure_yields_zero_pages() {
        let pages = FakePageFetch::default().with_page("https://example.com/", "<html>unreachable</html>");
        let robots = FakeRobotsFetch::default(); // allow_all_by_default = false, no bodies -> None
        let (storage, engine) = build_engine(pages, robots).await;

        let t = task("https://example.com/", 1);
        storage.insert_task(&t).await.unwrap();
        engine.run_task(&t).await.unwrap();

        assert_eq!(storage.get_page_count().await.unwrap(), 0);
    }

    /// Scenario 5: seed links to itself; traversal terminates after one fetch.
    #[tokio::test]
    async fn self_linking_page_is_fetched_once() {
        let pages = FakePageFetch::default()
            .with_page("https://example.com/", r#"<html><body><a href="https://example.com/">self</a></body></html>"#);
        let (storage, engine) = build_engine(pages, FakeRobotsFetch::allow_all()).await;

        let t = task("https://example.com/", 3);
        storage.insert_task(&t).await.unwrap();
        engine.run_task(&t).await.unwrap();

        assert_eq!(storage.get_page_count().await.unwrap(), 1);
    }
}
