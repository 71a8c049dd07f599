//! Client for the external full-text index. The index is expected to run a
//! standard-analyzer-plus-English-stopwords-plus-Porter-stemmer pipeline over
//! the `web_pages` index (see the search surface's design notes); this crate
//! only speaks its query/index/count HTTP contract.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use crawlbot_core::{CrawlError, IndexDoc, SearchIndex, SearchMode};
use serde_json::json;

/// In-process substring-match index for tests: case-insensitive containment
/// stands in for the real index's analyzer pipeline.
#[derive(Default)]
pub struct InMemorySearchIndex {
    docs: Mutex<HashMap<String, IndexDoc>>,
}

impl InMemorySearchIndex {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SearchIndex for InMemorySearchIndex {
    async fn index(&self, doc: IndexDoc) -> Result<(), CrawlError> {
        self.docs.lock().unwrap().insert(doc.doc_id.clone(), doc);
        Ok(())
    }

    async fn search(&self, mode: SearchMode, query: &str, size: u32) -> Result<Vec<IndexDoc>, CrawlError> {
        let needle = query.to_lowercase();
        let docs = self.docs.lock().unwrap();
        let mut matches: Vec<IndexDoc> = docs
            .values()
            .filter(|doc| match mode {
                SearchMode::Phrase => doc.text.to_lowercase().contains(&needle),
                SearchMode::Match | SearchMode::Boolean => {
                    needle.split_whitespace().any(|term| doc.text.to_lowercase().contains(term))
                }
            })
            .cloned()
            .collect();
        matches.truncate(size as usize);
        Ok(matches)
    }

    async fn count(&self) -> Result<u64, CrawlError> {
        Ok(self.docs.lock().unwrap().len() as u64)
    }

    async fn ping(&self) -> bool {
        true
    }
}

/// HTTP-backed index client. Assumes an Elasticsearch-shaped search API over
/// the `web_pages` index: `PUT {base}/web_pages/_doc/{id}`, `POST {base}/web_pages/_search`,
/// `GET {base}/web_pages/_count`.
pub struct HttpSearchIndex {
    client: reqwest::Client,
    base_url: String,
}

impl HttpSearchIndex {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
        }
    }

    fn query_body(mode: SearchMode, query: &str) -> serde_json::Value {
        match mode {
            SearchMode::Match => json!({ "query": { "match": { "text": query } } }),
            SearchMode::Phrase => json!({ "query": { "match_phrase": { "text": query } } }),
            SearchMode::Boolean => json!({ "query": { "query_string": { "query": query } } }),
        }
    }
}

#[derive(serde::Deserialize)]
struct SearchResponseBody {
    hits: SearchHits,
}

#[derive(serde::Deserialize)]
struct SearchHits {
    hits: Vec<SearchHit>,
}

#[derive(serde::Deserialize)]
struct SearchHit {
    #[serde(rename = "_id")]
    id: String,
    #[serde(rename = "_source")]
    source: SourceDoc,
}

#[derive(serde::Deserialize)]
struct SourceDoc {
    url: String,
    text: String,
}

#[async_trait]
impl SearchIndex for HttpSearchIndex {
    async fn index(&self, doc: IndexDoc) -> Result<(), CrawlError> {
        self.client
            .put(format!("{}/web_pages/_doc/{}", self.base_url, doc.doc_id))
            .json(&json!({ "url": doc.url, "text": doc.text }))
            .send()
            .await
            .map_err(|e| CrawlError::Index(e.to_string()))?
            .error_for_status()
            .map_err(|e| CrawlError::Index(e.to_string()))?;
        Ok(())
    }

    async fn search(&self, mode: SearchMode, query: &str, size: u32) -> Result<Vec<IndexDoc>, CrawlError> {
        let mut body = Self::query_body(mode, query);
        body["size"] = json!(size);

        let resp = self
            .client
            .post(format!("{}/web_pages/_search", self.base_url))
            .json(&body)
            .send()
            .await
            .map_err(|e| CrawlError::Index(e.to_string()))?;

        if resp.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(Vec::new());
        }
        let parsed: SearchResponseBody = resp
            .error_for_status()
            .map_err(|e| CrawlError::Index(e.to_string()))?
            .json()
            .await
            .map_err(|e| CrawlError::Index(e.to_string()))?;

        Ok(parsed
            .hits
            .hits
            .into_iter()
            .map(|hit| IndexDoc {
                doc_id: hit.id,
                url: hit.source.url,
                text: hit.source.text,
            })
            .collect())
    }

    async fn count(&self) -> Result<u64, CrawlError> {
        #[derive(serde::Deserialize)]
        struct CountResponse {
            count: u64,
        }
        let resp = self
            .client
            .get(format!("{}/web_pages/_count", self.base_url))
            .send()
            .await
            .map_err(|e| CrawlError::Index(e.to_string()))?;
        if resp.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(0);
        }
        let parsed: CountResponse = resp
            .error_for_status()
            .map_err(|e| CrawlError::Index(e.to_string()))?
            .json()
            .await
            .map_err(|e| CrawlError::Index(e.to_string()))?;
        Ok(parsed.count)
    }

    async fn ping(&self) -> bool {
        self.client
            .get(&self.base_url)
            .send()
            .await
            .map(|r| r.status().is_success())
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(id: &str, text: &str) -> IndexDoc {
        IndexDoc {
            doc_id: id.to_string(),
            url: format!("https://example.com/{id}"),
            text: text.to_string(),
        }
    }

    #[tokio::test]
    async fn match_mode_finds_any_term() {
        let index = InMemorySearchIndex::new();
        index.index(doc("1", "the quick brown fox")).await.unwrap();
        let results = index.search(SearchMode::Match, "fox lazy", 10).await.unwrap();
        assert_eq!(results.len(), 1);
    }

    #[tokio::test]
    async fn phrase_mode_requires_contiguous_match() {
        let index = InMemorySearchIndex::new();
        index.index(doc("1", "brown fox jumps")).await.unwrap();
        let hit = index.search(SearchMode::Phrase, "brown fox", 10).await.unwrap();
        assert_eq!(hit.len(), 1);
        let miss = index.search(SearchMode::Phrase, "fox brown", 10).await.unwrap();
        assert!(miss.is_empty());
    }

    #[tokio::test]
    async fn reindexing_same_doc_id_overwrites() {
        let index = InMemorySearchIndex::new();
        index.index(doc("1", "first version")).await.unwrap();
        index.index(doc("1", "second version")).await.unwrap();
        assert_eq!(index.count().await.unwrap(), 1);
    }
}
