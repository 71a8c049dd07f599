//! Blob store for raw HTML snapshots: a production HTTP client (PUT by key)
//! and an in-memory fake for tests.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use crawlbot_core::{BlobStore, CrawlError};

#[derive(Default)]
pub struct InMemoryBlobStore {
    objects: Mutex<HashMap<String, (String, Vec<u8>)>>,
}

impl InMemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<(String, Vec<u8>)> {
        self.objects.lock().unwrap().get(key).cloned()
    }

    pub fn len(&self) -> usize {
        self.objects.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl BlobStore for InMemoryBlobStore {
    async fn put(&self, key: &str, content_type: &str, bytes: Vec<u8>) -> Result<(), CrawlError> {
        self.objects
            .lock()
            .unwrap()
            .insert(key.to_string(), (content_type.to_string(), bytes));
        Ok(())
    }
}

/// HTTP-backed blob store. Assumes a service accepting `PUT {base}/{bucket}/{key}`.
pub struct HttpBlobStore {
    client: reqwest::Client,
    base_url: String,
    bucket: String,
}

impl HttpBlobStore {
    pub fn new(base_url: impl Into<String>, bucket: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
            bucket: bucket.into(),
        }
    }
}

#[async_trait]
impl BlobStore for HttpBlobStore {
    async fn put(&self, key: &str, content_type: &str, bytes: Vec<u8>) -> Result<(), CrawlError> {
        self.client
            .put(format!("{}/{}/{}", self.base_url, self.bucket, key))
            .header(reqwest::header::CONTENT_TYPE, content_type)
            .body(bytes)
            .send()
            .await
            .map_err(|e| CrawlError::Blob(e.to_string()))?
            .error_for_status()
            .map_err(|e| CrawlError::Blob(e.to_string()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn in_memory_store_round_trips() {
        let store = InMemoryBlobStore::new();
        store.put("abc.html", "text/html", b"<html></html>".to_vec()).await.unwrap();
        let (content_type, bytes) = store.get("abc.html").unwrap();
        assert_eq!(content_type, "text/html");
        assert_eq!(bytes, b"<html></html>");
    }
}
