//! Test doubles

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::error::Result;
use crate::fetch::{Fetch, FetchResponse};

/// Serves canned pages by exact URL and records every request
///
/// Unknown URLs answer 404.
#[derive(Debug, Default)]
pub struct MockFetcher {
    pages: HashMap<String, (u16, String)>,
    requests: Mutex<Vec<String>>,
}

impl MockFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_page(self, url: &str, body: &str) -> Self {
        self.with_status(url, 200, body)
    }

    pub fn with_status(mut self, url: &str, status: u16, body: &str) -> Self {
        self.pages.insert(url.to_string(), (status, body.to_string()));
        self
    }

    /// Requested URLs in order
    pub fn requests(&self) -> Vec<String> {
        self.requests
            .lock()
            .map(|log| log.clone())
            .unwrap_or_default()
    }

    pub fn request_count(&self) -> usize {
        self.requests().len()
    }
}

#[async_trait]
impl Fetch for MockFetcher {
    async fn fetch(&self, url: &str) -> Result<FetchResponse> {
        if let Ok(mut log) = self.requests.lock() {
            log.push(url.to_string());
        }

        let (status, body) = self
            .pages
            .get(url)
            .cloned()
            .unwrap_or_else(|| (404, "Not Found".to_string()));

        Ok(FetchResponse {
            url: url.to_string(),
            status,
            body,
        })
    }
}
