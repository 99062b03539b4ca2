use anyhow::{Context, Result};
use serde::Deserialize;
use serde_json::Value;

use crate::extract::extract_record;
use crate::record::Record;
use crate::retry::{HttpClassify, RetryPolicy};
use crate::tasks::ChangelogEntry;

/// Narrow transport contract: fetch bytes from an absolute URL. Kept
/// separate from `DataConnector` so tests can substitute a fake transport
/// instead of hitting the network.
pub trait Transport: Send + Sync {
    fn get(&self, url: &str) -> Result<Vec<u8>>;
}

/// Thin wrapper around a blocking `reqwest` client, mirroring the
/// teacher's `rate_limited_client::Client` shape (a struct holding the
/// real client, exposing a narrow method rather than the raw client).
pub struct HttpTransport {
    client: reqwest::blocking::Client,
}

impl HttpTransport {
    pub fn new() -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(std::time::Duration::from_secs(2))
            .build()
            .context("failed to build HTTP client")?;
        Ok(HttpTransport { client })
    }
}

impl Transport for HttpTransport {
    fn get(&self, url: &str) -> Result<Vec<u8>> {
        let response = self
            .client
            .get(url)
            .send()
            .with_context(|| format!("request to {url} failed"))?;
        let response = response
            .error_for_status()
            .with_context(|| format!("{url} returned an error status"))?;
        let bytes = response
            .bytes()
            .with_context(|| format!("failed to read response body from {url}"))?;
        Ok(bytes.to_vec())
    }
}

#[derive(Debug, Deserialize)]
struct ChangesPage {
    results: Vec<ChangesResult>,
}

#[derive(Debug, Deserialize)]
struct ChangesResult {
    id: String,
    timestamp: String,
    #[serde(default)]
    deleted: bool,
}

/// Fetches the upstream changelog and document front-matter, pacing every
/// call through a retry policy. Generalizes the teacher's `oai.rs`
/// request-building/response-parsing loop from arXiv's `ListRecords` XML
/// to the kernel's JSON changelog/front-matter endpoints.
pub struct DataConnector<'t> {
    host: String,
    transport: &'t dyn Transport,
    retry: RetryPolicy,
    classify: HttpClassify,
}

impl<'t> DataConnector<'t> {
    pub fn new(host: impl Into<String>, transport: &'t dyn Transport) -> Self {
        DataConnector {
            host: host.into().trim_end_matches('/').to_string(),
            transport,
            retry: RetryPolicy::default(),
            classify: HttpClassify,
        }
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    fn absolute_url(&self, path: &str) -> String {
        if path.starts_with(&self.host) {
            path.to_string()
        } else {
            format!("{}{}", self.host, path)
        }
    }

    fn fetch(&self, url: &str) -> Result<Vec<u8>> {
        self.retry
            .call(&self.classify, || self.transport.get(url))
    }

    /// Drains the whole changelog starting from `since`, paging through
    /// `/changes?since=...` until an empty page is returned.
    pub fn changes(&self, since: &str) -> Result<Vec<ChangelogEntry>> {
        let mut entries = Vec::new();
        let mut cursor = since.to_string();
        loop {
            let url = format!("{}/changes?since={}", self.host, cursor);
            let body = self.fetch(&url)?;
            let page: ChangesPage =
                serde_json::from_slice(&body).with_context(|| format!("malformed changes page from {url}"))?;
            if page.results.is_empty() {
                break;
            }
            cursor = page.results.last().unwrap().timestamp.clone();
            for r in page.results {
                entries.push(ChangelogEntry {
                    id: r.id,
                    timestamp: r.timestamp,
                    deleted: r.deleted,
                });
            }
        }
        Ok(entries)
    }

    /// Fetches `{doc_path}/front` and runs the metadata extractor over it.
    pub fn doc_metadata(&self, doc_path: &str) -> Result<Record> {
        let doc_url = self.absolute_url(doc_path);
        let front_url = format!("{doc_url}/front");
        let body = self.fetch(&front_url)?;
        let front: Value =
            serde_json::from_slice(&body).with_context(|| format!("malformed front-matter from {front_url}"))?;
        extract_record(&doc_url, &front)
    }
}
