// src/fetch/http.rs

//! HTTP fetcher with bounded retries.

use super::{BlobKind, Fetcher};
use crate::error::{Error, Result};
use reqwest::blocking::Client;
use reqwest::StatusCode;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tracing::{debug, warn};

/// Timeout for a single request.
const HTTP_TIMEOUT: Duration = Duration::from_secs(30);

/// Maximum retry attempts for failed downloads.
const MAX_RETRIES: u32 = 3;

/// Base retry delay; doubled per attempt.
const RETRY_DELAY_MS: u64 = 1000;

pub struct HttpFetcher {
    client: Client,
    base_url: String,
    bytes: AtomicU64,
}

impl HttpFetcher {
    pub fn new(base_url: &str) -> Result<Self> {
        let client = Client::builder()
            .timeout(HTTP_TIMEOUT)
            .build()
            .map_err(|e| Error::Download(format!("failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            bytes: AtomicU64::new(0),
        })
    }

    fn url(&self, kind: BlobKind, version: u32, id: &str) -> String {
        format!("{}/{}", self.base_url, kind.relative_path(version, id))
    }

    /// GET with retries. Returns `Ok(None)` on 404 so absence can be
    /// distinguished from transport failure.
    fn get(&self, url: &str) -> Result<Option<Vec<u8>>> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.client.get(url).send() {
                Ok(response) => {
                    if response.status() == StatusCode::NOT_FOUND {
                        return Ok(None);
                    }
                    if !response.status().is_success() {
                        return Err(Error::Download(format!(
                            "HTTP {} from {}",
                            response.status(),
                            url
                        )));
                    }
                    let body = response
                        .bytes()
                        .map_err(|e| Error::Download(format!("failed to read {}: {}", url, e)))?;
                    self.bytes.fetch_add(body.len() as u64, Ordering::Relaxed);
                    debug!("fetched {} ({} bytes)", url, body.len());
                    return Ok(Some(body.to_vec()));
                }
                Err(e) if attempt < MAX_RETRIES => {
                    warn!(
                        "request to {} failed (attempt {}/{}): {}",
                        url, attempt, MAX_RETRIES, e
                    );
                    std::thread::sleep(Duration::from_millis(RETRY_DELAY_MS * attempt as u64));
                }
                Err(e) => {
                    return Err(Error::Download(format!(
                        "request to {} failed after {} attempts: {}",
                        url, MAX_RETRIES, e
                    )))
                }
            }
        }
    }
}

impl Fetcher for HttpFetcher {
    fn fetch(&self, kind: BlobKind, version: u32, id: &str) -> Result<Vec<u8>> {
        let url = self.url(kind, version, id);
        self.get(&url)?
            .ok_or_else(|| Error::Download(format!("HTTP 404 from {}", url)))
    }

    fn try_fetch(&self, kind: BlobKind, version: u32, id: &str) -> Result<Option<Vec<u8>>> {
        self.get(&self.url(kind, version, id))
    }

    fn bytes_fetched(&self) -> u64 {
        self.bytes.load(Ordering::Relaxed)
    }
}
