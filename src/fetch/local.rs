// src/fetch/local.rs

//! Directory-backed fetcher.
//!
//! Serves blobs from a local content tree laid out the same way as the
//! upstream server. Used for file:// content sources and as the mix
//! overlay, where a locally-authored tree shadows upstream manifests.

use super::{BlobKind, Fetcher};
use crate::error::{Error, Result};
use std::fs;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::debug;

pub struct DirectoryFetcher {
    base: PathBuf,
    bytes: AtomicU64,
}

impl DirectoryFetcher {
    pub fn new(base: impl Into<PathBuf>) -> Self {
        Self {
            base: base.into(),
            bytes: AtomicU64::new(0),
        }
    }

    pub fn base(&self) -> &PathBuf {
        &self.base
    }
}

impl Fetcher for DirectoryFetcher {
    fn fetch(&self, kind: BlobKind, version: u32, id: &str) -> Result<Vec<u8>> {
        self.try_fetch(kind, version, id)?.ok_or_else(|| {
            Error::Download(format!(
                "{} not present under {}",
                kind.relative_path(version, id),
                self.base.display()
            ))
        })
    }

    fn try_fetch(&self, kind: BlobKind, version: u32, id: &str) -> Result<Option<Vec<u8>>> {
        let path = self.base.join(kind.relative_path(version, id));
        if !path.is_file() {
            return Ok(None);
        }
        debug!("reading {}", path.display());
        let bytes = fs::read(&path)?;
        self.bytes.fetch_add(bytes.len() as u64, Ordering::Relaxed);
        Ok(Some(bytes))
    }

    fn bytes_fetched(&self) -> u64 {
        self.bytes.load(Ordering::Relaxed)
    }
}
