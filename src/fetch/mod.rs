// src/fetch/mod.rs

//! Transport abstraction for manifests and content blobs.
//!
//! The core never talks to the network directly; it pulls byte blobs
//! through the `Fetcher` trait, keyed by kind, version and identifier.
//! Implementations may batch or parallelize internally, but requests are
//! logically sequential from the core's perspective.

mod http;
mod local;

pub use http::HttpFetcher;
pub use local::DirectoryFetcher;

use crate::error::Result;

/// What kind of blob is being requested.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlobKind {
    /// The Manifest of Manifests for one version.
    Mom,
    /// A per-bundle manifest; `id` is the component name.
    BundleManifest,
    /// An individually downloadable file payload; `id` is its hash.
    FullFile,
    /// A batched archive of full-files for one bundle; `id` is the
    /// component name.
    Pack,
}

impl BlobKind {
    /// Relative location of a blob within a versioned content tree. The
    /// same layout is used for URLs and local directories.
    pub fn relative_path(&self, version: u32, id: &str) -> String {
        match self {
            BlobKind::Mom => format!("{}/Manifest.MoM", version),
            BlobKind::BundleManifest => format!("{}/Manifest.{}", version, id),
            BlobKind::FullFile => format!("{}/files/{}", version, id),
            BlobKind::Pack => format!("{}/pack-{}.tar.gz", version, id),
        }
    }
}

/// Pulls byte blobs from a content source.
pub trait Fetcher {
    /// Fetch a blob; failure to retrieve it is an error.
    fn fetch(&self, kind: BlobKind, version: u32, id: &str) -> Result<Vec<u8>>;

    /// Fetch a blob that may legitimately be absent (mix overlays, packs).
    fn try_fetch(&self, kind: BlobKind, version: u32, id: &str) -> Result<Option<Vec<u8>>>;

    /// Total payload bytes retrieved through this fetcher so far.
    fn bytes_fetched(&self) -> u64;
}
