// src/lib.rs

//! osmos — content-addressed, manifest-driven OS image updater client
//!
//! Reconciles the local filesystem with a declarative, versioned collection
//! of bundles published by a server. Each release is described by a
//! Manifest of Manifests (MoM) naming one manifest per bundle; the set of
//! installed bundles, plus the immutable base bundle, determines which
//! files must exist on disk.
//!
//! # Architecture
//!
//! - Content-addressed: payloads are keyed by SHA-256 and staged under
//!   `<state>/staged/<hash>` before touching the target tree
//! - Two-phase install: every file is staged next to its destination, then
//!   renamed into place; rename is atomic per file, so interruption leaves
//!   a state a re-run converges from
//! - Explicit context: no process globals; one `Context` per invocation
//! - Per-bundle fault isolation: a bad bundle name or a still-required
//!   bundle skips that bundle and lets the rest of the operation proceed

pub mod consolidate;
pub mod context;
pub mod diskspace;
mod error;
pub mod fetch;
pub mod hash;
pub mod install;
pub mod manifest;
pub mod progress;
pub mod query;
pub mod remove;
pub mod resolver;
pub mod store;
pub mod subscription;
pub mod telemetry;
pub mod tracking;
pub mod unpack;
pub mod version;

pub use context::{Context, BASE_BUNDLE, BUNDLES_DIR};
pub use error::{Error, Result};
pub use fetch::{BlobKind, DirectoryFetcher, Fetcher, HttpFetcher};
pub use hash::Hash;
pub use install::{install_bundles, InstallSummary, Installer};
pub use manifest::{FileKind, FileRecord, Manifest};
pub use progress::{CliProgress, LogProgress, ProgressTracker, SilentProgress};
pub use query::BundleListing;
pub use remove::{remove_bundles, RemoveOptions, RemoveSummary};
pub use resolver::{RequiredBy, ResolveReport};
pub use store::ManifestStore;
pub use subscription::{Subscription, SubscriptionSet};
