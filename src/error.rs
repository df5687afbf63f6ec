// src/error.rs

//! Crate-wide error type and exit-status taxonomy.
//!
//! Faults fall into three classes:
//!
//! - **Input faults** (invalid bundle, not installed, required-by): scoped to
//!   one bundle; the operation logs, counts, and continues with the rest.
//! - **Environment faults** (unknown version, MoM load failure, disk space):
//!   global; the operation aborts before mutating anything.
//! - **Mutation faults** (hash mismatch, copy/rename failure): abort
//!   immediately; whatever has been written stays in place.
//!
//! The process exit status is the first fatal error's code, or the most
//! severe per-bundle fault when nothing fatal occurred.

use std::path::PathBuf;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("unable to determine current OS version: {0}")]
    CurrentVersionUnknown(String),

    #[error("unable to load Manifest.MoM: {0}")]
    CouldntLoadMom(String),

    #[error("unable to load manifest: {0}")]
    CouldntLoadManifest(String),

    #[error("unable to load MoM sub-manifests: {0}")]
    RecurseManifest(String),

    #[error("bundle \"{0}\" is invalid")]
    InvalidBundle(String),

    #[error("bundle \"{0}\" is not installed")]
    BundleNotTracked(String),

    #[error("bundle \"{0}\" is required by other installed bundles")]
    RequiredBundle(String),

    #[error("insufficient disk space: {0}")]
    DiskSpace(String),

    #[error("could not remove file {0}")]
    CouldntRemoveFile(PathBuf),

    #[error("could not list directory {0}")]
    CouldntListDir(PathBuf),

    #[error("download failed: {0}")]
    Download(String),

    #[error("manifest parse error: {0}")]
    Parse(String),

    #[error("hash mismatch for {path}: expected {expected}, got {actual}")]
    HashMismatch {
        path: PathBuf,
        expected: String,
        actual: String,
    },

    #[error("could not acquire update lock: {0}")]
    Lock(String),
}

impl Error {
    /// Process exit status for this error.
    pub fn exit_code(&self) -> i32 {
        match self {
            Error::CurrentVersionUnknown(_) => 2,
            Error::CouldntLoadMom(_) => 3,
            Error::CouldntLoadManifest(_) => 4,
            Error::RecurseManifest(_) => 5,
            Error::InvalidBundle(_) => 6,
            Error::BundleNotTracked(_) => 7,
            Error::RequiredBundle(_) => 8,
            Error::DiskSpace(_) => 9,
            Error::CouldntRemoveFile(_) => 10,
            Error::CouldntListDir(_) => 11,
            Error::Download(_) => 12,
            Error::Lock(_) => 13,
            Error::Io(_) | Error::Parse(_) | Error::HashMismatch { .. } => 1,
        }
    }

    /// Rank used when aggregating per-bundle faults; higher wins.
    fn severity(&self) -> u8 {
        match self {
            Error::RequiredBundle(_) => 3,
            Error::InvalidBundle(_) => 2,
            Error::BundleNotTracked(_) => 1,
            _ => 0,
        }
    }
}

/// Keep the most severe of the per-bundle faults seen so far.
///
/// Earlier faults win ties, so the reported error is the first of the worst.
pub(crate) fn keep_most_severe(slot: &mut Option<Error>, candidate: Error) {
    let keep = match slot {
        Some(existing) => candidate.severity() > existing.severity(),
        None => true,
    };
    if keep {
        *slot = Some(candidate);
    }
}
