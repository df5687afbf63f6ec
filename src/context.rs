// src/context.rs

//! Per-invocation configuration and path derivation.
//!
//! There is no process-global state: one `Context` is built from the command
//! line and threaded through every operation. All well-known locations in
//! the target tree and the state directory are derived here.

use crate::error::{Error, Result};
use crate::hash::Hash;
use fs2::FileExt;
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

/// Directory (relative to the prefix) whose markers are the system view of
/// installed bundles.
pub const BUNDLES_DIR: &str = "usr/share/clear/bundles";

/// The immutable base bundle. Never removable.
pub const BASE_BUNDLE: &str = "os-core";

/// Lock acquisition attempts: 0ms, 100ms, 200ms, 400ms, 800ms.
const LOCK_RETRIES: u32 = 5;

#[derive(Debug, Clone)]
pub struct Context {
    /// Root of the target tree being reconciled (usually `/`).
    pub path_prefix: PathBuf,
    /// State directory holding staged content, tracking files and scratch
    /// space (usually `/var/lib/osmos`).
    pub state_dir: PathBuf,
    /// Do not follow `also-add` (optional) includes during forward
    /// resolution.
    pub skip_optional: bool,
    /// Operator override for the disk admission check.
    pub skip_diskspace_check: bool,
}

impl Context {
    pub fn new(path_prefix: impl Into<PathBuf>, state_dir: impl Into<PathBuf>) -> Self {
        Self {
            path_prefix: path_prefix.into(),
            state_dir: state_dir.into(),
            skip_optional: false,
            skip_diskspace_check: false,
        }
    }

    /// `<prefix>/usr/share/clear/bundles` — system view of installed bundles.
    pub fn system_bundles_dir(&self) -> PathBuf {
        self.path_prefix.join(BUNDLES_DIR)
    }

    /// `<state>/bundles` — manually-installed tracking markers.
    pub fn tracking_dir(&self) -> PathBuf {
        self.state_dir.join("bundles")
    }

    /// `<state>/staged` — content-addressed staging area.
    pub fn staged_dir(&self) -> PathBuf {
        self.state_dir.join("staged")
    }

    /// Staging location of one content blob.
    pub fn staged_path(&self, hash: &Hash) -> PathBuf {
        self.staged_dir().join(hash.as_str())
    }

    /// `<state>/download` — scratch space, wiped at install start.
    pub fn download_dir(&self) -> PathBuf {
        self.state_dir.join("download")
    }

    /// `<state>/telemetry` — spool for operation records.
    pub fn telemetry_dir(&self) -> PathBuf {
        self.state_dir.join("telemetry")
    }

    /// `<state>/mix` — locally-authored manifest overlay, when present.
    pub fn mix_dir(&self) -> PathBuf {
        self.state_dir.join("mix")
    }

    /// Map an absolute record path into the target tree.
    pub fn to_target(&self, path: &Path) -> PathBuf {
        let relative = path.strip_prefix("/").unwrap_or(path);
        self.path_prefix.join(relative)
    }

    /// True when the bundle's marker exists in the system bundle directory.
    pub fn is_installed_bundle(&self, name: &str) -> bool {
        self.system_bundles_dir().join(name).exists()
    }

    /// Create the state directory skeleton.
    pub fn ensure_state_dirs(&self) -> Result<()> {
        fs::create_dir_all(self.staged_dir())?;
        fs::create_dir_all(self.download_dir())?;
        Ok(())
    }

    /// Acquire the advisory update lock, retrying briefly.
    ///
    /// Protects the state directory and target tree against concurrent
    /// invocations. The lock is released on drop.
    pub fn lock(&self) -> Result<UpdateLock> {
        fs::create_dir_all(&self.state_dir)?;
        let lock_path = self.state_dir.join("osmos.lock");
        let file = File::create(&lock_path)?;

        let mut last_error = None;
        for attempt in 0..LOCK_RETRIES {
            match file.try_lock_exclusive() {
                Ok(()) => {
                    last_error = None;
                    break;
                }
                Err(e) => {
                    last_error = Some(e);
                    if attempt < LOCK_RETRIES - 1 {
                        std::thread::sleep(Duration::from_millis(100 * (1 << attempt)));
                    }
                }
            }
        }

        if let Some(e) = last_error {
            return Err(Error::Lock(format!(
                "another update may be in progress ({}): {}",
                lock_path.display(),
                e
            )));
        }

        debug!("acquired update lock at {}", lock_path.display());
        Ok(UpdateLock { file })
    }
}

/// Held for the duration of a mutating operation.
pub struct UpdateLock {
    file: File,
}

impl Drop for UpdateLock {
    fn drop(&mut self) {
        let _ = self.file.unlock();
    }
}
