// src/tracking.rs

//! Persistence of the manually-installed bundle set.
//!
//! A marker file in the tracking directory means "the user asked for this",
//! as opposed to "installed as a dependency". Weird state in this directory
//! must always be handled gracefully, so nothing here returns an error;
//! failures degrade to a debug log.

use crate::context::Context;
use crate::error::Result;
use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::Path;
use tracing::debug;
use walkdir::WalkDir;

/// Record a bundle as manually installed.
pub fn track_installed(ctx: &Context, bundle: &str) {
    if let Err(e) = try_track(ctx, bundle) {
        debug!(
            "issue creating tracking file in {} for {}: {}",
            ctx.tracking_dir().display(),
            bundle,
            e
        );
    }
}

/// Drop a bundle's manually-installed marker, if any.
pub fn untrack(ctx: &Context, bundle: &str) {
    let marker = ctx.tracking_dir().join(bundle);
    if let Err(e) = fs::remove_file(&marker) {
        debug!("could not remove tracking file {}: {}", marker.display(), e);
    }
}

/// True when the bundle carries a manually-installed marker.
pub fn is_tracked(ctx: &Context, bundle: &str) -> bool {
    ctx.tracking_dir().join(bundle).exists()
}

fn try_track(ctx: &Context, bundle: &str) -> Result<()> {
    let dir = ctx.tracking_dir();

    // First time tracking anything: we cannot tell what the user installed
    // themselves, so seed from the system view. The bundle being tracked is
    // already installed and therefore already has a marker there.
    if !is_populated_dir(&dir) {
        seed_tracking_dir(ctx, &dir)?;
    }

    let marker = dir.join(bundle);
    let file = fs::OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(false)
        .open(&marker)?;
    file.set_permissions(fs::Permissions::from_mode(0o600))?;
    Ok(())
}

fn seed_tracking_dir(ctx: &Context, dst: &Path) -> Result<()> {
    if dst.exists() {
        fs::remove_dir_all(dst)?;
    }
    copy_dir(&ctx.system_bundles_dir(), dst)?;

    // The system directory carries internal markers that are not bundles.
    let _ = fs::remove_file(dst.join(".MoM"));

    fs::set_permissions(dst, fs::Permissions::from_mode(0o700))?;
    Ok(())
}

fn copy_dir(src: &Path, dst: &Path) -> Result<()> {
    fs::create_dir_all(dst)?;
    for entry in WalkDir::new(src).min_depth(1) {
        let entry = entry.map_err(std::io::Error::other)?;
        let relative = entry
            .path()
            .strip_prefix(src)
            .map_err(std::io::Error::other)?;
        let target = dst.join(relative);
        if entry.file_type().is_dir() {
            fs::create_dir_all(&target)?;
        } else {
            fs::copy(entry.path(), &target)?;
        }
    }
    Ok(())
}

fn is_populated_dir(dir: &Path) -> bool {
    fs::read_dir(dir)
        .map(|mut entries| entries.next().is_some())
        .unwrap_or(false)
}
