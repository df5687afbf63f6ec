// src/diskspace.rs

//! Disk-space admission control for planned installs.
//!
//! Only `<prefix>/usr/` is consulted; bundles placing content elsewhere are
//! not accounted for. That limitation is inherited behavior and is surfaced
//! in the error message rather than silently widened.

use crate::context::Context;
use crate::error::{Error, Result};
use crate::manifest::Manifest;
use nix::sys::statvfs::statvfs;
use std::sync::Arc;
use tracing::{debug, error, info};

/// Fudge factor applied on top of the declared content size.
const FUDGE_FACTOR: f64 = 1.1;

/// Fail unless the target filesystem has room for the planned bundles.
pub fn check(ctx: &Context, to_install: &[Arc<Manifest>]) -> Result<()> {
    if ctx.skip_diskspace_check {
        debug!("disk space check skipped by request");
        return Ok(());
    }

    let bundle_size: u64 = to_install.iter().map(|m| m.contentsize).sum();
    let required = (bundle_size as f64 * FUDGE_FACTOR) as u64;

    let probe = ctx.path_prefix.join("usr/");
    let stats = statvfs(&probe).map_err(|e| {
        Error::DiskSpace(format!(
            "unable to determine free space on {}: {}",
            probe.display(),
            e
        ))
    })?;
    let available = stats.blocks_available() as u64 * stats.fragment_size() as u64;

    if required > available {
        error!(
            "bundle too large by {}M",
            required.saturating_sub(available) / 1_000_000
        );
        info!(
            "note: only {} is checked for available space",
            probe.display()
        );
        info!("to skip this check and install anyway, use --skip-diskspace-check");
        return Err(Error::DiskSpace(format!(
            "{} bytes required, {} available under {}",
            required,
            available,
            probe.display()
        )));
    }

    debug!("disk space ok: {} required, {} available", required, available);
    Ok(())
}
