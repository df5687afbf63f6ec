// src/unpack.rs

//! Pack archive extraction.
//!
//! Packs are gzip-compressed tar archives whose entries land under the
//! state directory (`staged/<hash>` paths). Extraction refuses entries that
//! would escape the destination.

use crate::error::Result;
use flate2::read::GzDecoder;
use std::fs;
use std::path::Path;
use tar::Archive;
use tracing::debug;

/// Extract a gzip-compressed tar archive into `dest`. Returns the number of
/// entries unpacked.
pub fn extract_tar_gz(bytes: &[u8], dest: &Path) -> Result<usize> {
    fs::create_dir_all(dest)?;
    let mut archive = Archive::new(GzDecoder::new(bytes));
    let mut unpacked = 0;

    for entry in archive.entries()? {
        let mut entry = entry?;
        // unpack_in rejects paths that escape dest (absolute or `..`)
        if entry.unpack_in(dest)? {
            unpacked += 1;
        } else {
            debug!("skipped unsafe archive entry {:?}", entry.path());
        }
    }

    Ok(unpacked)
}
