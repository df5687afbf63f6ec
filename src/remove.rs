// src/remove.rs

//! Bundle removal.
//!
//! Removal unlinks only the files uniquely owned by the removed bundles:
//! the candidate set is everything they list, minus anything a surviving
//! bundle still provides. Per-bundle faults (unknown name, not installed,
//! still required) skip that bundle and let the rest proceed; the final
//! code is the most severe fault seen.

use crate::consolidate::{consolidate, files_to_unlink};
use crate::context::{Context, BASE_BUNDLE};
use crate::error::{keep_most_severe, Error, Result};
use crate::manifest::{FileKind, FileRecord, Manifest};
use crate::progress::ProgressTracker;
use crate::resolver::required_by;
use crate::store::ManifestStore;
use crate::subscription::read_subscriptions;
use crate::{telemetry, tracking, version};
use std::fs;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

#[derive(Debug, Default, Clone)]
pub struct RemoveOptions {
    /// Also remove every installed bundle that depends on the targets.
    pub force: bool,
}

/// Outcome of one remove operation.
#[derive(Debug, Default)]
pub struct RemoveSummary {
    pub requested: usize,
    pub removed: usize,
    pub failed: usize,
    pub deleted_files: usize,
}

/// Remove one or more bundles.
pub fn remove_bundles(
    ctx: &Context,
    store: &ManifestStore,
    names: &[String],
    options: &RemoveOptions,
    progress: &dyn ProgressTracker,
) -> Result<RemoveSummary> {
    let mut current_version = 0;
    let result = remove_inner(ctx, store, names, options, progress, &mut current_version);

    let code = match &result {
        Ok(_) => 0,
        Err(e) => e.exit_code(),
    };
    telemetry::emit(
        ctx,
        &telemetry::Record::new(
            "bundle-remove",
            names,
            current_version,
            code,
            store.bytes_fetched(),
        ),
    );

    result
}

fn remove_inner(
    ctx: &Context,
    store: &ManifestStore,
    names: &[String],
    options: &RemoveOptions,
    progress: &dyn ProgressTracker,
    current_version: &mut u32,
) -> Result<RemoveSummary> {
    let _lock = ctx.lock()?;

    *current_version = version::current_version(ctx)?;
    let mom = store.load_mom(*current_version)?;

    let mut subs = read_subscriptions(ctx)?;
    subs.set_versions(&mom);
    let mut submanifests = store.recurse(&mom, &subs)?;

    let mut bundles_to_remove: Vec<Arc<Manifest>> = Vec::new();
    let mut worst: Option<Error> = None;
    let mut summary = RemoveSummary {
        requested: names.len(),
        ..Default::default()
    };

    for bundle in names {
        // The base bundle holds the system together; every file in it is
        // shared by construction, so removal is always refused.
        if bundle == BASE_BUNDLE {
            warn!(
                "bundle \"{}\" not allowed to be removed, skipping it",
                BASE_BUNDLE
            );
            keep_most_severe(&mut worst, Error::RequiredBundle(bundle.clone()));
            summary.failed += 1;
            continue;
        }

        if mom.bundle(bundle).is_none() {
            warn!("bundle \"{}\" is invalid, skipping it", bundle);
            keep_most_severe(&mut worst, Error::InvalidBundle(bundle.clone()));
            summary.failed += 1;
            continue;
        }

        if !ctx.is_installed_bundle(bundle) {
            warn!("bundle \"{}\" is not installed, skipping it", bundle);
            keep_most_severe(&mut worst, Error::BundleNotTracked(bundle.clone()));
            summary.failed += 1;
            continue;
        }

        // Bundles the user is also removing do not count as dependents.
        let dependents = required_by(&submanifests, bundle, names);
        if !dependents.is_empty() {
            if !options.force {
                error!(
                    "bundle \"{}\" is required by {} bundle(s), skipping it",
                    bundle,
                    dependents.count()
                );
                info!(
                    "use \"osmos remove --force {}\" to remove \"{}\" and all bundles that require it",
                    bundle, bundle
                );
                keep_most_severe(&mut worst, Error::RequiredBundle(bundle.clone()));
                summary.failed += 1;
                continue;
            }

            info!(
                "the --force option was used; bundle \"{}\" and all bundles that require it will be removed",
                bundle
            );
            // Dependents go first so the target is never removed while
            // something that needs it survives.
            for dependent in &dependents.names {
                move_manifest(dependent, &mut submanifests, &mut bundles_to_remove);
                tracking::untrack(ctx, dependent);
            }
        }

        move_manifest(bundle, &mut submanifests, &mut bundles_to_remove);
        info!("removing bundle: {}", bundle);
        tracking::untrack(ctx, bundle);
    }

    if !bundles_to_remove.is_empty() {
        // Files required by surviving bundles stay on the system.
        let kept_files = consolidate(&submanifests);
        let candidates = consolidate(&bundles_to_remove);
        let to_unlink = files_to_unlink(&candidates, &kept_files);

        if !to_unlink.is_empty() {
            info!("deleting bundle files...");
            progress.set_length(to_unlink.len() as u64);
            summary.deleted_files = unlink_files(ctx, &to_unlink, progress);
            progress.finish_with_message("bundle files deleted");
            info!("total deleted files: {}", summary.deleted_files);
        }

        summary.removed = bundles_to_remove.len();
    }

    if summary.failed > 0 {
        warn!(
            "failed to remove {} of {} bundles",
            summary.failed, summary.requested
        );
    } else {
        info!("successfully removed {} bundle(s)", summary.removed);
    }

    match worst {
        Some(error) => Err(error),
        None => Ok(summary),
    }
}

fn move_manifest(name: &str, from: &mut Vec<Arc<Manifest>>, to: &mut Vec<Arc<Manifest>>) {
    if let Some(position) = from.iter().position(|m| m.component == name) {
        to.push(from.remove(position));
    }
}

/// Unlink in reverse path order so directory contents go before the
/// directory itself. Directories are only removed when empty; a non-empty
/// directory still holds someone else's files.
fn unlink_files(ctx: &Context, files: &[FileRecord], progress: &dyn ProgressTracker) -> usize {
    let mut deleted = 0;

    for record in files.iter().rev() {
        progress.increment(1);
        let target = ctx.to_target(&record.path);

        let Ok(metadata) = fs::symlink_metadata(&target) else {
            debug!("{} already absent", record.path.display());
            continue;
        };

        let result = if metadata.is_dir() && record.kind == FileKind::Directory {
            fs::remove_dir(&target)
        } else {
            fs::remove_file(&target)
        };

        match result {
            Ok(()) => deleted += 1,
            Err(e) if e.kind() == std::io::ErrorKind::DirectoryNotEmpty => {
                debug!("directory {} not empty, keeping it", record.path.display());
            }
            Err(e) => {
                warn!("could not remove {}: {}", target.display(), e);
            }
        }
    }

    deleted
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hash::hash_bytes;
    use crate::manifest::FileRecord;
    use crate::progress::SilentProgress;
    use std::path::PathBuf;
    use tempfile::TempDir;

    fn record(path: &str, kind: FileKind) -> FileRecord {
        FileRecord {
            path: PathBuf::from(path),
            hash: hash_bytes(path.as_bytes()),
            kind,
            is_deleted: false,
            do_not_update: false,
            is_ignored: false,
            is_experimental: false,
            last_change: 10,
        }
    }

    #[test]
    fn test_move_manifest() {
        let make = |name: &str| {
            Arc::new(Manifest {
                component: name.to_string(),
                format: 1,
                version: 10,
                timestamp: 0,
                contentsize: 0,
                includes: Vec::new(),
                optional: Vec::new(),
                is_experimental: false,
                files: Vec::new(),
            })
        };

        let mut from = vec![make("a"), make("b")];
        let mut to = Vec::new();

        move_manifest("a", &mut from, &mut to);
        assert_eq!(from.len(), 1);
        assert_eq!(to.len(), 1);
        assert_eq!(to[0].component, "a");

        // Moving a name that is not present is a no-op.
        move_manifest("ghost", &mut from, &mut to);
        assert_eq!(from.len(), 1);
        assert_eq!(to.len(), 1);
    }

    #[test]
    fn test_unlink_files_depth_first() {
        let tmp = TempDir::new().unwrap();
        let ctx = Context::new(tmp.path().join("root"), tmp.path().join("state"));

        let dir = ctx.to_target(std::path::Path::new("/usr/lib/feature"));
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("data"), b"x").unwrap();

        // Consolidated order is path-sorted; the reverse pass must delete
        // the file before its parent directory.
        let files = vec![
            record("/usr/lib/feature", FileKind::Directory),
            record("/usr/lib/feature/data", FileKind::File),
        ];

        let progress = SilentProgress::new();
        let deleted = unlink_files(&ctx, &files, &progress);
        assert_eq!(deleted, 2);
        assert!(!dir.exists());
    }

    #[test]
    fn test_unlink_keeps_populated_directory() {
        let tmp = TempDir::new().unwrap();
        let ctx = Context::new(tmp.path().join("root"), tmp.path().join("state"));

        let dir = ctx.to_target(std::path::Path::new("/usr/lib/shared"));
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("kept-by-other-bundle"), b"x").unwrap();

        let files = vec![record("/usr/lib/shared", FileKind::Directory)];
        let progress = SilentProgress::new();
        let deleted = unlink_files(&ctx, &files, &progress);

        assert_eq!(deleted, 0);
        assert!(dir.exists());
        assert!(dir.join("kept-by-other-bundle").exists());
    }

    #[test]
    fn test_unlink_tolerates_absent_files() {
        let tmp = TempDir::new().unwrap();
        let ctx = Context::new(tmp.path().join("root"), tmp.path().join("state"));

        let files = vec![record("/usr/bin/never-existed", FileKind::File)];
        let progress = SilentProgress::new();
        assert_eq!(unlink_files(&ctx, &files, &progress), 0);
    }

}
