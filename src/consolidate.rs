// src/consolidate.rs

//! Set arithmetic over per-bundle file lists.
//!
//! Installed bundles overlap: several may carry the same path, and one may
//! mark deleted what another still provides. Consolidation merges the
//! per-bundle lists into one path-sorted view with a deterministic winner
//! per path, and the filters derive the working sets the installer and
//! remover operate on.

use crate::manifest::{FileRecord, Manifest};
use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;

/// Merge the file lists of `manifests` into one list, sorted by path and
/// unique by path.
///
/// Collision rule: a non-deleted record beats a deleted one (deleted-in-one
/// -bundle must not erase a file another installed bundle still provides);
/// ties resolve to the higher `last_change`.
pub fn consolidate(manifests: &[Arc<Manifest>]) -> Vec<FileRecord> {
    let mut all: Vec<FileRecord> = manifests
        .iter()
        .flat_map(|manifest| manifest.files.iter().cloned())
        .collect();
    all.sort_by(|a, b| a.path.cmp(&b.path));

    let mut merged: Vec<FileRecord> = Vec::with_capacity(all.len());
    for record in all {
        match merged.last_mut() {
            Some(previous) if previous.path == record.path => {
                if wins(&record, previous) {
                    *previous = record;
                }
            }
            _ => merged.push(record),
        }
    }
    merged
}

fn wins(candidate: &FileRecord, incumbent: &FileRecord) -> bool {
    match (candidate.is_deleted, incumbent.is_deleted) {
        (false, true) => true,
        (true, false) => false,
        _ => candidate.last_change > incumbent.last_change,
    }
}

/// Drop records whose path must not exist after reconciliation.
pub fn filter_out_deleted(files: Vec<FileRecord>) -> Vec<FileRecord> {
    files.into_iter().filter(|f| !f.is_deleted).collect()
}

/// Drop desired records already present (same path and hash) in the
/// installed set.
pub fn filter_out_existing(desired: Vec<FileRecord>, installed: &[FileRecord]) -> Vec<FileRecord> {
    let have: HashSet<(&Path, &str)> = installed
        .iter()
        .map(|f| (f.path.as_path(), f.hash.as_str()))
        .collect();

    desired
        .into_iter()
        .filter(|f| !have.contains(&(f.path.as_path(), f.hash.as_str())))
        .collect()
}

/// Paths present in the removed set but absent from the kept set.
///
/// A path is kept if any kept record for it is non-deleted; both inputs are
/// consolidated views.
pub fn files_to_unlink(removed: &[FileRecord], kept: &[FileRecord]) -> Vec<FileRecord> {
    let kept_live: HashSet<&Path> = kept
        .iter()
        .filter(|f| !f.is_deleted)
        .map(|f| f.path.as_path())
        .collect();

    removed
        .iter()
        .filter(|f| !f.is_deleted && !kept_live.contains(f.path.as_path()))
        .cloned()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hash::{hash_bytes, Hash};
    use crate::manifest::FileKind;
    use std::path::PathBuf;

    fn record(path: &str, content: &[u8], last_change: u32) -> FileRecord {
        FileRecord {
            path: PathBuf::from(path),
            hash: hash_bytes(content),
            kind: FileKind::File,
            is_deleted: false,
            do_not_update: false,
            is_ignored: false,
            is_experimental: false,
            last_change,
        }
    }

    fn deleted(path: &str, last_change: u32) -> FileRecord {
        FileRecord {
            path: PathBuf::from(path),
            hash: Hash::zero(),
            kind: FileKind::File,
            is_deleted: true,
            do_not_update: false,
            is_ignored: false,
            is_experimental: false,
            last_change,
        }
    }

    fn bundle(component: &str, files: Vec<FileRecord>) -> Arc<Manifest> {
        let mut files = files;
        files.sort_by(|a, b| a.path.cmp(&b.path));
        Arc::new(Manifest {
            component: component.to_string(),
            format: 1,
            version: 10,
            timestamp: 0,
            contentsize: 0,
            includes: Vec::new(),
            optional: Vec::new(),
            is_experimental: false,
            files,
        })
    }

    #[test]
    fn test_consolidate_sorts_and_dedups() {
        let a = bundle("a", vec![record("/usr/z", b"z", 1), record("/usr/a", b"a", 1)]);
        let b = bundle("b", vec![record("/usr/m", b"m", 1)]);

        let merged = consolidate(&[a, b]);
        let paths: Vec<_> = merged.iter().map(|f| f.path.clone()).collect();
        assert_eq!(
            paths,
            vec![
                PathBuf::from("/usr/a"),
                PathBuf::from("/usr/m"),
                PathBuf::from("/usr/z")
            ]
        );
    }

    #[test]
    fn test_live_record_beats_deleted() {
        // One bundle dropped the file at a later version, another still
        // provides it; the live record must win regardless of order.
        let a = bundle("a", vec![deleted("/usr/shared", 9)]);
        let b = bundle("b", vec![record("/usr/shared", b"body", 3)]);

        for pair in [
            [Arc::clone(&a), Arc::clone(&b)],
            [Arc::clone(&b), Arc::clone(&a)],
        ] {
            let merged = consolidate(&pair);
            assert_eq!(merged.len(), 1);
            assert!(!merged[0].is_deleted);
            assert_eq!(merged[0].last_change, 3);
        }
    }

    #[test]
    fn test_higher_last_change_wins_among_live() {
        let a = bundle("a", vec![record("/usr/tool", b"old", 5)]);
        let b = bundle("b", vec![record("/usr/tool", b"new", 8)]);

        let merged = consolidate(&[a, b]);
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].last_change, 8);
        assert_eq!(merged[0].hash, hash_bytes(b"new"));
    }

    #[test]
    fn test_filter_out_deleted() {
        let files = vec![record("/usr/a", b"a", 1), deleted("/usr/b", 1)];
        let live = filter_out_deleted(files);
        assert_eq!(live.len(), 1);
        assert_eq!(live[0].path, PathBuf::from("/usr/a"));
    }

    #[test]
    fn test_filter_out_existing_matches_path_and_hash() {
        let installed = vec![record("/usr/same", b"same", 1), record("/usr/stale", b"old", 1)];
        let desired = vec![
            record("/usr/same", b"same", 2),  // same content: drop
            record("/usr/stale", b"new", 2),  // content changed: keep
            record("/usr/fresh", b"fresh", 2) // new path: keep
        ];

        let todo = filter_out_existing(desired, &installed);
        let paths: Vec<_> = todo.iter().map(|f| f.path.clone()).collect();
        assert_eq!(
            paths,
            vec![PathBuf::from("/usr/fresh"), PathBuf::from("/usr/stale")]
        );
    }

    #[test]
    fn test_files_to_unlink_keeps_shared() {
        let removed = vec![
            record("/usr/only-removed", b"x", 1),
            record("/usr/shared", b"s", 1),
            deleted("/usr/gone", 1),
        ];
        let kept = vec![record("/usr/shared", b"s", 1), deleted("/usr/only-removed", 2)];

        let unlink = files_to_unlink(&removed, &kept);
        let paths: Vec<_> = unlink.iter().map(|f| f.path.clone()).collect();
        // "/usr/shared" survives (kept live), "/usr/gone" was already
        // deleted, and a kept *deleted* record does not protect a path.
        assert_eq!(paths, vec![PathBuf::from("/usr/only-removed")]);
    }
}
