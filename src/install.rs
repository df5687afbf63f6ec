// src/install.rs

//! Two-phase staged installation of bundle files.
//!
//! Every planned file is first placed next to its final destination under a
//! `.update` sidecar name (Phase A), and only then renamed into place
//! (Phase B). Rename is atomic per file on POSIX filesystems, so the only
//! window of partial visibility is the rename loop itself. A crash between
//! phases leaves sidecars behind; they are idempotently replaced on the
//! next run, so a re-run converges to the same final state.
//!
//! Content flows from the staging area (`<state>/staged/<hash>`), filled by
//! packs when many files are needed and by individual full-files otherwise.
//! Staged blobs for symlinks hold the link target as their content.

use crate::consolidate::{consolidate, filter_out_deleted, filter_out_existing};
use crate::context::Context;
use crate::error::{Error, Result};
use crate::fetch::{BlobKind, Fetcher};
use crate::hash::{hash_bytes, verify_file};
use crate::manifest::{FileKind, FileRecord};
use crate::progress::ProgressTracker;
use crate::resolver::{self, ResolveReport};
use crate::store::ManifestStore;
use crate::subscription::{read_subscriptions, SubscriptionSet};
use crate::{diskspace, telemetry, tracking, unpack, version};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Below this many missing files, individual full-file downloads beat a
/// pack round-trip.
const PACK_THRESHOLD: usize = 10;

/// Suffix of the staging sidecar placed next to each final destination.
const SIDECAR_SUFFIX: &str = ".update";

/// Sidecar name for a final destination: `/usr/bin/tool.update`.
pub fn sidecar_path(target: &Path) -> PathBuf {
    let mut name = target.file_name().unwrap_or_default().to_os_string();
    name.push(SIDECAR_SUFFIX);
    target.with_file_name(name)
}

/// One record in the install plan, plus where Phase A staged it.
#[derive(Debug, Clone)]
pub struct PlannedFile {
    pub record: FileRecord,
    /// Set by Phase A. `None` for directories and for records staged
    /// out-of-band by path repair.
    staging: Option<PathBuf>,
}

/// Build the install plan from a consolidated, deduplicated file list.
pub fn plan_files(files: Vec<FileRecord>) -> Vec<PlannedFile> {
    files
        .into_iter()
        .map(|record| PlannedFile {
            record,
            staging: None,
        })
        .collect()
}

/// Wipe the download scratch area and make sure every planned blob is
/// present and verified in the staging area.
///
/// When more than [`PACK_THRESHOLD`] files are missing, one pack per
/// subscription is attempted first; pack failures are non-fatal since every
/// blob can still arrive as a full-file. A full-file that cannot be fetched
/// or does not verify aborts the install.
pub fn supply_content(
    ctx: &Context,
    fetcher: &dyn Fetcher,
    subs: &SubscriptionSet,
    plan: &[PlannedFile],
) -> Result<()> {
    let download = ctx.download_dir();
    if download.exists() {
        fs::remove_dir_all(&download)?;
    }
    fs::create_dir_all(&download)?;
    fs::create_dir_all(ctx.staged_dir())?;

    let missing: Vec<&FileRecord> = plan
        .iter()
        .map(|entry| &entry.record)
        .filter(|record| record.is_mutable() && record.kind != FileKind::Directory)
        .filter(|record| !ctx.staged_path(&record.hash).exists())
        .collect();

    if missing.len() > PACK_THRESHOLD {
        for sub in subs.iter() {
            match fetcher.try_fetch(BlobKind::Pack, sub.version, &sub.component) {
                Ok(Some(bytes)) => match unpack::extract_tar_gz(&bytes, &ctx.state_dir) {
                    Ok(count) => info!("pack for {} supplied {} files", sub.component, count),
                    Err(e) => debug!("pack for {} unusable: {}", sub.component, e),
                },
                Ok(None) => debug!("no pack published for {}", sub.component),
                Err(e) => debug!("pack fetch for {} failed: {}", sub.component, e),
            }
        }
    } else if !missing.is_empty() {
        info!("no packs need to be downloaded");
    }

    for record in missing {
        let staged = ctx.staged_path(&record.hash);
        if staged.exists() {
            // A pack already delivered it.
            continue;
        }

        let bytes = fetcher
            .fetch(BlobKind::FullFile, record.last_change, record.hash.as_str())
            .map_err(|e| Error::Download(format!("{}: {}", record.path.display(), e)))?;

        let actual = hash_bytes(&bytes);
        if actual != record.hash {
            return Err(Error::HashMismatch {
                path: record.path.clone(),
                expected: record.hash.to_string(),
                actual: actual.to_string(),
            });
        }
        fs::write(&staged, bytes)?;
    }

    Ok(())
}

/// The two-phase staged installer.
pub struct Installer<'a> {
    ctx: &'a Context,
    /// Consolidated view of every file the release knows about; consulted
    /// to materialize missing ancestor directories and to recover staging
    /// metadata for records staged out-of-band.
    known_files: BTreeMap<PathBuf, FileRecord>,
}

impl<'a> Installer<'a> {
    pub fn new(ctx: &'a Context, known_files: Vec<FileRecord>) -> Self {
        Self {
            ctx,
            known_files: known_files
                .into_iter()
                .map(|record| (record.path.clone(), record))
                .collect(),
        }
    }

    /// Pre-flight hash check over the staging area.
    ///
    /// Content already present for a planned file is re-hashed; a mismatch
    /// unlinks the blob so the download step fetches it again.
    pub fn preflight(&self, plan: &[PlannedFile]) -> Result<()> {
        for entry in plan {
            let record = &entry.record;
            if !record.is_mutable() || record.kind == FileKind::Directory {
                continue;
            }

            let staged = self.ctx.staged_path(&record.hash);
            if !staged.exists() {
                continue;
            }

            let ok = verify_file(&staged, &record.hash).unwrap_or(false);
            if !ok {
                warn!("hash check failed for {}", record.path.display());
                info!("will fetch a fresh copy of {}", record.path.display());
                fs::remove_file(&staged)
                    .map_err(|_| Error::CouldntRemoveFile(staged.clone()))?;
            }
        }
        Ok(())
    }

    /// Phase A: place every planned file next to its destination.
    pub fn stage_all(
        &self,
        plan: &mut [PlannedFile],
        progress: &dyn ProgressTracker,
    ) -> Result<()> {
        for entry in plan.iter_mut() {
            if entry.record.is_mutable() {
                self.stage_one(entry)?;
            }
            progress.increment(1);
        }
        Ok(())
    }

    fn stage_one(&self, entry: &mut PlannedFile) -> Result<()> {
        let record = &entry.record;
        let target = self.ctx.to_target(&record.path);

        self.ensure_parent(&target, &record.path)?;

        // A pre-existing entry of a different type cannot be renamed over.
        if let Ok(metadata) = fs::symlink_metadata(&target) {
            let file_type = metadata.file_type();
            let same_kind = match record.kind {
                FileKind::File => file_type.is_file(),
                FileKind::Directory => file_type.is_dir(),
                FileKind::Symlink => file_type.is_symlink(),
                FileKind::Manifest => true,
            };
            if !same_kind {
                debug!(
                    "type changed for {}, removing old entry",
                    record.path.display()
                );
                if file_type.is_dir() {
                    fs::remove_dir_all(&target)?;
                } else {
                    fs::remove_file(&target)?;
                }
            }
        }

        match record.kind {
            FileKind::Directory => {
                // Directories take their final name immediately; creation
                // is idempotent and there is nothing to rename.
                fs::create_dir_all(&target)?;
                entry.staging = None;
            }
            FileKind::File => {
                let sidecar = sidecar_path(&target);
                fs::copy(self.ctx.staged_path(&record.hash), &sidecar)?;
                entry.staging = Some(sidecar);
            }
            FileKind::Symlink => {
                let sidecar = sidecar_path(&target);
                let link_target = fs::read_to_string(self.ctx.staged_path(&record.hash))?;
                match fs::remove_file(&sidecar) {
                    Ok(()) => {}
                    Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                    Err(e) => return Err(e.into()),
                }
                std::os::unix::fs::symlink(link_target.trim_end(), &sidecar)?;
                entry.staging = Some(sidecar);
            }
            FileKind::Manifest => {
                debug!("manifest reference {} is not stageable", record.path.display());
            }
        }

        Ok(())
    }

    /// Make sure the parent directory of `target` exists, materializing
    /// missing ancestors the release records as directories (path repair).
    fn ensure_parent(&self, target: &Path, record_path: &Path) -> Result<()> {
        let Some(parent) = target.parent() else {
            return Ok(());
        };
        if parent.exists() {
            return Ok(());
        }

        let mut ancestors: Vec<&Path> = record_path.ancestors().skip(1).collect();
        ancestors.reverse();
        for ancestor in ancestors {
            let Some(known) = self.known_files.get(ancestor) else {
                continue;
            };
            if known.kind != FileKind::Directory || known.is_deleted {
                continue;
            }
            let dir = self.ctx.to_target(ancestor);
            if !dir.exists() {
                debug!("repairing missing directory {}", ancestor.display());
                fs::create_dir_all(&dir)?;
            }
        }

        // Ancestors outside the release's view still have to exist.
        if !parent.exists() {
            fs::create_dir_all(parent)?;
        }
        Ok(())
    }

    /// Phase B: rename every sidecar to its final name, then sync.
    pub fn rename_all(
        &self,
        plan: &[PlannedFile],
        progress: &dyn ProgressTracker,
    ) -> Result<()> {
        for entry in plan {
            let record = &entry.record;
            if !record.is_mutable() {
                progress.increment(1);
                continue;
            }
            if record.kind == FileKind::Directory || record.kind == FileKind::Manifest {
                progress.increment(1);
                continue;
            }

            let target = self.ctx.to_target(&record.path);
            let sidecar = match &entry.staging {
                Some(sidecar) => sidecar.clone(),
                // Staged out-of-band: the plan entry carries no staging
                // name, so recover it from the release's consolidated view.
                None => match self.known_files.get(&record.path) {
                    Some(known) => sidecar_path(&self.ctx.to_target(&known.path)),
                    None => sidecar_path(&target),
                },
            };

            if !path_entry_exists(&sidecar) {
                debug!("nothing staged for {}", record.path.display());
                progress.increment(1);
                continue;
            }

            fs::rename(&sidecar, &target)?;
            progress.increment(1);
        }

        nix::unistd::sync();
        Ok(())
    }
}

/// `exists()` follows symlinks; a staged sidecar symlink may dangle.
fn path_entry_exists(path: &Path) -> bool {
    fs::symlink_metadata(path).is_ok()
}

/// Outcome of one install operation.
#[derive(Debug, Default)]
pub struct InstallSummary {
    pub requested: usize,
    pub installed: usize,
    pub dependencies: usize,
    pub already_installed: usize,
    pub failed: usize,
}

/// Install one or more bundles and their dependency closure.
pub fn install_bundles(
    ctx: &Context,
    store: &ManifestStore,
    names: &[String],
    progress: &dyn ProgressTracker,
) -> Result<InstallSummary> {
    let mut current_version = 0;
    let result = install_inner(ctx, store, names, progress, &mut current_version);

    // Already-renamed files stay (a re-run converges); only the scratch
    // area is reclaimed on failure.
    if result.is_err() {
        let _ = fs::remove_dir_all(ctx.download_dir());
    }

    let code = match &result {
        Ok(_) => 0,
        Err(e) => e.exit_code(),
    };
    telemetry::emit(
        ctx,
        &telemetry::Record::new(
            "bundle-add",
            names,
            current_version,
            code,
            store.bytes_fetched(),
        ),
    );

    result
}

fn install_inner(
    ctx: &Context,
    store: &ManifestStore,
    names: &[String],
    progress: &dyn ProgressTracker,
    current_version: &mut u32,
) -> Result<InstallSummary> {
    let _lock = ctx.lock()?;
    ctx.ensure_state_dirs()?;

    *current_version = version::current_version(ctx)?;
    let mom = store.load_mom(*current_version)?;

    info!("loading required manifests...");
    let mut subs = SubscriptionSet::default();
    let report: ResolveReport =
        resolver::add_subscriptions(ctx, store, &mom, names, &mut subs, false, 0);

    let mut summary = InstallSummary {
        requested: names.len(),
        ..Default::default()
    };

    for name in names {
        if ctx.is_installed_bundle(name) {
            warn!("bundle \"{}\" is already installed, skipping it", name);
            summary.already_installed += 1;
            // The user asked for it explicitly; make sure it is tracked.
            tracking::track_installed(ctx, name);
        }
        if let Some(record) = mom.bundle(name) {
            if record.is_experimental {
                warn!("bundle \"{}\" is experimental", name);
            }
        }
    }

    if !report.new {
        if report.errored {
            return Err(Error::CouldntLoadManifest(
                "aborting installation".to_string(),
            ));
        }
        if report.has_bad_names() {
            return Err(Error::InvalidBundle(report.bad_names.join(", ")));
        }
        // Everything requested was already installed; nothing to do.
        return Ok(summary);
    }
    let invalid_provided = report.has_bad_names();

    subs.set_versions(&mom);
    let to_install_bundles = store.recurse(&mom, &subs)?;

    let mut current_subs = read_subscriptions(ctx)?;
    current_subs.set_versions(&mom);
    let installed_bundles = store.recurse(&mom, &current_subs)?;

    let installed_files = filter_out_deleted(consolidate(&installed_bundles));
    let to_install_files = filter_out_existing(
        filter_out_deleted(consolidate(&to_install_bundles)),
        &installed_files,
    );

    diskspace::check(ctx, &to_install_bundles)?;

    // Full release view for path repair: everything either side knows.
    let mut all_bundles: Vec<Arc<_>> = to_install_bundles.clone();
    all_bundles.extend(installed_bundles.iter().cloned());
    let known_files = consolidate(&all_bundles);

    let installer = Installer::new(ctx, known_files);
    let mut plan = plan_files(to_install_files);

    installer.preflight(&plan)?;
    supply_content(ctx, store.fetcher(), &subs, &plan)?;

    info!("installing bundle(s) files...");
    // Two passes over the plan: stage, then rename.
    progress.set_length(plan.len() as u64 * 2);
    installer.stage_all(&mut plan, progress)?;
    installer.rename_all(&plan, progress)?;
    progress.finish_with_message("bundle files installed");

    // Tracking happens only after reconciliation succeeded, and only for
    // bundles the user named; dependencies stay untracked.
    for manifest in &to_install_bundles {
        if !ctx.is_installed_bundle(&manifest.component) {
            continue;
        }
        if names.iter().any(|name| name == &manifest.component) {
            summary.installed += 1;
            tracking::track_installed(ctx, &manifest.component);
        } else {
            summary.dependencies += 1;
        }
    }

    summary.failed = summary
        .requested
        .saturating_sub(summary.installed + summary.already_installed);

    if summary.failed > 0 {
        warn!(
            "failed to install {} of {} bundles",
            summary.failed,
            summary.requested - summary.already_installed
        );
    } else if summary.installed > 0 {
        info!("successfully installed {} bundle(s)", summary.installed);
    }
    if summary.dependencies > 0 {
        info!(
            "{} bundle(s) were installed as dependencies",
            summary.dependencies
        );
    }
    if summary.already_installed > 0 {
        info!("{} bundle(s) already installed", summary.already_installed);
    }

    // "Did what it could" still reports the bad name to the caller.
    if invalid_provided {
        return Err(Error::InvalidBundle(report.bad_names.join(", ")));
    }
    Ok(summary)
}
