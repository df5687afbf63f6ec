// src/store.rs

//! Manifest loading, verification and caching.
//!
//! The store is content-addressed: a component at a given `last_change` is
//! immutable, so a cached entry never needs revalidation. Consumers receive
//! shared read-only `Arc<Manifest>` views and never mutate them.
//!
//! When a mix overlay is configured, locally-authored manifests shadow
//! upstream ones for the same version. Mix manifests are exempt from the
//! MoM hash check; they intentionally differ from what the MoM records.

use crate::error::{Error, Result};
use crate::fetch::{BlobKind, DirectoryFetcher, Fetcher};
use crate::hash::hash_bytes;
use crate::manifest::{FileRecord, Manifest};
use crate::subscription::SubscriptionSet;
use std::cell::RefCell;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

pub struct ManifestStore<'a> {
    fetcher: &'a dyn Fetcher,
    mix: Option<DirectoryFetcher>,
    cache: RefCell<HashMap<(String, u32), Arc<Manifest>>>,
}

impl<'a> ManifestStore<'a> {
    pub fn new(fetcher: &'a dyn Fetcher) -> Self {
        Self {
            fetcher,
            mix: None,
            cache: RefCell::new(HashMap::new()),
        }
    }

    /// Install a mix overlay. Only call this when mix is active for the
    /// invocation; overlay presence is what enables shadowing.
    pub fn with_mix(mut self, overlay: DirectoryFetcher) -> Self {
        self.mix = Some(overlay);
        self
    }

    pub fn fetcher(&self) -> &dyn Fetcher {
        self.fetcher
    }

    /// Total payload bytes pulled through this store's transport.
    pub fn bytes_fetched(&self) -> u64 {
        self.fetcher.bytes_fetched()
            + self.mix.as_ref().map_or(0, |overlay| overlay.bytes_fetched())
    }

    /// Load the Manifest of Manifests for one version.
    pub fn load_mom(&self, version: u32) -> Result<Arc<Manifest>> {
        if let Some(overlay) = &self.mix {
            if let Some(bytes) = overlay
                .try_fetch(BlobKind::Mom, version, "MoM")
                .map_err(|e| Error::CouldntLoadMom(e.to_string()))?
            {
                debug!("using mix MoM for version {}", version);
                return parse_manifest("MoM", &bytes).map(Arc::new);
            }
        }

        let bytes = self
            .fetcher
            .fetch(BlobKind::Mom, version, "MoM")
            .map_err(|e| Error::CouldntLoadMom(format!("version {}: {}", version, e)))?;
        parse_manifest("MoM", &bytes)
            .map(Arc::new)
            .map_err(|e| Error::CouldntLoadMom(e.to_string()))
    }

    /// Load the manifest a MoM record points at.
    ///
    /// The raw bytes must hash to the value the MoM recorded; a mismatch is
    /// a load failure, not a warning.
    pub fn load_manifest(&self, record: &FileRecord) -> Result<Arc<Manifest>> {
        let component = record.name().to_string();
        let version = record.last_change;

        if let Some(cached) = self.cache.borrow().get(&(component.clone(), version)) {
            return Ok(Arc::clone(cached));
        }

        let manifest = self.load_uncached(&component, record, version)?;
        self.cache
            .borrow_mut()
            .insert((component, version), Arc::clone(&manifest));
        Ok(manifest)
    }

    fn load_uncached(
        &self,
        component: &str,
        record: &FileRecord,
        version: u32,
    ) -> Result<Arc<Manifest>> {
        if let Some(overlay) = &self.mix {
            if let Some(bytes) = overlay
                .try_fetch(BlobKind::BundleManifest, version, component)
                .map_err(|e| Error::CouldntLoadManifest(e.to_string()))?
            {
                debug!("using mix manifest for {} at {}", component, version);
                let mut manifest = parse_manifest(component, &bytes)
                    .map_err(|e| Error::CouldntLoadManifest(e.to_string()))?;
                manifest.is_experimental = record.is_experimental;
                return Ok(Arc::new(manifest));
            }
        }

        let bytes = self
            .fetcher
            .fetch(BlobKind::BundleManifest, version, component)
            .map_err(|e| {
                Error::CouldntLoadManifest(format!("{} at version {}: {}", component, version, e))
            })?;

        let actual = hash_bytes(&bytes);
        if actual != record.hash {
            return Err(Error::CouldntLoadManifest(format!(
                "{} at version {}: content hashes to {} but MoM records {}",
                component, version, actual, record.hash
            )));
        }

        let mut manifest = parse_manifest(component, &bytes)
            .map_err(|e| Error::CouldntLoadManifest(e.to_string()))?;
        manifest.is_experimental = record.is_experimental;
        Ok(Arc::new(manifest))
    }

    /// Fetch the manifest for every subscribed component, yielding the
    /// transitive set.
    ///
    /// Subscriptions without a MoM entry are skipped with a warning: a
    /// version-skewed tracking directory must not brick the operation.
    pub fn recurse(&self, mom: &Manifest, subs: &SubscriptionSet) -> Result<Vec<Arc<Manifest>>> {
        let mut manifests = Vec::with_capacity(subs.len());
        for sub in subs.iter() {
            let Some(record) = mom.bundle(&sub.component) else {
                warn!(
                    "installed bundle \"{}\" is not listed in the MoM, skipping it",
                    sub.component
                );
                continue;
            };
            let manifest = self
                .load_manifest(record)
                .map_err(|e| Error::RecurseManifest(e.to_string()))?;
            manifests.push(manifest);
        }
        Ok(manifests)
    }
}

fn parse_manifest(component: &str, bytes: &[u8]) -> Result<Manifest> {
    let text = std::str::from_utf8(bytes)
        .map_err(|_| Error::Parse(format!("{}: manifest is not valid UTF-8", component)))?;
    Manifest::parse(component, text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hash::Hash;
    use std::fs;
    use tempfile::TempDir;

    fn write_bundle(base: &std::path::Path, version: u32, name: &str, body: &str) -> Hash {
        let dir = base.join(version.to_string());
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join(format!("Manifest.{}", name)), body).unwrap();
        hash_bytes(body.as_bytes())
    }

    fn write_mom(base: &std::path::Path, version: u32, entries: &[(&str, &Hash, u32)]) {
        let mut body = format!("MANIFEST\t1\nversion:\t{}\n\n", version);
        for (name, hash, last_change) in entries {
            body.push_str(&format!("M...\t{}\t{}\t{}\n", hash, last_change, name));
        }
        let dir = base.join(version.to_string());
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("Manifest.MoM"), body).unwrap();
    }

    #[test]
    fn test_load_mom_and_manifest() {
        let tmp = TempDir::new().unwrap();
        let body = "MANIFEST\t1\nversion:\t10\ncontentsize:\t128\n\n";
        let hash = write_bundle(tmp.path(), 10, "editor", body);
        write_mom(tmp.path(), 10, &[("editor", &hash, 10)]);

        let fetcher = DirectoryFetcher::new(tmp.path());
        let store = ManifestStore::new(&fetcher);

        let mom = store.load_mom(10).unwrap();
        let record = mom.bundle("editor").unwrap();
        let manifest = store.load_manifest(record).unwrap();
        assert_eq!(manifest.component, "editor");
        assert_eq!(manifest.contentsize, 128);
    }

    #[test]
    fn test_manifest_hash_checked_against_mom() {
        let tmp = TempDir::new().unwrap();
        let body = "MANIFEST\t1\nversion:\t10\n\n";
        write_bundle(tmp.path(), 10, "editor", body);
        // Record a hash for different content.
        write_mom(tmp.path(), 10, &[("editor", &hash_bytes(b"other"), 10)]);

        let fetcher = DirectoryFetcher::new(tmp.path());
        let store = ManifestStore::new(&fetcher);

        let mom = store.load_mom(10).unwrap();
        let record = mom.bundle("editor").unwrap();
        assert!(matches!(
            store.load_manifest(record),
            Err(Error::CouldntLoadManifest(_))
        ));
    }

    #[test]
    fn test_cache_avoids_refetch() {
        let tmp = TempDir::new().unwrap();
        let body = "MANIFEST\t1\nversion:\t10\n\n";
        let hash = write_bundle(tmp.path(), 10, "editor", body);
        write_mom(tmp.path(), 10, &[("editor", &hash, 10)]);

        let fetcher = DirectoryFetcher::new(tmp.path());
        let store = ManifestStore::new(&fetcher);
        let mom = store.load_mom(10).unwrap();
        let record = mom.bundle("editor").unwrap();

        store.load_manifest(record).unwrap();
        let after_first = fetcher.bytes_fetched();
        store.load_manifest(record).unwrap();
        assert_eq!(fetcher.bytes_fetched(), after_first);
    }

    #[test]
    fn test_mix_overlay_shadows_upstream() {
        let tmp = TempDir::new().unwrap();
        let upstream = tmp.path().join("upstream");
        let mix = tmp.path().join("mix");

        let body = "MANIFEST\t1\nversion:\t10\ncontentsize:\t1\n\n";
        let hash = write_bundle(&upstream, 10, "editor", body);
        write_mom(&upstream, 10, &[("editor", &hash, 10)]);

        // The mix version declares a different contentsize and would fail
        // the MoM hash check if it were treated as upstream content.
        let mix_body = "MANIFEST\t1\nversion:\t10\ncontentsize:\t999\n\n";
        write_bundle(&mix, 10, "editor", mix_body);

        let fetcher = DirectoryFetcher::new(&upstream);
        let store = ManifestStore::new(&fetcher).with_mix(DirectoryFetcher::new(&mix));

        let mom = store.load_mom(10).unwrap();
        let record = mom.bundle("editor").unwrap();
        let manifest = store.load_manifest(record).unwrap();
        assert_eq!(manifest.contentsize, 999);
    }

    #[test]
    fn test_recurse_skips_unknown_subscription() {
        let tmp = TempDir::new().unwrap();
        let body = "MANIFEST\t1\nversion:\t10\n\n";
        let hash = write_bundle(tmp.path(), 10, "editor", body);
        write_mom(tmp.path(), 10, &[("editor", &hash, 10)]);

        let fetcher = DirectoryFetcher::new(tmp.path());
        let store = ManifestStore::new(&fetcher);
        let mom = store.load_mom(10).unwrap();

        let mut subs = SubscriptionSet::default();
        subs.add("editor");
        subs.add("ghost");
        subs.set_versions(&mom);

        let manifests = store.recurse(&mom, &subs).unwrap();
        assert_eq!(manifests.len(), 1);
        assert_eq!(manifests[0].component, "editor");
    }
}
