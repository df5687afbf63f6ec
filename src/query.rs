// src/query.rs

//! Bundle listing and dependency queries.
//!
//! These operations compute and return their answers; the front-end owns
//! the formatting. Experimental bundles are flagged so listings can mark
//! them.

use crate::context::Context;
use crate::error::{Error, Result};
use crate::resolver::{self, RequiredBy};
use crate::store::ManifestStore;
use crate::subscription::SubscriptionSet;
use crate::version;
use std::fs;
use tracing::{error, info, warn};

/// One row of a bundle listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BundleListing {
    pub name: String,
    pub is_experimental: bool,
}

impl BundleListing {
    /// Display form; experimental bundles are suffixed.
    pub fn printable(&self) -> String {
        if self.is_experimental {
            format!("{} (experimental)", self.name)
        } else {
            self.name.clone()
        }
    }
}

/// Every bundle the current release publishes, sorted by name.
pub fn installable_bundles(ctx: &Context, store: &ManifestStore) -> Result<Vec<BundleListing>> {
    let current = version::current_version(ctx)?;
    let mom = store.load_mom(current)?;

    let mut listings: Vec<BundleListing> = mom
        .bundle_names()
        .map(|record| BundleListing {
            name: record.name().to_string(),
            is_experimental: record.is_experimental,
        })
        .collect();
    listings.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(listings)
}

/// Locally installed bundles, sorted by name.
///
/// The MoM is only needed to annotate experimental bundles, so a failure to
/// load it degrades to plain names.
pub fn local_bundles(ctx: &Context, store: &ManifestStore) -> Result<Vec<BundleListing>> {
    let mom = match version::current_version(ctx).and_then(|v| store.load_mom(v)) {
        Ok(mom) => Some(mom),
        Err(e) => {
            warn!(
                "could not determine which installed bundles are experimental: {}",
                e
            );
            None
        }
    };

    let dir = ctx.system_bundles_dir();
    let entries = fs::read_dir(&dir).map_err(|_| Error::CouldntListDir(dir.clone()))?;

    let mut listings: Vec<BundleListing> = entries
        .filter_map(|entry| entry.ok())
        .filter_map(|entry| entry.file_name().into_string().ok())
        .filter(|name| !name.starts_with('.'))
        .map(|name| {
            let is_experimental = mom
                .as_ref()
                .and_then(|mom| mom.bundle(&name))
                .is_some_and(|record| record.is_experimental);
            BundleListing {
                name,
                is_experimental,
            }
        })
        .collect();
    listings.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(listings)
}

/// The recursive include closure of `bundle`, excluding the bundle itself.
pub fn included_bundles(
    ctx: &Context,
    store: &ManifestStore,
    bundle: &str,
) -> Result<Vec<String>> {
    let current = version::current_version(ctx)?;
    let mom = store.load_mom(current)?;

    let mut subs = SubscriptionSet::default();
    let names = vec![bundle.to_string()];
    let report = resolver::add_subscriptions(ctx, store, &mom, &names, &mut subs, true, 0);

    if !report.new {
        if report.errored {
            return Err(Error::CouldntLoadManifest(format!(
                "cannot load included bundles for \"{}\"",
                bundle
            )));
        }
        return Err(Error::InvalidBundle(bundle.to_string()));
    }

    subs.set_versions(&mom);
    let closure = store.recurse(&mom, &subs)?;

    Ok(closure
        .iter()
        .map(|manifest| manifest.component.clone())
        .filter(|name| name != bundle)
        .collect())
}

/// Which bundles would break if `bundle` were removed.
///
/// By default only installed bundles are inspected; a bundle that is not
/// installed is rejected with a hint to pass `all`. With `all` set, every
/// bundle the release publishes is considered instead.
pub fn required_by_report(
    ctx: &Context,
    store: &ManifestStore,
    bundle: &str,
    all: bool,
) -> Result<RequiredBy> {
    if !all && !ctx.is_installed_bundle(bundle) {
        info!("bundle \"{}\" does not seem to be installed", bundle);
        info!("try passing --all to check uninstalled bundles");
        return Err(Error::BundleNotTracked(bundle.to_string()));
    }

    let current = version::current_version(ctx)?;
    let mom = store.load_mom(current)?;

    if mom.bundle(bundle).is_none() {
        error!(
            "bundle \"{}\" is invalid, aborting dependency list",
            bundle
        );
        return Err(Error::InvalidBundle(bundle.to_string()));
    }

    let mut subs = if all {
        let mut subs = SubscriptionSet::default();
        for record in mom.bundle_names() {
            subs.add(record.name());
        }
        subs
    } else {
        crate::subscription::read_subscriptions(ctx)?
    };
    subs.set_versions(&mom);

    let submanifests = store.recurse(&mom, &subs)?;
    Ok(resolver::required_by(&submanifests, bundle, &[]))
}
