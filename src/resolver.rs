// src/resolver.rs

//! Forward and reverse bundle dependency traversal.
//!
//! Forward traversal (`add_subscriptions`) expands a seed list of bundle
//! names into the subscription closure, following `includes` always and
//! `also-add` unless the context opts out. Reverse traversal (`required_by`)
//! answers "which installed bundles would break if this one were removed".
//!
//! Note the asymmetry: `skip_optional` applies only to forward resolution.
//! Reverse resolution never follows optional edges at all; an optional
//! dependency does not force retention.

use crate::context::Context;
use crate::manifest::Manifest;
use crate::store::ManifestStore;
use crate::subscription::SubscriptionSet;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{error, warn};

/// Outcome of one forward traversal.
#[derive(Debug, Default)]
pub struct ResolveReport {
    /// At least one bundle was newly subscribed.
    pub new: bool,
    /// A manifest failed to load; the traversal was cut short.
    pub errored: bool,
    /// Names that have no MoM entry, in the order they were seen.
    pub bad_names: Vec<String>,
}

impl ResolveReport {
    pub fn has_bad_names(&self) -> bool {
        !self.bad_names.is_empty()
    }

    fn merge(&mut self, other: ResolveReport) {
        self.new |= other.new;
        self.errored |= other.errored;
        self.bad_names.extend(other.bad_names);
    }
}

/// Expand `names` into `subs`, recursing through include lists.
///
/// With `find_all` unset, bundles already installed on the system are
/// skipped without recursing. A bundle already subscribed is skipped at
/// recursion depth > 0 only; the top level always materializes the seed
/// list, so the caller can tell "user asked" from "transitively pulled".
///
/// Unknown names are per-bundle faults: recorded and skipped. A manifest
/// that fails to load aborts the traversal with `errored` set.
pub fn add_subscriptions(
    ctx: &Context,
    store: &ManifestStore,
    mom: &Manifest,
    names: &[String],
    subs: &mut SubscriptionSet,
    find_all: bool,
    depth: usize,
) -> ResolveReport {
    let mut report = ResolveReport::default();

    for name in names {
        let Some(record) = mom.bundle(name) else {
            warn!("bundle \"{}\" is invalid, skipping it", name);
            report.bad_names.push(name.clone());
            continue;
        };

        if !find_all && ctx.is_installed_bundle(name) {
            continue;
        }

        let manifest = match store.load_manifest(record) {
            Ok(manifest) => manifest,
            Err(e) => {
                error!(
                    "unable to load manifest for \"{}\" at version {}: {}",
                    name, record.last_change, e
                );
                report.errored = true;
                return report;
            }
        };

        if subs.contains(name) {
            // Deep in an include tree this bundle will be (or was) visited
            // at the top level anyway; only the top level must re-walk it.
            if depth > 0 {
                continue;
            }
        } else {
            subs.add(name);
            report.new = true;
        }

        if !manifest.includes.is_empty() {
            report.merge(add_subscriptions(
                ctx,
                store,
                mom,
                &manifest.includes,
                subs,
                find_all,
                depth + 1,
            ));
        }

        if !ctx.skip_optional && !manifest.optional.is_empty() {
            report.merge(add_subscriptions(
                ctx,
                store,
                mom,
                &manifest.optional,
                subs,
                find_all,
                depth + 1,
            ));
        }
    }

    report
}

/// One row of the reverse-dependency tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TreeRow {
    pub depth: usize,
    pub component: String,
}

/// Result of a reverse traversal: the flat deduplicated list plus the full
/// tree (duplicates allowed) for verbose display.
#[derive(Debug, Default)]
pub struct RequiredBy {
    pub names: Vec<String>,
    pub tree: Vec<TreeRow>,
}

impl RequiredBy {
    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn count(&self) -> usize {
        self.names.len()
    }

    /// Render one tree row the way the CLI prints it: the root level is
    /// marked `*`, nested levels `|--`, indented four columns per level.
    pub fn render_row(row: &TreeRow) -> String {
        if row.depth == 0 {
            format!("  * {}", row.component)
        } else {
            format!("{}|-- {}", " ".repeat(row.depth * 4), row.component)
        }
    }
}

/// Collect the installed bundles whose transitive `includes` contain
/// `target`. Names in `exclusions` are not reported (the caller intends to
/// remove them too), but their own dependents are still followed.
pub fn required_by(
    submanifests: &[Arc<Manifest>],
    target: &str,
    exclusions: &[String],
) -> RequiredBy {
    let mut result = RequiredBy::default();
    let mut visited = HashSet::new();
    walk(submanifests, target, exclusions, 0, &mut visited, &mut result);

    // The tree view may repeat bundles reachable along several paths; the
    // flat list reports each dependent once, in discovery order.
    let mut seen = HashSet::new();
    result.names.retain(|name| seen.insert(name.clone()));
    result
}

fn walk(
    submanifests: &[Arc<Manifest>],
    target: &str,
    exclusions: &[String],
    depth: usize,
    visited: &mut HashSet<String>,
    result: &mut RequiredBy,
) {
    // Well-formed manifest sets are acyclic; the guard keeps a corrupt
    // server from recursing forever.
    if !visited.insert(target.to_string()) {
        return;
    }

    for bundle in submanifests {
        // Manifests never list their own component.
        if bundle.component == target {
            continue;
        }

        for include in &bundle.includes {
            if include != target {
                continue;
            }

            if !exclusions.iter().any(|name| name == &bundle.component) {
                result.names.push(bundle.component.clone());
                result.tree.push(TreeRow {
                    depth,
                    component: bundle.component.clone(),
                });
            }

            walk(
                submanifests,
                &bundle.component,
                exclusions,
                depth + 1,
                visited,
                result,
            );
        }
    }
}
