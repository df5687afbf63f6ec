// src/subscription.rs

//! Subscriptions: the set of bundles under consideration for one operation.
//!
//! A subscription is a tentative intent to install or inspect a bundle. The
//! set is built during planning, carries at most one entry per component,
//! and dies with the operation.

use crate::context::Context;
use crate::error::Result;
use crate::manifest::Manifest;
use std::collections::HashSet;
use std::fs;
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subscription {
    pub component: String,
    /// Version of the bundle's manifest; set from the MoM record's
    /// `last_change` once the MoM is known.
    pub version: u32,
}

/// Ordered set of subscriptions, unique by component.
#[derive(Debug, Default)]
pub struct SubscriptionSet {
    subs: Vec<Subscription>,
    names: HashSet<String>,
}

impl SubscriptionSet {
    pub fn contains(&self, component: &str) -> bool {
        self.names.contains(component)
    }

    /// Add a subscription; a second add for the same component is a no-op.
    pub fn add(&mut self, component: &str) {
        if self.names.insert(component.to_string()) {
            self.subs.push(Subscription {
                component: component.to_string(),
                version: 0,
            });
        }
    }

    /// Pin every subscription to the version its manifest last changed at,
    /// as recorded in the MoM.
    pub fn set_versions(&mut self, mom: &Manifest) {
        for sub in &mut self.subs {
            match mom.bundle(&sub.component) {
                Some(record) => sub.version = record.last_change,
                None => debug!("subscription {} has no MoM entry", sub.component),
            }
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &Subscription> {
        self.subs.iter()
    }

    pub fn len(&self) -> usize {
        self.subs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.subs.is_empty()
    }
}

/// One subscription per installed bundle marker in the system directory.
///
/// A missing directory yields the empty set: a freshly provisioned target
/// tree simply has nothing installed yet.
pub fn read_subscriptions(ctx: &Context) -> Result<SubscriptionSet> {
    let mut set = SubscriptionSet::default();
    let dir = ctx.system_bundles_dir();

    let entries = match fs::read_dir(&dir) {
        Ok(entries) => entries,
        Err(e) => {
            debug!("no installed bundles at {}: {}", dir.display(), e);
            return Ok(set);
        }
    };

    let mut names: Vec<String> = entries
        .filter_map(|entry| entry.ok())
        .filter_map(|entry| entry.file_name().into_string().ok())
        .filter(|name| !name.starts_with('.'))
        .collect();
    names.sort();

    for name in names {
        set.add(&name);
    }
    Ok(set)
}
