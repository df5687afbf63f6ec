// src/manifest.rs

//! Bundle manifests and the text wire format.
//!
//! A manifest describes one bundle at one version: a header with counters
//! and include lists, then one record per path. The MoM (Manifest of
//! Manifests) uses the same format; its records are of kind `Manifest` and
//! name the per-bundle manifests for that release.
//!
//! Wire format, tab separated:
//!
//! ```text
//! MANIFEST <format>
//! version:     <version>
//! filecount:   <n>
//! timestamp:   <unix-seconds>
//! contentsize: <bytes>
//! includes:    <component>     (repeated)
//! also-add:    <component>     (repeated; optional includes)
//!
//! <flags> <hash> <last_change> <path>
//! ```
//!
//! `<flags>` is four characters: type `F|D|L|M|.`, status `.|d` (deleted),
//! modifier `.|C` (do-not-update) or `I` (ignored by update), misc `.|e`
//! (experimental).

use crate::error::{Error, Result};
use crate::hash::Hash;
use std::path::{Path, PathBuf};

/// What a record names on disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileKind {
    File,
    Directory,
    Symlink,
    /// MoM entries: a reference to a per-bundle manifest.
    Manifest,
}

/// Immutable descriptor of one path in one manifest version.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileRecord {
    /// Absolute path in the target tree (bare component name for MoM
    /// entries).
    pub path: PathBuf,
    pub hash: Hash,
    pub kind: FileKind,
    /// The path must not exist after reconciliation. Carries `Hash::zero()`.
    pub is_deleted: bool,
    pub do_not_update: bool,
    pub is_ignored: bool,
    pub is_experimental: bool,
    /// Version at which this record was introduced.
    pub last_change: u32,
}

impl FileRecord {
    /// True when reconciliation is allowed to stage and rename this record.
    pub fn is_mutable(&self) -> bool {
        !self.is_deleted && !self.do_not_update && !self.is_ignored
    }

    /// Record name as a string; used for MoM entries.
    pub fn name(&self) -> &str {
        self.path.to_str().unwrap_or_default()
    }
}

/// Parsed bundle description.
#[derive(Debug, Clone)]
pub struct Manifest {
    /// Bundle name; globally unique. `"MoM"` for the top-level index.
    pub component: String,
    pub format: u32,
    pub version: u32,
    pub timestamp: i64,
    /// Sum of live file sizes, as declared by the publisher.
    pub contentsize: u64,
    /// Mandatory dependencies.
    pub includes: Vec<String>,
    /// Optional dependencies, installed unless the caller opts out.
    pub optional: Vec<String>,
    /// Set from the owning MoM record when loaded through the store.
    pub is_experimental: bool,
    /// Records, sorted by path, unique by path.
    pub files: Vec<FileRecord>,
}

impl Manifest {
    /// Parse the wire format. `component` is the requester's name for this
    /// manifest; the format does not repeat it.
    pub fn parse(component: &str, input: &str) -> Result<Manifest> {
        let mut lines = input.lines();

        let first = lines
            .next()
            .ok_or_else(|| Error::Parse(format!("{}: empty manifest", component)))?;
        let format = match first.split_once('\t') {
            Some(("MANIFEST", value)) => value.trim().parse::<u32>().map_err(|_| {
                Error::Parse(format!("{}: malformed format \"{}\"", component, value))
            })?,
            _ => {
                return Err(Error::Parse(format!(
                    "{}: missing MANIFEST header",
                    component
                )))
            }
        };

        let mut manifest = Manifest {
            component: component.to_string(),
            format,
            version: 0,
            timestamp: 0,
            contentsize: 0,
            includes: Vec::new(),
            optional: Vec::new(),
            is_experimental: false,
            files: Vec::new(),
        };

        let mut filecount: Option<usize> = None;

        // Header fields until the blank separator line.
        for line in lines.by_ref() {
            if line.is_empty() {
                break;
            }
            let (key, value) = line.split_once('\t').ok_or_else(|| {
                Error::Parse(format!("{}: malformed header line \"{}\"", component, line))
            })?;
            let value = value.trim();
            match key {
                "version:" => manifest.version = parse_number(component, "version", value)?,
                "filecount:" => {
                    filecount = Some(parse_number::<usize>(component, "filecount", value)?)
                }
                "timestamp:" => manifest.timestamp = parse_number(component, "timestamp", value)?,
                "contentsize:" => {
                    manifest.contentsize = parse_number(component, "contentsize", value)?
                }
                "includes:" => manifest.includes.push(value.to_string()),
                "also-add:" => manifest.optional.push(value.to_string()),
                // Unknown header fields are skipped so newer servers can
                // add fields without breaking older clients.
                _ => {}
            }
        }

        if manifest.includes.iter().any(|name| name == component) {
            return Err(Error::Parse(format!(
                "{}: manifest includes itself",
                component
            )));
        }

        for line in lines {
            if line.is_empty() {
                continue;
            }
            manifest.files.push(parse_record(component, line)?);
        }

        if let Some(expected) = filecount {
            if expected != manifest.files.len() {
                return Err(Error::Parse(format!(
                    "{}: filecount {} does not match {} records",
                    component,
                    expected,
                    manifest.files.len()
                )));
            }
        }

        manifest.files.sort_by(|a, b| a.path.cmp(&b.path));
        for pair in manifest.files.windows(2) {
            if pair[0].path == pair[1].path {
                return Err(Error::Parse(format!(
                    "{}: duplicate path {}",
                    component,
                    pair[0].path.display()
                )));
            }
        }

        Ok(manifest)
    }

    /// Look up a record by path.
    pub fn file(&self, path: &Path) -> Option<&FileRecord> {
        self.files
            .binary_search_by(|record| record.path.as_path().cmp(path))
            .ok()
            .map(|index| &self.files[index])
    }

    /// Look up a sub-manifest reference by bundle name. Only meaningful on
    /// the MoM.
    pub fn bundle(&self, name: &str) -> Option<&FileRecord> {
        self.files
            .iter()
            .find(|record| record.kind == FileKind::Manifest && record.name() == name)
    }

    /// Bundle names listed by this MoM.
    pub fn bundle_names(&self) -> impl Iterator<Item = &FileRecord> {
        self.files
            .iter()
            .filter(|record| record.kind == FileKind::Manifest)
    }
}

fn parse_number<T: std::str::FromStr>(component: &str, field: &str, value: &str) -> Result<T> {
    value
        .parse::<T>()
        .map_err(|_| Error::Parse(format!("{}: malformed {} \"{}\"", component, field, value)))
}

fn parse_record(component: &str, line: &str) -> Result<FileRecord> {
    let mut fields = line.splitn(4, '\t');
    let (Some(flags), Some(hash), Some(last_change), Some(path)) = (
        fields.next(),
        fields.next(),
        fields.next(),
        fields.next(),
    ) else {
        return Err(Error::Parse(format!(
            "{}: malformed record \"{}\"",
            component, line
        )));
    };

    let mut chars = flags.chars();
    let (Some(kind_char), Some(status), Some(modifier), Some(misc), None) = (
        chars.next(),
        chars.next(),
        chars.next(),
        chars.next(),
        chars.next(),
    ) else {
        return Err(Error::Parse(format!(
            "{}: malformed flags \"{}\"",
            component, flags
        )));
    };

    let kind = match kind_char {
        'F' | '.' => FileKind::File,
        'D' => FileKind::Directory,
        'L' => FileKind::Symlink,
        'M' => FileKind::Manifest,
        other => {
            return Err(Error::Parse(format!(
                "{}: unknown record type '{}'",
                component, other
            )))
        }
    };

    Ok(FileRecord {
        path: PathBuf::from(path),
        hash: hash
            .parse::<Hash>()
            .map_err(|e| Error::Parse(format!("{}: {}: {}", component, path, e)))?,
        kind,
        is_deleted: status == 'd',
        do_not_update: modifier == 'C',
        is_ignored: modifier == 'I',
        is_experimental: misc == 'e',
        last_change: parse_number(component, "last_change", last_change)?,
    })
}
