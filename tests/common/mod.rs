// tests/common/mod.rs

//! Shared fixture: a fake upstream content tree plus a target root and
//! state directory inside one tempdir.
//!
//! Bundles are described with a small builder, then `publish` writes the
//! full-file blobs, the per-bundle manifests and the MoM in the wire format
//! the client parses. Every bundle automatically carries its own marker
//! record under `/usr/share/clear/bundles/`, the way real releases do, so
//! reconciliation is what makes a bundle "installed".

#![allow(dead_code)]

use osmos::hash::{hash_bytes, Hash};
use osmos::progress::SilentProgress;
use osmos::{
    install_bundles, remove_bundles, Context, DirectoryFetcher, InstallSummary, ManifestStore,
    RemoveOptions, RemoveSummary,
};
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// The release version every fixture publishes.
pub const VERSION: u32 = 10;

pub struct Fixture {
    pub tmp: TempDir,
    pub ctx: Context,
    pub content: PathBuf,
}

impl Fixture {
    pub fn new() -> Fixture {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path().join("root");
        let state = tmp.path().join("state");
        let content = tmp.path().join("content");

        fs::create_dir_all(root.join("usr/lib")).unwrap();
        fs::write(
            root.join("usr/lib/os-release"),
            format!("NAME=\"Test OS\"\nVERSION_ID={}\n", VERSION),
        )
        .unwrap();

        // A provisioned system already tracks its base bundle; starting
        // populated keeps first-use seeding out of these tests' way.
        fs::create_dir_all(state.join("bundles")).unwrap();
        fs::write(state.join("bundles/os-core"), b"").unwrap();

        let ctx = Context::new(root, state);
        Fixture { tmp, ctx, content }
    }

    pub fn bundle(&self, name: &str) -> BundleSpec {
        BundleSpec::new(name)
    }

    /// Write blobs, manifests and the MoM for one release.
    pub fn publish(&self, bundles: &[BundleSpec]) {
        let dir = self.content.join(VERSION.to_string());
        let files_dir = dir.join("files");
        fs::create_dir_all(&files_dir).unwrap();

        let mut mom_entries = Vec::new();
        for spec in bundles {
            let body = spec.render(&files_dir);
            fs::write(dir.join(format!("Manifest.{}", spec.name)), &body).unwrap();
            mom_entries.push((
                spec.name.clone(),
                hash_bytes(body.as_bytes()),
                spec.experimental,
            ));
        }

        let mut mom = format!("MANIFEST\t1\nversion:\t{}\n\n", VERSION);
        for (name, hash, experimental) in mom_entries {
            let misc = if experimental { 'e' } else { '.' };
            mom.push_str(&format!("M..{}\t{}\t{}\t{}\n", misc, hash, VERSION, name));
        }
        fs::write(dir.join("Manifest.MoM"), mom).unwrap();
    }

    pub fn install(&self, names: &[&str]) -> osmos::Result<InstallSummary> {
        let fetcher = DirectoryFetcher::new(&self.content);
        let store = ManifestStore::new(&fetcher);
        let names: Vec<String> = names.iter().map(|s| s.to_string()).collect();
        install_bundles(&self.ctx, &store, &names, &SilentProgress::new())
    }

    pub fn remove(&self, names: &[&str], force: bool) -> osmos::Result<RemoveSummary> {
        let fetcher = DirectoryFetcher::new(&self.content);
        let store = ManifestStore::new(&fetcher);
        let names: Vec<String> = names.iter().map(|s| s.to_string()).collect();
        remove_bundles(
            &self.ctx,
            &store,
            &names,
            &RemoveOptions { force },
            &SilentProgress::new(),
        )
    }

    /// Location of a record path inside the target root.
    pub fn target(&self, path: &str) -> PathBuf {
        self.ctx.to_target(Path::new(path))
    }

    pub fn is_installed(&self, name: &str) -> bool {
        self.ctx.is_installed_bundle(name)
    }

    pub fn is_tracked(&self, name: &str) -> bool {
        self.ctx.tracking_dir().join(name).exists()
    }
}

enum Entry {
    File {
        path: String,
        content: Vec<u8>,
        modifier: char,
    },
    Dir {
        path: String,
    },
    Symlink {
        path: String,
        target: String,
    },
    Deleted {
        path: String,
    },
}

pub struct BundleSpec {
    name: String,
    includes: Vec<String>,
    optional: Vec<String>,
    experimental: bool,
    contentsize: Option<u64>,
    entries: Vec<Entry>,
}

impl BundleSpec {
    fn new(name: &str) -> Self {
        BundleSpec {
            name: name.to_string(),
            includes: Vec::new(),
            optional: Vec::new(),
            experimental: false,
            contentsize: None,
            entries: Vec::new(),
        }
    }

    pub fn include(mut self, name: &str) -> Self {
        self.includes.push(name.to_string());
        self
    }

    pub fn optional(mut self, name: &str) -> Self {
        self.optional.push(name.to_string());
        self
    }

    pub fn experimental(mut self) -> Self {
        self.experimental = true;
        self
    }

    /// Override the declared contentsize (for disk admission tests).
    pub fn contentsize(mut self, size: u64) -> Self {
        self.contentsize = Some(size);
        self
    }

    pub fn file(mut self, path: &str, content: &[u8]) -> Self {
        self.entries.push(Entry::File {
            path: path.to_string(),
            content: content.to_vec(),
            modifier: '.',
        });
        self
    }

    pub fn do_not_update_file(mut self, path: &str, content: &[u8]) -> Self {
        self.entries.push(Entry::File {
            path: path.to_string(),
            content: content.to_vec(),
            modifier: 'C',
        });
        self
    }

    pub fn dir(mut self, path: &str) -> Self {
        self.entries.push(Entry::Dir {
            path: path.to_string(),
        });
        self
    }

    pub fn symlink(mut self, path: &str, target: &str) -> Self {
        self.entries.push(Entry::Symlink {
            path: path.to_string(),
            target: target.to_string(),
        });
        self
    }

    pub fn deleted(mut self, path: &str) -> Self {
        self.entries.push(Entry::Deleted {
            path: path.to_string(),
        });
        self
    }

    /// Render the manifest body, writing full-file blobs as a side effect.
    fn render(&self, files_dir: &Path) -> String {
        let mut records: Vec<(String, String)> = Vec::new();
        let mut total_size = 0u64;

        // The bundle's own installed marker.
        let marker_path = format!("/usr/share/clear/bundles/{}", self.name);
        let marker_hash = write_blob(files_dir, self.name.as_bytes());
        records.push((marker_path, format!("F...\t{}\t{}", marker_hash, VERSION)));
        total_size += self.name.len() as u64;

        for entry in &self.entries {
            match entry {
                Entry::File {
                    path,
                    content,
                    modifier,
                } => {
                    let hash = write_blob(files_dir, content);
                    total_size += content.len() as u64;
                    records.push((
                        path.clone(),
                        format!("F.{}.\t{}\t{}", modifier, hash, VERSION),
                    ));
                }
                Entry::Dir { path } => {
                    let hash = hash_bytes(format!("dir:{}", path).as_bytes());
                    records.push((path.clone(), format!("D...\t{}\t{}", hash, VERSION)));
                }
                Entry::Symlink { path, target } => {
                    let hash = write_blob(files_dir, target.as_bytes());
                    records.push((path.clone(), format!("L...\t{}\t{}", hash, VERSION)));
                }
                Entry::Deleted { path } => {
                    records.push((
                        path.clone(),
                        format!(".d..\t{}\t{}", Hash::zero(), VERSION),
                    ));
                }
            }
        }

        records.sort_by(|a, b| a.0.cmp(&b.0));

        let mut body = format!(
            "MANIFEST\t1\nversion:\t{}\nfilecount:\t{}\ntimestamp:\t1700000000\ncontentsize:\t{}\n",
            VERSION,
            records.len(),
            self.contentsize.unwrap_or(total_size),
        );
        for include in &self.includes {
            body.push_str(&format!("includes:\t{}\n", include));
        }
        for optional in &self.optional {
            body.push_str(&format!("also-add:\t{}\n", optional));
        }
        body.push('\n');
        for (path, prefix) in records {
            body.push_str(&format!("{}\t{}\n", prefix, path));
        }
        body
    }
}

fn write_blob(files_dir: &Path, content: &[u8]) -> Hash {
    let hash = hash_bytes(content);
    fs::write(files_dir.join(hash.as_str()), content).unwrap();
    hash
}
