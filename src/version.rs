// src/version.rs

//! Current OS version detection.
//!
//! The installed image records its version in `<prefix>/usr/lib/os-release`
//! as a `VERSION_ID` field. That value names the MoM to reconcile against.

use crate::context::Context;
use crate::error::{Error, Result};
use std::fs;

const OS_RELEASE: &str = "usr/lib/os-release";

/// Read the current OS version from the target tree.
pub fn current_version(ctx: &Context) -> Result<u32> {
    let path = ctx.path_prefix.join(OS_RELEASE);
    let content = fs::read_to_string(&path).map_err(|e| {
        Error::CurrentVersionUnknown(format!("cannot read {}: {}", path.display(), e))
    })?;

    for line in content.lines() {
        let Some(value) = line.strip_prefix("VERSION_ID=") else {
            continue;
        };
        let value = value.trim().trim_matches('"');
        return value.parse::<u32>().map_err(|_| {
            Error::CurrentVersionUnknown(format!("malformed VERSION_ID \"{}\"", value))
        });
    }

    Err(Error::CurrentVersionUnknown(format!(
        "no VERSION_ID in {}",
        path.display()
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn context_with_os_release(content: &str) -> (TempDir, Context) {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path().join("root");
        fs::create_dir_all(root.join("usr/lib")).unwrap();
        fs::write(root.join(OS_RELEASE), content).unwrap();
        let ctx = Context::new(root, tmp.path().join("state"));
        (tmp, ctx)
    }

    #[test]
    fn test_plain_version() {
        let (_tmp, ctx) = context_with_os_release("NAME=test\nVERSION_ID=1440\n");
        assert_eq!(current_version(&ctx).unwrap(), 1440);
    }

    #[test]
    fn test_quoted_version() {
        let (_tmp, ctx) = context_with_os_release("VERSION_ID=\"90\"\n");
        assert_eq!(current_version(&ctx).unwrap(), 90);
    }

    #[test]
    fn test_missing_field() {
        let (_tmp, ctx) = context_with_os_release("NAME=test\n");
        assert!(matches!(
            current_version(&ctx),
            Err(Error::CurrentVersionUnknown(_))
        ));
    }

    #[test]
    fn test_missing_file() {
        let tmp = TempDir::new().unwrap();
        let ctx = Context::new(tmp.path().join("root"), tmp.path().join("state"));
        assert!(matches!(
            current_version(&ctx),
            Err(Error::CurrentVersionUnknown(_))
        ));
    }

    #[test]
    fn test_malformed_version() {
        let (_tmp, ctx) = context_with_os_release("VERSION_ID=latest\n");
        assert!(matches!(
            current_version(&ctx),
            Err(Error::CurrentVersionUnknown(_))
        ));
    }
}
