// src/telemetry.rs

//! Best-effort operation telemetry.
//!
//! One record is spooled per operation, success or failure. Telemetry must
//! never affect the operation's outcome, so emission swallows its own
//! errors.

use crate::context::Context;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fs;
use tracing::debug;

#[derive(Debug, Serialize)]
pub struct Record<'a> {
    pub operation: &'a str,
    pub bundles: &'a [String],
    pub current_version: u32,
    pub result: i32,
    pub bytes: u64,
    pub timestamp: DateTime<Utc>,
}

impl<'a> Record<'a> {
    pub fn new(
        operation: &'a str,
        bundles: &'a [String],
        current_version: u32,
        result: i32,
        bytes: u64,
    ) -> Self {
        Self {
            operation,
            bundles,
            current_version,
            result,
            bytes,
            timestamp: Utc::now(),
        }
    }
}

/// Spool one record into the state directory.
pub fn emit(ctx: &Context, record: &Record<'_>) {
    if let Err(e) = write_record(ctx, record) {
        debug!("telemetry record not written: {}", e);
    }
}

fn write_record(ctx: &Context, record: &Record<'_>) -> std::io::Result<()> {
    let dir = ctx.telemetry_dir();
    fs::create_dir_all(&dir)?;

    let name = format!(
        "{}.{}.json",
        record.operation,
        record.timestamp.timestamp_millis()
    );
    let body = serde_json::to_vec(record)?;
    fs::write(dir.join(name), body)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_record_spooled() {
        let tmp = TempDir::new().unwrap();
        let ctx = Context::new(tmp.path().join("root"), tmp.path().join("state"));

        let bundles = vec![String::from("editor")];
        emit(&ctx, &Record::new("bundle-add", &bundles, 140, 0, 4096));

        let entries: Vec<_> = fs::read_dir(ctx.telemetry_dir())
            .unwrap()
            .map(|e| e.unwrap())
            .collect();
        assert_eq!(entries.len(), 1);

        let body = fs::read_to_string(entries[0].path()).unwrap();
        let value: serde_json::Value = serde_json::from_str(&body).unwrap();
        assert_eq!(value["operation"], "bundle-add");
        assert_eq!(value["current_version"], 140);
        assert_eq!(value["bytes"], 4096);
    }

    #[test]
    fn test_emit_never_fails() {
        // State dir path collides with an existing file: emission must
        // degrade silently.
        let tmp = TempDir::new().unwrap();
        let blocked = tmp.path().join("state");
        fs::write(&blocked, b"not a directory").unwrap();
        let ctx = Context::new(tmp.path().join("root"), &blocked);

        let bundles = vec![String::from("editor")];
        emit(&ctx, &Record::new("bundle-remove", &bundles, 1, 8, 0));
    }
}
