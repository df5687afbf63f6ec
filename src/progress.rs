// src/progress.rs

//! Progress reporting for long-running operations.
//!
//! The `ProgressTracker` trait is the single interface operations report
//! through. Implementations: `CliProgress` (indicatif bar), `LogProgress`
//! (tracing, for non-interactive runs), `SilentProgress` (no-op).

use indicatif::ProgressBar;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use tracing::info;

pub trait ProgressTracker {
    /// Set the current status message.
    fn set_message(&self, message: &str);

    /// Advance by `amount` steps.
    fn increment(&self, amount: u64);

    /// Set the total number of steps.
    fn set_length(&self, length: u64);

    fn position(&self) -> u64;

    /// Finish successfully with a message.
    fn finish_with_message(&self, message: &str);
}

/// No-op tracker for quiet or scripted use.
#[derive(Debug, Default)]
pub struct SilentProgress {
    position: AtomicU64,
    length: AtomicU64,
}

impl SilentProgress {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ProgressTracker for SilentProgress {
    fn set_message(&self, _message: &str) {}

    fn increment(&self, amount: u64) {
        self.position.fetch_add(amount, Ordering::Relaxed);
    }

    fn set_length(&self, length: u64) {
        self.length.store(length, Ordering::Relaxed);
    }

    fn position(&self) -> u64 {
        self.position.load(Ordering::Relaxed)
    }

    fn finish_with_message(&self, _message: &str) {}
}

/// Logs progress at intervals; useful when there is no terminal.
#[derive(Debug)]
pub struct LogProgress {
    name: String,
    position: AtomicU64,
    length: AtomicU64,
    finished: AtomicBool,
}

impl LogProgress {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            position: AtomicU64::new(0),
            length: AtomicU64::new(0),
            finished: AtomicBool::new(false),
        }
    }
}

impl ProgressTracker for LogProgress {
    fn set_message(&self, message: &str) {
        info!("{}: {}", self.name, message);
    }

    fn increment(&self, amount: u64) {
        let old = self.position.fetch_add(amount, Ordering::Relaxed);
        let new = old + amount;
        let length = self.length.load(Ordering::Relaxed);

        // Log roughly ten times per operation.
        if length > 0 {
            let interval = std::cmp::max(1, length / 10);
            if new / interval > old / interval {
                info!("{}: {}% ({}/{})", self.name, (new * 100) / length, new, length);
            }
        }
    }

    fn set_length(&self, length: u64) {
        self.length.store(length, Ordering::Relaxed);
    }

    fn position(&self) -> u64 {
        self.position.load(Ordering::Relaxed)
    }

    fn finish_with_message(&self, message: &str) {
        if !self.finished.swap(true, Ordering::Relaxed) {
            info!("{}: {}", self.name, message);
        }
    }
}

/// Visual progress bar for interactive terminals.
pub struct CliProgress {
    bar: ProgressBar,
}

impl CliProgress {
    pub fn new() -> Self {
        Self {
            bar: ProgressBar::new(0),
        }
    }
}

impl Default for CliProgress {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressTracker for CliProgress {
    fn set_message(&self, message: &str) {
        self.bar.set_message(message.to_string());
    }

    fn increment(&self, amount: u64) {
        self.bar.inc(amount);
    }

    fn set_length(&self, length: u64) {
        self.bar.set_length(length);
    }

    fn position(&self) -> u64 {
        self.bar.position()
    }

    fn finish_with_message(&self, message: &str) {
        self.bar.finish_with_message(message.to_string());
    }
}
