use std::path::PathBuf;

use tokio::sync::watch;

use crate::manifest::LinkSlot;

/// Cancellation token wrapper
#[derive(Clone)]
pub struct CancelToken {
    rx: watch::Receiver<bool>,
}

impl CancelToken {
    pub fn new(rx: watch::Receiver<bool>) -> Self {
        Self { rx }
    }

    /// Token that can never fire, for callers without a cancel source.
    pub fn disabled() -> Self {
        let (_tx, rx) = watch::channel(false);
        Self { rx }
    }

    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }
}

/// Which manifest document a rewritten link lives in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkTarget {
    Api,
    Mod,
}

/// What a single artifact task produced.
#[derive(Debug)]
pub enum TaskOutcome {
    /// File written and admitted. The slot should be rewritten to `url`
    /// once every task has joined.
    Written {
        target: LinkTarget,
        path: PathBuf,
        slot: LinkSlot,
        url: String,
    },

    /// Final archive exceeded the size ceiling; nothing was admitted and
    /// the link keeps its upstream value.
    Oversized { name: String },

    /// Fetch or write failed; the run continues without this artifact.
    Failed(FailedArtifact),
}

/// A task that did not produce its artifact.
#[derive(Debug)]
pub struct FailedArtifact {
    /// Declared mod name, or the platform for API binaries.
    pub name: String,
    pub url: String,
    pub error: anyhow::Error,
}

/// Result of one completed mirror run.
#[derive(Debug)]
pub struct MirrorSummary {
    pub revision: String,
    /// Number of artifact files written and hashed.
    pub written: usize,
    /// Stems of mods rejected by the size ceiling.
    pub oversized: Vec<String>,
    pub failed: Vec<FailedArtifact>,
}

/// Render a byte count for run reports, in powers of 1024.
pub fn format_size(size: u64) -> String {
    const UNITS: [&str; 4] = ["B", "KiB", "MiB", "GiB"];

    if size == 0 {
        return "0 B".to_string();
    }

    let mut exp = 0;
    let mut scaled = size;
    while scaled >= 1024 && exp < UNITS.len() - 1 {
        scaled /= 1024;
        exp += 1;
    }

    let value = size as f64 / 1024f64.powi(exp as i32);
    let mut text = format!("{:.2}", value);
    if text.contains('.') {
        while text.ends_with('0') {
            text.pop();
        }
        if text.ends_with('.') {
            text.pop();
        }
    }

    format!("{} {}", text, UNITS[exp])
}
