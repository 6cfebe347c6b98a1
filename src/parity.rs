//! Repair collaborator — external par2 invocation
//!
//! The pipeline never parses recovery data itself; it locates the first
//! recovery file by naming pattern and hands the working directory to the
//! external tool. Only the tool's exit code is interpreted.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::process::Command;
use tracing::debug;

use crate::error::{Error, Result};

/// Outcome of a repair-tool invocation, mapped from its exit code.
///
/// Only [`RepairNotPossible`](RepairOutcome::RepairNotPossible) and
/// [`InvalidArguments`](RepairOutcome::InvalidArguments) are fatal to the
/// pipeline; every other outcome proceeds with whatever the tool left on
/// disk.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RepairOutcome {
    /// Exit 0 — all files verified or repaired
    Success,
    /// Exit 1 — repair is possible (tool was run in verify-only mode)
    RepairPossible,
    /// Exit 2 — not enough recovery data to repair
    RepairNotPossible,
    /// Exit 3 — the tool rejected its command line
    InvalidArguments,
    /// Exit 4 — insufficient critical data to verify
    InsufficientData,
    /// Exit 5 — repair was attempted and failed
    RepairFailed,
    /// Exit 6 — file I/O error
    FileIoError,
    /// Exit 7 — internal logic error
    LogicError,
    /// Exit 8 — out of memory
    OutOfMemory,
    /// Any exit code outside the documented set
    Unknown(i32),
}

impl RepairOutcome {
    /// Map a process exit code onto its documented meaning.
    pub fn from_exit_code(code: i32) -> Self {
        match code {
            0 => RepairOutcome::Success,
            1 => RepairOutcome::RepairPossible,
            2 => RepairOutcome::RepairNotPossible,
            3 => RepairOutcome::InvalidArguments,
            4 => RepairOutcome::InsufficientData,
            5 => RepairOutcome::RepairFailed,
            6 => RepairOutcome::FileIoError,
            7 => RepairOutcome::LogicError,
            8 => RepairOutcome::OutOfMemory,
            other => RepairOutcome::Unknown(other),
        }
    }

    /// Human-readable description of the outcome.
    pub fn describe(&self) -> String {
        match self {
            RepairOutcome::Success => "Success".into(),
            RepairOutcome::RepairPossible => "Repair possible".into(),
            RepairOutcome::RepairNotPossible => "Repair not possible".into(),
            RepairOutcome::InvalidArguments => "Invalid command line arguments".into(),
            RepairOutcome::InsufficientData => "Insufficient critical data to verify".into(),
            RepairOutcome::RepairFailed => "Repair failed".into(),
            RepairOutcome::FileIoError => "FileIO error".into(),
            RepairOutcome::LogicError => "Logic error".into(),
            RepairOutcome::OutOfMemory => "Out of memory".into(),
            RepairOutcome::Unknown(code) => format!("Unknown error (exit code {code})"),
        }
    }

    /// Whether this outcome must abort the pipeline.
    ///
    /// An unrepairable payload and a rejected invocation are the only
    /// outcomes repair cannot proceed past.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            RepairOutcome::RepairNotPossible | RepairOutcome::InvalidArguments
        )
    }
}

/// Trait for the external repair tool.
#[async_trait]
pub trait RepairTool: Send + Sync {
    /// Run a repair against the given recovery file.
    ///
    /// # Errors
    ///
    /// Returns an error only when the tool could not be executed at all;
    /// tool-reported failures come back as a [`RepairOutcome`].
    async fn repair(&self, recovery_file: &Path) -> Result<RepairOutcome>;

    /// Human-readable name for logging
    fn name(&self) -> &'static str;
}

/// CLI-based repair tool using the external par2 binary
///
/// Runs `par2 r -q [-p] <recovery-file>`; `-p` purges recovery files after
/// a successful repair.
pub struct Par2Cli {
    binary_path: PathBuf,
    purge: bool,
}

impl Par2Cli {
    /// Create a handler with an explicit binary path.
    pub fn new(binary_path: PathBuf, purge: bool) -> Self {
        Self { binary_path, purge }
    }

    /// Attempt to find par2 in PATH.
    pub fn from_path(purge: bool) -> Option<Self> {
        which::which("par2").ok().map(|p| Self::new(p, purge))
    }
}

#[async_trait]
impl RepairTool for Par2Cli {
    async fn repair(&self, recovery_file: &Path) -> Result<RepairOutcome> {
        let mut command = Command::new(&self.binary_path);
        command.arg("r").arg("-q");
        if self.purge {
            command.arg("-p");
        }
        command.arg(recovery_file);

        debug!(?recovery_file, purge = self.purge, "running par2 repair");

        let output = command
            .output()
            .await
            .map_err(|e| Error::ExternalTool(format!("failed to execute par2: {e}")))?;

        let outcome = match output.status.code() {
            Some(code) => RepairOutcome::from_exit_code(code),
            None => {
                return Err(Error::ExternalTool(
                    "par2 terminated by signal".to_string(),
                ));
            }
        };

        Ok(outcome)
    }

    fn name(&self) -> &'static str {
        "cli-par2"
    }
}

/// Find the recovery file to hand to the repair tool.
///
/// Scans `dir` for `*.par2` entries and returns the first, preferring base
/// recovery files over `.vol` volumes. Returns `None` when the directory
/// holds no recovery files.
pub async fn find_recovery_file(dir: &Path) -> Result<Option<PathBuf>> {
    let mut recovery_files = Vec::new();

    let mut entries = tokio::fs::read_dir(dir).await?;
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        let metadata = entry.metadata().await?;
        if metadata.is_file()
            && let Some(ext) = path.extension()
            && ext.eq_ignore_ascii_case("par2")
        {
            recovery_files.push(path);
        }
    }

    recovery_files.sort_by(|a, b| {
        let a_is_vol = a
            .file_name()
            .and_then(|n| n.to_str())
            .map(|s| s.contains(".vol"))
            .unwrap_or(false);
        let b_is_vol = b
            .file_name()
            .and_then(|n| n.to_str())
            .map(|s| s.contains(".vol"))
            .unwrap_or(false);

        match (a_is_vol, b_is_vol) {
            (false, true) => std::cmp::Ordering::Less,
            (true, false) => std::cmp::Ordering::Greater,
            _ => a.cmp(b),
        }
    });

    Ok(recovery_files.into_iter().next())
}
