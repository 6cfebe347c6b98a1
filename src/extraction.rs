//! Extraction collaborator — external unrar invocation
//!
//! Extraction is advisory: a failed or warned extraction is recorded in the
//! job report, but the assembled files stay available either way.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::process::Command;
use tracing::{debug, warn};

use crate::error::{Error, Result};

/// Outcome of an extraction-tool invocation, mapped from its exit code.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ExtractOutcome {
    /// Exit 0 — archive extracted cleanly
    Success,
    /// Exit 1 — extracted with non-fatal warnings
    Warning,
    /// Exit >1 — extraction failed with the given description
    Failed {
        /// Raw exit code from the tool
        code: i32,
        /// Documented meaning of the exit code
        message: String,
    },
}

impl ExtractOutcome {
    /// Map a process exit code onto its documented meaning.
    pub fn from_exit_code(code: i32) -> Self {
        match code {
            0 => ExtractOutcome::Success,
            1 => ExtractOutcome::Warning,
            other => ExtractOutcome::Failed {
                code: other,
                message: describe_exit_code(other).to_string(),
            },
        }
    }

    /// Whether the archive contents were extracted (possibly with warnings).
    pub fn succeeded(&self) -> bool {
        !matches!(self, ExtractOutcome::Failed { .. })
    }
}

/// Documented unrar exit-code meanings.
fn describe_exit_code(code: i32) -> &'static str {
    match code {
        0 => "Successful operation",
        1 => "Warning. Non fatal error(s) occurred",
        2 => "A fatal error occurred",
        3 => "Invalid checksum. Data is damaged",
        4 => "Attempt to modify a locked archive",
        5 => "Write error",
        6 => "File open error",
        7 => "Wrong command line option",
        8 => "Not enough memory",
        9 => "File create error",
        10 => "No files matching the specified mask and options were found",
        11 => "Wrong password",
        255 => "User break",
        _ => "Unknown error",
    }
}

/// Trait for the external extraction tool.
#[async_trait]
pub trait ExtractTool: Send + Sync {
    /// Extract the archives under `archive_dir` into `dest_dir`.
    ///
    /// # Errors
    ///
    /// Returns an error only when the tool could not be executed at all;
    /// tool-reported failures come back as an [`ExtractOutcome`].
    async fn extract(
        &self,
        archive_dir: &Path,
        dest_dir: &Path,
        password: Option<&str>,
    ) -> Result<ExtractOutcome>;

    /// Human-readable name for logging
    fn name(&self) -> &'static str;
}

/// CLI-based extraction tool using the external unrar binary
///
/// Runs `unrar x -o+ [-p<password>] <archive_dir>/*.rar <dest_dir>`.
pub struct UnrarCli {
    binary_path: PathBuf,
}

impl UnrarCli {
    /// Create a handler with an explicit binary path.
    pub fn new(binary_path: PathBuf) -> Self {
        Self { binary_path }
    }

    /// Attempt to find unrar in PATH.
    pub fn from_path() -> Option<Self> {
        which::which("unrar").ok().map(Self::new)
    }
}

#[async_trait]
impl ExtractTool for UnrarCli {
    async fn extract(
        &self,
        archive_dir: &Path,
        dest_dir: &Path,
        password: Option<&str>,
    ) -> Result<ExtractOutcome> {
        let mut command = Command::new(&self.binary_path);
        command.arg("x").arg("-o+");
        if let Some(password) = password {
            command.arg(format!("-p{password}"));
        }
        command.arg(archive_dir.join("*.rar"));
        command.arg(dest_dir);

        debug!(?archive_dir, ?dest_dir, "running unrar extraction");

        let output = command
            .output()
            .await
            .map_err(|e| Error::ExternalTool(format!("failed to execute unrar: {e}")))?;

        let outcome = match output.status.code() {
            Some(code) => ExtractOutcome::from_exit_code(code),
            None => {
                return Err(Error::ExternalTool(
                    "unrar terminated by signal".to_string(),
                ));
            }
        };

        Ok(outcome)
    }

    fn name(&self) -> &'static str {
        "cli-unrar"
    }
}

/// Delete archive volumes from `dir` after a successful extraction.
///
/// Removal failures are logged and skipped; leftover volumes are not worth
/// failing a finished job over.
pub async fn delete_archives(dir: &Path) -> Result<u64> {
    let mut deleted = 0;

    let mut entries = tokio::fs::read_dir(dir).await?;
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        let metadata = entry.metadata().await?;
        if metadata.is_file()
            && let Some(ext) = path.extension()
            && ext.eq_ignore_ascii_case("rar")
        {
            match tokio::fs::remove_file(&path).await {
                Ok(()) => deleted += 1,
                Err(e) => {
                    warn!(?path, error = %e, "unable to remove archive volume");
                }
            }
        }
    }

    Ok(deleted)
}
