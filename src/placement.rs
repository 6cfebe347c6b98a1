//! Placement collaborator — relocate assembled files to their destination
//!
//! Invoked exactly once at the end of a pipeline, whether it finished clean
//! or fatal: whatever was assembled belongs to the caller.

use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::error::Result;

/// Move every file under `source` (recursively) into `dest`, flat.
///
/// `dest` is created if missing. Files keep their base name; directory
/// structure under `source` is not preserved (the working tree is flat in
/// practice — one file per reconstructed destination name plus tool
/// leftovers).
///
/// Returns the number of files moved.
///
/// # Errors
///
/// Returns the first I/O error encountered; files moved before the failure
/// stay moved.
pub async fn relocate(source: &Path, dest: &Path) -> Result<u64> {
    tokio::fs::create_dir_all(dest).await?;

    info!(?source, ?dest, "moving files to destination");

    let mut moved = 0;
    let mut pending: Vec<PathBuf> = vec![source.to_path_buf()];

    while let Some(dir) = pending.pop() {
        let mut entries = tokio::fs::read_dir(&dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            let metadata = entry.metadata().await?;
            if metadata.is_dir() {
                pending.push(path);
            } else if let Some(name) = path.file_name() {
                let target = dest.join(name);
                debug!(from = ?path, to = ?target, "moving file");
                tokio::fs::rename(&path, &target).await?;
                moved += 1;
            }
        }
    }

    Ok(moved)
}
