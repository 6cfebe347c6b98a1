//! File writer pool — positioned assembly of destination files
//!
//! One writer per distinct destination filename, registered exactly once on
//! first sight of that name. Each writer runs as a blocking thread draining
//! a bounded fragment queue and position-writing payloads, so out-of-order
//! arrival across workers never matters.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Mutex, PoisonError};

use tokio::sync::mpsc;
use tracing::{debug, error, warn};

use crate::error::{Error, Result};
use crate::types::Fragment;

/// Cross-platform positional file write.
///
/// Writes `buf` to `file` at the given byte `offset`, equivalent to Unix
/// `pwrite`.
#[cfg(unix)]
fn write_all_at(file: &std::fs::File, buf: &[u8], offset: u64) -> std::io::Result<()> {
    use std::os::unix::fs::FileExt;
    file.write_all_at(buf, offset)
}

/// Cross-platform positional file write.
///
/// Writes `buf` to `file` at the given byte `offset`, equivalent to Unix
/// `pwrite`.
#[cfg(windows)]
fn write_all_at(file: &std::fs::File, buf: &[u8], offset: u64) -> std::io::Result<()> {
    use std::os::windows::fs::FileExt;
    let mut written = 0;
    while written < buf.len() {
        let n = file.seek_write(&buf[written..], offset + written as u64)?;
        if n == 0 {
            return Err(std::io::Error::new(
                std::io::ErrorKind::WriteZero,
                "failed to write whole buffer",
            ));
        }
        written += n;
    }
    Ok(())
}

/// Cross-platform positional file write.
#[cfg(not(any(unix, windows)))]
fn write_all_at(_file: &std::fs::File, _buf: &[u8], _offset: u64) -> std::io::Result<()> {
    Err(std::io::Error::new(
        std::io::ErrorKind::Unsupported,
        "positional writes not supported on this platform",
    ))
}

struct PoolInner {
    senders: HashMap<String, mpsc::Sender<Fragment>>,
    handles: Vec<tokio::task::JoinHandle<()>>,
}

/// Registry of per-file writers, keyed by destination filename.
///
/// The registry lock guarantees the "run exactly once" property: however
/// many workers see a new filename concurrently, exactly one writer thread
/// is started for it.
pub(crate) struct WriterPool {
    dir: PathBuf,
    queue_capacity: usize,
    inner: Mutex<PoolInner>,
}

impl WriterPool {
    /// Create a pool writing into `dir` with the given per-file queue depth.
    pub(crate) fn new(dir: PathBuf, queue_capacity: usize) -> Self {
        Self {
            dir,
            queue_capacity: queue_capacity.max(1),
            inner: Mutex::new(PoolInner {
                senders: HashMap::new(),
                handles: Vec::new(),
            }),
        }
    }

    /// Hand a fragment to the writer owning its destination file, starting
    /// that writer if this is the first fragment for the name.
    ///
    /// Blocks (asynchronously) when the destination's queue is full —
    /// back-pressure against decode outpacing disk I/O.
    pub(crate) async fn route(&self, fragment: Fragment) -> Result<()> {
        let sender = self.sender_for(&fragment.filename);
        sender.send(fragment).await.map_err(|e| {
            Error::Io(std::io::Error::other(format!(
                "writer queue closed for \"{}\"",
                e.0.filename
            )))
        })
    }

    /// Get the queue for a destination name, registering its writer on
    /// first sight. The registry lock is never held across an await.
    fn sender_for(&self, name: &str) -> mpsc::Sender<Fragment> {
        let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(sender) = inner.senders.get(name) {
            return sender.clone();
        }

        let (tx, rx) = mpsc::channel(self.queue_capacity);
        let path = self.dir.join(name);
        let filename = name.to_string();
        inner
            .handles
            .push(tokio::task::spawn_blocking(move || write_file(rx, path, filename)));
        inner.senders.insert(name.to_string(), tx.clone());
        tx
    }

    /// Number of writers started so far.
    pub(crate) fn writer_count(&self) -> usize {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .senders
            .len()
    }

    /// Close every writer queue and wait for the writers to drain and exit.
    pub(crate) async fn close(&self) {
        let handles = {
            let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
            inner.senders.clear();
            std::mem::take(&mut inner.handles)
        };

        for result in futures::future::join_all(handles).await {
            if let Err(e) = result {
                error!(error = %e, "file writer panicked");
            }
        }
    }
}

/// Writer loop: drain the fragment queue, position-writing each payload.
///
/// Runs on a blocking thread. The destination file is preallocated to its
/// declared size the first time a fragment carries one (sparse file). A
/// failed write is a warning, not an item failure — the repair pass is the
/// recovery mechanism for damaged output. A file that cannot be opened at
/// all drains its queue discarding fragments so no producer blocks forever.
fn write_file(mut rx: mpsc::Receiver<Fragment>, path: PathBuf, filename: String) {
    debug!(file = %filename, "start writing file");

    let file = match std::fs::OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(false)
        .open(&path)
    {
        Ok(file) => file,
        Err(e) => {
            error!(file = %filename, error = %e, "unable to create destination file");
            while rx.blocking_recv().is_some() {}
            return;
        }
    };

    let mut preallocated = false;

    while let Some(fragment) = rx.blocking_recv() {
        if !preallocated && fragment.file_size > 0 {
            if let Err(e) = file.set_len(fragment.file_size) {
                warn!(file = %filename, size = fragment.file_size, error = %e,
                    "unable to preallocate destination file");
            }
            preallocated = true;
        }

        if let Err(e) = write_all_at(&file, &fragment.data, fragment.offset) {
            warn!(
                file = %filename,
                offset = fragment.offset,
                len = fragment.data.len(),
                error = %e,
                "unable to write fragment to destination file"
            );
        }
    }

    debug!(file = %filename, "writer finished");
}
