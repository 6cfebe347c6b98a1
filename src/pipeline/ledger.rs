//! Missing-part ledger and per-pass counters

use std::sync::{Mutex, PoisonError};
use std::sync::atomic::{AtomicU64, Ordering};

/// Append-only record of article identifiers that could not be resolved in
/// the current pass.
///
/// An identifier lands here when its fetch-retry budget is exhausted, its
/// body fails to decode, or its re-submission found the work queue closed.
/// Every pass starts with a fresh, empty ledger.
#[derive(Debug, Default)]
pub(crate) struct MissingLedger {
    parts: Mutex<Vec<String>>,
}

impl MissingLedger {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Record an unresolved identifier.
    pub(crate) fn add(&self, message_id: impl Into<String>) {
        self.parts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(message_id.into());
    }

    pub(crate) fn len(&self) -> usize {
        self.parts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Snapshot the identifiers recorded so far.
    pub(crate) fn snapshot(&self) -> Vec<String> {
        self.parts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

/// Atomic counters scoped to one pass.
#[derive(Debug, Default)]
pub(crate) struct PassCounters {
    /// Fragments fetched, decoded and routed to a writer
    pub(crate) fragments_loaded: AtomicU64,
    /// Decoded bytes routed to writers
    pub(crate) bytes_loaded: AtomicU64,
    /// Connection slots abandoned after exhausting connect retries
    pub(crate) failed_connections: AtomicU64,
}

impl PassCounters {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Record one loaded fragment; returns (fragments so far, bytes so far).
    pub(crate) fn record_fragment(&self, bytes: u64) -> (u64, u64) {
        let fragments = self.fragments_loaded.fetch_add(1, Ordering::Relaxed) + 1;
        let total_bytes = self.bytes_loaded.fetch_add(bytes, Ordering::Relaxed) + bytes;
        (fragments, total_bytes)
    }

    /// Record one abandoned connection slot; returns the new total.
    pub(crate) fn record_failed_connection(&self) -> u64 {
        self.failed_connections.fetch_add(1, Ordering::Relaxed) + 1
    }

    pub(crate) fn fragments(&self) -> u64 {
        self.fragments_loaded.load(Ordering::Relaxed)
    }

    pub(crate) fn bytes(&self) -> u64 {
        self.bytes_loaded.load(Ordering::Relaxed)
    }
}
