//! Core types for hashdl

use base64::Engine;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::parity::RepairOutcome;

/// The two article kinds a payload is published as.
///
/// Data parts carry the payload itself; par2 parts carry the redundancy
/// data an external repair tool can rebuild missing payload from. The two
/// kinds form disjoint message-id namespaces (the kind tag is part of the
/// addressing hash input).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PartKind {
    /// Payload data articles
    Data,
    /// PAR2 recovery articles
    Par2,
}

impl PartKind {
    /// The tag string hashed into the message-id derivation.
    ///
    /// These values are a wire contract shared with uploaders; changing
    /// them makes existing payloads unaddressable.
    pub fn tag(&self) -> &'static str {
        match self {
            PartKind::Data => "data",
            PartKind::Par2 => "par2",
        }
    }
}

impl std::fmt::Display for PartKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.tag())
    }
}

/// One addressed article to fetch during a pass.
///
/// Created by the orchestrator when a pass is enqueued, re-submitted with
/// an incremented attempt count on fetch failure, and destroyed once it
/// resolves (fragment written, or identifier ledgered as missing).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WorkItem {
    /// Derived message identifier (without angle brackets)
    pub message_id: String,
    /// Fetch attempts so far (0 = not yet attempted)
    pub attempt: u32,
    /// Which part kind this item belongs to
    pub kind: PartKind,
}

impl WorkItem {
    /// Create a fresh, never-attempted work item.
    pub fn new(message_id: String, kind: PartKind) -> Self {
        Self {
            message_id,
            attempt: 0,
            kind,
        }
    }
}

/// A decoded chunk of a destination file, positioned by byte offset.
///
/// Produced by a fetch-decode worker and consumed exactly once by the
/// writer owning `filename`. Offsets are absolute within the destination
/// file, so fragments may be written in any order.
#[derive(Clone, Debug)]
pub struct Fragment {
    /// Destination filename (as declared by the encoded article)
    pub filename: String,
    /// Absolute byte offset of `data` within the destination file
    pub offset: u64,
    /// Decoded payload bytes
    pub data: Vec<u8>,
    /// Total destination file size declared by the article, if known.
    /// Used for one-time preallocation; 0 means unknown.
    pub file_size: u64,
}

/// Payload layout decoded from the shared header string.
///
/// The header is a base64-wrapped `title:dataParts:par2Parts` triple. Note
/// that only the *layout* is decoded from it — message-id derivation hashes
/// the raw header string as given (see [`crate::addressing`]).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PayloadLayout {
    /// Human-readable payload title
    pub title: String,
    /// Total number of data articles published for this payload
    pub data_parts: u32,
    /// Total number of par2 recovery articles published for this payload
    pub par2_parts: u32,
}

impl PayloadLayout {
    /// Decode a base64 header string into its payload layout.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidHeader`] if the header is empty, not valid
    /// base64, not UTF-8, or does not match `title:dataParts:par2Parts`.
    pub fn from_header(header: &str) -> Result<Self> {
        if header.is_empty() {
            return Err(Error::InvalidHeader("header is empty".into()));
        }

        let decoded = base64::engine::general_purpose::STANDARD
            .decode(header.trim())
            .map_err(|e| Error::InvalidHeader(format!("not valid base64: {e}")))?;
        let decoded = String::from_utf8(decoded)
            .map_err(|e| Error::InvalidHeader(format!("not valid UTF-8: {e}")))?;

        // Title may itself contain ':'; the part counts are the last two fields.
        let layout_re = regex::Regex::new(r"(?s)^(.+):(\d+):(\d+)$")
            .map_err(|e| Error::InvalidHeader(e.to_string()))?;
        let captures = layout_re.captures(&decoded).ok_or_else(|| {
            Error::InvalidHeader("expected title:dataParts:par2Parts".into())
        })?;

        let title = captures[1].to_string();
        let data_parts: u32 = captures[2]
            .parse()
            .map_err(|e| Error::InvalidHeader(format!("bad data part count: {e}")))?;
        let par2_parts: u32 = captures[3]
            .parse()
            .map_err(|e| Error::InvalidHeader(format!("bad par2 part count: {e}")))?;

        Ok(Self {
            title,
            data_parts,
            par2_parts,
        })
    }

    /// Total published articles for the given part kind.
    pub fn parts(&self, kind: PartKind) -> u32 {
        match kind {
            PartKind::Data => self.data_parts,
            PartKind::Par2 => self.par2_parts,
        }
    }
}

/// Events emitted by a running download job.
///
/// Purely observational — consumers subscribe via
/// [`crate::DownloadJob::subscribe`]; nothing in the pipeline depends on
/// whether anyone is listening.
#[derive(Clone, Debug)]
pub enum Event {
    /// A pass over one part kind has started
    PassStarted {
        /// Part kind being fetched
        kind: PartKind,
        /// Number of articles the pass will enqueue
        total_parts: u32,
    },
    /// A fragment was fetched, decoded and handed to its writer
    FragmentLoaded {
        /// Part kind of the pass
        kind: PartKind,
        /// Fragments loaded so far in this pass
        loaded: u64,
        /// Bytes loaded so far in this pass
        bytes: u64,
    },
    /// Estimated total payload size, refined over the first ten fragments
    SizeEstimated {
        /// Part kind of the pass
        kind: PartKind,
        /// Estimated total decoded bytes for the whole pass
        estimated_bytes: u64,
    },
    /// A connection slot exhausted its connect retries and was abandoned
    ConnectionFailed {
        /// Slot number (1-based)
        slot: usize,
        /// Abandoned slots so far
        failed: u64,
    },
    /// A pass finished (drained or aborted)
    PassComplete {
        /// Part kind of the pass
        kind: PartKind,
        /// Fragments loaded during the pass
        loaded: u64,
        /// Identifiers left unresolved in the ledger
        missing: u64,
    },
    /// The external repair tool is being invoked
    RepairStarted,
    /// The external repair tool finished
    RepairComplete {
        /// Outcome reported by the tool
        outcome: RepairOutcome,
    },
    /// The external extraction tool is being invoked
    ExtractionStarted,
    /// The external extraction tool finished
    ExtractionComplete {
        /// Whether the archive extracted without a reported failure
        success: bool,
    },
    /// Files were relocated to the destination directory
    FilesPlaced {
        /// Number of files moved
        count: u64,
    },
}

/// Per-pass statistics captured after the pass drains.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PassStats {
    /// Fragments fetched, decoded and written
    pub fragments_loaded: u64,
    /// Decoded bytes handed to writers
    pub bytes_loaded: u64,
    /// Identifiers that could not be resolved
    pub missing: u64,
}

/// Final report for a completed (or partially completed) job.
#[derive(Clone, Debug, Default)]
pub struct JobReport {
    /// Statistics for the data pass
    pub data_pass: PassStats,
    /// Statistics for the recovery pass, if one ran
    pub recovery_pass: Option<PassStats>,
    /// Outcome of the repair tool, if it was invoked
    pub repair: Option<RepairOutcome>,
    /// Error message from the extraction tool, if it reported one.
    /// Extraction failures are advisory: the assembled files remain in the
    /// destination directory either way.
    pub extraction_warning: Option<String>,
    /// Number of files placed into the destination directory
    pub files_placed: u64,
}
