//! # hashdl
//!
//! Manifest-free Usenet payload reconstruction library.
//!
//! hashdl rebuilds a multi-part binary payload from an NNTP article store
//! given nothing but a shared header string: every article's message-id is
//! derived deterministically from (header, part kind, sequence number), so
//! no NZB or other manifest is ever downloaded or parsed.
//!
//! ## Design Philosophy
//!
//! - **Library-first** - No CLI or UI, purely a Rust crate for embedding
//! - **Collaborators at the seams** - Connectivity, repair and extraction
//!   are trait objects, so the whole pipeline runs against fakes in tests
//! - **Event-driven** - Consumers subscribe to events, no polling required
//! - **Bounded everywhere** - Back-pressure through bounded queues, retry
//!   ceilings on connections and articles, fatal-abort thresholds
//!
//! ## Pipeline
//!
//! A [`DownloadJob`] runs a data pass over all published data articles:
//! one fetch-decode worker per connection, each decoding yEnc article
//! bodies into positioned fragments that per-file writer threads assemble
//! with positional writes. Articles that stay unfetchable after their
//! retry budget land in a missing-part ledger. If anything is missing, a
//! recovery pass downloads the payload's par2 articles and the external
//! repair tool is invoked; afterwards the external extraction tool unpacks
//! archives. Whatever was assembled is finally moved to the destination
//! directory — even when the job ends fatally.
//!
//! ## Quick Start
//!
//! ```no_run
//! use hashdl::{Config, DownloadJob, ServerConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config {
//!         server: ServerConfig {
//!             host: "news.example.com".to_string(),
//!             port: 563,
//!             tls: true,
//!             username: Some("user".to_string()),
//!             password: Some("pass".to_string()),
//!             connections: 20,
//!         },
//!         header: "dGVzdDoxMjA6MTQ=".to_string(),
//!         ..Default::default()
//!     };
//!
//!     let job = DownloadJob::new(config)?;
//!
//!     // Subscribe to events
//!     let mut events = job.subscribe();
//!     tokio::spawn(async move {
//!         while let Ok(event) = events.recv().await {
//!             println!("Event: {:?}", event);
//!         }
//!     });
//!
//!     let report = job.run().await?;
//!     println!("placed {} files", report.files_placed);
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

/// Deterministic article addressing
pub mod addressing;
/// Configuration types
pub mod config;
/// Connectivity collaborator (NNTP sessions)
pub mod connection;
/// Error types
pub mod error;
/// Extraction collaborator (external unrar)
pub mod extraction;
/// Repair collaborator (external par2)
pub mod parity;
/// Download pipeline and job orchestration
pub mod pipeline;
/// Placement of finished files
pub mod placement;
/// Core types and events
pub mod types;

// Re-export commonly used types
pub use config::{Config, ExtractionConfig, RepairConfig, ServerConfig};
pub use connection::{Connector, NntpConnector, Session};
pub use error::{Error, Result};
pub use extraction::{ExtractOutcome, ExtractTool, UnrarCli};
pub use parity::{Par2Cli, RepairOutcome, RepairTool};
pub use pipeline::DownloadJob;
pub use types::{Event, Fragment, JobReport, PartKind, PassStats, PayloadLayout, WorkItem};
