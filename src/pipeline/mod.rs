//! Download pipeline — pass orchestration and the public job type
//!
//! A job runs at most two passes (data, then recovery if parts are
//! missing), decides whether the external repair and extraction tools run,
//! and always hands whatever was assembled to the destination directory —
//! fatal endings included.
//!
//! Pass procedure: spawn one fetch-decode worker per connection slot plus
//! the retry relay, enqueue every derived work item, close the queue, wait
//! until each item has resolved (written or declared missing), then close
//! and drain every writer. Pool exhaustion and ledger overflow abort the
//! wait early via a cancellation token shared with all workers.

mod ledger;
mod relay;
mod worker;
mod writer;


use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};

use tokio::sync::{broadcast, mpsc, Notify};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::addressing;
use crate::config::Config;
use crate::connection::{Connector, NntpConnector};
use crate::error::{Error, Result};
use crate::extraction::{ExtractOutcome, ExtractTool, UnrarCli};
use crate::parity::{self, Par2Cli, RepairTool};
use crate::placement;
use crate::types::{Event, JobReport, PartKind, PassStats, PayloadLayout, WorkItem};

use ledger::{MissingLedger, PassCounters};
use relay::spawn_relay;
use worker::{run_worker, WorkerContext};
use writer::WriterPool;

/// Broadcast capacity for job events. Slow subscribers lag, they never
/// block the pipeline.
const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Why a pass was aborted before draining naturally.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum AbortReason {
    /// Every connection slot was abandoned; nobody can service the queue
    PoolExhausted,
    /// More parts are missing than recovery data could ever rebuild
    LedgerOverflow,
}

/// One-shot abort signal shared by the orchestrator and every worker.
///
/// The first trigger wins; later reasons are ignored.
pub(crate) struct AbortSignal {
    token: CancellationToken,
    reason: Mutex<Option<AbortReason>>,
}

impl AbortSignal {
    pub(crate) fn new() -> Self {
        Self {
            token: CancellationToken::new(),
            reason: Mutex::new(None),
        }
    }

    /// Abort the pass for the given reason (first caller wins).
    pub(crate) fn trigger(&self, reason: AbortReason) {
        let mut slot = self.reason.lock().unwrap_or_else(PoisonError::into_inner);
        if slot.is_none() {
            *slot = Some(reason);
        }
        drop(slot);
        self.token.cancel();
    }

    /// Wait until the pass is aborted.
    pub(crate) fn cancelled(&self) -> tokio_util::sync::WaitForCancellationFuture<'_> {
        self.token.cancelled()
    }

    pub(crate) fn reason(&self) -> Option<AbortReason> {
        *self.reason.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Counts unresolved work items for one pass.
///
/// Every enqueued item resolves exactly once — its fragment reaches a
/// writer queue, or its identifier reaches the ledger. When the count hits
/// zero the pass is drained and the orchestrator can tear the queue down.
pub(crate) struct Outstanding {
    remaining: AtomicUsize,
    notify: Notify,
}

impl Outstanding {
    pub(crate) fn new(total: usize) -> Self {
        Self {
            remaining: AtomicUsize::new(total),
            notify: Notify::new(),
        }
    }

    /// Mark one work item resolved.
    pub(crate) fn resolve(&self) {
        if self.remaining.fetch_sub(1, Ordering::AcqRel) == 1 {
            self.notify.notify_waiters();
        }
    }

    /// Wait until every work item has resolved.
    pub(crate) async fn wait_for_zero(&self) {
        loop {
            let notified = self.notify.notified();
            if self.remaining.load(Ordering::Acquire) == 0 {
                return;
            }
            notified.await;
        }
    }
}

/// A single payload reconstruction job.
///
/// Derives every article address from the configured header, downloads and
/// assembles the payload into the temporary directory, optionally repairs
/// and extracts it, and finally relocates the result into the destination
/// directory.
///
/// # Example
///
/// ```no_run
/// use hashdl::{Config, DownloadJob, ServerConfig};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let config = Config {
///         server: ServerConfig {
///             host: "news.example.com".to_string(),
///             port: 563,
///             tls: true,
///             ..Default::default()
///         },
///         header: "dGVzdDoxMjA6MTQ=".to_string(),
///         ..Default::default()
///     };
///
///     let job = DownloadJob::new(config)?;
///     let report = job.run().await?;
///     println!("loaded {} fragments", report.data_pass.fragments_loaded);
///     Ok(())
/// }
/// ```
pub struct DownloadJob {
    config: Arc<Config>,
    layout: PayloadLayout,
    connector: Arc<dyn Connector>,
    repair_tool: Option<Arc<dyn RepairTool>>,
    extract_tool: Option<Arc<dyn ExtractTool>>,
    event_tx: broadcast::Sender<Event>,
}

impl DownloadJob {
    /// Create a job with production collaborators (NNTP connectivity,
    /// external par2/unrar binaries discovered from the configuration or
    /// PATH).
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] / [`Error::InvalidHeader`] for unusable
    /// configuration and [`Error::NotSupported`] when an enabled external
    /// tool cannot be found.
    pub fn new(config: Config) -> Result<Self> {
        let connector: Arc<dyn Connector> = Arc::new(NntpConnector::new(config.server.clone()));

        let repair_tool: Option<Arc<dyn RepairTool>> = if config.repair.enabled {
            let purge = config.repair.delete_recovery_files;
            let tool = match &config.repair.par2_path {
                Some(path) => Par2Cli::new(path.clone(), purge),
                None => Par2Cli::from_path(purge).ok_or_else(|| {
                    Error::NotSupported(
                        "par2 binary not found in PATH; set repair.par2_path or disable repair"
                            .into(),
                    )
                })?,
            };
            Some(Arc::new(tool))
        } else {
            None
        };

        let extract_tool: Option<Arc<dyn ExtractTool>> = if config.extraction.enabled {
            let tool = match &config.extraction.unrar_path {
                Some(path) => UnrarCli::new(path.clone()),
                None => UnrarCli::from_path().ok_or_else(|| {
                    Error::NotSupported(
                        "unrar binary not found in PATH; set extraction.unrar_path or disable extraction"
                            .into(),
                    )
                })?,
            };
            Some(Arc::new(tool))
        } else {
            None
        };

        Self::with_collaborators(config, connector, repair_tool, extract_tool)
    }

    /// Create a job with explicit collaborators.
    ///
    /// This is the seam embedders and tests use to run the pipeline against
    /// their own connectivity or tool implementations. Passing `None` for a
    /// tool behaves as if that stage were disabled.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] / [`Error::InvalidHeader`] for unusable
    /// configuration.
    pub fn with_collaborators(
        config: Config,
        connector: Arc<dyn Connector>,
        repair_tool: Option<Arc<dyn RepairTool>>,
        extract_tool: Option<Arc<dyn ExtractTool>>,
    ) -> Result<Self> {
        config.validate()?;
        let layout = PayloadLayout::from_header(&config.header)?;
        let (event_tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);

        Ok(Self {
            config: Arc::new(config),
            layout,
            connector,
            repair_tool,
            extract_tool,
            event_tx,
        })
    }

    /// Subscribe to pipeline events.
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.event_tx.subscribe()
    }

    /// The payload layout decoded from the configured header.
    pub fn layout(&self) -> &PayloadLayout {
        &self.layout
    }

    /// Run the job to completion.
    ///
    /// Drives the full state machine: data pass → missing check → recovery
    /// pass → repair decision → extract decision. Placement into the
    /// destination directory happens once at the end *regardless* of
    /// outcome — a fatal job still delivers everything it assembled before
    /// returning its error.
    ///
    /// # Errors
    ///
    /// - [`Error::AllConnectionsFailed`] — every connection slot was abandoned
    /// - [`Error::Unrecoverable`] — more parts missing than recovery data covers
    /// - [`Error::RepairFailed`] — the repair tool reported a fatal outcome
    /// - [`Error::Io`] — working/destination directory failures
    pub async fn run(&self) -> Result<JobReport> {
        tokio::fs::create_dir_all(&self.config.temp_dir).await?;
        tokio::fs::create_dir_all(&self.config.dest_dir).await?;

        let mut report = JobReport::default();
        let outcome = self.execute(&mut report).await;

        // Best-effort placement, fatal endings included.
        match placement::relocate(&self.config.temp_dir, &self.config.dest_dir).await {
            Ok(count) => {
                report.files_placed = count;
                self.event_tx.send(Event::FilesPlaced { count }).ok();
            }
            Err(e) => {
                error!(error = %e, "unable to move files to destination");
                if outcome.is_ok() {
                    return Err(e);
                }
            }
        }

        if let Err(e) = tokio::fs::remove_dir_all(&self.config.temp_dir).await {
            warn!(error = %e, "unable to remove temporary directory");
        }

        outcome.map(|()| report)
    }

    /// The pipeline proper — everything before placement.
    async fn execute(&self, report: &mut JobReport) -> Result<()> {
        // Data pass
        let (stats, aborted) = self.run_pass(PartKind::Data).await?;
        report.data_pass = stats;

        if aborted == Some(AbortReason::PoolExhausted) {
            return Err(Error::AllConnectionsFailed {
                pool_size: self.config.server.connections,
            });
        }

        info!(loaded = stats.fragments_loaded, "download of data files completed");

        // Missing check
        if stats.missing > 0 {
            info!(
                missing = stats.missing,
                "downloaded files are incomplete and need to be repaired"
            );

            let recovery_parts = self.layout.par2_parts;
            if recovery_parts == 0 || stats.missing > u64::from(recovery_parts) {
                error!(
                    missing = stats.missing,
                    recovery_parts, "repair not possible"
                );
                return Err(Error::Unrecoverable {
                    missing: stats.missing as usize,
                    recovery_parts,
                });
            }

            // Recovery pass
            let (recovery_stats, recovery_aborted) = self.run_pass(PartKind::Par2).await?;
            report.recovery_pass = Some(recovery_stats);

            if recovery_aborted == Some(AbortReason::PoolExhausted) {
                return Err(Error::AllConnectionsFailed {
                    pool_size: self.config.server.connections,
                });
            }

            info!(
                loaded = recovery_stats.fragments_loaded,
                "download of recovery files completed"
            );

            self.run_repair(report).await?;
        }

        self.run_extraction(report).await;

        Ok(())
    }

    /// Repair decision: invoke the external tool against the first recovery
    /// file in the working directory. Only an unrepairable payload or a
    /// rejected invocation is fatal.
    async fn run_repair(&self, report: &mut JobReport) -> Result<()> {
        let Some(tool) = &self.repair_tool else {
            info!("repair not configured, proceeding with downloaded files");
            return Ok(());
        };

        let Some(recovery_file) = parity::find_recovery_file(&self.config.temp_dir).await? else {
            warn!("no recovery file found in working directory, skipping repair");
            return Ok(());
        };

        info!(tool = tool.name(), ?recovery_file, "starting repair process");
        self.event_tx.send(Event::RepairStarted).ok();

        let outcome = tool.repair(&recovery_file).await?;
        report.repair = Some(outcome);
        self.event_tx.send(Event::RepairComplete { outcome }).ok();

        if outcome.is_fatal() {
            error!(outcome = %outcome.describe(), "repair failed");
            return Err(Error::RepairFailed(outcome));
        }

        info!(outcome = %outcome.describe(), "repair finished");
        Ok(())
    }

    /// Extract decision: invoke the external tool. Failures are recorded
    /// and reported, never fatal — the assembled files remain available.
    async fn run_extraction(&self, report: &mut JobReport) {
        let Some(tool) = &self.extract_tool else {
            return;
        };

        info!(tool = tool.name(), "starting extraction process");
        self.event_tx.send(Event::ExtractionStarted).ok();

        let outcome = tool
            .extract(
                &self.config.temp_dir,
                &self.config.dest_dir,
                self.config.password.as_deref(),
            )
            .await;

        match outcome {
            Ok(outcome) => {
                self.event_tx
                    .send(Event::ExtractionComplete {
                        success: outcome.succeeded(),
                    })
                    .ok();

                match &outcome {
                    ExtractOutcome::Success => {
                        info!("extraction successful");
                    }
                    ExtractOutcome::Warning => {
                        warn!("extraction finished with warnings");
                        report.extraction_warning =
                            Some("extraction finished with warnings".into());
                    }
                    ExtractOutcome::Failed { code, message } => {
                        error!(code, message, "error while extracting archive");
                        report.extraction_warning = Some(message.clone());
                    }
                }

                if outcome.succeeded() && self.config.extraction.delete_archives {
                    match crate::extraction::delete_archives(&self.config.temp_dir).await {
                        Ok(deleted) => info!(deleted, "deleted archive volumes"),
                        Err(e) => warn!(error = %e, "unable to delete archive volumes"),
                    }
                }
            }
            Err(e) => {
                error!(error = %e, "error while extracting archive");
                report.extraction_warning = Some(e.to_string());
                self.event_tx
                    .send(Event::ExtractionComplete { success: false })
                    .ok();
            }
        }
    }

    /// Run one complete pass over every article of the given kind.
    ///
    /// Returns the pass statistics and, if the pass did not drain
    /// naturally, the reason it was aborted.
    async fn run_pass(&self, kind: PartKind) -> Result<(PassStats, Option<AbortReason>)> {
        let total = self.layout.parts(kind);
        let pool_size = self.config.server.connections;
        let queue_capacity = pool_size * 2;

        info!(kind = %kind, total, "loading files");
        self.event_tx
            .send(Event::PassStarted {
                kind,
                total_parts: total,
            })
            .ok();

        let ledger = Arc::new(MissingLedger::new());
        let counters = Arc::new(PassCounters::new());
        let writers = Arc::new(WriterPool::new(
            self.config.temp_dir.clone(),
            queue_capacity,
        ));
        let outstanding = Arc::new(Outstanding::new(total as usize));
        let abort = Arc::new(AbortSignal::new());
        let shutdown = CancellationToken::new();

        let (work_tx, work_rx) = mpsc::channel::<WorkItem>(queue_capacity);
        let (retry_tx, retry_rx) = mpsc::unbounded_channel::<WorkItem>();
        let queue = Arc::new(tokio::sync::Mutex::new(work_rx));

        let relay = spawn_relay(
            retry_rx,
            work_tx.clone(),
            Arc::clone(&ledger),
            Arc::clone(&outstanding),
            shutdown.clone(),
        );

        let ctx = WorkerContext {
            kind,
            expected_parts: total,
            recovery_budget: self.layout.par2_parts,
            pool_size,
            connect_retries: self.config.connect_retries,
            connect_wait: self.config.connect_wait,
            fetch_retries: self.config.fetch_retries,
            queue,
            retry_tx,
            writers: Arc::clone(&writers),
            ledger: Arc::clone(&ledger),
            counters: Arc::clone(&counters),
            outstanding: Arc::clone(&outstanding),
            abort: Arc::clone(&abort),
            event_tx: self.event_tx.clone(),
        };

        let mut workers = Vec::with_capacity(pool_size);
        for slot in 1..=pool_size {
            workers.push(tokio::spawn(run_worker(
                slot,
                Arc::clone(&self.connector),
                ctx.clone(),
            )));
        }
        // Workers hold their own retry senders; dropping ours lets the
        // relay observe the end of the pass.
        drop(ctx);

        // Enqueue every derived work item, bailing out if the pass aborts
        // while the queue is full — nobody may be left to make room.
        for seq in 1..=total {
            let message_id = addressing::message_id(&self.config.header, kind, seq)?;
            let item = WorkItem::new(message_id, kind);
            tokio::select! {
                result = work_tx.send(item) => {
                    if result.is_err() {
                        break;
                    }
                }
                _ = abort.cancelled() => break,
            }
        }
        drop(work_tx);

        tokio::select! {
            _ = outstanding.wait_for_zero() => {}
            _ = abort.cancelled() => {}
        }

        // Teardown: stop the relay (its work sender is the last one, so the
        // queue closes), join the workers, then close and drain the writers.
        shutdown.cancel();
        if let Err(e) = relay.await {
            error!(error = %e, "retry relay panicked");
        }
        for handle in workers {
            if let Err(e) = handle.await {
                error!(error = %e, "worker panicked");
            }
        }
        tracing::debug!(files = writers.writer_count(), "closing writer queues");
        writers.close().await;

        if !ledger.is_empty() {
            tracing::debug!(parts = ?ledger.snapshot(), "unresolved parts after pass");
        }

        let stats = PassStats {
            fragments_loaded: counters.fragments(),
            bytes_loaded: counters.bytes(),
            missing: ledger.len() as u64,
        };
        self.event_tx
            .send(Event::PassComplete {
                kind,
                loaded: stats.fragments_loaded,
                missing: stats.missing,
            })
            .ok();

        Ok((stats, abort.reason()))
    }
}
