//! Fetch-decode worker — one per connection slot
//!
//! Each worker establishes its own private session, then drains the shared
//! work queue: fetch the article body, decode it into a positioned
//! fragment, route the fragment to its destination writer. Fetch failures
//! go back through the retry relay until the item's budget is spent; decode
//! failures are corrupt payload and are declared missing immediately.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{broadcast, mpsc};
use tracing::{debug, error, warn};

use crate::connection::{Connector, Session};
use crate::types::{Event, Fragment, PartKind, WorkItem};

use super::ledger::{MissingLedger, PassCounters};
use super::writer::WriterPool;
use super::{AbortReason, AbortSignal, Outstanding};

/// Size estimates are refined over this many leading fragments, then frozen.
const ESTIMATE_SAMPLE: u64 = 10;

/// Everything one worker needs for a pass. All handles are shared; each
/// worker receives its own clone.
#[derive(Clone)]
pub(crate) struct WorkerContext {
    pub(crate) kind: PartKind,
    /// Total articles published for this pass's part kind
    pub(crate) expected_parts: u32,
    /// Static recovery-part total from the header — the ledger-overflow ceiling
    pub(crate) recovery_budget: u32,
    pub(crate) pool_size: usize,
    pub(crate) connect_retries: u32,
    pub(crate) connect_wait: Duration,
    pub(crate) fetch_retries: u32,
    /// Shared work queue, drained cooperatively by all workers
    pub(crate) queue: Arc<tokio::sync::Mutex<mpsc::Receiver<WorkItem>>>,
    /// Hand-off to the retry relay (unbounded: never blocks the worker)
    pub(crate) retry_tx: mpsc::UnboundedSender<WorkItem>,
    pub(crate) writers: Arc<WriterPool>,
    pub(crate) ledger: Arc<MissingLedger>,
    pub(crate) counters: Arc<PassCounters>,
    pub(crate) outstanding: Arc<Outstanding>,
    pub(crate) abort: Arc<AbortSignal>,
    pub(crate) event_tx: broadcast::Sender<Event>,
}

/// Run one worker for the duration of a pass.
pub(crate) async fn run_worker(slot: usize, connector: Arc<dyn Connector>, ctx: WorkerContext) {
    let Some(mut session) = establish_session(slot, connector.as_ref(), &ctx).await else {
        return; // slot abandoned; accounting already done
    };

    loop {
        let item = tokio::select! {
            _ = ctx.abort.cancelled() => return,
            item = next_item(&ctx.queue) => match item {
                Some(item) => item,
                None => return, // queue closed and drained
            },
        };

        let fetched = tokio::select! {
            _ = ctx.abort.cancelled() => return,
            fetched = session.fetch(&item.message_id) => fetched,
        };

        match fetched {
            Ok(raw) => handle_body(slot, &ctx, &item, &raw).await,
            Err(e) => handle_fetch_failure(slot, &ctx, item, &e.to_string()),
        }
    }
}

/// Receive the next work item, sharing the queue with the other workers.
async fn next_item(
    queue: &tokio::sync::Mutex<mpsc::Receiver<WorkItem>>,
) -> Option<WorkItem> {
    queue.lock().await.recv().await
}

/// Connect this slot's private session, waiting a fixed interval between
/// attempts. Exhausting the retry budget abandons the slot; when the last
/// slot is abandoned the whole pass is aborted — nobody is left to service
/// the queue.
async fn establish_session(
    slot: usize,
    connector: &dyn Connector,
    ctx: &WorkerContext,
) -> Option<Box<dyn Session>> {
    let mut attempt = 0u32;
    loop {
        match connector.connect().await {
            Ok(session) => {
                debug!(slot, "connection established");
                return Some(session);
            }
            Err(e) => {
                attempt += 1;
                if attempt > ctx.connect_retries {
                    error!(slot, retries = attempt - 1, error = %e,
                        "connection failed after retries, abandoning slot");
                    let failed = ctx.counters.record_failed_connection();
                    ctx.event_tx
                        .send(Event::ConnectionFailed { slot, failed })
                        .ok();
                    if failed >= ctx.pool_size as u64 {
                        ctx.abort.trigger(AbortReason::PoolExhausted);
                    }
                    return None;
                }

                warn!(slot, wait_secs = ctx.connect_wait.as_secs(), error = %e,
                    "connection error, waiting to reconnect");
                tokio::select! {
                    _ = tokio::time::sleep(ctx.connect_wait) => {}
                    _ = ctx.abort.cancelled() => return None,
                }
            }
        }
    }
}

/// Decode a fetched body and route the fragment to its destination writer.
async fn handle_body(slot: usize, ctx: &WorkerContext, item: &WorkItem, raw: &[u8]) {
    let fragment = match decode_fragment(raw) {
        Ok(fragment) => fragment,
        Err(e) => {
            // Corrupt payload, not transient: retrying cannot help.
            warn!(slot, message_id = %item.message_id, error = %e,
                "unable to decode article body");
            declare_missing(ctx, item.message_id.clone());
            return;
        }
    };

    let bytes = fragment.data.len() as u64;
    if let Err(e) = ctx.writers.route(fragment).await {
        warn!(slot, message_id = %item.message_id, error = %e,
            "unable to route fragment to writer");
        declare_missing(ctx, item.message_id.clone());
        return;
    }

    let (fragments, total_bytes) = ctx.counters.record_fragment(bytes);
    ctx.event_tx
        .send(Event::FragmentLoaded {
            kind: ctx.kind,
            loaded: fragments,
            bytes: total_bytes,
        })
        .ok();

    if fragments <= ESTIMATE_SAMPLE {
        let estimated_bytes = total_bytes / fragments * u64::from(ctx.expected_parts);
        ctx.event_tx
            .send(Event::SizeEstimated {
                kind: ctx.kind,
                estimated_bytes,
            })
            .ok();
    }

    ctx.outstanding.resolve();
}

/// Route a failed item through the retry relay, or declare it missing once
/// its budget is spent.
fn handle_fetch_failure(slot: usize, ctx: &WorkerContext, mut item: WorkItem, error: &str) {
    item.attempt += 1;
    if item.attempt <= ctx.fetch_retries {
        debug!(slot, message_id = %item.message_id, attempt = item.attempt, error,
            "fetch failed, handing item to retry relay");
        if let Err(send_error) = ctx.retry_tx.send(item) {
            // Relay gone (pass shutting down): the item cannot be retried.
            declare_missing(ctx, send_error.0.message_id);
        }
    } else {
        warn!(slot, message_id = %item.message_id, retries = item.attempt - 1, error,
            "unable to fetch article after retries");
        declare_missing(ctx, item.message_id);
    }
}

/// Ledger an identifier, resolve its work item, and check the overflow
/// ceiling: once more parts are missing than recovery data could ever
/// rebuild, finishing the pass would be wasted work.
fn declare_missing(ctx: &WorkerContext, message_id: String) {
    ctx.ledger.add(message_id);
    ctx.outstanding.resolve();
    if ctx.ledger.len() > ctx.recovery_budget as usize {
        ctx.abort.trigger(AbortReason::LedgerOverflow);
    }
}

/// Decode a raw article body into a positioned fragment.
///
/// Offsets follow the transport encoding's 1-based part ranges: a
/// multi-part file fragment starts at `begin - 1`, a single-part file at 0.
fn decode_fragment(raw: &[u8]) -> std::result::Result<Fragment, String> {
    let decoded = nntp_rs::yenc_decode(raw).map_err(|e| e.to_string())?;

    let filename = decoded.header.name.clone();
    let offset = decoded.part.as_ref().map(|p| p.begin - 1).unwrap_or(0);
    let file_size = decoded.header.size;

    Ok(Fragment {
        filename,
        offset,
        data: decoded.data,
        file_size,
    })
}
