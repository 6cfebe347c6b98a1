//! Retry relay — decoupled re-submission of failed work items
//!
//! A worker must never push a failed item back onto the queue it is itself
//! draining: with every worker blocked on a full queue there would be no
//! consumer left to make room. The relay breaks that cycle — workers hand
//! failures to the relay over an unbounded channel (a send that cannot
//! block) and the relay re-submits them onto the shared work queue on its
//! own time. If re-submission finds the queue already closed, the item is
//! declared missing instead.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::types::WorkItem;

use super::ledger::MissingLedger;
use super::Outstanding;

/// Spawn the relay task for one pass.
///
/// Exits when `shutdown` fires (all items resolved or the pass aborted) or
/// when every retry sender is gone. Dropping its `work_tx` clone on exit is
/// what lets the shared work queue close.
pub(crate) fn spawn_relay(
    mut retry_rx: mpsc::UnboundedReceiver<WorkItem>,
    work_tx: mpsc::Sender<WorkItem>,
    ledger: Arc<MissingLedger>,
    outstanding: Arc<Outstanding>,
    shutdown: CancellationToken,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            let item = tokio::select! {
                item = retry_rx.recv() => match item {
                    Some(item) => item,
                    None => break,
                },
                _ = shutdown.cancelled() => break,
            };

            debug!(message_id = %item.message_id, attempt = item.attempt,
                "re-submitting failed item");

            if let Err(send_error) = work_tx.send(item).await {
                // Queue closed under us: the item can never be retried.
                let item = send_error.0;
                debug!(message_id = %item.message_id,
                    "work queue closed, declaring item missing");
                ledger.add(item.message_id);
                outstanding.resolve();
            }
        }
    })
}
