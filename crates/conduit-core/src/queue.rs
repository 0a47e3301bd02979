//! Single-consumer request queue serializing all upstream traffic.
//!
//! Concurrent HTTP handlers submit envelopes here; one worker task drains
//! them strictly in arrival order, one dispatch in flight at a time. That
//! caps the proxy's outbound concurrency at one and smooths page-load
//! bursts into a sequential stream. There is no inter-item delay: the read
//! cache in front of the proxy is what prevents bursts, not artificial
//! spacing. An admitted entry always settles; there is no cancellation
//! path for queued work.

use crate::dispatch::{Dispatch, DispatchError};
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, oneshot};
use tracing::debug;

struct QueueEntry {
    body: serde_json::Value,
    reply: oneshot::Sender<Result<serde_json::Value, DispatchError>>,
}

/// Handle for submitting requests to the drain loop.
///
/// Cloneable; all clones feed the same worker.
#[derive(Clone)]
pub struct SerialQueue {
    tx: mpsc::UnboundedSender<QueueEntry>,
}

impl SerialQueue {
    /// Spawns the drain loop over the given dispatcher and returns the
    /// submission handle plus the worker's join handle.
    ///
    /// The worker exits when the shutdown broadcast fires or every handle
    /// is dropped; entries already admitted are drained first so no caller
    /// is left hanging.
    #[must_use]
    pub fn start(
        dispatcher: Arc<dyn Dispatch>,
        mut shutdown_rx: broadcast::Receiver<()>,
    ) -> (Self, tokio::task::JoinHandle<()>) {
        let (tx, mut rx) = mpsc::unbounded_channel::<QueueEntry>();

        let handle = tokio::spawn(async move {
            loop {
                let entry = tokio::select! {
                    // biased: drain admitted entries before observing shutdown.
                    biased;
                    entry = rx.recv() => match entry {
                        Some(entry) => entry,
                        None => break,
                    },
                    _ = shutdown_rx.recv() => {
                        rx.close();
                        while let Some(entry) = rx.recv().await {
                            let _ = entry.reply.send(Err(DispatchError::ShuttingDown));
                        }
                        break;
                    }
                };

                let result = dispatcher.dispatch(entry.body).await;
                // A dropped receiver just means the client went away.
                let _ = entry.reply.send(result);
            }
            debug!("serial queue worker stopped");
        });

        (Self { tx }, handle)
    }

    /// Enqueues one envelope and waits for its outcome.
    ///
    /// # Errors
    ///
    /// Returns the dispatcher's error verbatim, or
    /// [`DispatchError::ShuttingDown`] when the worker is gone.
    pub async fn submit(
        &self,
        body: serde_json::Value,
    ) -> Result<serde_json::Value, DispatchError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(QueueEntry { body, reply: reply_tx })
            .map_err(|_| DispatchError::ShuttingDown)?;
        reply_rx.await.map_err(|_| DispatchError::ShuttingDown)?
    }
}
