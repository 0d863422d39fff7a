use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use super::engine::{CatalogEvent, SyncEngine, SyncError, SyncOutcome};
use crate::catalog::Catalog;

type Reply = oneshot::Sender<Result<SyncOutcome, SyncError>>;

struct Job {
    event: CatalogEvent,
    reply: Option<Reply>,
}

/// Cloneable sender side of the sync queue.
#[derive(Clone)]
pub struct SyncHandle {
    tx: mpsc::Sender<Job>,
}

impl SyncHandle {
    /// Queues an event and waits for its outcome.
    pub async fn submit(&self, event: CatalogEvent) -> Result<SyncOutcome, SyncError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(Job {
                event,
                reply: Some(reply_tx),
            })
            .await
            .map_err(|_| SyncError::WorkerStopped)?;
        reply_rx.await.map_err(|_| SyncError::WorkerStopped)?
    }

    /// Queues an event without waiting. Failures are logged by the worker.
    pub async fn enqueue(&self, event: CatalogEvent) -> Result<(), SyncError> {
        self.tx
            .send(Job { event, reply: None })
            .await
            .map_err(|_| SyncError::WorkerStopped)
    }
}

/// Owns the only [`SyncEngine`] for a feed and runs its events one at a
/// time, in arrival order, on a dedicated blocking thread.
///
/// Every read-modify-write of the feed file happens inside this worker, so
/// overlapping triggers cannot lose each other's updates.
pub struct SyncWorker {
    handle: SyncHandle,
    task: JoinHandle<()>,
}

impl SyncWorker {
    /// Starts the worker. `capacity` bounds the number of queued events.
    pub fn spawn<C>(engine: SyncEngine<C>, capacity: usize) -> Self
    where
        C: Catalog + Send + 'static,
    {
        let (tx, mut rx) = mpsc::channel::<Job>(capacity.max(1));

        let task = tokio::task::spawn_blocking(move || {
            while let Some(job) = rx.blocking_recv() {
                let result = engine.handle(job.event);
                match job.reply {
                    Some(reply) => {
                        // Receiver may have given up waiting
                        let _ = reply.send(result);
                    }
                    None => {
                        if let Err(e) = result {
                            tracing::error!(
                                product_id = job.event.id,
                                error = %e,
                                "Failed to apply queued catalog event"
                            );
                        }
                    }
                }
            }
            tracing::debug!("Sync queue closed, worker exiting");
        });

        Self {
            handle: SyncHandle { tx },
            task,
        }
    }

    pub fn handle(&self) -> SyncHandle {
        self.handle.clone()
    }

    /// Stops accepting events from this worker's own handle and waits until
    /// the queue is drained. Outstanding clones of [`SyncHandle`] must be
    /// dropped for the worker to finish.
    pub async fn shutdown(self) -> Result<(), SyncError> {
        drop(self.handle);
        self.task.await.map_err(|e| {
            tracing::error!(error = %e, "Sync worker terminated abnormally");
            SyncError::WorkerStopped
        })
    }
}
