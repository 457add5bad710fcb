//! Correlation layer between the game and its solver worker.
//!
//! Requests are tagged with a host-assigned id and parked in a pending map
//! until the dispatcher task sees a reply carrying the same id. Replies may
//! arrive in any order; a reply whose kind differs from the request it is
//! keyed to is surfaced as [`SolverError::UnexpectedReply`] instead of being
//! handed to the wrong caller.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot, watch, Mutex};

use crate::error::SolverError;
use crate::game::Direction;

use super::protocol::{Kind, Request, RequestFrame, Response, WorkerMessage};
use super::transport::WorkerChannels;

type Reply = Result<Response, SolverError>;

struct Pending {
    kind: Kind,
    tx: oneshot::Sender<Reply>,
}

#[derive(Default)]
struct PendingTable {
    entries: Mutex<HashMap<u64, Pending>>,
    /// Set by the dispatcher, under the `entries` lock, once the worker is gone.
    closed: AtomicBool,
}

/// Cloneable handle to one solver worker.
///
/// The dispatcher task only holds the pending table, never the outbound
/// sender, so dropping every client closes the worker's inbound channel.
#[derive(Clone)]
pub struct SolverClient {
    outbound: mpsc::UnboundedSender<RequestFrame>,
    pending: Arc<PendingTable>,
    next_id: Arc<AtomicU64>,
    ready: watch::Receiver<bool>,
    timeout: Option<Duration>,
}

impl SolverClient {
    /// Attach to a worker and spawn the reply dispatcher on the current
    /// tokio runtime.
    pub fn connect(channels: WorkerChannels, timeout: Option<Duration>) -> Self {
        let WorkerChannels { outbound, inbound } = channels;
        let pending = Arc::new(PendingTable::default());
        let (ready_tx, ready) = watch::channel(false);
        tokio::spawn(dispatch(inbound, pending.clone(), ready_tx));
        Self { outbound, pending, next_id: Arc::new(AtomicU64::new(1)), ready, timeout }
    }

    /// Wait for the worker's one-time `READY`.
    pub async fn wait_ready(&self) -> Result<(), SolverError> {
        let mut ready = self.ready.clone();
        let wait = ready.wait_for(|r| *r);
        let outcome = match self.timeout {
            Some(limit) => tokio::time::timeout(limit, wait)
                .await
                .map_err(|_| SolverError::NotReady)?,
            None => wait.await,
        };
        outcome.map(|_| ()).map_err(|_| SolverError::Disconnected)
    }

    pub fn is_ready(&self) -> bool { *self.ready.borrow() }

    /// Requests sent but not yet answered.
    pub async fn pending_requests(&self) -> usize { self.pending.entries.lock().await.len() }

    /// Send one request and await the reply keyed to it.
    ///
    /// On timeout the pending entry is dropped; a late reply for it is then
    /// logged and discarded by the dispatcher.
    pub async fn request(&self, request: Request) -> Result<Response, SolverError> {
        let kind = request.kind();
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = oneshot::channel();
        {
            let mut entries = self.pending.entries.lock().await;
            if self.pending.closed.load(Ordering::Acquire) {
                return Err(SolverError::Disconnected);
            }
            entries.insert(id, Pending { kind, tx });
        }

        tracing::trace!(id, %kind, "sending solver request");
        if self.outbound.send(RequestFrame { id, request }).is_err() {
            self.pending.entries.lock().await.remove(&id);
            return Err(SolverError::Disconnected);
        }

        let reply = match self.timeout {
            Some(limit) => match tokio::time::timeout(limit, rx).await {
                Ok(reply) => reply,
                Err(_) => {
                    self.pending.entries.lock().await.remove(&id);
                    tracing::warn!(id, %kind, "solver request timed out");
                    return Err(SolverError::Timeout { kind });
                }
            },
            None => rx.await,
        };

        match reply {
            Ok(Ok(Response::Failed { message, .. })) => Err(SolverError::Worker(message)),
            Ok(result) => result,
            Err(_) => Err(SolverError::Disconnected),
        }
    }

    async fn expect_ack(&self, request: Request) -> Result<(), SolverError> {
        self.request(request).await.map(|_| ())
    }

    pub async fn setup(&self, seed: Option<u64>) -> Result<(), SolverError> {
        self.expect_ack(Request::Setup { seed }).await
    }

    pub async fn reset(&self, seed: Option<u64>) -> Result<(), SolverError> {
        self.expect_ack(Request::Reset { seed }).await
    }

    /// Replace the worker's mirror with row-major face values.
    pub async fn set_board(&self, tiles: Vec<u32>) -> Result<(), SolverError> {
        self.expect_ack(Request::Board { tiles }).await
    }

    pub async fn mirror_move(&self, direction: Direction) -> Result<(), SolverError> {
        self.expect_ack(Request::Move { direction: direction.code() }).await
    }

    pub async fn add_tile(&self, position: usize, value: u32) -> Result<(), SolverError> {
        self.expect_ack(Request::Add { position, value }).await
    }

    /// Ask for the best move. `Ok(None)` means the worker sees no legal move.
    pub async fn best_move(&self) -> Result<Option<Direction>, SolverError> {
        match self.request(Request::Solve).await? {
            Response::Solve { direction: None } => Ok(None),
            Response::Solve { direction: Some(code) } => Direction::from_code(code)
                .map(Some)
                .ok_or_else(|| SolverError::Worker(format!("unknown direction code {code}"))),
            other => Err(SolverError::UnexpectedReply { expected: Kind::Solve, got: other.kind() }),
        }
    }

    /// Ask for an adversarial placement code; `Ok(None)` on a full board.
    pub async fn evil_tile(&self) -> Result<Option<u32>, SolverError> {
        match self.request(Request::Tile).await? {
            Response::Tile { position_code } => Ok(position_code),
            other => Err(SolverError::UnexpectedReply { expected: Kind::Tile, got: other.kind() }),
        }
    }
}

async fn dispatch(
    mut inbound: mpsc::UnboundedReceiver<WorkerMessage>,
    pending: Arc<PendingTable>,
    ready: watch::Sender<bool>,
) {
    while let Some(message) = inbound.recv().await {
        match message {
            WorkerMessage::Ready => {
                tracing::info!("solver worker ready");
                ready.send_replace(true);
            }
            WorkerMessage::Reply { id, response } => {
                let got = response.kind();
                let Some(Pending { kind, tx }) = pending.entries.lock().await.remove(&id) else {
                    tracing::warn!(id, kind = %got, "reply for unknown or abandoned request");
                    continue;
                };
                let reply = if got == kind {
                    Ok(response)
                } else {
                    tracing::warn!(id, expected = %kind, %got, "reply kind does not match request");
                    Err(SolverError::UnexpectedReply { expected: kind, got })
                };
                let _ = tx.send(reply);
            }
        }
    }
    drop(ready);

    let mut entries = pending.entries.lock().await;
    pending.closed.store(true, Ordering::Release);
    if !entries.is_empty() {
        tracing::warn!(abandoned = entries.len(), "solver worker closed with requests in flight");
    }
    // Dropping the senders wakes every waiter with `Disconnected`.
    entries.clear();
    tracing::info!("solver worker disconnected");
}
