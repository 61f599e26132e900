//! Per-session change queue.
//!
//! File changes arrive on the watcher's thread, but a session must handle
//! them one at a time and in arrival order. Each session gets an unbounded
//! channel drained by a single worker task that owns the session's handler.

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::broadcaster::ChangeEvent;
use crate::protocol::{CycleOutcome, HandlerState, SessionHandler};
use crate::session::ConnectionId;

/// Why a session worker stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerExit {
    /// The queue was dropped (session unregistered).
    QueueClosed,
    /// The connection went away mid-cycle.
    Disconnected,
    /// The session's entry file disappeared.
    Invalidated,
}

/// Sending half of a session's change queue.
#[derive(Debug, Clone)]
pub struct SessionQueue {
    tx: mpsc::UnboundedSender<ChangeEvent>,
}

/// Receiving half of a queue whose worker has not been started yet. Events
/// sent in the meantime are buffered.
#[derive(Debug)]
pub struct PendingWorker {
    rx: mpsc::UnboundedReceiver<ChangeEvent>,
}

impl SessionQueue {
    pub fn channel() -> (Self, PendingWorker) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, PendingWorker { rx })
    }

    /// Queue a change. Returns `false` once the worker has stopped.
    pub fn enqueue(&self, event: ChangeEvent) -> bool {
        self.tx.send(event).is_ok()
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

impl PendingWorker {
    /// Start draining the queue into `handler`. `on_exit` runs once if the
    /// worker stops for any reason other than every sender being dropped.
    pub fn spawn<F>(self, handler: SessionHandler, on_exit: F) -> JoinHandle<WorkerExit>
    where
        F: FnOnce(ConnectionId, WorkerExit) + Send + 'static,
    {
        tokio::spawn(run(handler, self.rx, on_exit))
    }
}

async fn run<F>(
    mut handler: SessionHandler,
    mut rx: mpsc::UnboundedReceiver<ChangeEvent>,
    on_exit: F,
) -> WorkerExit
where
    F: FnOnce(ConnectionId, WorkerExit),
{
    let connection_id = handler.connection_id();

    while let Some(event) = rx.recv().await {
        let exit = match handler.handle_change(&event).await {
            CycleOutcome::Invalidated => Some(WorkerExit::Invalidated),
            CycleOutcome::Discarded if handler.state() == HandlerState::Closed => {
                Some(WorkerExit::Disconnected)
            }
            _ => None,
        };

        if let Some(exit) = exit {
            rx.close();
            tracing::debug!(connection_id = %connection_id, ?exit, "Session worker stopped");
            on_exit(connection_id, exit);
            return exit;
        }
    }

    tracing::debug!(connection_id = %connection_id, "Session queue closed");
    WorkerExit::QueueClosed
}
