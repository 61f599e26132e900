use std::sync::Arc;

use super::{ErrorBody, MessageSink, ServerMessage, UpdatePayload};
use crate::broadcaster::ChangeEvent;
use crate::bundle::IncrementalBundleBuilder;
use crate::error::{HmrError, Result};
use crate::reactor::{ChangeReactor, Reaction};
use crate::session::{ConnectionId, Liveness, Session, SessionHandle};

/// Per-connection protocol state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandlerState {
    Idle,
    /// `update-start` sent, reactor or builder running.
    AwaitingBuild,
    /// Sending the result of a cycle.
    Sending,
    /// Connection gone or session invalid. Terminal.
    Closed,
}

/// Result of handling one change event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleOutcome {
    /// Not in this session's graph. Nothing was sent.
    Skipped,
    /// `update-start`, `update` and `update-done` were sent.
    Updated { modules: usize },
    /// Nothing to push: `update-start` and `update-done` only.
    NoOp,
    /// `update-start`, `error` and `update-done` were sent. Session intact.
    Failed,
    /// Connection closed mid-cycle; the result was dropped.
    Discarded,
    /// Entry file is gone. An error was sent and the session is now invalid.
    Invalidated,
}

/// Drives the update cycle for one connection.
///
/// Every relevant change produces exactly one `update-start` followed by
/// exactly one `update-done`, with at most one `update` or `error` in
/// between. Changes are handled strictly one at a time; the caller is
/// expected to feed them from a single queue.
pub struct SessionHandler {
    connection_id: ConnectionId,
    session: SessionHandle,
    liveness: Liveness,
    reactor: ChangeReactor,
    builder: IncrementalBundleBuilder,
    sink: Arc<dyn MessageSink>,
    state: HandlerState,
}

impl SessionHandler {
    pub fn new(
        connection_id: ConnectionId,
        session: SessionHandle,
        liveness: Liveness,
        reactor: ChangeReactor,
        builder: IncrementalBundleBuilder,
        sink: Arc<dyn MessageSink>,
    ) -> Self {
        Self {
            connection_id,
            session,
            liveness,
            reactor,
            builder,
            sink,
            state: HandlerState::Idle,
        }
    }

    pub fn connection_id(&self) -> ConnectionId {
        self.connection_id
    }

    pub fn state(&self) -> HandlerState {
        self.state
    }

    pub async fn handle_change(&mut self, event: &ChangeEvent) -> CycleOutcome {
        if self.state == HandlerState::Closed || self.is_disconnected() {
            return self.discard();
        }

        let handle = Arc::clone(&self.session);
        let mut session = handle.lock().await;

        if !session.is_active() {
            return self.discard();
        }
        if !ChangeReactor::is_relevant(&session, event) {
            return CycleOutcome::Skipped;
        }

        tracing::debug!(
            connection_id = %self.connection_id,
            path = %event.path().display(),
            "Starting update cycle"
        );
        self.transition(HandlerState::AwaitingBuild);
        if !self.emit(ServerMessage::UpdateStart) {
            return self.discard();
        }

        let result = self.run_cycle(&mut session, event).await;

        // The client may have left while the build was running.
        if self.is_disconnected() {
            return self.discard();
        }

        self.transition(HandlerState::Sending);
        let (message, outcome) = match result {
            Ok(Some(payload)) => {
                let modules = payload.modules.len();
                (
                    Some(ServerMessage::Update(payload)),
                    CycleOutcome::Updated { modules },
                )
            }
            Ok(None) => (None, CycleOutcome::NoOp),
            Err(err) => {
                let outcome = if err.is_session_invalid() {
                    session.invalidate();
                    tracing::warn!(
                        connection_id = %self.connection_id,
                        entry = %session.entry_file().display(),
                        "Entry file is gone, invalidating session"
                    );
                    CycleOutcome::Invalidated
                } else {
                    tracing::debug!(connection_id = %self.connection_id, error = %err, "Update failed");
                    CycleOutcome::Failed
                };
                (Some(ServerMessage::Error(ErrorBody::from_error(&err))), outcome)
            }
        };

        if let Some(message) = message {
            if !self.emit(message) {
                return self.discard();
            }
        }
        if !self.emit(ServerMessage::UpdateDone) {
            return self.discard();
        }

        let next = if outcome == CycleOutcome::Invalidated {
            HandlerState::Closed
        } else {
            HandlerState::Idle
        };
        self.transition(next);
        outcome
    }

    async fn run_cycle(
        &self,
        session: &mut Session,
        event: &ChangeEvent,
    ) -> Result<Option<UpdatePayload>, HmrError> {
        match self.reactor.react(session, event).await? {
            Reaction::Irrelevant => Ok(None),
            Reaction::Deleted(module) => {
                tracing::debug!(
                    connection_id = %self.connection_id,
                    module = %module.id,
                    "Module deleted"
                );
                Ok(Some(UpdatePayload::deletion(
                    module.id,
                    session.graph().inverse_dependencies().clone(),
                )))
            }
            Reaction::Rebuild(modules) => self.builder.build_for(session, &modules).await,
        }
    }

    fn is_disconnected(&self) -> bool {
        self.liveness.is_closed() || self.sink.is_closed()
    }

    fn emit(&self, message: ServerMessage) -> bool {
        let kind = message.kind();
        match self.sink.send(message) {
            Ok(()) => true,
            Err(_) => {
                tracing::debug!(connection_id = %self.connection_id, kind, "Client gone, dropping message");
                false
            }
        }
    }

    fn discard(&mut self) -> CycleOutcome {
        self.transition(HandlerState::Closed);
        CycleOutcome::Discarded
    }

    fn transition(&mut self, next: HandlerState) {
        if self.state != next {
            tracing::trace!(
                connection_id = %self.connection_id,
                from = ?self.state,
                to = ?next,
                "Handler state change"
            );
            self.state = next;
        }
    }
}

impl std::fmt::Debug for SessionHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionHandler")
            .field("connection_id", &self.connection_id)
            .field("state", &self.state)
            .finish()
    }
}
