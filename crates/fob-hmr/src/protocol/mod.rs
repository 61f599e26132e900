//! HMR wire protocol: outbound messages and the per-connection handler.

mod handler;
mod message;

pub use handler::{CycleOutcome, HandlerState, SessionHandler};
pub use message::{
    ErrorBody, ErrorKind, INTERNAL_ERROR_DESCRIPTION, ServerMessage, UpdateModule, UpdatePayload,
};

use thiserror::Error;

/// The client side of a connection went away.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("client connection closed")]
pub struct SinkClosed;

/// Outbound channel to one client.
///
/// Sends must be cheap and non-blocking; transports typically forward into a
/// writer task that owns the socket.
pub trait MessageSink: Send + Sync {
    fn send(&self, message: ServerMessage) -> Result<(), SinkClosed>;

    fn is_closed(&self) -> bool;
}

impl MessageSink for tokio::sync::mpsc::UnboundedSender<ServerMessage> {
    fn send(&self, message: ServerMessage) -> Result<(), SinkClosed> {
        tokio::sync::mpsc::UnboundedSender::send(self, message).map_err(|_| SinkClosed)
    }

    fn is_closed(&self) -> bool {
        tokio::sync::mpsc::UnboundedSender::is_closed(self)
    }
}
