//! Error taxonomy for the HMR service.
//!
//! Build-time errors never escape the session protocol handler as panics or
//! propagated failures; they are classified here and surfaced to the client
//! as `error` messages (see [`crate::protocol::ErrorBody`]).

use std::path::PathBuf;

use thiserror::Error;

use crate::broadcaster::ChangeSourceError;
use crate::resolver::ResolverError;

/// Result type alias using [`HmrError`] as the default error type.
pub type Result<T, E = HmrError> = std::result::Result<T, E>;

/// Errors produced while seeding or updating a session.
#[derive(Debug, Clone, Error)]
pub enum HmrError {
    /// The edited file, or a dependency it introduced, does not exist
    #[error("File not found: {}", .path.display())]
    NotFound { path: PathBuf },

    /// A module specifier could not be resolved
    #[error("Unable to resolve module '{specifier}' from '{}': {reason}", .from.display())]
    UnableToResolve {
        specifier: String,
        from: PathBuf,
        reason: String,
    },

    /// Syntax or transform-time error in a source file
    #[error("Transform error in {}: {description}", .filename.display())]
    Transform {
        filename: PathBuf,
        description: String,
        line_number: Option<u32>,
    },

    /// The session's entry file can no longer be resolved
    #[error("Session entry file is no longer available: {}", .entry_file.display())]
    SessionInvalid { entry_file: PathBuf },

    /// Anything unexpected. The message is for server logs only.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl HmrError {
    /// Whether this error was caused by a missing entry file, which leaves the
    /// session without a graph to work from.
    pub fn is_session_invalid(&self) -> bool {
        matches!(self, HmrError::SessionInvalid { .. })
    }
}

impl From<ChangeSourceError> for HmrError {
    fn from(err: ChangeSourceError) -> Self {
        HmrError::Internal(err.to_string())
    }
}

impl From<ResolverError> for HmrError {
    fn from(err: ResolverError) -> Self {
        match err {
            ResolverError::NotFound { path } => HmrError::NotFound { path },
            ResolverError::UnableToResolve {
                specifier,
                from,
                reason,
            } => HmrError::UnableToResolve {
                specifier,
                from,
                reason,
            },
            ResolverError::Transform {
                filename,
                message,
                line_number,
            } => HmrError::Transform {
                filename,
                description: message,
                line_number,
            },
            ResolverError::Other(message) => HmrError::Internal(message),
        }
    }
}
