//! Error handling for the HMR server CLI.
//!
//! Same layering as the rest of the fob tooling: a top-level [`CliError`]
//! for broad failure categories and domain errors ([`ConfigError`],
//! [`ServerError`]) with actionable hints. `main` turns the final error into
//! a `miette` report.

use std::net::SocketAddr;
use std::path::PathBuf;

use thiserror::Error;

/// Top-level CLI error type.
#[derive(Debug, Error)]
pub enum CliError {
    /// Configuration-related errors (bad file, invalid values, ...)
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// HTTP/WebSocket server errors
    #[error("Server error: {0}")]
    Server(#[from] ServerError),

    /// File or directory not found
    #[error("File not found: {}", .0.display())]
    FileNotFound(PathBuf),

    /// I/O errors from file system operations
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The project root could not be watched
    #[error("File watcher error: {0}")]
    Watch(#[from] notify::Error),
}

/// Configuration-specific errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Explicitly requested config file doesn't exist
    #[error("Config file not found: {}\n\nHint: Create a fob-hmr.config.json file or fix the --config path", .0.display())]
    NotFound(PathBuf),

    /// Config sources could not be merged or deserialized
    #[error("Invalid configuration: {0}\n\nHint: Check fob-hmr.config.json syntax and FOB_HMR_* environment variables")]
    Invalid(String),

    /// Invalid value for a configuration option
    #[error("Invalid value for '{field}': {value}\n\nHint: {hint}")]
    InvalidValue {
        /// Name of the field with invalid value
        field: String,
        /// The invalid value
        value: String,
        /// Helpful hint for correct values
        hint: String,
    },
}

/// Server startup and runtime errors.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("Failed to bind to {addr}: {source}\n\nHint: Is another packager already running? Try a different --port")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid listen address '{0}'\n\nHint: Use a host name or IP address, e.g. localhost or 0.0.0.0")]
    InvalidAddress(String),

    #[error("Server stopped unexpectedly: {0}")]
    Serve(#[source] std::io::Error),
}

/// Result type alias using `CliError` as the default error type.
pub type Result<T, E = CliError> = std::result::Result<T, E>;

/// Convert a CLI error into a miette report for the terminal.
pub fn cli_error_to_miette(err: CliError) -> miette::Report {
    match err {
        CliError::Config(e) => miette::miette!("Configuration error: {}", e),
        CliError::Server(e) => miette::miette!("{}", e),
        _ => miette::miette!("{}", err),
    }
}
