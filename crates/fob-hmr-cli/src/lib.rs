//! Fob HMR server - command-line front end for [`fob_hmr`].
//!
//! Provides the native pieces the HMR service leaves to its embedder:
//!
//! - [`watcher`] - `notify`-based [`fob_hmr::ChangeSource`]
//! - [`native`] - file-system [`fob_hmr::Resolver`] using `oxc_resolver` and `oxc_parser`
//! - [`server`] - axum WebSocket transport for the HMR protocol
//! - [`config`] - figment-based configuration loading
//! - [`error`], [`logger`], [`ui`] - error reporting, tracing setup and status lines
//!
//! # Example
//!
//! ```rust
//! use fob_hmr_cli::{error::Result, logger};
//!
//! fn main() -> Result<()> {
//!     logger::init_logger(false, false, false);
//!     Ok(())
//! }
//! ```

pub mod cli;
pub mod commands;
pub mod config;
pub mod error;
pub mod logger;
pub mod native;
pub mod server;
pub mod ui;
pub mod watcher;

pub use config::HmrServerConfig;
pub use error::{CliError, ConfigError, Result, ServerError};
pub use native::NativeResolver;
pub use server::HmrServer;
pub use watcher::FileWatcher;
