//! Command-line interface definition.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

/// fob-hmr - hot module replacement server
#[derive(Parser, Debug)]
#[command(
    name = "fob-hmr",
    version,
    about = "Hot module replacement server for live code reload",
    long_about = "Watches a project directory and pushes incremental module updates to\n\
                  connected live-reload clients over WebSocket. Each client gets exactly\n\
                  the modules an edit affects, dependencies first."
)]
pub struct Cli {
    /// Enable verbose logging (debug level)
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Suppress all output except errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Disable colored output
    #[arg(long, global = true)]
    pub no_color: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Start the HMR WebSocket server
    ///
    /// Clients connect to `ws://HOST:PORT/hot?platform=<name>&bundleEntry=<path>`.
    Serve(ServeArgs),
}

/// Arguments for the serve command.
///
/// Every option is optional here; unset values fall back to the config
/// file, then `FOB_HMR_*` environment variables, then defaults.
#[derive(Args, Debug, Default, Clone)]
pub struct ServeArgs {
    /// Project root to watch and resolve entry files against
    #[arg(long, value_name = "DIR")]
    pub root: Option<PathBuf>,

    /// Host to listen on
    #[arg(long, value_name = "HOST")]
    pub host: Option<String>,

    /// Port to listen on
    #[arg(short, long, value_name = "PORT")]
    pub port: Option<u16>,

    /// Path to a config file (defaults to fob-hmr.config.json in the root)
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Ignore repeated changes to the same file within this window
    #[arg(long, value_name = "MS")]
    pub debounce_ms: Option<u64>,
}
