//! Command implementations for the HMR server CLI.
//!
//! Each command lives in its own module and exposes an `execute` function
//! taking the parsed arguments.

pub mod serve;

pub use serve::execute as serve_execute;
