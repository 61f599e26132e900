//! # fob-hmr
//!
//! Incremental dependency-graph updates for live code reload.
//!
//! Clients connect with a platform and an entry file. The service seeds a
//! per-client dependency graph, listens for file changes while at least one
//! client is connected, and for every relevant change pushes exactly the
//! modules that need re-evaluation, leaf modules first.
//!
//! ## Architecture
//!
//! ```text
//!  ChangeSource ──► ChangeBroadcaster ──► SessionQueue (one per client)
//!                                              │
//!                                              ▼
//!                                        SessionHandler
//!                                     ┌────────┴────────┐
//!                                     ▼                 ▼
//!                               ChangeReactor   IncrementalBundleBuilder
//!                                     │                 │
//!                                     └──── Resolver ◄──┘
//! ```
//!
//! The service owns no I/O. File watching, module resolution and code
//! transformation are provided by the embedder through [`ChangeSource`] and
//! [`Resolver`]; messages go out through a [`MessageSink`].
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use fob_hmr::{HmrConfig, HmrService, ServerMessage};
//! # use fob_hmr::{ChangeSource, Resolver};
//! # async fn run(resolver: Arc<dyn Resolver>, watcher: Arc<dyn ChangeSource>) -> fob_hmr::Result<()> {
//! let service = HmrService::new(resolver, watcher, HmrConfig::new("localhost", 8081));
//!
//! let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel::<ServerMessage>();
//! let id = service.connect("ios", "/app/index.js", Arc::new(tx)).await?;
//!
//! while let Some(message) = rx.recv().await {
//!     println!("{}", message.to_json().unwrap_or_default());
//! }
//! service.disconnect(id);
//! # Ok(())
//! # }
//! ```

pub mod broadcaster;
pub mod bundle;
pub mod config;
pub mod error;
pub mod graph;
pub mod module;
pub mod protocol;
pub mod queue;
pub mod reactor;
pub mod resolver;
pub mod service;
pub mod session;

#[cfg(any(test, feature = "test-utils"))]
pub mod testing;

pub use broadcaster::{
    ChangeBroadcaster, ChangeEvent, ChangeListener, ChangeSource, ChangeSourceError, ChangeType,
};
pub use bundle::IncrementalBundleBuilder;
pub use config::HmrConfig;
pub use error::{HmrError, Result};
pub use graph::{DependencyGraph, InverseDependencyMap, compute_graph};
pub use module::{Module, ModuleId, ModuleKind};
pub use protocol::{
    CycleOutcome, ErrorBody, ErrorKind, HandlerState, MessageSink, ServerMessage, SessionHandler,
    SinkClosed, UpdateModule, UpdatePayload,
};
pub use reactor::{ChangeReactor, Reaction};
pub use resolver::{
    Bundle, BundleOptions, BundledModule, ResolutionResponse, ResolveOptions, Resolver,
    ResolverError, ResolverResult,
};
pub use service::HmrService;
pub use session::{ConnectionId, Session, SessionHandle, SessionStatus};
