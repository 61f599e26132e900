//! Client sessions.
//!
//! One [`Session`] per connected client. The session owns its dependency
//! graph outright; nothing is shared between sessions except read access to
//! the source tree through the resolver.

mod store;

pub use store::{SessionRegistration, SessionStore};

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::graph::DependencyGraph;
use crate::resolver::ResolutionResponse;

/// Identifier of one client connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(pub u64);

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Whether a session can still accept updates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStatus {
    Active,
    /// The entry file disappeared. Terminal.
    Invalid,
}

/// Server-side state for one live-reload client.
#[derive(Debug)]
pub struct Session {
    connection_id: ConnectionId,
    platform: String,
    entry_file: PathBuf,
    graph: DependencyGraph,
    status: SessionStatus,
}

impl Session {
    pub(crate) fn new(
        connection_id: ConnectionId,
        platform: String,
        entry_file: PathBuf,
        graph: DependencyGraph,
    ) -> Self {
        Self {
            connection_id,
            platform,
            entry_file,
            graph,
            status: SessionStatus::Active,
        }
    }

    pub fn connection_id(&self) -> ConnectionId {
        self.connection_id
    }

    pub fn platform(&self) -> &str {
        &self.platform
    }

    pub fn entry_file(&self) -> &Path {
        &self.entry_file
    }

    pub fn graph(&self) -> &DependencyGraph {
        &self.graph
    }

    pub fn status(&self) -> SessionStatus {
        self.status
    }

    pub fn is_active(&self) -> bool {
        self.status == SessionStatus::Active
    }

    /// Replace every cached view of the graph at once.
    pub(crate) fn replace_graph(&mut self, graph: DependencyGraph) {
        self.graph = graph;
    }

    pub(crate) fn invalidate(&mut self) {
        self.status = SessionStatus::Invalid;
    }

    /// Resolution context for the transformer: every known module plus its
    /// direct dependencies.
    pub fn resolution_response(&self) -> ResolutionResponse {
        ResolutionResponse {
            modules: self.graph.modules().to_vec(),
            dependencies: self
                .graph
                .shallow_dependencies()
                .iter()
                .map(|(path, deps)| (path.clone(), deps.clone()))
                .collect(),
        }
    }
}

/// Shared handle to a session. The protocol handler of the connection is the
/// only writer.
pub type SessionHandle = Arc<tokio::sync::Mutex<Session>>;

/// Liveness flag of a connection, flipped once on disconnect.
#[derive(Debug, Clone, Default)]
pub struct Liveness(Arc<AtomicBool>);

impl Liveness {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn close(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_closed(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}
