use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use rustc_hash::FxHashMap;

use super::{ConnectionId, Liveness, Session, SessionHandle};
use crate::broadcaster::{ChangeBroadcaster, ChangeEvent, SubscriberId};
use crate::error::{HmrError, Result};
use crate::graph::compute_graph;
use crate::resolver::Resolver;

struct StoreEntry {
    session: SessionHandle,
    subscription: SubscriberId,
    liveness: Liveness,
}

/// Everything a connection needs after a successful registration.
#[derive(Debug, Clone)]
pub struct SessionRegistration {
    pub connection_id: ConnectionId,
    pub session: SessionHandle,
    pub liveness: Liveness,
}

/// Registry of live sessions, keyed by connection.
///
/// Each registered session holds one subscription on the change broadcaster,
/// so the file-change source is attached exactly while the store is
/// non-empty.
pub struct SessionStore {
    resolver: Arc<dyn Resolver>,
    broadcaster: Arc<ChangeBroadcaster>,
    sessions: Mutex<FxHashMap<ConnectionId, StoreEntry>>,
    next_id: AtomicU64,
}

impl SessionStore {
    pub fn new(resolver: Arc<dyn Resolver>, broadcaster: Arc<ChangeBroadcaster>) -> Self {
        Self {
            resolver,
            broadcaster,
            sessions: Mutex::new(FxHashMap::default()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Seed a session from a fresh full-graph computation and register it.
    ///
    /// `on_change` is subscribed to the broadcaster only once seeding has
    /// succeeded, so no change can reach a half-built session. The first
    /// subscription attaches the change source, which can block, so it runs
    /// on a blocking thread with no store lock held. Seeding and attach
    /// failures are returned and nothing is registered.
    pub async fn register<F>(
        &self,
        platform: impl Into<String>,
        entry_file: impl Into<PathBuf>,
        on_change: F,
    ) -> Result<SessionRegistration>
    where
        F: Fn(&ChangeEvent) + Send + Sync + 'static,
    {
        let platform = platform.into();
        let entry_file = entry_file.into();

        let graph = compute_graph(self.resolver.as_ref(), &platform, &entry_file)
            .await
            .map_err(HmrError::from)?;

        let connection_id = ConnectionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let module_count = graph.len();
        let session = Arc::new(tokio::sync::Mutex::new(Session::new(
            connection_id,
            platform.clone(),
            entry_file.clone(),
            graph,
        )));
        let liveness = Liveness::new();

        let broadcaster = Arc::clone(&self.broadcaster);
        let subscription = tokio::task::spawn_blocking(move || broadcaster.subscribe(on_change))
            .await
            .map_err(|err| HmrError::Internal(format!("Subscription task failed: {err}")))??;

        self.sessions.lock().insert(
            connection_id,
            StoreEntry {
                session: Arc::clone(&session),
                subscription,
                liveness: liveness.clone(),
            },
        );

        tracing::info!(
            connection_id = %connection_id,
            platform = %platform,
            entry = %entry_file.display(),
            modules = module_count,
            "Registered HMR session"
        );

        Ok(SessionRegistration {
            connection_id,
            session,
            liveness,
        })
    }

    /// Drop a session and its subscription. Safe to call repeatedly; returns
    /// whether a session was actually removed.
    pub fn unregister(&self, connection_id: ConnectionId) -> bool {
        let mut sessions = self.sessions.lock();
        let Some(entry) = sessions.remove(&connection_id) else {
            return false;
        };
        entry.liveness.close();
        self.broadcaster.unsubscribe(entry.subscription);
        let remaining = sessions.len();
        drop(sessions);

        tracing::info!(connection_id = %connection_id, remaining, "Unregistered HMR session");
        true
    }

    pub fn get(&self, connection_id: ConnectionId) -> Option<SessionHandle> {
        self.sessions
            .lock()
            .get(&connection_id)
            .map(|entry| Arc::clone(&entry.session))
    }

    pub fn len(&self) -> usize {
        self.sessions.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.lock().is_empty()
    }

    pub fn connection_ids(&self) -> Vec<ConnectionId> {
        let mut ids: Vec<_> = self.sessions.lock().keys().copied().collect();
        ids.sort();
        ids
    }
}

impl std::fmt::Debug for SessionStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionStore")
            .field("sessions", &self.len())
            .finish()
    }
}
