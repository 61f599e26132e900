use std::path::PathBuf;
use std::sync::Arc;

use crate::broadcaster::{ChangeBroadcaster, ChangeSource};
use crate::bundle::IncrementalBundleBuilder;
use crate::config::HmrConfig;
use crate::error::Result;
use crate::protocol::{MessageSink, SessionHandler};
use crate::queue::{SessionQueue, WorkerExit};
use crate::reactor::ChangeReactor;
use crate::resolver::Resolver;
use crate::session::{ConnectionId, SessionHandle, SessionStore};

/// Entry point tying the pieces together.
///
/// Owns the session store and the change broadcaster. Transports call
/// [`HmrService::connect`] when a client arrives and
/// [`HmrService::disconnect`] when it leaves; everything in between happens
/// on a per-session worker task.
pub struct HmrService {
    config: HmrConfig,
    broadcaster: Arc<ChangeBroadcaster>,
    store: SessionStore,
    reactor: ChangeReactor,
    builder: IncrementalBundleBuilder,
}

impl HmrService {
    pub fn new(
        resolver: Arc<dyn Resolver>,
        source: Arc<dyn ChangeSource>,
        config: HmrConfig,
    ) -> Arc<Self> {
        let broadcaster = Arc::new(ChangeBroadcaster::new(source));
        Arc::new(Self {
            store: SessionStore::new(Arc::clone(&resolver), Arc::clone(&broadcaster)),
            reactor: ChangeReactor::new(Arc::clone(&resolver)),
            builder: IncrementalBundleBuilder::new(resolver, config.clone()),
            broadcaster,
            config,
        })
    }

    pub fn config(&self) -> &HmrConfig {
        &self.config
    }

    /// Register a client and start its update worker.
    ///
    /// Seeding errors (missing or unresolvable entry file) are returned to
    /// the caller and leave nothing registered. Must be called from within a
    /// Tokio runtime.
    pub async fn connect(
        self: &Arc<Self>,
        platform: impl Into<String>,
        entry_file: impl Into<PathBuf>,
        sink: Arc<dyn MessageSink>,
    ) -> Result<ConnectionId> {
        let (queue, pending) = SessionQueue::channel();
        let registration = self
            .store
            .register(platform, entry_file, move |event| {
                queue.enqueue(event.clone());
            })
            .await?;

        let connection_id = registration.connection_id;
        let handler = SessionHandler::new(
            connection_id,
            registration.session,
            registration.liveness,
            self.reactor.clone(),
            self.builder.clone(),
            sink,
        );

        let service = Arc::downgrade(self);
        pending.spawn(handler, move |connection_id, exit| {
            if exit == WorkerExit::Invalidated {
                tracing::info!(connection_id = %connection_id, "Dropping invalid HMR session");
            }
            if let Some(service) = service.upgrade() {
                service.disconnect(connection_id);
            }
        });

        Ok(connection_id)
    }

    /// Unregister a client. Idempotent. Any in-flight update for the
    /// connection is discarded.
    pub fn disconnect(&self, connection_id: ConnectionId) -> bool {
        self.store.unregister(connection_id)
    }

    pub fn session(&self, connection_id: ConnectionId) -> Option<SessionHandle> {
        self.store.get(connection_id)
    }

    pub fn session_count(&self) -> usize {
        self.store.len()
    }

    pub fn connection_ids(&self) -> Vec<ConnectionId> {
        self.store.connection_ids()
    }

    /// Whether the file-change source is currently attached.
    pub fn is_listening(&self) -> bool {
        self.broadcaster.is_attached()
    }
}

impl std::fmt::Debug for HmrService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HmrService")
            .field("config", &self.config)
            .field("store", &self.store)
            .field("broadcaster", &self.broadcaster)
            .finish()
    }
}
