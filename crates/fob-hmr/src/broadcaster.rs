//! File-change fan-out.
//!
//! The underlying watcher exposes a single listener slot
//! ([`ChangeSource::set_change_listener`]). [`ChangeBroadcaster`] turns that
//! into a subscriber registry: the source is attached when the first
//! subscriber arrives and detached when the last one leaves, so nothing is
//! watched while no client is connected.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use thiserror::Error;

/// Kind of file-system change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChangeType {
    Modified,
    Deleted,
}

/// A single file-change notification. Transient.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeEvent {
    pub change_type: ChangeType,
    pub path: PathBuf,
}

impl ChangeEvent {
    pub fn modified(path: impl Into<PathBuf>) -> Self {
        Self {
            change_type: ChangeType::Modified,
            path: path.into(),
        }
    }

    pub fn deleted(path: impl Into<PathBuf>) -> Self {
        Self {
            change_type: ChangeType::Deleted,
            path: path.into(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_deleted(&self) -> bool {
        self.change_type == ChangeType::Deleted
    }
}

/// Callback installed into a [`ChangeSource`].
pub type ChangeListener = Arc<dyn Fn(ChangeEvent) + Send + Sync>;

/// A [`ChangeSource`] refused a listener, e.g. because the watched root is
/// missing or the OS watch limit was hit.
#[derive(Debug, Clone, Error)]
#[error("Failed to attach file-change source: {message}")]
pub struct ChangeSourceError {
    pub message: String,
}

impl ChangeSourceError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Single-slot file-change source (e.g. a file watcher).
///
/// Installing a listener may block (a recursive watch walks the tree), so
/// callers inside a runtime should do it on a blocking thread.
pub trait ChangeSource: Send + Sync {
    /// Install `listener`, or detach with `None`. On error no listener is
    /// installed.
    fn set_change_listener(
        &self,
        listener: Option<ChangeListener>,
    ) -> Result<(), ChangeSourceError>;
}

/// Handle returned by [`ChangeBroadcaster::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriberId(u64);

type Subscriber = Arc<dyn Fn(&ChangeEvent) + Send + Sync>;

#[derive(Default)]
struct Registry {
    subscribers: FxHashMap<SubscriberId, Subscriber>,
    // Subscription order, so dispatch order is deterministic.
    order: Vec<SubscriberId>,
    next_id: u64,
    attached: bool,
}

/// Reference-counted observer registry over one [`ChangeSource`].
pub struct ChangeBroadcaster {
    source: Arc<dyn ChangeSource>,
    registry: Arc<Mutex<Registry>>,
}

impl ChangeBroadcaster {
    pub fn new(source: Arc<dyn ChangeSource>) -> Self {
        Self {
            source,
            registry: Arc::new(Mutex::new(Registry::default())),
        }
    }

    /// Register a subscriber. Attaches the source on the first subscription.
    ///
    /// If the source cannot be attached the subscriber is not registered and
    /// the broadcaster stays detached, so a later subscription retries.
    pub fn subscribe<F>(&self, callback: F) -> Result<SubscriberId, ChangeSourceError>
    where
        F: Fn(&ChangeEvent) + Send + Sync + 'static,
    {
        let mut registry = self.registry.lock();

        if !registry.attached {
            self.source.set_change_listener(Some(self.dispatcher()))?;
            registry.attached = true;
            tracing::debug!("Attached file-change listener");
        }

        let id = SubscriberId(registry.next_id);
        registry.next_id += 1;
        registry.subscribers.insert(id, Arc::new(callback));
        registry.order.push(id);

        Ok(id)
    }

    /// Remove a subscriber. Detaches the source when the last one leaves.
    ///
    /// Unknown or already-removed ids are ignored; returns whether anything
    /// was removed.
    pub fn unsubscribe(&self, id: SubscriberId) -> bool {
        let mut registry = self.registry.lock();
        if registry.subscribers.remove(&id).is_none() {
            return false;
        }
        registry.order.retain(|existing| *existing != id);

        if registry.subscribers.is_empty() && registry.attached {
            registry.attached = false;
            match self.source.set_change_listener(None) {
                Ok(()) => tracing::debug!("Detached file-change listener"),
                Err(err) => tracing::warn!(error = %err, "Failed to detach file-change listener"),
            }
        }

        true
    }

    pub fn is_attached(&self) -> bool {
        self.registry.lock().attached
    }

    pub fn subscriber_count(&self) -> usize {
        self.registry.lock().subscribers.len()
    }

    /// Listener handed to the source. Snapshots subscribers so no lock is
    /// held while callbacks run.
    fn dispatcher(&self) -> ChangeListener {
        let registry = Arc::downgrade(&self.registry);
        Arc::new(move |event: ChangeEvent| {
            let Some(registry) = registry.upgrade() else {
                return;
            };
            let subscribers: Vec<Subscriber> = {
                let registry = registry.lock();
                registry
                    .order
                    .iter()
                    .filter_map(|id| registry.subscribers.get(id).cloned())
                    .collect()
            };
            for subscriber in subscribers {
                subscriber(&event);
            }
        })
    }
}

impl std::fmt::Debug for ChangeBroadcaster {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let registry = self.registry.lock();
        f.debug_struct("ChangeBroadcaster")
            .field("subscribers", &registry.subscribers.len())
            .field("attached", &registry.attached)
            .finish()
    }
}
