//! File system watcher feeding the HMR change broadcaster.
//!
//! The underlying `notify` watcher only exists while a listener is
//! installed, so an idle server holds no watch handles at all. Events are
//! debounced on the trailing edge: a path is reported once it has been quiet
//! for the whole window, with the kind of its last event.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::mpsc::{self, RecvTimeoutError};
use std::time::{Duration, Instant};

use fob_hmr::{ChangeEvent, ChangeListener, ChangeSource, ChangeSourceError, ChangeType};
use notify::event::{ModifyKind, RenameMode};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use parking_lot::Mutex;

use crate::error::{CliError, Result};

struct PendingChange {
    change_type: ChangeType,
    deadline: Instant,
}

/// Coalesces bursts of events per path. Entries leave the map as soon as
/// they are drained, so it only ever holds paths still inside their window.
struct Debouncer {
    window: Duration,
    pending: Mutex<HashMap<PathBuf, PendingChange>>,
}

impl Debouncer {
    fn new(window: Duration) -> Self {
        Self {
            window,
            pending: Mutex::new(HashMap::new()),
        }
    }

    /// Record an event; a newer event for the same path replaces the kind
    /// and restarts the window.
    fn record(&self, path: PathBuf, change_type: ChangeType, now: Instant) {
        self.pending.lock().insert(
            path,
            PendingChange {
                change_type,
                deadline: now + self.window,
            },
        );
    }

    /// Remove and return every change whose window has closed, oldest first.
    fn drain_ready(&self, now: Instant) -> Vec<ChangeEvent> {
        let mut pending = self.pending.lock();
        let mut ready: Vec<(Instant, ChangeEvent)> = Vec::new();
        pending.retain(|path, change| {
            if change.deadline <= now {
                ready.push((
                    change.deadline,
                    ChangeEvent {
                        change_type: change.change_type,
                        path: path.clone(),
                    },
                ));
                false
            } else {
                true
            }
        });
        ready.sort_by_key(|(deadline, _)| *deadline);
        ready.into_iter().map(|(_, event)| event).collect()
    }

    fn next_deadline(&self) -> Option<Instant> {
        self.pending.lock().values().map(|change| change.deadline).min()
    }
}

/// A running watch. Dropping it stops `notify` and the flush thread.
struct ActiveWatch {
    _watcher: RecommendedWatcher,
    _stop: Option<mpsc::Sender<()>>,
}

/// Recursive project watcher implementing [`ChangeSource`].
pub struct FileWatcher {
    root: PathBuf,
    ignore_patterns: Vec<String>,
    debounce: Duration,
    active: Mutex<Option<ActiveWatch>>,
}

impl FileWatcher {
    pub fn new(root: PathBuf, ignore_patterns: Vec<String>, debounce_ms: u64) -> Result<Self> {
        if !root.is_dir() {
            return Err(CliError::FileNotFound(root));
        }

        Ok(Self {
            root,
            ignore_patterns,
            debounce: Duration::from_millis(debounce_ms),
            active: Mutex::new(None),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Whether a `notify` watcher is currently running.
    pub fn is_watching(&self) -> bool {
        self.active.lock().is_some()
    }

    fn start(&self, listener: ChangeListener) -> Result<ActiveWatch> {
        let root = self.root.clone();
        let ignore_patterns = self.ignore_patterns.clone();

        // With no window every event goes straight to the listener.
        let debouncer = (!self.debounce.is_zero()).then(|| Arc::new(Debouncer::new(self.debounce)));
        let stop = match &debouncer {
            Some(debouncer) => Some(Self::spawn_flusher(
                Arc::clone(debouncer),
                Arc::clone(&listener),
            )?),
            None => None,
        };

        let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| {
            let event = match res {
                Ok(event) => event,
                Err(err) => {
                    tracing::warn!(error = %err, "File watcher error");
                    return;
                }
            };

            for path in &event.paths {
                if Self::should_ignore(path, &root, &ignore_patterns) {
                    continue;
                }
                let Some(change_type) = Self::classify(&event.kind, path) else {
                    continue;
                };

                tracing::trace!(path = %path.display(), ?change_type, "Raw file event");
                match &debouncer {
                    Some(debouncer) => debouncer.record(path.clone(), change_type, Instant::now()),
                    None => listener(ChangeEvent {
                        change_type,
                        path: path.clone(),
                    }),
                }
            }
        })?;

        watcher.watch(&self.root, RecursiveMode::Recursive)?;
        Ok(ActiveWatch {
            _watcher: watcher,
            _stop: stop,
        })
    }

    /// Emit debounced changes until the returned sender is dropped.
    fn spawn_flusher(
        debouncer: Arc<Debouncer>,
        listener: ChangeListener,
    ) -> Result<mpsc::Sender<()>> {
        let (stop_tx, stop_rx) = mpsc::channel::<()>();

        std::thread::Builder::new()
            .name("fob-hmr-debounce".to_string())
            .spawn(move || {
                loop {
                    let wait = debouncer.next_deadline().map_or(debouncer.window, |deadline| {
                        deadline.saturating_duration_since(Instant::now())
                    });
                    match stop_rx.recv_timeout(wait) {
                        Err(RecvTimeoutError::Timeout) => {}
                        Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                    }

                    for event in debouncer.drain_ready(Instant::now()) {
                        tracing::debug!(
                            path = %event.path.display(),
                            change_type = ?event.change_type,
                            "File changed"
                        );
                        listener(event);
                    }
                }
            })?;

        Ok(stop_tx)
    }

    /// Map a notify event kind to a change type. Directories and access
    /// events are dropped.
    fn classify(kind: &EventKind, path: &Path) -> Option<ChangeType> {
        match kind {
            EventKind::Remove(_) => Some(ChangeType::Deleted),
            EventKind::Modify(ModifyKind::Name(RenameMode::From)) => Some(ChangeType::Deleted),
            EventKind::Modify(ModifyKind::Name(_)) => {
                if path.exists() {
                    (!path.is_dir()).then_some(ChangeType::Modified)
                } else {
                    Some(ChangeType::Deleted)
                }
            }
            EventKind::Create(_) | EventKind::Modify(_) => {
                (!path.is_dir()).then_some(ChangeType::Modified)
            }
            _ => None,
        }
    }

    /// Only files inside `root` that are neither hidden nor matched by an
    /// ignore pattern are reported.
    fn should_ignore(path: &Path, root: &Path, ignore_patterns: &[String]) -> bool {
        let Ok(rel_path) = path.strip_prefix(root) else {
            return true;
        };

        let path_str = rel_path.to_string_lossy();
        for pattern in ignore_patterns {
            if let Some(ext) = pattern.strip_prefix('*') {
                if path_str.ends_with(ext) {
                    return true;
                }
            } else if rel_path
                .components()
                .any(|component| component.as_os_str() == pattern.as_str())
            {
                return true;
            }
        }

        rel_path.components().any(|component| {
            component
                .as_os_str()
                .to_str()
                .is_some_and(|name| name.starts_with('.') && name != "." && name != "..")
        })
    }
}

impl ChangeSource for FileWatcher {
    fn set_change_listener(
        &self,
        listener: Option<ChangeListener>,
    ) -> std::result::Result<(), ChangeSourceError> {
        let mut active = self.active.lock();
        match listener {
            Some(listener) => match self.start(listener) {
                Ok(watch) => {
                    *active = Some(watch);
                    tracing::info!(root = %self.root.display(), "Watching for changes");
                    Ok(())
                }
                Err(err) => {
                    tracing::error!(root = %self.root.display(), error = %err, "Failed to start file watcher");
                    Err(ChangeSourceError::new(err.to_string()))
                }
            },
            None => {
                if active.take().is_some() {
                    tracing::info!("No clients connected, stopped watching");
                }
                Ok(())
            }
        }
    }
}

impl std::fmt::Debug for FileWatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileWatcher")
            .field("root", &self.root)
            .field("watching", &self.is_watching())
            .finish()
    }
}
