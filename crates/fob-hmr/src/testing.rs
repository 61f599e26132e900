//! Test doubles for the resolver, the change source and client sinks.
//!
//! Available to the crate's own tests and, with the `test-utils` feature, to
//! downstream crates.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use indexmap::IndexMap;
use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use tokio::sync::Notify;

use crate::broadcaster::{ChangeEvent, ChangeListener, ChangeSource, ChangeSourceError};
use crate::module::{Module, ModuleId, ModuleKind};
use crate::protocol::{ErrorBody, MessageSink, ServerMessage, SinkClosed, UpdatePayload};
use crate::resolver::{
    Bundle, BundleOptions, BundledModule, ResolveOptions, Resolver, ResolverError, ResolverResult,
};

#[derive(Debug, Clone)]
struct FileEntry {
    id: ModuleId,
    kind: ModuleKind,
    dependencies: Vec<PathBuf>,
    code: String,
}

#[derive(Debug, Default)]
struct ResolverState {
    files: IndexMap<PathBuf, FileEntry>,
    next_id: u32,
    failures: FxHashMap<PathBuf, ResolverError>,
    shallow_calls: FxHashMap<PathBuf, usize>,
    bundle_calls: usize,
    latency: Option<Duration>,
}

/// Resolver over an in-memory file table.
///
/// Ids are assigned in insertion order starting at 0 and never reused.
/// Failures can be injected per path; they surface from dependency lookups
/// and from bundling, like a syntax error would.
#[derive(Debug, Default)]
pub struct InMemoryResolver {
    state: Mutex<ResolverState>,
}

impl InMemoryResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_source(&self, path: impl Into<PathBuf>, dependencies: &[&str]) {
        let path = path.into();
        let code = format!("// {}", path.display());
        self.add_module(path, ModuleKind::Source, dependencies, code);
    }

    /// Add or replace a file. Replacing keeps the existing id.
    pub fn add_module(
        &self,
        path: impl Into<PathBuf>,
        kind: ModuleKind,
        dependencies: &[&str],
        code: impl Into<String>,
    ) {
        let mut state = self.state.lock();
        let path = path.into();
        let id = match state.files.get(&path) {
            Some(existing) => existing.id,
            None => {
                let id = ModuleId(state.next_id);
                state.next_id += 1;
                id
            }
        };
        state.files.insert(
            path,
            FileEntry {
                id,
                kind,
                dependencies: dependencies.iter().map(PathBuf::from).collect(),
                code: code.into(),
            },
        );
    }

    pub fn set_dependencies(&self, path: impl AsRef<Path>, dependencies: &[&str]) {
        let mut state = self.state.lock();
        let entry = state
            .files
            .get_mut(path.as_ref())
            .unwrap_or_else(|| panic!("unknown file {}", path.as_ref().display()));
        entry.dependencies = dependencies.iter().map(PathBuf::from).collect();
    }

    pub fn set_code(&self, path: impl AsRef<Path>, code: impl Into<String>) {
        let mut state = self.state.lock();
        let entry = state
            .files
            .get_mut(path.as_ref())
            .unwrap_or_else(|| panic!("unknown file {}", path.as_ref().display()));
        entry.code = code.into();
    }

    pub fn remove(&self, path: impl AsRef<Path>) {
        self.state.lock().files.shift_remove(path.as_ref());
    }

    pub fn fail_transform(&self, path: impl Into<PathBuf>, message: &str, line_number: Option<u32>) {
        let path = path.into();
        let error = ResolverError::Transform {
            filename: path.clone(),
            message: message.to_string(),
            line_number,
        };
        self.state.lock().failures.insert(path, error);
    }

    pub fn fail_internal(&self, path: impl Into<PathBuf>, message: &str) {
        let path = path.into();
        let error = ResolverError::Other(message.to_string());
        self.state.lock().failures.insert(path, error);
    }

    pub fn clear_failure(&self, path: impl AsRef<Path>) {
        self.state.lock().failures.remove(path.as_ref());
    }

    /// Delay every bundle build, to widen race windows in tests.
    pub fn set_latency(&self, latency: Duration) {
        self.state.lock().latency = Some(latency);
    }

    pub fn shallow_calls(&self, path: &Path) -> usize {
        self.state
            .lock()
            .shallow_calls
            .get(path)
            .copied()
            .unwrap_or_default()
    }

    pub fn bundle_calls(&self) -> usize {
        self.state.lock().bundle_calls
    }

    pub fn id_of(&self, path: impl AsRef<Path>) -> Option<ModuleId> {
        self.state.lock().files.get(path.as_ref()).map(|entry| entry.id)
    }
}

#[async_trait]
impl Resolver for InMemoryResolver {
    async fn get_shallow_dependencies(
        &self,
        options: &ResolveOptions,
    ) -> ResolverResult<Vec<PathBuf>> {
        let mut state = self.state.lock();
        *state
            .shallow_calls
            .entry(options.entry_file.clone())
            .or_default() += 1;

        if let Some(error) = state.failures.get(&options.entry_file) {
            return Err(error.clone());
        }
        state
            .files
            .get(&options.entry_file)
            .map(|entry| entry.dependencies.clone())
            .ok_or_else(|| ResolverError::NotFound {
                path: options.entry_file.clone(),
            })
    }

    async fn get_module_for_path(&self, path: &Path) -> ResolverResult<Module> {
        let state = self.state.lock();
        state
            .files
            .get(path)
            .map(|entry| Module::new(entry.id, path, entry.kind))
            .ok_or_else(|| ResolverError::NotFound {
                path: path.to_path_buf(),
            })
    }

    async fn build_bundle_for_hmr(
        &self,
        options: &BundleOptions,
        host: &str,
        port: u16,
    ) -> ResolverResult<Bundle> {
        let latency = {
            let mut state = self.state.lock();
            state.bundle_calls += 1;
            state.latency
        };
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }

        let state = self.state.lock();
        let mut modules = Vec::with_capacity(options.modules.len());
        for module in &options.modules {
            if let Some(error) = state.failures.get(&module.path) {
                return Err(error.clone());
            }
            let entry = state
                .files
                .get(&module.path)
                .ok_or_else(|| ResolverError::NotFound {
                    path: module.path.clone(),
                })?;
            let url = format!(
                "http://{host}:{port}{}?platform={}",
                module.path.display(),
                options.resolve.platform
            );
            modules.push(BundledModule {
                id: entry.id,
                code: format!(
                    "__d(function(global, require, module, exports) {{\n{}\n}}, {});",
                    entry.code, entry.id
                ),
                source_mapping_url: format!("{url}&map=true"),
                source_url: url,
            });
        }
        Ok(Bundle { modules })
    }
}

/// Sink that records every message it accepts.
#[derive(Debug, Default)]
pub struct RecordingSink {
    messages: Mutex<Vec<ServerMessage>>,
    closed: AtomicBool,
    close_after: Mutex<Option<usize>>,
    notify: Notify,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn messages(&self) -> Vec<ServerMessage> {
        self.messages.lock().clone()
    }

    pub fn kinds(&self) -> Vec<&'static str> {
        self.messages.lock().iter().map(ServerMessage::kind).collect()
    }

    pub fn updates(&self) -> Vec<UpdatePayload> {
        self.messages
            .lock()
            .iter()
            .filter_map(|message| match message {
                ServerMessage::Update(payload) => Some(payload.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn errors(&self) -> Vec<ErrorBody> {
        self.messages
            .lock()
            .iter()
            .filter_map(|message| match message {
                ServerMessage::Error(body) => Some(body.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn clear(&self) {
        self.messages.lock().clear();
    }

    /// Simulate the client going away.
    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        self.notify.notify_waiters();
    }

    /// Accept `count` more messages, then behave as closed.
    pub fn close_after(&self, count: usize) {
        let accepted = self.messages.lock().len();
        *self.close_after.lock() = Some(accepted + count);
    }

    /// Wait until at least `count` messages were recorded, or the sink closed.
    pub async fn wait_for(&self, count: usize) {
        loop {
            let notified = self.notify.notified();
            if self.messages.lock().len() >= count || self.is_closed() {
                return;
            }
            notified.await;
        }
    }
}

impl MessageSink for RecordingSink {
    fn send(&self, message: ServerMessage) -> Result<(), SinkClosed> {
        if self.is_closed() {
            return Err(SinkClosed);
        }
        let accepted = {
            let mut messages = self.messages.lock();
            messages.push(message);
            messages.len()
        };
        if self.close_after.lock().is_some_and(|limit| accepted >= limit) {
            self.closed.store(true, Ordering::SeqCst);
        }
        self.notify.notify_waiters();
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

/// Change source driven by hand. Counts attach and detach transitions.
#[derive(Default)]
pub struct ManualChangeSource {
    listener: Mutex<Option<ChangeListener>>,
    attaches: AtomicUsize,
    detaches: AtomicUsize,
    attach_failure: Mutex<Option<String>>,
}

impl ManualChangeSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn attach_count(&self) -> usize {
        self.attaches.load(Ordering::SeqCst)
    }

    pub fn detach_count(&self) -> usize {
        self.detaches.load(Ordering::SeqCst)
    }

    pub fn is_attached(&self) -> bool {
        self.listener.lock().is_some()
    }

    /// Make the next attach fail with `message`.
    pub fn fail_next_attach(&self, message: impl Into<String>) {
        *self.attach_failure.lock() = Some(message.into());
    }

    /// Deliver `event` to the installed listener, if any. Returns whether it
    /// was delivered.
    pub fn emit(&self, event: ChangeEvent) -> bool {
        let listener = self.listener.lock().clone();
        match listener {
            Some(listener) => {
                listener(event);
                true
            }
            None => false,
        }
    }
}

impl ChangeSource for ManualChangeSource {
    fn set_change_listener(
        &self,
        listener: Option<ChangeListener>,
    ) -> Result<(), ChangeSourceError> {
        let mut slot = self.listener.lock();
        match (&*slot, &listener) {
            (None, Some(_)) => {
                if let Some(message) = self.attach_failure.lock().take() {
                    return Err(ChangeSourceError::new(message));
                }
                self.attaches.fetch_add(1, Ordering::SeqCst);
            }
            (Some(_), None) => {
                self.detaches.fetch_add(1, Ordering::SeqCst);
            }
            _ => {}
        }
        *slot = listener;
        Ok(())
    }
}

impl std::fmt::Debug for ManualChangeSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ManualChangeSource")
            .field("attached", &self.is_attached())
            .finish()
    }
}
