//! Change reactor.
//!
//! Decides, for one session and one changed file, which modules have to be
//! rebuilt and pushed. The common case (a function body edit) costs a single
//! shallow-dependency lookup; only a changed import list triggers a full
//! graph recomputation.

use std::sync::Arc;

use crate::broadcaster::ChangeEvent;
use crate::error::{HmrError, Result};
use crate::graph::compute_graph;
use crate::graph::rank::{leaf_first_rank, order_leaf_first};
use crate::module::Module;
use crate::resolver::{ResolveOptions, Resolver, ResolverError};
use crate::session::Session;

/// What a file change means for one session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reaction {
    /// The file is not part of this session's graph.
    Irrelevant,
    /// Modules to rebuild, leaf-first. Empty when the changed file is no
    /// longer reachable from the entry file.
    Rebuild(Vec<Module>),
    /// A module of the graph was deleted. Nothing to rebuild.
    Deleted(Module),
}

#[derive(Debug, Clone)]
pub struct ChangeReactor {
    resolver: Arc<dyn Resolver>,
}

impl ChangeReactor {
    pub fn new(resolver: Arc<dyn Resolver>) -> Self {
        Self { resolver }
    }

    /// Cheap relevance check: is the file in the session's shallow map?
    pub fn is_relevant(session: &Session, event: &ChangeEvent) -> bool {
        session
            .graph()
            .shallow_dependencies()
            .contains_key(event.path())
    }

    /// React to `event` for `session`.
    ///
    /// Session caches are updated before this returns, so the next change
    /// for the same session sees the post-change graph. On error the session
    /// is left untouched.
    pub async fn react(&self, session: &mut Session, event: &ChangeEvent) -> Result<Reaction> {
        if !Self::is_relevant(session, event) {
            return Ok(Reaction::Irrelevant);
        }

        let path = event.path();
        let Some(module) = session.graph().module_by_path(path).cloned() else {
            return Ok(Reaction::Irrelevant);
        };

        if event.is_deleted() {
            if path == session.entry_file() {
                return Err(HmrError::SessionInvalid {
                    entry_file: session.entry_file().to_path_buf(),
                });
            }
            return Ok(Reaction::Deleted(module));
        }

        // Assets are reloaded by the client itself; the cycle only brackets
        // them with update-start/update-done.
        if module.is_asset() {
            return Ok(Reaction::Rebuild(Vec::new()));
        }

        // JSON is tracked but never diffed.
        if !module.has_dependencies() {
            return Ok(Reaction::Rebuild(vec![module]));
        }

        let options = ResolveOptions::hot(session.platform(), path, session.entry_file());
        let current = self.resolver.get_shallow_dependencies(&options).await?;
        let cached = session.graph().shallow_dependencies_of(path).unwrap_or_default();

        if current.as_slice() == cached {
            tracing::debug!(path = %path.display(), "Dependency shape unchanged");
            return Ok(Reaction::Rebuild(vec![module]));
        }

        tracing::debug!(
            path = %path.display(),
            before = cached.len(),
            after = current.len(),
            "Shallow dependencies changed, recomputing graph"
        );

        let graph = compute_graph(self.resolver.as_ref(), session.platform(), session.entry_file())
            .await
            .map_err(|err| match err {
                ResolverError::NotFound { path } if path == session.entry_file() => {
                    HmrError::SessionInvalid { entry_file: path }
                }
                other => HmrError::from(other),
            })?;

        let added = graph.added_since(session.graph());
        let changed = graph.module_by_path(path).cloned();
        let rank = leaf_first_rank(session.entry_file(), graph.shallow_dependencies());
        session.replace_graph(graph);

        let Some(changed) = changed else {
            tracing::debug!(path = %path.display(), "Changed file is no longer reachable");
            return Ok(Reaction::Rebuild(Vec::new()));
        };

        let mut to_push = added;
        to_push.push(changed);
        Ok(Reaction::Rebuild(order_leaf_first(to_push, &rank)))
    }
}
