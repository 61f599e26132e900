//! Per-session dependency graph.
//!
//! A [`DependencyGraph`] is owned by exactly one session. It holds the
//! breadth-first ordered module list for one entry file and platform, the
//! shallow dependency map the change reactor diffs against, and the inverse
//! dependency map derived from it.

mod builder;
mod inverse;
pub mod rank;

pub use builder::compute_graph;
pub use inverse::InverseDependencyMap;

use std::path::{Path, PathBuf};

use indexmap::IndexMap;
use rustc_hash::{FxHashMap, FxHashSet};

use crate::module::{Module, ModuleId};

/// Module path → direct dependency paths, in import order.
///
/// Keys keep BFS discovery order so iteration is deterministic.
pub type ShallowDependencyMap = IndexMap<PathBuf, Vec<PathBuf>>;

/// Dependency graph for one entry file on one platform.
#[derive(Debug, Clone, Default)]
pub struct DependencyGraph {
    modules: Vec<Module>,
    shallow: ShallowDependencyMap,
    inverse: InverseDependencyMap,
    by_id: FxHashMap<ModuleId, usize>,
    by_path: FxHashMap<PathBuf, usize>,
}

impl DependencyGraph {
    /// Assemble a graph from BFS-ordered modules and their shallow dependencies.
    ///
    /// The inverse map is always derived here; there is no way to set it
    /// independently.
    pub fn from_parts(modules: Vec<Module>, shallow: ShallowDependencyMap) -> Self {
        let mut by_id = FxHashMap::default();
        let mut by_path = FxHashMap::default();
        for (index, module) in modules.iter().enumerate() {
            by_id.insert(module.id, index);
            by_path.insert(module.path.clone(), index);
        }

        let inverse = InverseDependencyMap::derive(&shallow, |path| {
            by_path.get(path).map(|&index| modules[index].id)
        });

        Self {
            modules,
            shallow,
            inverse,
            by_id,
            by_path,
        }
    }

    /// Modules in breadth-first discovery order.
    pub fn modules(&self) -> &[Module] {
        &self.modules
    }

    pub fn len(&self) -> usize {
        self.modules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }

    pub fn shallow_dependencies(&self) -> &ShallowDependencyMap {
        &self.shallow
    }

    /// Cached direct dependencies of `path`, if the path is part of the graph.
    pub fn shallow_dependencies_of(&self, path: &Path) -> Option<&[PathBuf]> {
        self.shallow.get(path).map(Vec::as_slice)
    }

    pub fn inverse_dependencies(&self) -> &InverseDependencyMap {
        &self.inverse
    }

    pub fn contains_path(&self, path: &Path) -> bool {
        self.by_path.contains_key(path)
    }

    pub fn module_by_path(&self, path: &Path) -> Option<&Module> {
        self.by_path.get(path).map(|&index| &self.modules[index])
    }

    pub fn module_by_id(&self, id: ModuleId) -> Option<&Module> {
        self.by_id.get(&id).map(|&index| &self.modules[index])
    }

    /// Set of known module paths.
    pub fn known_paths(&self) -> FxHashSet<&Path> {
        self.modules.iter().map(|m| m.path.as_path()).collect()
    }

    /// Modules of `self` whose paths are not present in `previous`, in this
    /// graph's discovery order.
    pub fn added_since(&self, previous: &DependencyGraph) -> Vec<Module> {
        self.modules
            .iter()
            .filter(|m| !previous.contains_path(&m.path))
            .cloned()
            .collect()
    }
}
