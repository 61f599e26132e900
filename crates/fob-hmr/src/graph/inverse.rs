use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use serde::Serialize;

use super::ShallowDependencyMap;
use crate::module::ModuleId;

/// Module id → ids of the modules that directly depend on it.
///
/// Derived data: built only from a [`ShallowDependencyMap`] and replaced
/// wholesale whenever that map changes. Ordered containers keep the wire
/// representation deterministic.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct InverseDependencyMap(BTreeMap<ModuleId, BTreeSet<ModuleId>>);

impl InverseDependencyMap {
    /// Derive the inverse map. `id_of` maps a path to its module id; paths it
    /// cannot map are skipped.
    pub(crate) fn derive<F>(shallow: &ShallowDependencyMap, id_of: F) -> Self
    where
        F: Fn(&Path) -> Option<ModuleId>,
    {
        let mut inverse: BTreeMap<ModuleId, BTreeSet<ModuleId>> = BTreeMap::new();

        for (dependent_path, dependencies) in shallow {
            let Some(dependent) = id_of(dependent_path) else {
                continue;
            };
            // Every module gets an entry, even with no dependents.
            inverse.entry(dependent).or_default();
            for dependency_path in dependencies {
                if let Some(dependency) = id_of(dependency_path) {
                    inverse.entry(dependency).or_default().insert(dependent);
                }
            }
        }

        Self(inverse)
    }

    pub fn dependents_of(&self, id: ModuleId) -> impl Iterator<Item = ModuleId> + '_ {
        self.0.get(&id).into_iter().flatten().copied()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (ModuleId, &BTreeSet<ModuleId>)> {
        self.0.iter().map(|(id, dependents)| (*id, dependents))
    }
}
