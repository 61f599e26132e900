use std::collections::VecDeque;
use std::path::Path;

use rustc_hash::FxHashSet;

use super::{DependencyGraph, ShallowDependencyMap};
use crate::resolver::{ResolveOptions, Resolver, ResolverResult};

/// Compute the full dependency graph of `entry_file` for `platform`.
///
/// Breadth-first from the entry file, asking the resolver for each file's
/// direct dependencies. Assets and JSON modules are included but are not
/// expanded. The resulting module order is stable for a fixed source tree.
///
/// Resolver failures are returned unchanged.
pub async fn compute_graph(
    resolver: &dyn Resolver,
    platform: &str,
    entry_file: &Path,
) -> ResolverResult<DependencyGraph> {
    let mut modules = Vec::new();
    let mut shallow = ShallowDependencyMap::default();
    let mut seen = FxHashSet::default();
    let mut queue = VecDeque::new();

    seen.insert(entry_file.to_path_buf());
    queue.push_back(entry_file.to_path_buf());

    while let Some(path) = queue.pop_front() {
        let module = resolver.get_module_for_path(&path).await?;

        let dependencies = if module.has_dependencies() {
            let options = ResolveOptions::hot(platform, &path, entry_file);
            resolver.get_shallow_dependencies(&options).await?
        } else {
            Vec::new()
        };

        for dependency in &dependencies {
            if seen.insert(dependency.clone()) {
                queue.push_back(dependency.clone());
            }
        }

        shallow.insert(path, dependencies);
        modules.push(module);
    }

    tracing::debug!(
        entry = %entry_file.display(),
        platform,
        modules = modules.len(),
        "Computed dependency graph"
    );

    Ok(DependencyGraph::from_parts(modules, shallow))
}
