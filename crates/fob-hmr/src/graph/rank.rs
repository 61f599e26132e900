//! Leaf-first delivery order.
//!
//! Updated modules must reach the client dependencies-first: a newly added
//! module has to be defined before the module that requires it is
//! re-evaluated. The rank is a post-order depth-first numbering from the
//! entry file, so it does not depend on how the graph was discovered.

use std::path::{Path, PathBuf};

use rustc_hash::{FxHashMap, FxHashSet};

use super::ShallowDependencyMap;
use crate::module::Module;

/// Post-order DFS rank of every module reachable from `entry`.
///
/// Children are visited in import order. Back edges (cycles) are ignored, so
/// for every non-cyclic edge `u -> v`, `rank[v] < rank[u]`.
pub fn leaf_first_rank(entry: &Path, shallow: &ShallowDependencyMap) -> FxHashMap<PathBuf, usize> {
    let mut rank = FxHashMap::default();
    let mut visited: FxHashSet<&Path> = FxHashSet::default();
    // (module, index of next child to visit)
    let mut stack: Vec<(&Path, usize)> = Vec::new();

    let Some((entry_key, _)) = shallow.get_key_value(entry) else {
        return rank;
    };
    visited.insert(entry_key.as_path());
    stack.push((entry_key.as_path(), 0));

    while let Some((path, next_child)) = stack.last_mut() {
        let children = shallow.get(*path).map(Vec::as_slice).unwrap_or_default();

        if let Some(child) = children.get(*next_child) {
            *next_child += 1;
            if visited.insert(child.as_path()) {
                stack.push((child.as_path(), 0));
            }
            continue;
        }

        let finished = path.to_path_buf();
        stack.pop();
        let next = rank.len();
        rank.insert(finished, next);
    }

    rank
}

/// Sort `modules` leaf-first by `rank`.
///
/// The sort is stable; modules without a rank keep their relative order and
/// go last.
pub fn order_leaf_first(mut modules: Vec<Module>, rank: &FxHashMap<PathBuf, usize>) -> Vec<Module> {
    modules.sort_by_key(|module| rank.get(&module.path).copied().unwrap_or(usize::MAX));
    modules
}
