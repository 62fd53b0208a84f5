//! Affected-module closure
//!
//! Given modules whose capabilities are about to be invalidated, computes
//! every module that must be recomputed with them: consumers wired to their
//! capabilities (package, named and module requirement edges), transitively,
//! plus fragments and hosts of anything in the set.

use std::collections::{BTreeSet, VecDeque};
use tracing::debug;

use super::Registry;
use crate::module::model::ModuleId;

/// Transitive closure from `seed`.
///
/// An empty seed means every module owning a zombie capability. Unknown ids
/// in the seed are ignored.
pub fn affected_closure(registry: &Registry, seed: &BTreeSet<ModuleId>) -> BTreeSet<ModuleId> {
    let start: Vec<ModuleId> = if seed.is_empty() {
        registry
            .modules()
            .filter(|m| {
                m.declared_capabilities()
                    .iter()
                    .any(|c| registry.capability(*c).is_some_and(|cap| cap.zombie))
            })
            .map(|m| m.id)
            .collect()
    } else {
        seed.iter()
            .copied()
            .filter(|id| registry.module(*id).is_some())
            .collect()
    };

    let mut closure: BTreeSet<ModuleId> = start.iter().copied().collect();
    let mut queue: VecDeque<ModuleId> = start.into_iter().collect();

    while let Some(id) = queue.pop_front() {
        let Some(module) = registry.module(id) else {
            continue;
        };

        let consumers = module
            .declared_capabilities()
            .iter()
            .flat_map(|cap| registry.consumers_of(*cap))
            .filter_map(|req| registry.requirement(req).map(|r| r.module));
        let attached = module.fragments().iter().copied().chain(module.host());

        for next in consumers.chain(attached) {
            if closure.insert(next) {
                queue.push_back(next);
            }
        }
    }

    debug!("Affected closure of {} seed module(s): {} module(s)", seed.len(), closure.len());
    closure
}
