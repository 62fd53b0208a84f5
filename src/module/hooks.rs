//! Resolver hooks
//!
//! Externally injected policy: veto resolvability of a module, narrow the
//! candidates of a requirement, arbitrate singleton collisions, and observe
//! committed wires. Hooks run synchronously on the thread driving the session
//! and must not start a resolution for a module outside the session
//! themselves (that is reported as a deadlock).

use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::warn;

use crate::module::model::{Capability, CapabilityId, Module, ModuleId, Requirement, Wire};
use crate::module::registry::Registry;
use crate::module::resolver::CallToken;

/// What a hook can see while it runs
pub struct HookContext<'a> {
    /// Registry as of the start of the session (after commit for `wires_committed`)
    pub registry: &'a Registry,
    /// Modules admitted by the open session so far
    pub members: &'a BTreeSet<ModuleId>,
    /// Token of the caller driving the session
    pub caller: CallToken,
}

/// Resolver policy hook; every method defaults to "no opinion"
pub trait ResolverHook: Send + Sync {
    /// Return false to veto resolving `module` in this session
    fn filter_resolvable(&self, _ctx: &HookContext<'_>, _module: &Module) -> bool {
        true
    }

    /// Remove candidates for `requirement`; additions are ignored
    fn filter_matches(
        &self,
        _ctx: &HookContext<'_>,
        _requirement: &Requirement,
        _candidates: &mut Vec<CapabilityId>,
    ) {
    }

    /// Remove identity capabilities that should not count as colliding with
    /// `singleton`; additions are ignored
    fn filter_singleton_collisions(
        &self,
        _ctx: &HookContext<'_>,
        _singleton: &Capability,
        _collisions: &mut Vec<CapabilityId>,
    ) {
    }

    /// Called once per commit with the wires it created
    fn wires_committed(&self, _ctx: &HookContext<'_>, _wires: &[Wire]) {}
}

/// Ordered set of hooks with remove-only enforcement
#[derive(Clone, Default)]
pub struct HookRegistry {
    hooks: Vec<Arc<dyn ResolverHook>>,
}

impl HookRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, hook: Arc<dyn ResolverHook>) {
        self.hooks.push(hook);
    }

    pub fn is_empty(&self) -> bool {
        self.hooks.is_empty()
    }

    pub fn len(&self) -> usize {
        self.hooks.len()
    }

    pub fn filter_resolvable(&self, ctx: &HookContext<'_>, module: &Module) -> bool {
        self.hooks.iter().all(|h| h.filter_resolvable(ctx, module))
    }

    /// Run every hook over `candidates`, keeping only what all of them kept
    pub fn filter_matches(
        &self,
        ctx: &HookContext<'_>,
        requirement: &Requirement,
        candidates: &mut Vec<CapabilityId>,
    ) {
        for hook in &self.hooks {
            let mut working = candidates.clone();
            hook.filter_matches(ctx, requirement, &mut working);
            retain_removals(candidates, &working, "filter_matches");
        }
    }

    pub fn filter_singleton_collisions(
        &self,
        ctx: &HookContext<'_>,
        singleton: &Capability,
        collisions: &mut Vec<CapabilityId>,
    ) {
        for hook in &self.hooks {
            let mut working = collisions.clone();
            hook.filter_singleton_collisions(ctx, singleton, &mut working);
            retain_removals(collisions, &working, "filter_singleton_collisions");
        }
    }

    pub fn wires_committed(&self, ctx: &HookContext<'_>, wires: &[Wire]) {
        for hook in &self.hooks {
            hook.wires_committed(ctx, wires);
        }
    }
}

/// Apply the removals a hook made to `original`, ignoring anything it added
fn retain_removals(original: &mut Vec<CapabilityId>, filtered: &[CapabilityId], method: &str) {
    if filtered.iter().any(|c| !original.contains(c)) {
        warn!("Resolver hook tried to add candidates in {}; additions ignored", method);
    }
    original.retain(|c| filtered.contains(c));
}
