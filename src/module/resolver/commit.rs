//! Session commit

use std::sync::Arc;
use tracing::info;

use super::{Resolver, SessionGuard};
use crate::module::hooks::HookContext;
use crate::module::model::Wire;
use crate::module::registry::Resolution;

impl Resolver {
    /// Apply a successful session to the registry and notify hooks.
    ///
    /// The ticket stays held until the hooks have run, so a hook asking for a
    /// module of this session joins instead of waiting.
    pub(super) fn commit(&self, guard: SessionGuard<'_>, resolution: Resolution) -> Vec<Wire> {
        let members = resolution.resolved.clone();

        let (wires, registry) = {
            let mut shared = self.lock();
            let wires = Arc::make_mut(&mut shared.registry).apply(resolution);
            (wires, Arc::clone(&shared.registry))
        };

        info!(
            "Committed session {}: {} module(s) resolved, {} new wire(s)",
            guard.ticket,
            members.len(),
            wires.len()
        );

        if !wires.is_empty() {
            let ctx = HookContext {
                registry: &registry,
                members: &members,
                caller: guard.caller,
            };
            self.hooks.wires_committed(&ctx, &wires);
        }

        drop(guard);
        wires
    }
}
