//! Singleton arbitration

use tracing::debug;

use super::session::Session;
use crate::module::model::{CapabilityId, Module};
use crate::module::traits::ResolveError;

impl<'a> Session<'a> {
    /// Fail if another singleton with the same symbolic name is resolved or
    /// admitted by this session and the hooks do not filter it out
    pub(crate) fn check_singleton(&self, module: &Module) -> Result<(), ResolveError> {
        if !module.is_singleton() {
            return Ok(());
        }
        let registry = self.registry();

        let others: Vec<&Module> = registry
            .modules_named(module.symbolic_name())
            .filter(|other| other.id != module.id && other.is_singleton())
            .collect();

        // Resolved ones first, then session members
        let mut collisions: Vec<CapabilityId> = others
            .iter()
            .filter(|other| other.state().is_resolved())
            .chain(
                others
                    .iter()
                    .filter(|other| !other.state().is_resolved() && self.state.resolved.contains(&other.id)),
            )
            .map(|other| other.identity())
            .collect();
        if collisions.is_empty() {
            return Ok(());
        }

        if let Some(identity) = registry.capability(module.identity()) {
            self.env
                .hooks
                .filter_singleton_collisions(&self.hook_context(), identity, &mut collisions);
        }

        let Some(first) = collisions
            .first()
            .and_then(|c| registry.capability(*c))
            .and_then(|c| registry.module(c.module))
        else {
            debug!("Hooks cleared every singleton collision for {}", module);
            return Ok(());
        };

        debug!("Singleton {} collides with {}", module, first);
        Err(ResolveError::SingletonCollision {
            module: first.id,
            identity: first.to_string(),
        })
    }
}
