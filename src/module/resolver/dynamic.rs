//! Dynamic imports
//!
//! Late, on-demand wiring of a package matched by a resolved module's
//! dynamic import pattern. Runs a single-requirement session seeded with the
//! importer's current wiring and commits one new concrete requirement with
//! its wire, or nothing.

use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::debug;

use super::session::{Session, SessionEnv};
use super::{CallToken, Resolver, SessionGuard};
use crate::module::model::{
    CapabilityId, ModuleId, Namespace, Requirement, RequirementId, ResolutionPolicy, Visibility,
};
use crate::module::registry::Registry;
use crate::module::traits::ResolveError;

enum DynamicTarget {
    /// Answer known without a session
    Done(Option<CapabilityId>),
    /// Concrete requirement to resolve
    Needed(Requirement),
}

enum DynamicAdmission<'r> {
    Answered(Option<CapabilityId>),
    Open(SessionGuard<'r>, Arc<Registry>, Requirement),
}

impl Resolver {
    /// Wire `package` for the dynamic import declaration `requirement`.
    ///
    /// Returns the providing capability, or `None` if the pattern does not
    /// match, the importer is not resolved, or no consistent provider exists.
    pub fn register_dynamic_import(
        &self,
        requirement: RequirementId,
        package: &str,
    ) -> Result<Option<CapabilityId>, ResolveError> {
        self.register_dynamic_import_as(CallToken::current(), requirement, package)
    }

    pub fn register_dynamic_import_as(
        &self,
        caller: CallToken,
        requirement: RequirementId,
        package: &str,
    ) -> Result<Option<CapabilityId>, ResolveError> {
        let (guard, snapshot, provisional) = match self.dynamic_admission(caller, requirement, package)? {
            DynamicAdmission::Open(guard, snapshot, provisional) => (guard, snapshot, provisional),
            DynamicAdmission::Answered(answer) => return Ok(answer),
        };

        let wired = {
            let publish = |members: &BTreeSet<ModuleId>| self.publish(guard.ticket, members);
            let env = SessionEnv {
                registry: &snapshot,
                hooks: &self.hooks,
                permissions: self.permissions.as_ref(),
                config: &self.config,
                caller,
                publish: &publish,
            };
            let mut session = Session::new(&env);
            session.seed_from_wiring(provisional.module);
            session.resolve_requirement(&provisional)?;

            let chosen = session.state.wires.get(&provisional.id).copied();
            chosen.map(|capability| (capability, session.into_resolution()))
        };
        drop(snapshot);

        let Some((capability, mut resolution)) = wired else {
            debug!("No provider for dynamic import of {} ({})", package, requirement);
            return Ok(None);
        };
        resolution.dynamic = Some(provisional);
        self.commit(guard, resolution);
        Ok(Some(capability))
    }

    /// Wait for the session slot, answering early where no session is needed
    fn dynamic_admission(
        &self,
        caller: CallToken,
        requirement: RequirementId,
        package: &str,
    ) -> Result<DynamicAdmission<'_>, ResolveError> {
        let timeout = self.config.session_wait_timeout();
        let deadline = timeout.map(|t| std::time::Instant::now() + t);
        let mut shared = self.lock();

        loop {
            let provisional = match dynamic_target(&shared.registry, requirement, package)? {
                DynamicTarget::Done(answer) => return Ok(DynamicAdmission::Answered(answer)),
                DynamicTarget::Needed(provisional) => provisional,
            };

            if shared.ticket.is_none() {
                let guard = SessionGuard::open(self, &mut shared, caller);
                return Ok(DynamicAdmission::Open(guard, Arc::clone(&shared.registry), provisional));
            }
            if let Some(ticket) = shared.ticket.as_ref().filter(|t| t.driven_by(caller)) {
                return Err(ResolveError::DeadlockDetected(format!(
                    "{} drives session {} and asked for a dynamic import of {}",
                    caller, ticket.id, package
                )));
            }

            shared = self.wait(shared, deadline, timeout)?;
        }
    }
}

fn dynamic_target(
    registry: &Registry,
    requirement: RequirementId,
    package: &str,
) -> Result<DynamicTarget, ResolveError> {
    let declaration = registry
        .requirement(requirement)
        .ok_or(ResolveError::UnknownRequirement(requirement))?;
    let pattern = declaration
        .dynamic
        .as_ref()
        .ok_or(ResolveError::NotDynamic(requirement))?;
    if !pattern.matches(package) {
        return Ok(DynamicTarget::Done(None));
    }

    let importer = registry
        .module(declaration.module)
        .ok_or(ResolveError::UnknownModule(declaration.module))?;
    if !importer.state().is_resolved() {
        return Ok(DynamicTarget::Done(None));
    }

    let existing = importer
        .declared_requirements()
        .iter()
        .filter_map(|r| registry.requirement(*r))
        .filter(|r| r.namespace == Namespace::Package && r.name == package)
        .find_map(|r| r.provider());
    if existing.is_some() {
        return Ok(DynamicTarget::Done(existing));
    }

    Ok(DynamicTarget::Needed(Requirement {
        id: registry.next_requirement_id(),
        module: importer.id,
        namespace: Namespace::Package,
        name: package.to_string(),
        filter: declaration.filter.clone(),
        policy: ResolutionPolicy::Optional,
        visibility: Visibility::Private,
        dynamic: None,
        origin: Some(requirement),
        provider: None,
        internal_candidate: None,
    }))
}

impl<'a> Session<'a> {
    /// Start from the importer's committed package wiring
    fn seed_from_wiring(&mut self, module: ModuleId) {
        for wire in self.registry().wires_of(module) {
            let Some(cap) = self.registry().capability(wire.capability) else {
                continue;
            };
            if cap.is_package() {
                self.state.providers.insert(cap.name.clone(), cap.id);
            }
        }
    }
}
