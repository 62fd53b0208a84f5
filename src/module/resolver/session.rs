//! Resolution session
//!
//! The mutable working state of one resolve attempt. Everything that can be
//! rolled back lives in one [`SessionSnapshot`], so speculation is a single
//! clone before probing a candidate and a single restore when it fails.

use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;

use crate::config::ResolverConfig;
use crate::module::hooks::{HookContext, HookRegistry};
use crate::module::model::{CapabilityId, Module, ModuleId, Namespace, Requirement, RequirementId};
use crate::module::registry::{Registry, Resolution};
use crate::module::resolver::CallToken;
use crate::module::traits::{PermissionOracle, ResolveError};

/// Why a capability was blacklisted
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Rejection {
    /// Inconsistent provider for this package
    Uses(String),
    Depth(usize),
    /// Owner could not be resolved for another reason
    Unresolvable,
}

impl Rejection {
    pub(crate) fn from_error(error: &ResolveError) -> Self {
        match error {
            ResolveError::UsesConflict(package) => Rejection::Uses(package.clone()),
            ResolveError::DepthExceeded(depth) => Rejection::Depth(*depth),
            _ => Rejection::Unresolvable,
        }
    }
}

/// Rollback unit of a session
#[derive(Debug, Clone, Default)]
pub(crate) struct SessionSnapshot {
    /// Modules tentatively admitted
    pub resolved: BTreeSet<ModuleId>,
    /// Package name -> chosen capability
    pub providers: BTreeMap<String, CapabilityId>,
    /// Non-package requirement -> providing module
    pub required: BTreeMap<RequirementId, ModuleId>,
    /// Capabilities proven unusable in this attempt
    pub blacklist: BTreeMap<CapabilityId, Rejection>,
    /// Pending requirement -> capability edges
    pub wires: BTreeMap<RequirementId, CapabilityId>,
    pub internal_candidates: BTreeMap<RequirementId, CapabilityId>,
}

#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct SessionStats {
    pub speculations: usize,
    pub rollbacks: usize,
    pub hook_filtered: usize,
}

/// Read-only collaborators of a session
pub(crate) struct SessionEnv<'a> {
    pub registry: &'a Registry,
    pub hooks: &'a HookRegistry,
    pub permissions: &'a dyn PermissionOracle,
    pub config: &'a ResolverConfig,
    pub caller: CallToken,
    /// Publishes the current member set to waiting callers
    pub publish: &'a dyn Fn(&BTreeSet<ModuleId>),
}

pub(crate) struct Session<'a> {
    pub(crate) env: &'a SessionEnv<'a>,
    pub(crate) state: SessionSnapshot,
    pub(crate) depth: usize,
    pub(crate) stats: SessionStats,
}

impl<'a> Session<'a> {
    pub(crate) fn new(env: &'a SessionEnv<'a>) -> Self {
        Self {
            env,
            state: SessionSnapshot::default(),
            depth: 0,
            stats: SessionStats::default(),
        }
    }

    pub(crate) fn registry(&self) -> &'a Registry {
        self.env.registry
    }

    pub(crate) fn hook_context(&self) -> HookContext<'_> {
        HookContext {
            registry: self.env.registry,
            members: &self.state.resolved,
            caller: self.env.caller,
        }
    }

    pub(crate) fn snapshot(&self) -> SessionSnapshot {
        self.state.clone()
    }

    /// Restore a snapshot taken before a failed trial
    pub(crate) fn restore(&mut self, snapshot: SessionSnapshot) {
        let membership_changed = snapshot.resolved != self.state.resolved;
        self.state = snapshot;
        self.stats.rollbacks += 1;
        if membership_changed {
            (self.env.publish)(&self.state.resolved);
        }
    }

    pub(crate) fn module(&self, id: ModuleId) -> Result<&'a Module, ResolveError> {
        self.env
            .registry
            .module(id)
            .ok_or(ResolveError::UnknownModule(id))
    }

    pub(crate) fn requirement(&self, id: RequirementId) -> Result<&'a Requirement, ResolveError> {
        self.env
            .registry
            .requirement(id)
            .ok_or(ResolveError::UnknownRequirement(id))
    }

    /// Resolved before this session or admitted by it
    pub(crate) fn is_settled(&self, id: ModuleId) -> bool {
        self.state.resolved.contains(&id)
            || self
                .env
                .registry
                .module(id)
                .is_some_and(|m| m.state().is_resolved())
    }

    /// Current provider of a requirement: pending wire first, then committed
    pub(crate) fn wire_of(&self, requirement: &Requirement) -> Option<CapabilityId> {
        self.state
            .wires
            .get(&requirement.id)
            .copied()
            .or(requirement.provider())
    }

    /// Module bound to a non-package requirement, pending or committed
    pub(crate) fn required_module(&self, requirement: &Requirement) -> Option<ModuleId> {
        self.state.required.get(&requirement.id).copied().or_else(|| {
            requirement
                .provider()
                .and_then(|c| self.registry().capability(c))
                .map(|c| c.module)
        })
    }

    /// Resolve the session's top module against `requirements`
    pub(crate) fn resolve_top(
        &mut self,
        module: ModuleId,
        requirements: &[RequirementId],
    ) -> Result<(), ResolveError> {
        self.admit(module)?;

        let mut ordered = requirements
            .iter()
            .map(|id| self.requirement(*id))
            .collect::<Result<Vec<_>, _>>()?;
        ordered.sort_by_key(|r| processing_rank(&r.namespace));

        for requirement in &ordered {
            self.resolve_requirement(requirement)?;
        }
        self.recheck_mandatory(module, &ordered)?;

        debug!(
            "Session for {} settled {} module(s) with {} wire(s) ({} speculations, {} rollbacks, {} hook-filtered)",
            module,
            self.state.resolved.len(),
            self.state.wires.len(),
            self.stats.speculations,
            self.stats.rollbacks,
            self.stats.hook_filtered
        );
        Ok(())
    }

    /// Admit `module` and resolve all of its static requirements
    pub(crate) fn resolve_module(&mut self, module: ModuleId) -> Result<(), ResolveError> {
        if self.is_settled(module) {
            return Ok(());
        }
        self.admit(module)?;

        for id in self.env.registry.static_requirements(module) {
            let requirement = self.requirement(id)?;
            self.resolve_requirement(requirement)?;
        }
        Ok(())
    }

    /// Resolve a not-yet-settled candidate owner on top of the current state.
    ///
    /// The caller takes a snapshot beforehand and restores it on failure.
    pub(crate) fn check_resolve(&mut self, module: ModuleId) -> Result<(), ResolveError> {
        let limit = self.env.config.max_speculation_depth;
        if self.depth >= limit {
            debug!("Speculation depth {} reached at {}", limit, module);
            return Err(ResolveError::DepthExceeded(limit));
        }

        self.depth += 1;
        self.stats.speculations += 1;
        let result = self.resolve_module(module);
        self.depth -= 1;
        result
    }

    fn admit(&mut self, module: ModuleId) -> Result<(), ResolveError> {
        let m = self.module(module)?;
        if !self.env.hooks.filter_resolvable(&self.hook_context(), m) {
            debug!("Hook vetoed resolving {}", m);
            return Err(ResolveError::HookVeto(format!("{} is not resolvable", m)));
        }

        self.state.resolved.insert(module);
        (self.env.publish)(&self.state.resolved);
        self.check_singleton(m)
    }

    /// Every admitted module must end up with all mandatory requirements wired
    fn recheck_mandatory(&self, top: ModuleId, top_requirements: &[&Requirement]) -> Result<(), ResolveError> {
        for id in &self.state.resolved {
            let requirements: Vec<&Requirement> = if *id == top {
                top_requirements.to_vec()
            } else {
                self.env
                    .registry
                    .static_requirements(*id)
                    .into_iter()
                    .filter_map(|r| self.env.registry.requirement(r))
                    .collect()
            };

            if let Some(missing) = requirements
                .into_iter()
                .find(|r| !r.is_optional() && self.wire_of(r).is_none())
            {
                return Err(self.unsatisfied(missing));
            }
        }
        Ok(())
    }

    /// Outcome to hand to the registry on commit
    pub(crate) fn into_resolution(self) -> Resolution {
        let registry = self.env.registry;
        Resolution {
            resolved: self
                .state
                .resolved
                .into_iter()
                .filter(|id| registry.module(*id).is_some_and(|m| !m.state().is_resolved()))
                .collect(),
            wires: self.state.wires,
            internal_candidates: self.state.internal_candidates,
            dynamic: None,
        }
    }
}

/// Named requirements first, then module requirements, then packages
fn processing_rank(namespace: &Namespace) -> u8 {
    match namespace {
        Namespace::Named(_) => 0,
        Namespace::Module => 1,
        Namespace::Package => 2,
    }
}
