//! Candidate selection
//!
//! Builds the candidate list of a requirement, lets hooks narrow it, and
//! tries survivors in priority order: modules already admitted by the
//! session, then resolved modules, then installed modules that can be
//! speculatively resolved, zombie capabilities last. Ties go to the higher
//! version, then the lower module id. The first candidate whose trial
//! succeeds wins; a failed trial is rolled back and the candidate blacklisted.

use std::cmp::Reverse;
use tracing::debug;

use super::session::{Rejection, Session};
use crate::module::model::{CapabilityId, Module, ModuleId, Namespace, Requirement, Version};
use crate::module::traits::ResolveError;

type Priority = (u8, Reverse<Version>, ModuleId);

impl<'a> Session<'a> {
    /// Choose the provider of `requirement`, or explain why there is none
    pub(crate) fn pick_provider(&mut self, requirement: &Requirement) -> Result<CapabilityId, ResolveError> {
        let requirer = self.module(requirement.module)?;

        if requirement.namespace == Namespace::Package {
            if let Some(chosen) = self.state.providers.get(&requirement.name).copied() {
                if self.usable(requirement, requirer, chosen) {
                    return self.reuse_provider(requirement, chosen);
                }
                debug!(
                    "Session already provides {} with {}, which does not satisfy {}",
                    requirement.name,
                    chosen,
                    self.registry().describe(requirement)
                );
                return Err(ResolveError::UsesConflict(requirement.name.clone()));
            }
        }

        let matched = self.matching_candidates(requirement, requirer);
        if matched.is_empty() {
            return Err(self.unsatisfied(requirement));
        }

        let mut candidates = matched.clone();
        self.env
            .hooks
            .filter_matches(&self.hook_context(), requirement, &mut candidates);
        self.stats.hook_filtered += matched.len() - candidates.len();
        if candidates.is_empty() {
            return Err(ResolveError::HookVeto(format!(
                "every candidate for {} was filtered",
                self.registry().describe(requirement)
            )));
        }

        candidates.sort_by_cached_key(|c| self.priority(*c));

        let mut rejections = Vec::new();
        for candidate in candidates {
            if let Some(rejection) = self.state.blacklist.get(&candidate) {
                rejections.push(rejection.clone());
                continue;
            }

            let saved = self.snapshot();
            match self.try_candidate(candidate) {
                Ok(()) => {
                    debug!(
                        "Picked {} for {}",
                        candidate,
                        self.registry().describe(requirement)
                    );
                    return Ok(candidate);
                }
                Err(error) => {
                    self.restore(saved);
                    debug!("Rejected candidate {} for {}: {}", candidate, requirement, error);

                    let rejection = Rejection::from_error(&error);
                    if self.owner_of(candidate) == Some(requirement.module) {
                        self.state
                            .internal_candidates
                            .insert(requirement.id, candidate);
                    }
                    self.state.blacklist.insert(candidate, rejection.clone());
                    rejections.push(rejection);
                }
            }
        }

        Err(self.select_failure(requirement, &rejections))
    }

    /// Hand the session's provider of a package to another importer. Hooks
    /// still see the requirement, as a one-element candidate list.
    fn reuse_provider(&mut self, requirement: &Requirement, chosen: CapabilityId) -> Result<CapabilityId, ResolveError> {
        let mut candidates = vec![chosen];
        self.env
            .hooks
            .filter_matches(&self.hook_context(), requirement, &mut candidates);
        if !candidates.contains(&chosen) {
            self.stats.hook_filtered += 1;
            return Err(ResolveError::HookVeto(format!(
                "every candidate for {} was filtered",
                self.registry().describe(requirement)
            )));
        }
        if let Some(rejection) = self.state.blacklist.get(&chosen) {
            debug!("Session provider {} for {} was rejected earlier", chosen, requirement);
            let rejections = [rejection.clone()];
            return Err(self.select_failure(requirement, &rejections));
        }
        Ok(chosen)
    }

    /// Exporters passing the filter, the zombie policy and the permission oracle
    fn matching_candidates(&mut self, requirement: &Requirement, requirer: &Module) -> Vec<CapabilityId> {
        let registry = self.registry();
        let mut matched = Vec::new();

        for cap in registry.lookup(&requirement.namespace, &requirement.name) {
            let Some(owner) = registry.module(cap.module) else {
                continue;
            };
            if !requirement.accepts(cap, owner) {
                continue;
            }
            if cap.zombie && !self.env.config.allow_zombie_providers {
                continue;
            }

            let permitted = self.env.permissions.may_provide(owner, cap)
                && self.env.permissions.may_require(requirer, requirement, cap);
            if !permitted {
                debug!("Permission denied wiring {} to {}", requirement, cap);
                if cap.module == requirement.module {
                    self.state
                        .internal_candidates
                        .insert(requirement.id, cap.id);
                }
                continue;
            }
            matched.push(cap.id);
        }
        matched
    }

    fn usable(&self, requirement: &Requirement, requirer: &Module, capability: CapabilityId) -> bool {
        let registry = self.registry();
        let Some(cap) = registry.capability(capability) else {
            return false;
        };
        let Some(owner) = registry.module(cap.module) else {
            return false;
        };
        requirement.accepts(cap, owner)
            && self.env.permissions.may_provide(owner, cap)
            && self.env.permissions.may_require(requirer, requirement, cap)
    }

    fn priority(&self, capability: CapabilityId) -> Priority {
        let Some(cap) = self.registry().capability(capability) else {
            return (u8::MAX, Reverse(Version::default()), ModuleId(u32::MAX));
        };
        let rank = if cap.zombie {
            3
        } else if self.state.resolved.contains(&cap.module) {
            0
        } else if self.is_settled(cap.module) {
            1
        } else {
            2
        };
        (rank, Reverse(cap.version.clone()), cap.module)
    }

    /// Resolve the candidate's owner if needed, then check uses-consistency
    fn try_candidate(&mut self, candidate: CapabilityId) -> Result<(), ResolveError> {
        if let Some(owner) = self.owner_of(candidate) {
            if !self.is_settled(owner) {
                self.check_resolve(owner)?;
            }
        }
        self.check_uses(candidate).map_err(ResolveError::UsesConflict)
    }

    fn owner_of(&self, capability: CapabilityId) -> Option<ModuleId> {
        self.registry().capability(capability).map(|c| c.module)
    }

    /// Uses conflicts explain a failure better than a missing provider
    fn select_failure(&self, requirement: &Requirement, rejections: &[Rejection]) -> ResolveError {
        let uses = rejections.iter().find_map(|r| match r {
            Rejection::Uses(package) => Some(package.clone()),
            _ => None,
        });
        if let Some(package) = uses {
            return ResolveError::UsesConflict(package);
        }

        let depth = rejections.iter().find_map(|r| match r {
            Rejection::Depth(depth) => Some(*depth),
            _ => None,
        });
        match depth {
            Some(depth) => ResolveError::DepthExceeded(depth),
            None => self.unsatisfied(requirement),
        }
    }
}
