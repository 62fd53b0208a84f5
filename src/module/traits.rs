//! Module system traits and error types
//!
//! Defines the contracts the resolver shares with its collaborators: module
//! state as seen by the lifecycle manager, the permission oracle, and the
//! error taxonomy of registry and resolver operations.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

use crate::module::model::{Capability, Module, ModuleId, Requirement, RequirementId};

/// Module lifecycle state
///
/// Owned by the lifecycle manager; the resolver only moves modules from
/// `Installed` to `Resolved` when it commits a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModuleState {
    /// Installed, not wired
    Installed,
    /// All mandatory requirements wired
    Resolved,
    /// Resolved and started by the lifecycle manager
    Active,
}

impl ModuleState {
    pub fn is_resolved(self) -> bool {
        matches!(self, ModuleState::Resolved | ModuleState::Active)
    }
}

/// Yes/no oracle deciding who may offer or consume what
///
/// Enforcement mechanics live outside the resolver; it only asks.
pub trait PermissionOracle: Send + Sync {
    /// May `module` offer `capability` to others?
    fn may_provide(&self, module: &Module, capability: &Capability) -> bool;

    /// May `module` satisfy `requirement` with `capability`?
    fn may_require(&self, module: &Module, requirement: &Requirement, capability: &Capability)
        -> bool;
}

/// Registry errors
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("Invalid module descriptor {name}: {}", .errors.join("; "))]
    InvalidDescriptor { name: String, errors: Vec<String> },

    #[error("Module not found: {0}")]
    ModuleNotFound(ModuleId),

    #[error("Module {0} still provides capabilities to other modules")]
    StillInUse(ModuleId),

    #[error("Fragment host not found: {0}")]
    HostNotFound(String),

    #[error("Registry cannot change while this caller drives a resolution session")]
    SessionActive,
}

/// Resolution failures
///
/// Every variant aborts only the current resolve attempt; the registry is
/// left exactly as it was before the call.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ResolveError {
    #[error("Missing provider for {description}")]
    MissingProvider {
        requirement: RequirementId,
        description: String,
    },

    #[error("Uses constraint violated for package {0}")]
    UsesConflict(String),

    #[error("Singleton collision with {identity}")]
    SingletonCollision { module: ModuleId, identity: String },

    #[error("Requirement not satisfied: {description}")]
    RequirementUnsatisfied {
        requirement: RequirementId,
        description: String,
    },

    #[error("Rejected by resolver hook: {0}")]
    HookVeto(String),

    #[error("Deadlock detected: {0}")]
    DeadlockDetected(String),

    #[error("Unknown module: {0}")]
    UnknownModule(ModuleId),

    #[error("Unknown requirement: {0}")]
    UnknownRequirement(RequirementId),

    #[error("Requirement {0} is not a dynamic import")]
    NotDynamic(RequirementId),

    #[error("Speculative resolution exceeded depth {0}")]
    DepthExceeded(usize),

    #[error("Timed out after {0:?} waiting for the resolver session")]
    SessionTimeout(Duration),
}

impl ResolveError {
    /// Failures that say something about the candidate graph, as opposed to
    /// misuse of the resolver API
    pub fn is_resolution_failure(&self) -> bool {
        matches!(
            self,
            ResolveError::MissingProvider { .. }
                | ResolveError::UsesConflict(_)
                | ResolveError::SingletonCollision { .. }
                | ResolveError::RequirementUnsatisfied { .. }
                | ResolveError::HookVeto(_)
                | ResolveError::DepthExceeded(_)
        )
    }
}
