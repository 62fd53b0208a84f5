//! Capability/requirement model
//!
//! Plain value types shared by the registry and the resolver. Modules,
//! capabilities and requirements reference each other only through
//! registry-assigned ids, so the whole model can be cloned for speculative
//! resolution without any ownership cycles.

pub mod capability;
pub mod requirement;
pub mod version;

use std::fmt;

use crate::module::traits::ModuleState;

pub use capability::{Capability, CapabilityId, ModuleId, Namespace, RequirementId};
pub use requirement::{Filter, NamePattern, Requirement, ResolutionPolicy, Visibility, Wire};
pub use version::{Version, VersionError, VersionRange};

/// An installed unit of resolution
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Module {
    pub id: ModuleId,
    pub symbolic_name: String,
    pub version: Version,
    pub singleton: bool,
    pub state: ModuleState,
    /// Declared capabilities, identity capability first
    pub(crate) capabilities: Vec<CapabilityId>,
    /// Declared requirements in processing order
    pub(crate) requirements: Vec<RequirementId>,
    /// The module-namespace capability naming this module
    pub(crate) identity: CapabilityId,
    /// Capabilities of required modules re-exported by this one
    pub(crate) reexports: Vec<CapabilityId>,
    pub(crate) host: Option<ModuleId>,
    pub(crate) fragments: Vec<ModuleId>,
}

impl Module {
    pub fn symbolic_name(&self) -> &str {
        &self.symbolic_name
    }

    pub fn is_singleton(&self) -> bool {
        self.singleton
    }

    pub fn state(&self) -> ModuleState {
        self.state
    }

    pub fn declared_capabilities(&self) -> &[CapabilityId] {
        &self.capabilities
    }

    pub fn declared_requirements(&self) -> &[RequirementId] {
        &self.requirements
    }

    pub fn identity(&self) -> CapabilityId {
        self.identity
    }

    pub fn reexports(&self) -> &[CapabilityId] {
        &self.reexports
    }

    pub fn host(&self) -> Option<ModuleId> {
        self.host
    }

    pub fn fragments(&self) -> &[ModuleId] {
        &self.fragments
    }
}

impl fmt::Display for Module {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.symbolic_name, self.version)
    }
}
