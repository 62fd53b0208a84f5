//! Module system
//!
//! Modules declare capabilities (exported packages, generic capabilities,
//! their own identity) and requirements (imported packages, required
//! modules, generic requirements, dynamic import patterns). The resolver
//! wires every requirement of the modules it admits to exactly one
//! capability while keeping all resolved modules consistent:
//!
//! - **Registry**: modules, capabilities, requirements and committed wires
//! - **Resolver**: sessions with speculative resolution and atomic commit
//! - **Hooks**: pluggable vetoes over resolvability, candidates and singletons
//! - **Permissions**: yes/no oracle over who may provide or consume what

pub mod hooks;
pub mod manager;
pub mod model;
pub mod registry;
pub mod resolver;
pub mod security;
pub mod traits;
pub mod validation;

pub use hooks::{HookContext, HookRegistry, ResolverHook};
pub use manager::{ModuleManager, ResolutionReport};
pub use model::{
    Capability, CapabilityId, Filter, Module, ModuleId, NamePattern, Namespace, Requirement,
    RequirementId, ResolutionPolicy, Version, VersionRange, Visibility, Wire,
};
pub use registry::{ModuleDescriptor, ModuleSet, Registry};
pub use resolver::{CallToken, Resolver, ResolverBuilder};
pub use security::{AllowAll, PermissionChecker};
pub use traits::{ModuleState, PermissionOracle, RegistryError, ResolveError};
