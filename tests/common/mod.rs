//! Shared fixtures for resolver integration tests
#![allow(dead_code)]

use std::collections::BTreeMap;
use std::sync::Arc;

use modwire::module::{
    CapabilityId, ModuleDescriptor, ModuleId, ModuleState, Namespace, Registry, RequirementId,
    Resolver, Wire,
};

/// Resolver with default config and no hooks
pub fn resolver() -> Arc<Resolver> {
    Arc::new(Resolver::new())
}

pub fn install(resolver: &Resolver, descriptor: ModuleDescriptor) -> ModuleId {
    resolver
        .install(&descriptor)
        .unwrap_or_else(|e| panic!("install {} failed: {}", descriptor.name, e))
}

/// Package capability `package` exported by `module`
pub fn export_of(registry: &Registry, module: ModuleId, package: &str) -> CapabilityId {
    registry
        .lookup(&Namespace::Package, package)
        .into_iter()
        .find(|c| c.module == module)
        .map(|c| c.id)
        .unwrap_or_else(|| panic!("{} does not export {}", module, package))
}

/// First requirement of `module` targeting `name`
pub fn requirement_named(registry: &Registry, module: ModuleId, name: &str) -> RequirementId {
    registry
        .module(module)
        .unwrap()
        .declared_requirements()
        .iter()
        .copied()
        .find(|r| registry.requirement(*r).unwrap().name == name)
        .unwrap_or_else(|| panic!("{} has no requirement on {}", module, name))
}

/// Committed provider of `module`'s requirement on `name`
pub fn wired_to(registry: &Registry, module: ModuleId, name: &str) -> Option<CapabilityId> {
    registry.provider_of(requirement_named(registry, module, name))
}

pub fn state_of(registry: &Registry, module: ModuleId) -> ModuleState {
    registry.module(module).unwrap().state()
}

/// Everything a failed resolve must leave untouched
#[derive(Debug, PartialEq, Eq)]
pub struct Observed {
    pub wires: Vec<Wire>,
    pub providers: BTreeMap<String, Vec<CapabilityId>>,
    pub states: Vec<(ModuleId, ModuleState)>,
    pub reexports: Vec<(ModuleId, Vec<CapabilityId>)>,
}

pub fn observe(registry: &Registry) -> Observed {
    let mut providers = BTreeMap::new();
    for module in registry.modules() {
        for cap in module.declared_capabilities() {
            let cap = registry.capability(*cap).unwrap();
            let active = registry.providers(&cap.namespace, &cap.name);
            providers.insert(
                format!("{}:{}", cap.namespace, cap.name),
                active.into_iter().collect(),
            );
        }
    }
    Observed {
        wires: registry.all_wires(),
        providers,
        states: registry.modules().map(|m| (m.id, m.state())).collect(),
        reexports: registry
            .modules()
            .map(|m| (m.id, m.reexports().to_vec()))
            .collect(),
    }
}
