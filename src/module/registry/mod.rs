//! Module registry
//!
//! Owns every installed module with its capabilities and requirements, the
//! package table (providers/exporters/importers per namespace and name) and
//! the committed wiring. The resolver reads a snapshot of it during a session
//! and writes back only through [`Registry::apply`] when a session commits.

pub mod closure;
pub mod manifest;

use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, info, warn};

use crate::module::model::{
    Capability, CapabilityId, Filter, Module, ModuleId, NamePattern, Namespace, Requirement,
    RequirementId, ResolutionPolicy, Version, VersionRange, Visibility, Wire,
};
use crate::module::traits::{ModuleState, RegistryError};
use crate::module::validation::{DescriptorValidator, ValidationResult};

pub use manifest::{
    ExportDecl, ImportDecl, ModuleDescriptor, ModuleSet, NeedDecl, ProvideDecl, RequireDecl,
};

/// Bucket key: namespace plus name
pub type PackageKey = (Namespace, String);

/// One row of the package table
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PackageEntry {
    /// Capabilities at least one live wire points to
    pub providers: BTreeSet<CapabilityId>,
    /// Every registered capability under this key, registration order
    pub exporters: Vec<CapabilityId>,
    /// Requirements naming this key
    pub importers: BTreeSet<RequirementId>,
}

impl PackageEntry {
    fn is_empty(&self) -> bool {
        self.providers.is_empty() && self.exporters.is_empty() && self.importers.is_empty()
    }
}

/// Everything a successful session hands back for commit
#[derive(Debug, Clone, Default)]
pub(crate) struct Resolution {
    /// Modules admitted by the session
    pub resolved: BTreeSet<ModuleId>,
    /// Requirement -> chosen capability
    pub wires: BTreeMap<RequirementId, CapabilityId>,
    pub internal_candidates: BTreeMap<RequirementId, CapabilityId>,
    /// Concrete requirement instantiated from a dynamic import declaration
    pub dynamic: Option<Requirement>,
}

/// Installed modules, their declarations and the committed wiring
#[derive(Debug, Clone, Default)]
pub struct Registry {
    modules: BTreeMap<ModuleId, Module>,
    capabilities: BTreeMap<CapabilityId, Capability>,
    requirements: BTreeMap<RequirementId, Requirement>,
    packages: BTreeMap<PackageKey, PackageEntry>,
    /// Dynamic import declarations (not indexed by name)
    dynamic_importers: BTreeSet<RequirementId>,
    /// Capability -> requirements wired to it
    consumers: BTreeMap<CapabilityId, BTreeSet<RequirementId>>,
    next_module: u32,
    next_capability: u32,
    next_requirement: u32,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install a module from its descriptor
    pub fn install(&mut self, descriptor: &ModuleDescriptor) -> Result<ModuleId, RegistryError> {
        if let ValidationResult::Invalid(errors) = DescriptorValidator::new().validate(descriptor) {
            return Err(RegistryError::InvalidDescriptor {
                name: descriptor.name.clone(),
                errors,
            });
        }

        let host = match &descriptor.fragment_host {
            Some(host_name) => Some(
                self.modules_named(host_name)
                    .max_by(|a, b| a.version.cmp(&b.version).then(b.id.cmp(&a.id)))
                    .map(|m| m.id)
                    .ok_or_else(|| RegistryError::HostNotFound(host_name.clone()))?,
            ),
            None => None,
        };

        let id = ModuleId(self.next_module);
        self.next_module += 1;
        // Validation guarantees every version and range below parses.
        let version = parse_version(&descriptor.version);

        let identity = self.new_capability(Capability {
            id: CapabilityId(0),
            module: id,
            namespace: Namespace::Module,
            name: descriptor.name.clone(),
            version: version.clone(),
            attributes: BTreeMap::new(),
            mandatory: Vec::new(),
            uses: Vec::new(),
            zombie: false,
        });
        let mut capabilities = vec![identity];

        for export in &descriptor.exports {
            capabilities.push(self.new_capability(Capability {
                id: CapabilityId(0),
                module: id,
                namespace: Namespace::Package,
                name: export.package.clone(),
                version: parse_version(&export.version),
                attributes: export.attributes.clone(),
                mandatory: export.mandatory.clone(),
                uses: export.uses.clone(),
                zombie: false,
            }));
        }
        for provide in &descriptor.provides {
            capabilities.push(self.new_capability(Capability {
                id: CapabilityId(0),
                module: id,
                namespace: Namespace::from(provide.namespace.as_str()),
                name: provide.name.clone(),
                version: parse_version(&provide.version),
                attributes: provide.attributes.clone(),
                mandatory: Vec::new(),
                uses: provide.uses.clone(),
                zombie: false,
            }));
        }

        // Processing order: generic, module, package, dynamic.
        let mut requirements = Vec::new();
        for need in &descriptor.needs {
            requirements.push(self.new_requirement(Requirement {
                namespace: Namespace::from(need.namespace.as_str()),
                name: need.name.clone(),
                filter: Filter {
                    version: parse_range(&need.version),
                    attributes: need.attributes.clone(),
                    ..Filter::default()
                },
                policy: policy(need.optional),
                ..blank_requirement(id)
            }));
        }
        for require in &descriptor.requires {
            requirements.push(self.new_requirement(Requirement {
                namespace: Namespace::Module,
                name: require.module.clone(),
                filter: Filter::with_version(parse_range(&require.version)),
                policy: policy(require.optional),
                visibility: if require.reexport {
                    Visibility::Reexport
                } else {
                    Visibility::Private
                },
                ..blank_requirement(id)
            }));
        }
        for import in &descriptor.imports {
            requirements.push(self.new_requirement(Requirement {
                namespace: Namespace::Package,
                name: import.package.clone(),
                filter: Filter {
                    version: parse_range(&import.version),
                    attributes: import.attributes.clone(),
                    from_module: import.from_module.clone(),
                    from_module_version: import
                        .from_module_version
                        .as_deref()
                        .map(parse_range)
                        .unwrap_or_default(),
                },
                policy: policy(import.optional),
                ..blank_requirement(id)
            }));
        }
        for pattern in &descriptor.dynamic_imports {
            requirements.push(self.new_requirement(Requirement {
                namespace: Namespace::Package,
                name: pattern.clone(),
                policy: ResolutionPolicy::Optional,
                dynamic: Some(NamePattern::parse(pattern)),
                ..blank_requirement(id)
            }));
        }

        self.modules.insert(
            id,
            Module {
                id,
                symbolic_name: descriptor.name.clone(),
                version,
                singleton: descriptor.singleton,
                state: ModuleState::Installed,
                capabilities,
                requirements,
                identity,
                reexports: Vec::new(),
                host,
                fragments: Vec::new(),
            },
        );
        if let Some(host) = host {
            if let Some(host_module) = self.modules.get_mut(&host) {
                host_module.fragments.push(id);
            }
        }

        self.add_capabilities(id);
        info!("Installed module {} {} as {}", descriptor.name, descriptor.version, id);
        Ok(id)
    }

    fn new_capability(&mut self, mut capability: Capability) -> CapabilityId {
        let id = CapabilityId(self.next_capability);
        self.next_capability += 1;
        capability.id = id;
        self.capabilities.insert(id, capability);
        id
    }

    fn new_requirement(&mut self, mut requirement: Requirement) -> RequirementId {
        let id = self.next_requirement_id();
        self.next_requirement += 1;
        requirement.id = id;
        self.requirements.insert(id, requirement);
        id
    }

    /// Id the next registered requirement will receive
    pub(crate) fn next_requirement_id(&self) -> RequirementId {
        RequirementId(self.next_requirement)
    }

    /// Register a module's declared capabilities and requirements in the package table
    pub fn add_capabilities(&mut self, module: ModuleId) {
        let Some(m) = self.modules.get(&module) else {
            return;
        };
        let capabilities = m.capabilities.clone();
        let requirements = m.requirements.clone();

        for cap_id in capabilities {
            if let Some(cap) = self.capabilities.get(&cap_id) {
                let entry = self
                    .packages
                    .entry((cap.namespace.clone(), cap.name.clone()))
                    .or_default();
                if !entry.exporters.contains(&cap_id) {
                    entry.exporters.push(cap_id);
                }
            }
        }
        for req_id in requirements {
            self.index_requirement(req_id);
        }
    }

    fn index_requirement(&mut self, req_id: RequirementId) {
        let Some(req) = self.requirements.get(&req_id) else {
            return;
        };
        if req.is_dynamic() {
            self.dynamic_importers.insert(req_id);
        } else {
            self.packages
                .entry((req.namespace.clone(), req.name.clone()))
                .or_default()
                .importers
                .insert(req_id);
        }
    }

    /// Unregister a module's capabilities and requirements.
    ///
    /// Returns false and leaves the registry untouched if another module is
    /// still wired to one of the capabilities, unless `force` is set, in which
    /// case those wires are cut.
    pub fn remove_capabilities(&mut self, module: ModuleId, force: bool) -> bool {
        let Some(m) = self.modules.get(&module) else {
            return false;
        };
        let capabilities = m.capabilities.clone();
        let requirements = m.requirements.clone();
        let external = self.external_consumers(module);

        if !external.is_empty() {
            if !force {
                debug!(
                    "Refusing to remove capabilities of {}: {} external wire(s)",
                    module,
                    external.len()
                );
                return false;
            }
            warn!(
                "Forcing removal of {}: cutting {} external wire(s)",
                module,
                external.len()
            );
            for req in external {
                self.release_wire(req);
            }
        }

        for req_id in &requirements {
            self.release_wire(*req_id);
            if let Some(req) = self.requirements.get(req_id) {
                if req.is_dynamic() {
                    self.dynamic_importers.remove(req_id);
                } else {
                    let key = (req.namespace.clone(), req.name.clone());
                    if let Some(entry) = self.packages.get_mut(&key) {
                        entry.importers.remove(req_id);
                    }
                }
            }
        }

        for cap_id in &capabilities {
            let Some(cap) = self.capabilities.get(cap_id) else {
                continue;
            };
            let key = (cap.namespace.clone(), cap.name.clone());
            if let Some(entry) = self.packages.get_mut(&key) {
                entry.exporters.retain(|c| c != cap_id);
                entry.providers.remove(cap_id);
            }
            self.consumers.remove(cap_id);
        }

        self.packages.retain(|_, entry| !entry.is_empty());
        true
    }

    /// Requirements of other modules wired to a capability of `module`
    pub fn external_consumers(&self, module: ModuleId) -> Vec<RequirementId> {
        let Some(m) = self.modules.get(&module) else {
            return Vec::new();
        };
        m.capabilities
            .iter()
            .filter_map(|cap| self.consumers.get(cap))
            .flatten()
            .copied()
            .filter(|req| {
                self.requirements
                    .get(req)
                    .is_some_and(|r| r.module != module)
            })
            .collect()
    }

    /// Drop the committed wire of a requirement, keeping the provider table exact
    fn release_wire(&mut self, req_id: RequirementId) {
        let Some(cap_id) = self
            .requirements
            .get_mut(&req_id)
            .and_then(|req| req.provider.take())
        else {
            return;
        };

        let unused = match self.consumers.get_mut(&cap_id) {
            Some(consumers) => {
                consumers.remove(&req_id);
                consumers.is_empty()
            }
            None => true,
        };
        if unused {
            self.consumers.remove(&cap_id);
            if let Some(cap) = self.capabilities.get(&cap_id) {
                let key = (cap.namespace.clone(), cap.name.clone());
                if let Some(entry) = self.packages.get_mut(&key) {
                    entry.providers.remove(&cap_id);
                }
            }
        }
    }

    /// Uninstall a module, removing its declarations from every table
    pub fn uninstall(&mut self, module: ModuleId, force: bool) -> Result<(), RegistryError> {
        if !self.modules.contains_key(&module) {
            return Err(RegistryError::ModuleNotFound(module));
        }
        if !self.remove_capabilities(module, force) {
            return Err(RegistryError::StillInUse(module));
        }

        let Some(removed) = self.modules.remove(&module) else {
            return Err(RegistryError::ModuleNotFound(module));
        };
        for cap in &removed.capabilities {
            self.capabilities.remove(cap);
        }
        for req in &removed.requirements {
            self.requirements.remove(req);
        }
        for m in self.modules.values_mut() {
            m.reexports.retain(|cap| !removed.capabilities.contains(cap));
            m.fragments.retain(|f| *f != module);
            if m.host == Some(module) {
                m.host = None;
            }
        }

        info!("Uninstalled module {} ({})", removed, module);
        Ok(())
    }

    /// Flag every capability of a superseded module as zombie.
    ///
    /// Returns the number of capabilities flagged.
    pub fn mark_zombie(&mut self, module: ModuleId) -> usize {
        let Some(m) = self.modules.get(&module) else {
            return 0;
        };
        let mut flagged = 0;
        for cap_id in &m.capabilities {
            if let Some(cap) = self.capabilities.get_mut(cap_id) {
                if !cap.zombie {
                    cap.zombie = true;
                    flagged += 1;
                }
            }
        }
        debug!("Marked {} capabilities of {} as zombie", flagged, module);
        flagged
    }

    /// Uninstall zombie modules nothing outside themselves is wired to any more
    pub fn purge_zombies(&mut self) -> Vec<ModuleId> {
        let candidates: Vec<ModuleId> = self
            .modules
            .values()
            .filter(|m| {
                m.capabilities
                    .iter()
                    .any(|c| self.capabilities.get(c).is_some_and(|cap| cap.zombie))
            })
            .map(|m| m.id)
            .collect();

        candidates
            .into_iter()
            .filter(|id| self.uninstall(*id, false).is_ok())
            .collect()
    }

    /// Lifecycle manager hook for state transitions the resolver does not own
    pub fn set_state(&mut self, module: ModuleId, state: ModuleState) -> Result<(), RegistryError> {
        let m = self
            .modules
            .get_mut(&module)
            .ok_or(RegistryError::ModuleNotFound(module))?;
        m.state = state;
        Ok(())
    }

    /// Commit a session's outcome.
    ///
    /// Writes every wire, flips wired capabilities into provider state, marks
    /// admitted modules resolved and propagates re-exports. Returns the new wires.
    pub(crate) fn apply(&mut self, resolution: Resolution) -> Vec<Wire> {
        if let Some(dynamic) = resolution.dynamic {
            let id = self.next_requirement_id();
            self.new_requirement(dynamic);
            if let Some(owner) = self.requirements.get(&id).map(|r| r.module) {
                if let Some(m) = self.modules.get_mut(&owner) {
                    m.requirements.push(id);
                }
            }
            self.index_requirement(id);
        }

        let mut wires = Vec::with_capacity(resolution.wires.len());
        for (req_id, cap_id) in &resolution.wires {
            let (Some(req), Some(cap)) = (
                self.requirements.get_mut(req_id),
                self.capabilities.get(cap_id),
            ) else {
                continue;
            };
            req.provider = Some(*cap_id);
            wires.push(Wire {
                requirement: *req_id,
                capability: *cap_id,
                requirer: req.module,
                provider: cap.module,
            });
            self.consumers.entry(*cap_id).or_default().insert(*req_id);
            self.packages
                .entry((cap.namespace.clone(), cap.name.clone()))
                .or_default()
                .providers
                .insert(*cap_id);
        }

        for (req_id, cap_id) in &resolution.internal_candidates {
            if let Some(req) = self.requirements.get_mut(req_id) {
                req.internal_candidate = Some(*cap_id);
            }
        }

        for id in &resolution.resolved {
            if let Some(m) = self.modules.get_mut(id) {
                if m.state == ModuleState::Installed {
                    m.state = ModuleState::Resolved;
                }
            }
        }

        self.propagate_reexports();
        wires
    }

    /// Fixpoint over re-exporting module requirements
    fn propagate_reexports(&mut self) {
        loop {
            let mut additions: Vec<(ModuleId, CapabilityId)> = Vec::new();
            for req in self.requirements.values() {
                if req.namespace != Namespace::Module || req.visibility != Visibility::Reexport {
                    continue;
                }
                let Some(target) = req
                    .provider
                    .and_then(|cap| self.capabilities.get(&cap))
                    .map(|cap| cap.module)
                else {
                    continue;
                };
                let Some(requirer) = self.modules.get(&req.module) else {
                    continue;
                };
                for cap in self.package_exports(target) {
                    if !requirer.reexports.contains(&cap) {
                        additions.push((req.module, cap));
                    }
                }
            }

            if additions.is_empty() {
                return;
            }
            for (module, cap) in additions {
                if let Some(m) = self.modules.get_mut(&module) {
                    if !m.reexports.contains(&cap) {
                        m.reexports.push(cap);
                    }
                }
            }
        }
    }

    /// Package capabilities a module makes visible: its own exports then its re-exports
    pub fn package_exports(&self, module: ModuleId) -> Vec<CapabilityId> {
        let Some(m) = self.modules.get(&module) else {
            return Vec::new();
        };
        m.capabilities
            .iter()
            .filter(|c| self.capabilities.get(c).is_some_and(|cap| cap.is_package()))
            .chain(m.reexports.iter())
            .copied()
            .collect()
    }

    pub fn module(&self, id: ModuleId) -> Option<&Module> {
        self.modules.get(&id)
    }

    pub fn modules(&self) -> impl Iterator<Item = &Module> {
        self.modules.values()
    }

    pub fn modules_named<'a>(&'a self, symbolic_name: &'a str) -> impl Iterator<Item = &'a Module> {
        self.modules
            .values()
            .filter(move |m| m.symbolic_name == symbolic_name)
    }

    pub fn capability(&self, id: CapabilityId) -> Option<&Capability> {
        self.capabilities.get(&id)
    }

    pub fn requirement(&self, id: RequirementId) -> Option<&Requirement> {
        self.requirements.get(&id)
    }

    /// Exporters registered under a namespace and name, registration order
    pub fn lookup(&self, namespace: &Namespace, name: &str) -> Vec<&Capability> {
        self.packages
            .get(&(namespace.clone(), name.to_string()))
            .map(|entry| {
                entry
                    .exporters
                    .iter()
                    .filter_map(|c| self.capabilities.get(c))
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn package(&self, namespace: &Namespace, name: &str) -> Option<&PackageEntry> {
        self.packages.get(&(namespace.clone(), name.to_string()))
    }

    /// Capabilities currently wired to at least one consumer under a key
    pub fn providers(&self, namespace: &Namespace, name: &str) -> BTreeSet<CapabilityId> {
        self.package(namespace, name)
            .map(|entry| entry.providers.clone())
            .unwrap_or_default()
    }

    /// Committed provider of a requirement
    pub fn provider_of(&self, requirement: RequirementId) -> Option<CapabilityId> {
        self.requirements.get(&requirement).and_then(|r| r.provider)
    }

    /// Requirements wired to a capability
    pub fn consumers_of(&self, capability: CapabilityId) -> impl Iterator<Item = RequirementId> + '_ {
        self.consumers
            .get(&capability)
            .into_iter()
            .flat_map(|set| set.iter().copied())
    }

    /// Committed wires whose requirement belongs to `module`
    pub fn wires_of(&self, module: ModuleId) -> Vec<Wire> {
        let Some(m) = self.modules.get(&module) else {
            return Vec::new();
        };
        m.requirements
            .iter()
            .filter_map(|req_id| {
                let cap_id = self.requirements.get(req_id)?.provider?;
                let cap = self.capabilities.get(&cap_id)?;
                Some(Wire {
                    requirement: *req_id,
                    capability: cap_id,
                    requirer: module,
                    provider: cap.module,
                })
            })
            .collect()
    }

    /// Every committed wire, ordered by requirement id
    pub fn all_wires(&self) -> Vec<Wire> {
        self.modules.keys().flat_map(|m| self.wires_of(*m)).collect()
    }

    /// Dynamic import declarations of every module
    pub fn dynamic_importers(&self) -> impl Iterator<Item = &Requirement> {
        self.dynamic_importers
            .iter()
            .filter_map(|r| self.requirements.get(r))
    }

    /// Requirements a resolve of `module` processes by default
    pub fn static_requirements(&self, module: ModuleId) -> Vec<RequirementId> {
        self.modules
            .get(&module)
            .map(|m| {
                m.requirements
                    .iter()
                    .filter(|r| {
                        self.requirements
                            .get(r)
                            .is_some_and(|req| !req.is_dynamic() && req.origin.is_none())
                    })
                    .copied()
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Human-readable requirement description naming its owner
    pub fn describe(&self, requirement: &Requirement) -> String {
        match self.modules.get(&requirement.module) {
            Some(owner) => format!("{} required by {}", requirement, owner),
            None => requirement.to_string(),
        }
    }
}

fn blank_requirement(module: ModuleId) -> Requirement {
    Requirement {
        id: RequirementId(0),
        module,
        namespace: Namespace::Package,
        name: String::new(),
        filter: Filter::default(),
        policy: ResolutionPolicy::Mandatory,
        visibility: Visibility::Private,
        dynamic: None,
        origin: None,
        provider: None,
        internal_candidate: None,
    }
}

fn policy(optional: bool) -> ResolutionPolicy {
    if optional {
        ResolutionPolicy::Optional
    } else {
        ResolutionPolicy::Mandatory
    }
}

fn parse_version(text: &str) -> Version {
    Version::parse(text).unwrap_or_default()
}

fn parse_range(text: &str) -> VersionRange {
    VersionRange::parse(text).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry_with(descriptors: &[ModuleDescriptor]) -> (Registry, Vec<ModuleId>) {
        let mut registry = Registry::new();
        let ids = descriptors
            .iter()
            .map(|d| registry.install(d).unwrap())
            .collect();
        (registry, ids)
    }

    /// Wire every requirement of `requirer` named `package` to `cap`
    fn wire(registry: &mut Registry, requirer: ModuleId, package: &str, cap: CapabilityId) {
        let req = registry
            .module(requirer)
            .unwrap()
            .requirements
            .iter()
            .copied()
            .find(|r| registry.requirement(*r).unwrap().name == package)
            .unwrap();
        registry.apply(Resolution {
            resolved: [requirer].into_iter().collect(),
            wires: [(req, cap)].into_iter().collect(),
            ..Resolution::default()
        });
    }

    fn export_of(registry: &Registry, module: ModuleId, package: &str) -> CapabilityId {
        registry
            .lookup(&Namespace::Package, package)
            .into_iter()
            .find(|c| c.module == module)
            .unwrap()
            .id
    }

    #[test]
    fn test_install_indexes_declarations() {
        let (registry, ids) = registry_with(&[
            ModuleDescriptor::new("a", "1.0").export("x", "1.5"),
            ModuleDescriptor::new("b", "1.0").import("x", "[1.0,2.0)").dynamic_import("com.*"),
        ]);

        let exporters = registry.lookup(&Namespace::Package, "x");
        assert_eq!(exporters.len(), 1);
        assert_eq!(exporters[0].module, ids[0]);

        let entry = registry.package(&Namespace::Package, "x").unwrap();
        assert_eq!(entry.importers.len(), 1);
        assert!(entry.providers.is_empty());

        let identity = registry.lookup(&Namespace::Module, "a");
        assert_eq!(identity[0].id, registry.module(ids[0]).unwrap().identity());
        assert_eq!(registry.dynamic_importers().count(), 1);
        assert_eq!(registry.static_requirements(ids[1]).len(), 1);
    }

    #[test]
    fn test_install_rejects_invalid_descriptor() {
        let mut registry = Registry::new();
        let err = registry
            .install(&ModuleDescriptor::new("", "1.0"))
            .unwrap_err();
        assert!(matches!(err, RegistryError::InvalidDescriptor { .. }));
        assert_eq!(registry.modules().count(), 0);
    }

    #[test]
    fn test_fragment_attaches_to_newest_host() {
        let (registry, ids) = registry_with(&[
            ModuleDescriptor::new("host", "1.0"),
            ModuleDescriptor::new("host", "2.0"),
            ModuleDescriptor::new("frag", "1.0").fragment_of("host"),
        ]);
        assert_eq!(registry.module(ids[2]).unwrap().host(), Some(ids[1]));
        assert_eq!(registry.module(ids[1]).unwrap().fragments(), &[ids[2]]);

        let mut registry = Registry::new();
        assert_eq!(
            registry.install(&ModuleDescriptor::new("frag", "1.0").fragment_of("none")),
            Err(RegistryError::HostNotFound("none".into()))
        );
    }

    #[test]
    fn test_apply_tracks_providers() {
        let (mut registry, ids) = registry_with(&[
            ModuleDescriptor::new("a", "1.0").export("x", "1.0"),
            ModuleDescriptor::new("b", "1.0").import("x", ""),
        ]);
        let cap = export_of(&registry, ids[0], "x");
        wire(&mut registry, ids[1], "x", cap);

        assert!(registry.providers(&Namespace::Package, "x").contains(&cap));
        assert_eq!(registry.wires_of(ids[1]).len(), 1);
        assert_eq!(registry.module(ids[1]).unwrap().state(), ModuleState::Resolved);
        assert_eq!(registry.consumers_of(cap).count(), 1);
    }

    #[test]
    fn test_remove_refuses_while_wired() {
        let (mut registry, ids) = registry_with(&[
            ModuleDescriptor::new("a", "1.0").export("x", "1.0"),
            ModuleDescriptor::new("b", "1.0").import("x", ""),
        ]);
        let cap = export_of(&registry, ids[0], "x");
        wire(&mut registry, ids[1], "x", cap);

        assert!(!registry.remove_capabilities(ids[0], false));
        assert_eq!(registry.lookup(&Namespace::Package, "x").len(), 1);
        assert_eq!(registry.uninstall(ids[0], false), Err(RegistryError::StillInUse(ids[0])));

        assert!(registry.remove_capabilities(ids[0], true));
        assert!(registry.lookup(&Namespace::Package, "x").is_empty());
        assert_eq!(registry.provider_of(registry.static_requirements(ids[1])[0]), None);
    }

    #[test]
    fn test_remove_allows_self_wires() {
        let (mut registry, ids) = registry_with(&[ModuleDescriptor::new("a", "1.0")
            .export("x", "1.0")
            .import("x", "")]);
        let cap = export_of(&registry, ids[0], "x");
        wire(&mut registry, ids[0], "x", cap);

        assert!(registry.remove_capabilities(ids[0], false));
        assert!(registry.providers(&Namespace::Package, "x").is_empty());
    }

    #[test]
    fn test_uninstall_releases_imports() {
        let (mut registry, ids) = registry_with(&[
            ModuleDescriptor::new("a", "1.0").export("x", "1.0"),
            ModuleDescriptor::new("b", "1.0").import("x", ""),
        ]);
        let cap = export_of(&registry, ids[0], "x");
        wire(&mut registry, ids[1], "x", cap);

        registry.uninstall(ids[1], false).unwrap();
        assert!(registry.providers(&Namespace::Package, "x").is_empty());
        assert!(registry.module(ids[1]).is_none());
        assert!(registry.uninstall(ids[1], false).is_err());
        registry.uninstall(ids[0], false).unwrap();
        assert!(registry.package(&Namespace::Package, "x").is_none());
    }

    #[test]
    fn test_zombie_marking_and_purge() {
        let (mut registry, ids) = registry_with(&[
            ModuleDescriptor::new("a", "1.0").export("x", "1.0"),
            ModuleDescriptor::new("b", "1.0").import("x", ""),
        ]);
        let cap = export_of(&registry, ids[0], "x");
        wire(&mut registry, ids[1], "x", cap);

        assert_eq!(registry.mark_zombie(ids[0]), 2);
        assert_eq!(registry.mark_zombie(ids[0]), 0);
        assert!(registry.capability(cap).unwrap().zombie);

        assert!(registry.purge_zombies().is_empty());
        registry.uninstall(ids[1], false).unwrap();
        assert_eq!(registry.purge_zombies(), vec![ids[0]]);
    }

    #[test]
    fn test_reexports_propagate_transitively() {
        let (mut registry, ids) = registry_with(&[
            ModuleDescriptor::new("base", "1.0").export("p", "1.0"),
            ModuleDescriptor::new("mid", "1.0").require_reexport("base", ""),
            ModuleDescriptor::new("top", "1.0").require_reexport("mid", ""),
        ]);
        let base_identity = registry.module(ids[0]).unwrap().identity();
        let mid_identity = registry.module(ids[1]).unwrap().identity();
        let mid_req = registry.static_requirements(ids[1])[0];
        let top_req = registry.static_requirements(ids[2])[0];

        registry.apply(Resolution {
            resolved: ids.iter().copied().collect(),
            wires: [(mid_req, base_identity), (top_req, mid_identity)]
                .into_iter()
                .collect(),
            ..Resolution::default()
        });

        let p = export_of(&registry, ids[0], "p");
        assert_eq!(registry.module(ids[1]).unwrap().reexports(), &[p]);
        assert_eq!(registry.module(ids[2]).unwrap().reexports(), &[p]);
        assert_eq!(registry.package_exports(ids[2]), vec![p]);
    }
}
