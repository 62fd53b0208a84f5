//! Module manager
//!
//! Thin lifecycle facade over a shared [`Resolver`]: installs descriptors and
//! descriptor files, resolves everything installed, replaces module revisions
//! and cleans up zombies once their consumers are gone.

use std::collections::BTreeSet;
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};

use crate::config::RuntimeConfig;
use crate::module::model::{ModuleId, Wire};
use crate::module::registry::{ModuleDescriptor, ModuleSet};
use crate::module::resolver::Resolver;
use crate::module::traits::{ModuleState, RegistryError, ResolveError};

/// Outcome of [`ModuleManager::resolve_all`]
#[derive(Debug, Clone, Default)]
pub struct ResolutionReport {
    /// Modules that were installed before the call and are resolved after it
    pub resolved: Vec<ModuleId>,
    /// Modules that could not be resolved, with the reason
    pub failed: Vec<(ModuleId, ResolveError)>,
    /// Every wire created by the call
    pub wires: Vec<Wire>,
}

impl ResolutionReport {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Module manager coordinates installation and resolution
pub struct ModuleManager {
    resolver: Arc<Resolver>,
}

impl ModuleManager {
    pub fn new(resolver: Arc<Resolver>) -> Self {
        Self { resolver }
    }

    pub fn from_config(config: &RuntimeConfig) -> anyhow::Result<Self> {
        Ok(Self::new(Arc::new(Resolver::from_config(config)?)))
    }

    pub fn resolver(&self) -> &Arc<Resolver> {
        &self.resolver
    }

    pub fn install(&self, descriptor: &ModuleDescriptor) -> Result<ModuleId, RegistryError> {
        self.resolver.install(descriptor)
    }

    /// Install every module of a set, fragments after their potential hosts
    pub fn install_set(&self, set: &ModuleSet) -> Result<Vec<ModuleId>, RegistryError> {
        let (fragments, hosts): (Vec<_>, Vec<_>) = set
            .modules
            .iter()
            .partition(|d| d.fragment_host.is_some());

        hosts
            .into_iter()
            .chain(fragments)
            .map(|descriptor| self.install(descriptor))
            .collect()
    }

    /// Load a TOML file of `[[module]]` tables and install its modules
    pub fn load_module_set<P: AsRef<Path>>(&self, path: P) -> anyhow::Result<Vec<ModuleId>> {
        let set = ModuleSet::from_file(path.as_ref())?;
        let ids = self.install_set(&set)?;
        info!(
            "Installed {} module(s) from {}",
            ids.len(),
            path.as_ref().display()
        );
        Ok(ids)
    }

    /// Resolve every installed module, in install order
    pub fn resolve_all(&self) -> ResolutionReport {
        let pending: Vec<ModuleId> = self
            .resolver
            .registry()
            .modules()
            .filter(|m| m.state() == ModuleState::Installed)
            .map(|m| m.id)
            .collect();

        let mut report = ResolutionReport::default();
        for id in &pending {
            match self.resolver.resolve(*id) {
                Ok(wires) => report.wires.extend(wires),
                Err(error) => {
                    warn!("Module {} left unresolved: {}", id, error);
                    report.failed.push((*id, error));
                }
            }
        }

        let registry = self.resolver.registry();
        report.resolved = pending
            .into_iter()
            .filter(|id| registry.module(*id).is_some_and(|m| m.state().is_resolved()))
            .collect();
        info!(
            "Resolved {} module(s), {} failure(s)",
            report.resolved.len(),
            report.failed.len()
        );
        report
    }

    /// Replace `module` with a new revision.
    ///
    /// The old revision is uninstalled if nothing outside it is wired to its
    /// capabilities, otherwise its capabilities become zombies until
    /// [`purge_zombies`](Self::purge_zombies) finds them unused.
    pub fn update(&self, module: ModuleId, descriptor: &ModuleDescriptor) -> Result<ModuleId, RegistryError> {
        let in_use = {
            let registry = self.resolver.registry();
            if registry.module(module).is_none() {
                return Err(RegistryError::ModuleNotFound(module));
            }
            !registry.external_consumers(module).is_empty()
        };

        let replacement = self.install(descriptor)?;
        if in_use {
            let flagged = self.resolver.mark_zombie(module)?;
            info!(
                "Updated {} to {}; {} capabilities kept as zombies",
                module, replacement, flagged
            );
        } else {
            self.resolver.uninstall(module, false)?;
            info!("Updated {} to {}", module, replacement);
        }
        Ok(replacement)
    }

    pub fn purge_zombies(&self) -> Result<Vec<ModuleId>, RegistryError> {
        let purged = self.resolver.purge_zombies()?;
        if !purged.is_empty() {
            info!("Purged {} zombie module(s)", purged.len());
        }
        Ok(purged)
    }

    pub fn affected_closure(&self, seed: &BTreeSet<ModuleId>) -> BTreeSet<ModuleId> {
        self.resolver.affected_closure(seed)
    }

    pub fn module_state(&self, module: ModuleId) -> Option<ModuleState> {
        self.resolver.registry().module(module).map(|m| m.state())
    }
}
