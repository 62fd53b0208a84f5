//! Uses-consistency
//!
//! A session maps every package name to at most one provider. Admitting a
//! capability records it under its package name and walks its `uses` list:
//! for each used package, the provider the capability's module sees must be
//! the one the session already chose, or becomes the choice (and is checked
//! in turn) when there is none yet.

use tracing::debug;

use super::session::Session;
use crate::module::model::{CapabilityId, ModuleId, Namespace};

impl<'a> Session<'a> {
    /// Check `capability` against the session's provider map.
    ///
    /// Returns the conflicting package name on failure. The caller rolls back
    /// any provider entries recorded before the conflict was found.
    pub(crate) fn check_uses(&mut self, capability: CapabilityId) -> Result<(), String> {
        let registry = self.registry();
        let Some(cap) = registry.capability(capability) else {
            return Ok(());
        };

        if cap.is_package() {
            match self.state.providers.get(&cap.name) {
                Some(existing) if *existing != capability => {
                    debug!(
                        "{} conflicts with session provider {} of {}",
                        capability, existing, cap.name
                    );
                    return Err(cap.name.clone());
                }
                Some(_) => return Ok(()),
                None => {
                    self.state.providers.insert(cap.name.clone(), capability);
                }
            }
        }

        let used = if !cap.uses.is_empty() {
            cap.uses.clone()
        } else if self.env.config.conservative_uses {
            self.imported_packages(cap.module)
        } else {
            Vec::new()
        };

        for package in used {
            let Some(seen) = self.visible_provider(cap.module, &package) else {
                continue;
            };
            match self.state.providers.get(&package) {
                None => self.check_uses(seen)?,
                Some(existing) if *existing != seen => {
                    debug!(
                        "{} of {} sees {} for {} but the session chose {}",
                        capability, cap.module, seen, package, existing
                    );
                    return Err(package);
                }
                Some(_) => {}
            }
        }
        Ok(())
    }

    /// Provider of `package` as seen from inside `module`: its wired import,
    /// else its own export, else an export of a module it requires
    pub(crate) fn visible_provider(&self, module: ModuleId, package: &str) -> Option<CapabilityId> {
        let registry = self.registry();
        let m = registry.module(module)?;
        let requirements = m
            .declared_requirements()
            .iter()
            .filter_map(|r| registry.requirement(*r))
            .filter(|r| !r.is_dynamic());

        let mut required_modules = Vec::new();
        for requirement in requirements {
            match requirement.namespace {
                Namespace::Package if requirement.name == package => {
                    if let Some(wired) = self.wire_of(requirement) {
                        return Some(wired);
                    }
                }
                Namespace::Module => required_modules.extend(self.required_module(requirement)),
                _ => {}
            }
        }

        let own = m.declared_capabilities().iter().copied().find(|c| {
            registry
                .capability(*c)
                .is_some_and(|cap| cap.is_package() && cap.name == package)
        });
        if own.is_some() {
            return own;
        }

        required_modules.into_iter().find_map(|target| {
            registry.package_exports(target).into_iter().find(|c| {
                registry
                    .capability(*c)
                    .is_some_and(|cap| cap.name == package)
            })
        })
    }

    /// Package names `module` currently has wired imports for
    pub(crate) fn imported_packages(&self, module: ModuleId) -> Vec<String> {
        let registry = self.registry();
        let Some(m) = registry.module(module) else {
            return Vec::new();
        };
        m.declared_requirements()
            .iter()
            .filter_map(|r| registry.requirement(*r))
            .filter(|r| r.namespace == Namespace::Package && !r.is_dynamic())
            .filter(|r| self.wire_of(r).is_some())
            .map(|r| r.name.clone())
            .collect()
    }
}
