//! Per-requirement resolution and failure reporting

use tracing::debug;

use super::session::Session;
use crate::module::model::{Namespace, Requirement};
use crate::module::traits::ResolveError;

impl<'a> Session<'a> {
    /// Wire one requirement, or leave it unwired if it is optional
    pub(crate) fn resolve_requirement(&mut self, requirement: &Requirement) -> Result<(), ResolveError> {
        if self.wire_of(requirement).is_some() {
            return Ok(());
        }

        match self.pick_provider(requirement) {
            Ok(capability) => {
                self.state.wires.insert(requirement.id, capability);
                if requirement.namespace != Namespace::Package {
                    if let Some(cap) = self.registry().capability(capability) {
                        self.state.required.insert(requirement.id, cap.module);
                    }
                }
                Ok(())
            }
            Err(error) if requirement.is_optional() && error.is_resolution_failure() => {
                debug!(
                    "Leaving optional {} unwired: {}",
                    self.registry().describe(requirement),
                    error
                );
                Ok(())
            }
            Err(error) => Err(error),
        }
    }

    /// Error for a requirement with no usable candidate at all
    pub(crate) fn unsatisfied(&self, requirement: &Requirement) -> ResolveError {
        let description = self.registry().describe(requirement);
        match requirement.namespace {
            Namespace::Package => ResolveError::MissingProvider {
                requirement: requirement.id,
                description,
            },
            Namespace::Module | Namespace::Named(_) => ResolveError::RequirementUnsatisfied {
                requirement: requirement.id,
                description,
            },
        }
    }
}
