//! Descriptor validation
//!
//! Validates module descriptors for structure and syntax before the registry
//! accepts them.

use std::collections::HashSet;
use tracing::{debug, warn};

use crate::module::model::{Namespace, Version, VersionRange};
use crate::module::registry::manifest::ModuleDescriptor;

/// Validation result
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationResult {
    /// Descriptor is valid
    Valid,
    /// Descriptor is invalid with specific errors
    Invalid(Vec<String>),
}

impl ValidationResult {
    pub fn is_valid(&self) -> bool {
        matches!(self, ValidationResult::Valid)
    }
}

/// Module descriptor validator
pub struct DescriptorValidator {
    /// Longest accepted symbolic or package name
    max_name_len: usize,
}

impl DescriptorValidator {
    pub fn new() -> Self {
        Self { max_name_len: 255 }
    }

    /// Validate a module descriptor
    pub fn validate(&self, descriptor: &ModuleDescriptor) -> ValidationResult {
        let mut errors = Vec::new();

        if !self.is_valid_name(&descriptor.name) {
            errors.push(format!(
                "Invalid symbolic name: '{}' (dot-separated alphanumeric segments, dashes and underscores allowed)",
                descriptor.name
            ));
        }
        if let Err(e) = Version::parse(&descriptor.version) {
            errors.push(format!("Invalid module version: {}", e));
        }

        self.validate_exports(descriptor, &mut errors);
        self.validate_imports(descriptor, &mut errors);
        self.validate_requires(descriptor, &mut errors);
        self.validate_generic(descriptor, &mut errors);

        for pattern in &descriptor.dynamic_imports {
            if !self.is_valid_pattern(pattern) {
                errors.push(format!("Invalid dynamic import pattern: '{}'", pattern));
            }
        }

        if let Some(host) = &descriptor.fragment_host {
            if host == &descriptor.name {
                errors.push("A module cannot be a fragment of itself".to_string());
            }
        }

        if errors.is_empty() {
            debug!("Descriptor validation passed for module: {}", descriptor.name);
            ValidationResult::Valid
        } else {
            warn!(
                "Descriptor validation failed for module {}: {:?}",
                descriptor.name, errors
            );
            ValidationResult::Invalid(errors)
        }
    }

    fn validate_exports(&self, descriptor: &ModuleDescriptor, errors: &mut Vec<String>) {
        let mut seen = HashSet::new();
        for export in &descriptor.exports {
            if !self.is_valid_name(&export.package) {
                errors.push(format!("Invalid exported package name: '{}'", export.package));
            }
            match Version::parse(&export.version) {
                Ok(version) => {
                    if !seen.insert((export.package.as_str(), version)) {
                        errors.push(format!(
                            "Package {} exported twice with version {}",
                            export.package, export.version
                        ));
                    }
                }
                Err(e) => errors.push(format!("Export {}: {}", export.package, e)),
            }
            for used in &export.uses {
                if !self.is_valid_name(used) {
                    errors.push(format!(
                        "Export {} uses invalid package name '{}'",
                        export.package, used
                    ));
                }
            }
            for key in &export.mandatory {
                if !export.attributes.contains_key(key) && key != "module-name" {
                    errors.push(format!(
                        "Export {} marks undeclared attribute '{}' mandatory",
                        export.package, key
                    ));
                }
            }
        }
    }

    fn validate_imports(&self, descriptor: &ModuleDescriptor, errors: &mut Vec<String>) {
        let mut seen = HashSet::new();
        for import in &descriptor.imports {
            if !self.is_valid_name(&import.package) {
                errors.push(format!("Invalid imported package name: '{}'", import.package));
            }
            if !seen.insert(import.package.as_str()) {
                errors.push(format!("Package {} imported more than once", import.package));
            }
            if let Err(e) = VersionRange::parse(&import.version) {
                errors.push(format!("Import {}: {}", import.package, e));
            }
            if let Some(range) = &import.from_module_version {
                if let Err(e) = VersionRange::parse(range) {
                    errors.push(format!("Import {} module version: {}", import.package, e));
                }
            }
        }
    }

    fn validate_requires(&self, descriptor: &ModuleDescriptor, errors: &mut Vec<String>) {
        for require in &descriptor.requires {
            if !self.is_valid_name(&require.module) {
                errors.push(format!("Invalid required module name: '{}'", require.module));
            }
            if require.module == descriptor.name {
                errors.push("A module cannot require itself".to_string());
            }
            if let Err(e) = VersionRange::parse(&require.version) {
                errors.push(format!("Require {}: {}", require.module, e));
            }
        }
    }

    fn validate_generic(&self, descriptor: &ModuleDescriptor, errors: &mut Vec<String>) {
        for provide in &descriptor.provides {
            if provide.namespace.is_empty() || Namespace::is_reserved(&provide.namespace) {
                errors.push(format!(
                    "Capability {} uses invalid namespace '{}'",
                    provide.name, provide.namespace
                ));
            }
            if let Err(e) = Version::parse(&provide.version) {
                errors.push(format!("Capability {}: {}", provide.name, e));
            }
        }
        for need in &descriptor.needs {
            if need.namespace.is_empty() || Namespace::is_reserved(&need.namespace) {
                errors.push(format!(
                    "Requirement {} uses invalid namespace '{}'",
                    need.name, need.namespace
                ));
            }
            if let Err(e) = VersionRange::parse(&need.version) {
                errors.push(format!("Requirement {}: {}", need.name, e));
            }
        }
    }

    /// Dot-separated segments of alphanumerics, dashes and underscores
    #[inline]
    fn is_valid_name(&self, name: &str) -> bool {
        if name.is_empty() || name.len() > self.max_name_len {
            return false;
        }

        name.split('.').all(|segment| {
            !segment.is_empty()
                && segment
                    .chars()
                    .all(|c| c.is_alphanumeric() || c == '-' || c == '_')
        })
    }

    fn is_valid_pattern(&self, pattern: &str) -> bool {
        if pattern == "*" {
            return true;
        }
        let name = pattern
            .strip_suffix(".*")
            .or_else(|| pattern.strip_suffix('.'))
            .unwrap_or(pattern);
        self.is_valid_name(name)
    }
}

impl Default for DescriptorValidator {
    fn default() -> Self {
        Self::new()
    }
}
