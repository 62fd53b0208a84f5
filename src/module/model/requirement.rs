//! Requirements, their filters and the wires that satisfy them

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use super::capability::{Capability, CapabilityId, ModuleId, Namespace, RequirementId};
use super::version::VersionRange;
use super::Module;

/// Whether an unsatisfied requirement blocks resolution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResolutionPolicy {
    #[default]
    Mandatory,
    Optional,
}

/// Re-export policy of a module requirement
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Visibility {
    #[default]
    Private,
    /// Packages of the required module are re-exported by the requirer
    Reexport,
}

/// Attribute and version predicate over capabilities
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Filter {
    pub version: VersionRange,
    pub attributes: BTreeMap<String, String>,
    /// Symbolic name the providing module must have
    pub from_module: Option<String>,
    /// Version range the providing module must fall in
    pub from_module_version: VersionRange,
}

impl Filter {
    pub fn with_version(version: VersionRange) -> Self {
        Self {
            version,
            ..Self::default()
        }
    }

    /// Check a capability owned by `provider` against this filter.
    ///
    /// Attributes the capability declares mandatory must be constrained here,
    /// otherwise the capability does not match even if everything else does.
    pub fn matches(&self, capability: &Capability, provider: &Module) -> bool {
        if !self.version.includes(&capability.version) {
            return false;
        }

        let attributes_match = self
            .attributes
            .iter()
            .all(|(key, value)| capability.attributes.get(key) == Some(value));
        if !attributes_match {
            return false;
        }

        let mandatory_named = capability.mandatory.iter().all(|key| {
            self.attributes.contains_key(key)
                || (key == "module-name" && self.from_module.is_some())
        });
        if !mandatory_named {
            return false;
        }

        if let Some(name) = &self.from_module {
            if *name != provider.symbolic_name {
                return false;
            }
        }
        self.from_module_version.includes(&provider.version)
    }
}

/// Name pattern of a dynamic import
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum NamePattern {
    /// `*`
    Any,
    /// `a.b.*` or `a.b.` stored as `a.b`
    Prefix(String),
    Exact(String),
}

impl NamePattern {
    /// `*` matches any name. A prefix is written `a.b.*`, or with the star
    /// already stripped as `a.b.`. Anything else is an exact name.
    pub fn parse(pattern: &str) -> Self {
        let pattern = pattern.trim();
        if pattern == "*" {
            NamePattern::Any
        } else if let Some(prefix) = pattern
            .strip_suffix(".*")
            .or_else(|| pattern.strip_suffix('.'))
        {
            NamePattern::Prefix(prefix.to_string())
        } else {
            NamePattern::Exact(pattern.to_string())
        }
    }

    /// `a.b.*` matches `a.b` and `a.b.c` but not `a.bc`
    pub fn matches(&self, name: &str) -> bool {
        match self {
            NamePattern::Any => true,
            NamePattern::Exact(exact) => exact == name,
            NamePattern::Prefix(prefix) => {
                name == prefix
                    || name
                        .strip_prefix(prefix.as_str())
                        .is_some_and(|rest| rest.starts_with('.'))
            }
        }
    }
}

impl fmt::Display for NamePattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NamePattern::Any => f.write_str("*"),
            NamePattern::Prefix(prefix) => write!(f, "{}.*", prefix),
            NamePattern::Exact(exact) => f.write_str(exact),
        }
    }
}

/// Something a module needs from others
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Requirement {
    pub id: RequirementId,
    /// Owning module
    pub module: ModuleId,
    pub namespace: Namespace,
    /// Target name; the pattern text for dynamic imports
    pub name: String,
    pub filter: Filter,
    pub policy: ResolutionPolicy,
    pub visibility: Visibility,
    /// Set for dynamic import declarations
    pub dynamic: Option<NamePattern>,
    /// Dynamic declaration this concrete import was instantiated from
    pub origin: Option<RequirementId>,
    pub(crate) provider: Option<CapabilityId>,
    pub(crate) internal_candidate: Option<CapabilityId>,
}

impl Requirement {
    pub fn is_optional(&self) -> bool {
        self.policy == ResolutionPolicy::Optional
    }

    pub fn is_dynamic(&self) -> bool {
        self.dynamic.is_some()
    }

    /// Capability this requirement is wired to
    pub fn provider(&self) -> Option<CapabilityId> {
        self.provider
    }

    /// Same-module candidate rejected during the resolution that wired this requirement
    pub fn internal_candidate(&self) -> Option<CapabilityId> {
        self.internal_candidate
    }

    /// Whether `capability` (owned by `provider`) could satisfy this requirement
    pub fn accepts(&self, capability: &Capability, provider: &Module) -> bool {
        capability.namespace == self.namespace
            && capability.name == self.name
            && self.filter.matches(capability, provider)
    }
}

impl fmt::Display for Requirement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.namespace, self.name)?;
        if !self.filter.version.is_any() {
            write!(f, ";version={}", self.filter.version)?;
        }
        if let Some(from) = &self.filter.from_module {
            write!(f, ";from={}", from)?;
        }
        if self.is_optional() {
            f.write_str(" (optional)")?;
        }
        Ok(())
    }
}

/// Committed requirement -> capability edge
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Wire {
    pub requirement: RequirementId,
    pub capability: CapabilityId,
    pub requirer: ModuleId,
    pub provider: ModuleId,
}

impl fmt::Display for Wire {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{} -> {}:{}",
            self.requirer, self.requirement, self.provider, self.capability
        )
    }
}
