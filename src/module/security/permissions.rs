//! Permission model for capability wiring
//!
//! Whitelist grants deciding which modules may export, import, require or
//! provide which names. The resolver consults them through the
//! [`PermissionOracle`] trait and never enforces anything itself.

use std::collections::{HashMap, HashSet};
use tracing::{debug, warn};

use crate::config::PermissionsConfig;
use crate::module::model::{Capability, Module, NamePattern, Namespace, Requirement};
use crate::module::traits::PermissionOracle;

/// Permission kinds a grant can carry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Action {
    /// Offer packages
    Export,
    /// Import packages
    Import,
    /// Require modules and generic capabilities
    Require,
    /// Offer generic capabilities
    Provide,
}

/// One grant: an action over names matching a pattern
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Permission {
    pub action: Action,
    pub pattern: NamePattern,
}

impl Permission {
    /// Parse `export:<pattern>`, `import:<pattern>`, `require:<pattern>` or `provide:<pattern>`
    pub fn parse(grant: &str) -> Option<Permission> {
        let (action, pattern) = grant.split_once(':')?;
        let action = match action.trim() {
            "export" => Action::Export,
            "import" => Action::Import,
            "require" => Action::Require,
            "provide" => Action::Provide,
            _ => return None,
        };
        let pattern = pattern.trim();
        if pattern.is_empty() {
            return None;
        }
        Some(Permission {
            action,
            pattern: NamePattern::parse(pattern),
        })
    }
}

/// Set of permissions for a module
#[derive(Debug, Clone, Default)]
pub struct PermissionSet {
    permissions: HashSet<Permission>,
}

impl PermissionSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Grants everything
    pub fn all() -> Self {
        Self::from_vec(
            [Action::Export, Action::Import, Action::Require, Action::Provide]
                .into_iter()
                .map(|action| Permission {
                    action,
                    pattern: NamePattern::Any,
                })
                .collect(),
        )
    }

    pub fn from_vec(permissions: Vec<Permission>) -> Self {
        Self {
            permissions: permissions.into_iter().collect(),
        }
    }

    /// Parse grant strings, failing on the first malformed one
    pub fn parse<S: AsRef<str>>(grants: &[S]) -> anyhow::Result<Self> {
        let permissions = grants
            .iter()
            .map(|g| {
                Permission::parse(g.as_ref())
                    .ok_or_else(|| anyhow::anyhow!("Invalid permission grant: '{}'", g.as_ref()))
            })
            .collect::<anyhow::Result<Vec<_>>>()?;
        Ok(Self::from_vec(permissions))
    }

    pub fn add(&mut self, permission: Permission) {
        self.permissions.insert(permission);
    }

    /// Whether some grant covers `action` on `name`
    pub fn allows(&self, action: Action, name: &str) -> bool {
        self.permissions
            .iter()
            .any(|p| p.action == action && p.pattern.matches(name))
    }

    pub fn len(&self) -> usize {
        self.permissions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.permissions.is_empty()
    }
}

/// Grants everything to everyone
#[derive(Debug, Clone, Copy, Default)]
pub struct AllowAll;

impl PermissionOracle for AllowAll {
    fn may_provide(&self, _module: &Module, _capability: &Capability) -> bool {
        true
    }

    fn may_require(&self, _module: &Module, _requirement: &Requirement, _capability: &Capability) -> bool {
        true
    }
}

/// Permission checker keyed by module symbolic name
pub struct PermissionChecker {
    /// Grants for modules without an override
    default_permissions: PermissionSet,
    /// Symbolic name -> grants; replaces the defaults
    module_permissions: HashMap<String, PermissionSet>,
}

impl PermissionChecker {
    /// Checker granting everything by default
    pub fn new() -> Self {
        Self::with_defaults(PermissionSet::all())
    }

    pub fn with_defaults(default_permissions: PermissionSet) -> Self {
        Self {
            default_permissions,
            module_permissions: HashMap::new(),
        }
    }

    pub fn from_config(config: &PermissionsConfig) -> anyhow::Result<Self> {
        let mut checker = Self::with_defaults(PermissionSet::parse(&config.default_grants)?);
        for (module, grants) in &config.module_grants {
            checker.register_module_permissions(module.clone(), PermissionSet::parse(grants)?);
        }
        Ok(checker)
    }

    /// Register module-specific permissions
    pub fn register_module_permissions(&mut self, module: String, permissions: PermissionSet) {
        debug!(
            "Registering {} permission(s) for module {}",
            permissions.len(),
            module
        );
        self.module_permissions.insert(module, permissions);
    }

    /// Check if a module holds a grant for `action` on `name`
    #[inline]
    pub fn check_permission(&self, module: &str, action: Action, name: &str) -> bool {
        // Module-specific grants replace the defaults entirely
        let granted = self
            .module_permissions
            .get(module)
            .unwrap_or(&self.default_permissions)
            .allows(action, name);
        if !granted {
            warn!("Module {} denied {:?} on {}", module, action, name);
        }
        granted
    }
}

impl Default for PermissionChecker {
    fn default() -> Self {
        Self::new()
    }
}

impl PermissionOracle for PermissionChecker {
    fn may_provide(&self, module: &Module, capability: &Capability) -> bool {
        let action = match capability.namespace {
            Namespace::Package => Action::Export,
            // Identity capabilities are always offered
            Namespace::Module => return true,
            Namespace::Named(_) => Action::Provide,
        };
        self.check_permission(module.symbolic_name(), action, &capability.name)
    }

    fn may_require(&self, module: &Module, requirement: &Requirement, capability: &Capability) -> bool {
        let action = match requirement.namespace {
            Namespace::Package => Action::Import,
            Namespace::Module | Namespace::Named(_) => Action::Require,
        };
        self.check_permission(module.symbolic_name(), action, &capability.name)
    }
}
