//! Capabilities and the identifiers shared by the whole model

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use super::version::Version;

macro_rules! id_type {
    ($(#[$meta:meta])* $name:ident, $prefix:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        pub struct $name(pub(crate) u32);

        impl $name {
            /// Raw table index
            pub fn index(self) -> u32 {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!($prefix, "#{}"), self.0)
            }
        }
    };
}

id_type!(
    /// Registry-assigned module identifier
    ModuleId,
    "module"
);
id_type!(
    /// Registry-assigned capability identifier
    CapabilityId,
    "capability"
);
id_type!(
    /// Registry-assigned requirement identifier
    RequirementId,
    "requirement"
);

/// Capability/requirement category
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Namespace {
    /// Exported/imported packages
    Package,
    /// Module identity (symbolic name + version)
    Module,
    /// Any other named namespace
    Named(String),
}

impl Namespace {
    pub fn as_str(&self) -> &str {
        match self {
            Namespace::Package => "package",
            Namespace::Module => "module",
            Namespace::Named(name) => name,
        }
    }

    /// Namespaces that map to dedicated descriptor sections
    pub fn is_reserved(name: &str) -> bool {
        matches!(name, "package" | "module")
    }
}

impl From<String> for Namespace {
    fn from(value: String) -> Self {
        match value.as_str() {
            "package" => Namespace::Package,
            "module" => Namespace::Module,
            _ => Namespace::Named(value),
        }
    }
}

impl From<&str> for Namespace {
    fn from(value: &str) -> Self {
        Namespace::from(value.to_string())
    }
}

impl From<Namespace> for String {
    fn from(namespace: Namespace) -> Self {
        namespace.as_str().to_string()
    }
}

impl fmt::Display for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Something a module offers to others
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Capability {
    pub id: CapabilityId,
    /// Owning module
    pub module: ModuleId,
    pub namespace: Namespace,
    /// Package name, symbolic name, or generic capability name
    pub name: String,
    pub version: Version,
    pub attributes: BTreeMap<String, String>,
    /// Attribute names a requirement must constrain to match this capability
    pub mandatory: Vec<String>,
    /// Packages the implementation behind this capability depends on
    pub uses: Vec<String>,
    /// Owning revision was superseded but consumers still hold wires to it
    pub zombie: bool,
}

impl Capability {
    pub fn is_package(&self) -> bool {
        self.namespace == Namespace::Package
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {};version={}", self.namespace, self.name, self.version)?;
        if self.zombie {
            f.write_str(" (zombie)")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_namespace_round_trip_names() {
        assert_eq!(Namespace::from("package"), Namespace::Package);
        assert_eq!(Namespace::from("module"), Namespace::Module);
        assert_eq!(
            Namespace::from("os.ee"),
            Namespace::Named("os.ee".to_string())
        );
        assert_eq!(Namespace::Named("os.ee".into()).to_string(), "os.ee");
        assert!(Namespace::is_reserved("package"));
        assert!(!Namespace::is_reserved("service"));
    }

    #[test]
    fn test_id_display() {
        assert_eq!(ModuleId(3).to_string(), "module#3");
        assert_eq!(CapabilityId(7).index(), 7);
    }
}
