//! Module descriptors
//!
//! The declaration a collaborator hands to the registry when installing a
//! module: identity, exported/imported packages, required modules, generic
//! capabilities and requirements. Descriptors can be built in code or read
//! from TOML files holding `[[module]]` tables.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

/// Exported package
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportDecl {
    pub package: String,
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub uses: Vec<String>,
    #[serde(default)]
    pub attributes: BTreeMap<String, String>,
    #[serde(default)]
    pub mandatory: Vec<String>,
}

impl ExportDecl {
    pub fn new(package: &str, version: &str) -> Self {
        Self {
            package: package.to_string(),
            version: version.to_string(),
            ..Self::default()
        }
    }

    pub fn uses<I, S>(mut self, packages: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.uses = packages.into_iter().map(Into::into).collect();
        self
    }

    pub fn attribute(mut self, key: &str, value: &str) -> Self {
        self.attributes.insert(key.to_string(), value.to_string());
        self
    }

    pub fn mandatory(mut self, key: &str) -> Self {
        self.mandatory.push(key.to_string());
        self
    }
}

/// Imported package
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportDecl {
    pub package: String,
    /// Version range, empty for any
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub optional: bool,
    #[serde(default)]
    pub attributes: BTreeMap<String, String>,
    /// Symbolic name of the module that must export the package
    #[serde(default)]
    pub from_module: Option<String>,
    #[serde(default)]
    pub from_module_version: Option<String>,
}

impl ImportDecl {
    pub fn new(package: &str, version: &str) -> Self {
        Self {
            package: package.to_string(),
            version: version.to_string(),
            ..Self::default()
        }
    }

    pub fn optional(mut self) -> Self {
        self.optional = true;
        self
    }

    pub fn from_module(mut self, module: &str) -> Self {
        self.from_module = Some(module.to_string());
        self
    }

    pub fn attribute(mut self, key: &str, value: &str) -> Self {
        self.attributes.insert(key.to_string(), value.to_string());
        self
    }
}

/// Required module
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequireDecl {
    pub module: String,
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub optional: bool,
    #[serde(default)]
    pub reexport: bool,
}

/// Generic capability in a named namespace
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProvideDecl {
    pub namespace: String,
    pub name: String,
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub attributes: BTreeMap<String, String>,
    #[serde(default)]
    pub uses: Vec<String>,
}

/// Generic requirement in a named namespace
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NeedDecl {
    pub namespace: String,
    pub name: String,
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub optional: bool,
    #[serde(default)]
    pub attributes: BTreeMap<String, String>,
}

/// Everything a module declares
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuleDescriptor {
    /// Symbolic name
    pub name: String,
    pub version: String,
    #[serde(default)]
    pub singleton: bool,
    /// Symbolic name of the host this module attaches to as a fragment
    #[serde(default)]
    pub fragment_host: Option<String>,
    #[serde(default, rename = "export")]
    pub exports: Vec<ExportDecl>,
    #[serde(default, rename = "import")]
    pub imports: Vec<ImportDecl>,
    #[serde(default, rename = "require")]
    pub requires: Vec<RequireDecl>,
    #[serde(default, rename = "provide")]
    pub provides: Vec<ProvideDecl>,
    #[serde(default, rename = "need")]
    pub needs: Vec<NeedDecl>,
    /// Dynamic import patterns (`*`, `a.b.*`, `a.b`)
    #[serde(default)]
    pub dynamic_imports: Vec<String>,
}

impl ModuleDescriptor {
    pub fn new(name: &str, version: &str) -> Self {
        Self {
            name: name.to_string(),
            version: version.to_string(),
            ..Self::default()
        }
    }

    pub fn singleton(mut self) -> Self {
        self.singleton = true;
        self
    }

    pub fn fragment_of(mut self, host: &str) -> Self {
        self.fragment_host = Some(host.to_string());
        self
    }

    pub fn export(self, package: &str, version: &str) -> Self {
        self.export_with(ExportDecl::new(package, version))
    }

    pub fn export_with(mut self, export: ExportDecl) -> Self {
        self.exports.push(export);
        self
    }

    pub fn import(self, package: &str, version: &str) -> Self {
        self.import_with(ImportDecl::new(package, version))
    }

    pub fn import_optional(self, package: &str, version: &str) -> Self {
        self.import_with(ImportDecl::new(package, version).optional())
    }

    pub fn import_with(mut self, import: ImportDecl) -> Self {
        self.imports.push(import);
        self
    }

    pub fn require(mut self, module: &str, version: &str) -> Self {
        self.requires.push(RequireDecl {
            module: module.to_string(),
            version: version.to_string(),
            ..RequireDecl::default()
        });
        self
    }

    pub fn require_reexport(mut self, module: &str, version: &str) -> Self {
        self.requires.push(RequireDecl {
            module: module.to_string(),
            version: version.to_string(),
            reexport: true,
            ..RequireDecl::default()
        });
        self
    }

    pub fn provide(mut self, namespace: &str, name: &str, version: &str) -> Self {
        self.provides.push(ProvideDecl {
            namespace: namespace.to_string(),
            name: name.to_string(),
            version: version.to_string(),
            ..ProvideDecl::default()
        });
        self
    }

    pub fn need(mut self, namespace: &str, name: &str, version: &str) -> Self {
        self.needs.push(NeedDecl {
            namespace: namespace.to_string(),
            name: name.to_string(),
            version: version.to_string(),
            ..NeedDecl::default()
        });
        self
    }

    pub fn dynamic_import(mut self, pattern: &str) -> Self {
        self.dynamic_imports.push(pattern.to_string());
        self
    }
}

/// A TOML file of `[[module]]` tables
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuleSet {
    #[serde(default, rename = "module")]
    pub modules: Vec<ModuleDescriptor>,
}

impl ModuleSet {
    pub fn from_toml_str(contents: &str) -> anyhow::Result<Self> {
        Ok(toml::from_str(contents)?)
    }

    /// Load a module set from file
    pub fn from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let contents = std::fs::read_to_string(path.as_ref()).map_err(|e| {
            anyhow::anyhow!(
                "Failed to read module set {}: {}",
                path.as_ref().display(),
                e
            )
        })?;
        Self::from_toml_str(&contents)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_collects_declarations() {
        let desc = ModuleDescriptor::new("b", "1.0.0")
            .singleton()
            .export_with(ExportDecl::new("x", "1.5").uses(["y"]))
            .import("y", "[1.0,2.0)")
            .import_optional("z", "")
            .require_reexport("a", "1.0")
            .dynamic_import("com.foo.*");

        assert!(desc.singleton);
        assert_eq!(desc.exports[0].uses, vec!["y".to_string()]);
        assert_eq!(desc.imports.len(), 2);
        assert!(desc.imports[1].optional);
        assert!(desc.requires[0].reexport);
        assert_eq!(desc.dynamic_imports, vec!["com.foo.*".to_string()]);
    }

    #[test]
    fn test_parse_module_set() {
        let set = ModuleSet::from_toml_str(
            r#"
            [[module]]
            name = "a"
            version = "1.0.0"

            [[module.export]]
            package = "x"
            version = "1.5"
            uses = ["y"]

            [[module]]
            name = "b"
            version = "1.0.0"
            singleton = true
            dynamic_imports = ["com.foo.*"]

            [[module.import]]
            package = "x"
            version = "[1.0,2.0)"
            from_module = "a"

            [[module.require]]
            module = "a"
            reexport = true
            "#,
        )
        .unwrap();

        assert_eq!(set.modules.len(), 2);
        assert_eq!(set.modules[0].exports[0].package, "x");
        assert_eq!(set.modules[1].imports[0].from_module.as_deref(), Some("a"));
        assert!(set.modules[1].requires[0].reexport);
        assert!(set.modules[1].singleton);
    }

    #[test]
    fn test_module_set_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("modules.toml");
        std::fs::write(&path, "[[module]]\nname = \"solo\"\nversion = \"2.0\"\n").unwrap();

        let set = ModuleSet::from_file(&path).unwrap();
        assert_eq!(set.modules[0].name, "solo");
        assert!(ModuleSet::from_file(dir.path().join("missing.toml")).is_err());
    }
}
