//! Module manager tests
//!
//! Loading module sets from disk, bulk resolution reports, revision updates
//! with zombie hand-over, and configuration-driven permissions.

mod common;

use std::collections::BTreeSet;

use common::*;
use modwire::config::RuntimeConfig;
use modwire::module::{ModuleDescriptor, ModuleManager, ModuleState, ResolveError};

const MODULE_SET: &str = r#"
[[module]]
name = "a"
version = "1.0.0"

[[module.export]]
package = "x"
version = "1.0"

[[module]]
name = "b"
version = "1.0.0"

[[module.import]]
package = "x"
version = "[1.0,2.0)"

[[module]]
name = "c"
version = "1.0.0"

[[module.import]]
package = "missing"
version = "1.0"
"#;

fn manager_with_set() -> ModuleManager {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("modules.toml");
    std::fs::write(&path, MODULE_SET).unwrap();

    let manager = ModuleManager::from_config(&RuntimeConfig::default()).unwrap();
    let ids = manager.load_module_set(&path).unwrap();
    assert_eq!(ids.len(), 3);
    manager
}

fn named(manager: &ModuleManager, name: &str) -> modwire::module::ModuleId {
    manager
        .resolver()
        .registry()
        .modules_named(name)
        .next()
        .map(|m| m.id)
        .unwrap()
}

#[test]
fn test_load_missing_file() {
    let manager = ModuleManager::from_config(&RuntimeConfig::default()).unwrap();
    let dir = tempfile::tempdir().unwrap();
    assert!(manager.load_module_set(dir.path().join("absent.toml")).is_err());
}

#[test]
fn test_load_rejects_invalid_descriptor() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("bad.toml");
    std::fs::write(
        &path,
        r#"
        [[module]]
        name = ""
        version = "not-a-version"
        "#,
    )
    .unwrap();

    let manager = ModuleManager::from_config(&RuntimeConfig::default()).unwrap();
    assert!(manager.load_module_set(&path).is_err());
    assert_eq!(manager.resolver().registry().modules().count(), 0);
}

#[test]
fn test_resolve_all_reports_failures() {
    let manager = manager_with_set();
    let (a, b, c) = (named(&manager, "a"), named(&manager, "b"), named(&manager, "c"));

    let report = manager.resolve_all();
    assert!(!report.is_complete());
    assert_eq!(report.resolved, vec![a, b]);
    assert_eq!(report.wires.len(), 1);
    assert_eq!(report.failed.len(), 1);
    assert_eq!(report.failed[0].0, c);
    assert!(matches!(
        report.failed[0].1,
        ResolveError::MissingProvider { .. }
    ));
    assert_eq!(manager.module_state(c), Some(ModuleState::Installed));

    // Nothing left to do for the resolved ones
    let again = manager.resolve_all();
    assert!(again.resolved.is_empty());
    assert!(again.wires.is_empty());
    assert_eq!(again.failed.len(), 1);
}

#[test]
fn test_update_in_use_keeps_zombie_until_consumers_leave() {
    let manager = manager_with_set();
    manager.resolve_all();
    let (a, b) = (named(&manager, "a"), named(&manager, "b"));

    let a2 = manager
        .update(a, &ModuleDescriptor::new("a", "1.1").export("x", "1.1"))
        .unwrap();
    let registry = manager.resolver().registry();
    assert!(registry.capability(export_of(&registry, a, "x")).unwrap().zombie);
    assert_eq!(wired_to(&registry, b, "x"), Some(export_of(&registry, a, "x")));
    assert_eq!(manager.affected_closure(&BTreeSet::new()), BTreeSet::from([a, b]));

    // New consumers go to the live revision
    let late = manager
        .install(&ModuleDescriptor::new("late", "1.0").import("x", "1.0"))
        .unwrap();
    manager.resolver().resolve(late).unwrap();
    let registry = manager.resolver().registry();
    assert_eq!(wired_to(&registry, late, "x"), Some(export_of(&registry, a2, "x")));

    assert!(manager.purge_zombies().unwrap().is_empty());
    manager.resolver().uninstall(b, false).unwrap();
    assert_eq!(manager.purge_zombies().unwrap(), vec![a]);
    assert_eq!(manager.module_state(a), None);
    assert_eq!(manager.module_state(a2), Some(ModuleState::Resolved));
}

#[test]
fn test_permissions_from_config() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("modwire.toml");
    std::fs::write(
        &path,
        r#"
        [permissions]
        default_grants = ["export:*", "import:*", "require:*", "provide:*"]

        [permissions.module_grants]
        "sandboxed" = ["import:safe.*"]
        "#,
    )
    .unwrap();
    let config = RuntimeConfig::from_file(&path).unwrap();
    let manager = ModuleManager::from_config(&config).unwrap();

    manager
        .install(&ModuleDescriptor::new("a", "1.0").export("x", "1.0").export("safe.io", "1.0"))
        .unwrap();
    let sandboxed = manager
        .install(&ModuleDescriptor::new("sandboxed", "1.0").import("x", "1.0"))
        .unwrap();
    let allowed = manager
        .install(&ModuleDescriptor::new("sandboxed", "2.0").import("safe.io", "1.0"))
        .unwrap();

    assert!(manager.resolver().resolve(sandboxed).is_err());
    assert!(manager.resolver().resolve(allowed).is_ok());
}
