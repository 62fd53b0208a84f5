//! Concurrency tests
//!
//! One session at a time: other callers wait for it, hooks re-entering the
//! resolver either join the open session or get a deadlock error, and
//! registry mutations from inside a session are refused.

mod common;

use std::sync::{Arc, Barrier, Mutex, OnceLock, Weak};
use std::thread;
use std::time::Duration;

use common::*;
use modwire::config::ResolverConfig;
use modwire::module::{
    CallToken, CapabilityId, HookContext, Module, ModuleDescriptor, ModuleId, ModuleState,
    RegistryError, Requirement, RequirementId, ResolveError, Resolver, ResolverHook,
};

/// Holds the session open on admitting `name` until released
struct Gate {
    name: &'static str,
    entered: Barrier,
    release: Barrier,
}

impl Gate {
    fn new(name: &'static str) -> Arc<Self> {
        Arc::new(Self {
            name,
            entered: Barrier::new(2),
            release: Barrier::new(2),
        })
    }
}

impl ResolverHook for Gate {
    fn filter_resolvable(&self, _ctx: &HookContext<'_>, module: &Module) -> bool {
        if module.symbolic_name() == self.name {
            self.entered.wait();
            self.release.wait();
        }
        true
    }
}

#[test]
fn test_second_caller_waits_for_open_session() {
    let gate = Gate::new("slow");
    let resolver = Arc::new(Resolver::builder().hook(gate.clone()).build());
    let slow = install(&resolver, ModuleDescriptor::new("slow", "1.0"));
    let fast = install(&resolver, ModuleDescriptor::new("fast", "1.0"));

    let first = {
        let resolver = Arc::clone(&resolver);
        thread::spawn(move || resolver.resolve(slow))
    };
    gate.entered.wait();

    let done = Arc::new(Mutex::new(false));
    let second = {
        let resolver = Arc::clone(&resolver);
        let done = Arc::clone(&done);
        thread::spawn(move || {
            let result = resolver.resolve(fast);
            *done.lock().unwrap() = true;
            result
        })
    };

    thread::sleep(Duration::from_millis(100));
    assert!(!*done.lock().unwrap(), "second session started while the first was open");

    gate.release.wait();
    assert!(first.join().unwrap().is_ok());
    assert!(second.join().unwrap().is_ok());

    let registry = resolver.registry();
    assert_eq!(state_of(&registry, slow), ModuleState::Resolved);
    assert_eq!(state_of(&registry, fast), ModuleState::Resolved);
}

#[test]
fn test_wait_times_out() {
    let gate = Gate::new("slow");
    let resolver = Arc::new(
        Resolver::builder()
            .config(ResolverConfig {
                session_wait_timeout_ms: Some(50),
                ..ResolverConfig::default()
            })
            .hook(gate.clone())
            .build(),
    );
    let slow = install(&resolver, ModuleDescriptor::new("slow", "1.0"));
    let fast = install(&resolver, ModuleDescriptor::new("fast", "1.0"));

    let first = {
        let resolver = Arc::clone(&resolver);
        thread::spawn(move || resolver.resolve(slow))
    };
    gate.entered.wait();

    assert_eq!(
        resolver.resolve(fast),
        Err(ResolveError::SessionTimeout(Duration::from_millis(50)))
    );
    assert_eq!(state_of(&resolver.registry(), fast), ModuleState::Installed);

    gate.release.wait();
    assert!(first.join().unwrap().is_ok());
    assert!(resolver.resolve(fast).is_ok());
}

/// Re-enters the resolver from inside a session and records what happened
struct Reentrant {
    resolver: OnceLock<Weak<Resolver>>,
    trigger: &'static str,
    target: OnceLock<ModuleId>,
    resolve_outcome: Mutex<Option<Result<usize, ResolveError>>>,
    install_outcome: Mutex<Option<Result<ModuleId, RegistryError>>>,
}

impl Reentrant {
    fn new(trigger: &'static str) -> Arc<Self> {
        Arc::new(Self {
            resolver: OnceLock::new(),
            trigger,
            target: OnceLock::new(),
            resolve_outcome: Mutex::new(None),
            install_outcome: Mutex::new(None),
        })
    }

    fn attach(self: &Arc<Self>) -> Arc<Resolver> {
        let resolver = Arc::new(Resolver::builder().hook(self.clone()).build());
        let _ = self.resolver.set(Arc::downgrade(&resolver));
        resolver
    }
}

impl ResolverHook for Reentrant {
    fn filter_matches(
        &self,
        ctx: &HookContext<'_>,
        requirement: &Requirement,
        _candidates: &mut Vec<CapabilityId>,
    ) {
        let is_trigger = ctx
            .registry
            .module(requirement.module)
            .is_some_and(|m| m.symbolic_name() == self.trigger);
        let (Some(resolver), Some(target)) = (
            self.resolver.get().and_then(Weak::upgrade),
            self.target.get(),
        ) else {
            return;
        };
        if !is_trigger {
            return;
        }

        let outcome = resolver.resolve(*target).map(|wires| wires.len());
        *self.resolve_outcome.lock().unwrap() = Some(outcome);
        let installed = resolver.install(&ModuleDescriptor::new("intruder", "1.0"));
        *self.install_outcome.lock().unwrap() = Some(installed);
    }
}

#[test]
fn test_hook_resolving_outside_session_is_deadlock() {
    let hook = Reentrant::new("b");
    let resolver = hook.attach();
    install(&resolver, ModuleDescriptor::new("a", "1.0").export("x", "1.0"));
    let b = install(&resolver, ModuleDescriptor::new("b", "1.0").import("x", "1.0"));
    let outsider = install(&resolver, ModuleDescriptor::new("outsider", "1.0"));
    hook.target.set(outsider).unwrap();

    resolver.resolve(b).unwrap();

    assert!(matches!(
        hook.resolve_outcome.lock().unwrap().take(),
        Some(Err(ResolveError::DeadlockDetected(_)))
    ));
    assert_eq!(state_of(&resolver.registry(), outsider), ModuleState::Installed);
}

#[test]
fn test_hook_resolving_session_member_joins() {
    let hook = Reentrant::new("b");
    let resolver = hook.attach();
    install(&resolver, ModuleDescriptor::new("a", "1.0").export("x", "1.0"));
    let b = install(&resolver, ModuleDescriptor::new("b", "1.0").import("x", "1.0"));
    hook.target.set(b).unwrap();

    assert_eq!(resolver.resolve(b).unwrap().len(), 1);
    assert_eq!(hook.resolve_outcome.lock().unwrap().take(), Some(Ok(0)));
}

#[test]
fn test_hook_cannot_mutate_registry() {
    let hook = Reentrant::new("b");
    let resolver = hook.attach();
    install(&resolver, ModuleDescriptor::new("a", "1.0").export("x", "1.0"));
    let b = install(&resolver, ModuleDescriptor::new("b", "1.0").import("x", "1.0"));
    hook.target.set(b).unwrap();

    resolver.resolve(b).unwrap();
    assert_eq!(
        hook.install_outcome.lock().unwrap().take(),
        Some(Err(RegistryError::SessionActive))
    );
    assert_eq!(resolver.registry().modules_named("intruder").count(), 0);
}

/// Re-enters under a fresh token from the thread driving the session
struct FreshToken {
    resolver: OnceLock<Weak<Resolver>>,
    outsider: OnceLock<ModuleId>,
    dynamic: OnceLock<RequirementId>,
    resolve_outcome: Mutex<Option<Result<usize, ResolveError>>>,
    dynamic_outcome: Mutex<Option<Result<Option<CapabilityId>, ResolveError>>>,
}

impl ResolverHook for FreshToken {
    fn filter_matches(
        &self,
        ctx: &HookContext<'_>,
        requirement: &Requirement,
        _candidates: &mut Vec<CapabilityId>,
    ) {
        let is_b = ctx
            .registry
            .module(requirement.module)
            .is_some_and(|m| m.symbolic_name() == "b");
        let (Some(resolver), Some(outsider), Some(dynamic)) = (
            self.resolver.get().and_then(Weak::upgrade),
            self.outsider.get(),
            self.dynamic.get(),
        ) else {
            return;
        };
        if !is_b {
            return;
        }

        let outcome = resolver
            .resolve_as(CallToken::new(), *outsider)
            .map(|wires| wires.len());
        *self.resolve_outcome.lock().unwrap() = Some(outcome);
        let wired = resolver.register_dynamic_import_as(CallToken::new(), *dynamic, "com.acme.util");
        *self.dynamic_outcome.lock().unwrap() = Some(wired);
    }
}

#[test]
fn test_fresh_token_on_driving_thread_is_deadlock() {
    let hook = Arc::new(FreshToken {
        resolver: OnceLock::new(),
        outsider: OnceLock::new(),
        dynamic: OnceLock::new(),
        resolve_outcome: Mutex::new(None),
        dynamic_outcome: Mutex::new(None),
    });
    let resolver = Arc::new(
        Resolver::builder()
            .config(ResolverConfig {
                session_wait_timeout_ms: Some(300),
                ..ResolverConfig::default()
            })
            .hook(hook.clone())
            .build(),
    );
    let _ = hook.resolver.set(Arc::downgrade(&resolver));

    install(&resolver, ModuleDescriptor::new("a", "1.0").export("x", "1.0"));
    install(&resolver, ModuleDescriptor::new("u", "1.0").export("com.acme.util", "1.0"));
    let d = install(&resolver, ModuleDescriptor::new("d", "1.0").dynamic_import("com.acme.*"));
    resolver.resolve(d).unwrap();
    hook.dynamic
        .set(requirement_named(&resolver.registry(), d, "com.acme.*"))
        .unwrap();
    let b = install(&resolver, ModuleDescriptor::new("b", "1.0").import("x", "1.0"));
    let outsider = install(&resolver, ModuleDescriptor::new("outsider", "1.0"));
    hook.outsider.set(outsider).unwrap();

    resolver.resolve(b).unwrap();

    assert!(matches!(
        hook.resolve_outcome.lock().unwrap().take(),
        Some(Err(ResolveError::DeadlockDetected(_)))
    ));
    assert!(matches!(
        hook.dynamic_outcome.lock().unwrap().take(),
        Some(Err(ResolveError::DeadlockDetected(_)))
    ));
    let registry = resolver.registry();
    assert_eq!(state_of(&registry, outsider), ModuleState::Installed);
    // No concrete import was added next to the dynamic declaration
    assert_eq!(registry.module(d).unwrap().declared_requirements().len(), 1);
}

#[test]
fn test_parallel_callers_share_one_provider() {
    let resolver = resolver();
    let a = install(&resolver, ModuleDescriptor::new("a", "1.0").export("x", "1.0"));
    let consumers: Vec<ModuleId> = (0..8)
        .map(|i| {
            install(
                &resolver,
                ModuleDescriptor::new(&format!("c{}", i), "1.0").import("x", "1.0"),
            )
        })
        .collect();

    let handles: Vec<_> = consumers
        .iter()
        .map(|id| {
            let resolver = Arc::clone(&resolver);
            let id = *id;
            thread::spawn(move || resolver.resolve(id))
        })
        .collect();
    for handle in handles {
        assert!(handle.join().unwrap().is_ok());
    }

    let registry = resolver.registry();
    let x = export_of(&registry, a, "x");
    assert_eq!(registry.consumers_of(x).count(), consumers.len());
    assert_eq!(registry.all_wires().len(), consumers.len());
    for id in consumers {
        assert_eq!(wired_to(&registry, id, "x"), Some(x));
    }
}
