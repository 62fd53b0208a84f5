//! Module resolver
//!
//! Front end of the resolution engine. One mutex guards the registry (an
//! `Arc`, copied on write) and the ticket of the single open session. The
//! session itself runs with the lock released against an immutable registry
//! snapshot; registry mutations wait until no session is open.
//!
//! Callers are identified by [`CallToken`]s rather than threads. A call for a
//! module the open session already admitted returns at once, a call from the
//! caller driving the session for any other module fails with
//! [`ResolveError::DeadlockDetected`], and everybody else waits.

mod candidates;
mod commit;
mod dynamic;
mod requirements;
mod session;
mod singleton;
mod uses;

use std::cell::RefCell;
use std::collections::BTreeSet;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::Instant;
use tracing::{debug, warn};

use crate::config::{ResolverConfig, RuntimeConfig};
use crate::module::hooks::{HookRegistry, ResolverHook};
use crate::module::model::{ModuleId, RequirementId, Wire};
use crate::module::registry::{closure, ModuleDescriptor, Registry};
use crate::module::security::{AllowAll, PermissionChecker};
use crate::module::traits::{ModuleState, PermissionOracle, RegistryError, ResolveError};

use session::{Session, SessionEnv};

static NEXT_TOKEN: AtomicU64 = AtomicU64::new(1);

thread_local! {
    /// Tokens of sessions driven by this thread, innermost last
    static DRIVING: RefCell<Vec<CallToken>> = const { RefCell::new(Vec::new()) };
}

/// Identity of a resolve caller
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CallToken(u64);

impl CallToken {
    /// Fresh token, distinct from every other
    pub fn new() -> Self {
        CallToken(NEXT_TOKEN.fetch_add(1, Ordering::Relaxed))
    }

    /// Token of the session this thread is driving, or a fresh one
    pub fn current() -> Self {
        DRIVING
            .with(|d| d.borrow().last().copied())
            .unwrap_or_else(Self::new)
    }

    fn is_driving_here(self) -> bool {
        DRIVING.with(|d| d.borrow().contains(&self))
    }
}

impl Default for CallToken {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for CallToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "caller#{}", self.0)
    }
}

/// The open session as seen by other callers
#[derive(Debug)]
struct Ticket {
    id: u64,
    drivers: BTreeSet<CallToken>,
    members: BTreeSet<ModuleId>,
}

impl Ticket {
    /// `caller` drives this session, or this thread already does under another token
    fn driven_by(&self, caller: CallToken) -> bool {
        self.drivers.contains(&caller) || self.drivers.iter().any(|t| t.is_driving_here())
    }
}

#[derive(Debug)]
struct Shared {
    registry: Arc<Registry>,
    ticket: Option<Ticket>,
    next_ticket: u64,
}

/// Releases the session ticket when the session ends, however it ends
struct SessionGuard<'r> {
    resolver: &'r Resolver,
    caller: CallToken,
    ticket: u64,
}

impl<'r> SessionGuard<'r> {
    fn open(resolver: &'r Resolver, shared: &mut Shared, caller: CallToken) -> Self {
        let id = shared.next_ticket;
        shared.next_ticket += 1;
        shared.ticket = Some(Ticket {
            id,
            drivers: [caller].into_iter().collect(),
            members: BTreeSet::new(),
        });
        DRIVING.with(|d| d.borrow_mut().push(caller));
        debug!("Session {} opened by {}", id, caller);
        Self {
            resolver,
            caller,
            ticket: id,
        }
    }
}

impl Drop for SessionGuard<'_> {
    fn drop(&mut self) {
        DRIVING.with(|d| {
            let mut driving = d.borrow_mut();
            if let Some(pos) = driving.iter().rposition(|t| *t == self.caller) {
                driving.remove(pos);
            }
        });
        let mut shared = self.resolver.lock();
        if shared.ticket.as_ref().is_some_and(|t| t.id == self.ticket) {
            shared.ticket = None;
        }
        drop(shared);
        self.resolver.session_free.notify_all();
        debug!("Session {} closed", self.ticket);
    }
}

/// What a caller gets when asking for a session
enum Admission<'r> {
    /// Nothing to do: already resolved or already admitted by the open session
    Settled,
    Open(SessionGuard<'r>, Arc<Registry>),
}

/// Builder for [`Resolver`]
pub struct ResolverBuilder {
    config: ResolverConfig,
    hooks: HookRegistry,
    permissions: Arc<dyn PermissionOracle>,
    registry: Registry,
}

impl ResolverBuilder {
    pub fn config(mut self, config: ResolverConfig) -> Self {
        self.config = config;
        self
    }

    pub fn hook(mut self, hook: Arc<dyn ResolverHook>) -> Self {
        self.hooks.add(hook);
        self
    }

    pub fn permissions(mut self, permissions: Arc<dyn PermissionOracle>) -> Self {
        self.permissions = permissions;
        self
    }

    /// Start from an existing registry
    pub fn registry(mut self, registry: Registry) -> Self {
        self.registry = registry;
        self
    }

    pub fn build(self) -> Resolver {
        Resolver {
            shared: Mutex::new(Shared {
                registry: Arc::new(self.registry),
                ticket: None,
                next_ticket: 1,
            }),
            session_free: Condvar::new(),
            hooks: self.hooks,
            permissions: self.permissions,
            config: self.config,
        }
    }
}

/// Resolver over one registry
pub struct Resolver {
    shared: Mutex<Shared>,
    session_free: Condvar,
    hooks: HookRegistry,
    permissions: Arc<dyn PermissionOracle>,
    config: ResolverConfig,
}

impl Resolver {
    pub fn new() -> Self {
        Self::builder().build()
    }

    pub fn builder() -> ResolverBuilder {
        ResolverBuilder {
            config: ResolverConfig::default(),
            hooks: HookRegistry::new(),
            permissions: Arc::new(AllowAll),
            registry: Registry::new(),
        }
    }

    /// Resolver configured from the runtime config (resolver section and permission grants)
    pub fn from_config(config: &RuntimeConfig) -> anyhow::Result<Self> {
        config.validate()?;
        let mut builder = Self::builder().config(config.resolver.clone());
        if let Some(ref permissions) = config.permissions {
            builder = builder.permissions(Arc::new(PermissionChecker::from_config(permissions)?));
        }
        Ok(builder.build())
    }

    pub fn config(&self) -> &ResolverConfig {
        &self.config
    }

    fn lock(&self) -> MutexGuard<'_, Shared> {
        self.shared.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Snapshot of the registry
    pub fn registry(&self) -> Arc<Registry> {
        Arc::clone(&self.lock().registry)
    }

    /// Resolve `module` with all of its declared static requirements.
    ///
    /// Returns the wires created; empty if the module was already resolved or
    /// is already being resolved by the open session.
    pub fn resolve(&self, module: ModuleId) -> Result<Vec<Wire>, ResolveError> {
        self.resolve_as(CallToken::current(), module)
    }

    pub fn resolve_as(&self, caller: CallToken, module: ModuleId) -> Result<Vec<Wire>, ResolveError> {
        self.resolve_requirements(caller, module, None)
    }

    /// Resolve `module` against `requirements` (all static requirements if `None`)
    pub fn resolve_requirements(
        &self,
        caller: CallToken,
        module: ModuleId,
        requirements: Option<&[RequirementId]>,
    ) -> Result<Vec<Wire>, ResolveError> {
        let (guard, snapshot) = match self.admission(caller, module)? {
            Admission::Settled => return Ok(Vec::new()),
            Admission::Open(guard, snapshot) => (guard, snapshot),
        };

        let requirements = match requirements {
            Some(list) => {
                for id in list {
                    match snapshot.requirement(*id) {
                        Some(r) if r.module == module => {}
                        _ => return Err(ResolveError::UnknownRequirement(*id)),
                    }
                }
                list.to_vec()
            }
            None => snapshot.static_requirements(module),
        };

        let outcome = {
            let publish = |members: &BTreeSet<ModuleId>| self.publish(guard.ticket, members);
            let env = SessionEnv {
                registry: &snapshot,
                hooks: &self.hooks,
                permissions: self.permissions.as_ref(),
                config: &self.config,
                caller,
                publish: &publish,
            };
            let mut session = Session::new(&env);
            session
                .resolve_top(module, &requirements)
                .map(|()| session.into_resolution())
        };
        drop(snapshot);

        match outcome {
            Ok(resolution) => Ok(self.commit(guard, resolution)),
            Err(error) => {
                warn!("Failed to resolve {}: {}", module, error);
                Err(error)
            }
        }
    }

    /// Wait until `caller` may open a session for `module`, or find out it need not
    fn admission(&self, caller: CallToken, module: ModuleId) -> Result<Admission<'_>, ResolveError> {
        let timeout = self.config.session_wait_timeout();
        let deadline = timeout.map(|t| Instant::now() + t);
        let mut shared = self.lock();

        loop {
            let label = match shared.registry.module(module) {
                Some(m) if m.state().is_resolved() => return Ok(Admission::Settled),
                Some(m) => m.to_string(),
                None => return Err(ResolveError::UnknownModule(module)),
            };

            if shared.ticket.is_none() {
                let guard = SessionGuard::open(self, &mut shared, caller);
                return Ok(Admission::Open(guard, Arc::clone(&shared.registry)));
            }
            match &shared.ticket {
                None => {}
                Some(ticket) if ticket.members.contains(&module) => {
                    debug!("{} joins session {} for {}", caller, ticket.id, label);
                    return Ok(Admission::Settled);
                }
                Some(ticket) if ticket.driven_by(caller) => {
                    return Err(ResolveError::DeadlockDetected(format!(
                        "{} drives session {} and asked for {}, which the session has not admitted",
                        caller, ticket.id, label
                    )));
                }
                Some(_) => {}
            }

            shared = self.wait(shared, deadline, timeout)?;
        }
    }

    /// Block on the session-free condition, bounded by the optional deadline
    fn wait<'g>(
        &self,
        shared: MutexGuard<'g, Shared>,
        deadline: Option<Instant>,
        timeout: Option<std::time::Duration>,
    ) -> Result<MutexGuard<'g, Shared>, ResolveError> {
        match (deadline, timeout) {
            (Some(deadline), Some(timeout)) => {
                let now = Instant::now();
                if now >= deadline {
                    return Err(ResolveError::SessionTimeout(timeout));
                }
                let (guard, _) = self
                    .session_free
                    .wait_timeout(shared, deadline - now)
                    .unwrap_or_else(PoisonError::into_inner);
                Ok(guard)
            }
            _ => Ok(self
                .session_free
                .wait(shared)
                .unwrap_or_else(PoisonError::into_inner)),
        }
    }

    fn publish(&self, ticket: u64, members: &BTreeSet<ModuleId>) {
        let mut shared = self.lock();
        if let Some(open) = shared.ticket.as_mut().filter(|t| t.id == ticket) {
            open.members.clone_from(members);
        }
        drop(shared);
        // Joiners waiting for a member can return now
        self.session_free.notify_all();
    }

    /// Run a registry mutation once no session is open
    fn mutate<R>(&self, f: impl FnOnce(&mut Registry) -> R) -> Result<R, RegistryError> {
        let mut shared = self.lock();
        while let Some(ticket) = &shared.ticket {
            if ticket.drivers.iter().any(|t| t.is_driving_here()) {
                return Err(RegistryError::SessionActive);
            }
            shared = self
                .session_free
                .wait(shared)
                .unwrap_or_else(PoisonError::into_inner);
        }
        Ok(f(Arc::make_mut(&mut shared.registry)))
    }

    pub fn install(&self, descriptor: &ModuleDescriptor) -> Result<ModuleId, RegistryError> {
        self.mutate(|registry| registry.install(descriptor))?
    }

    pub fn uninstall(&self, module: ModuleId, force: bool) -> Result<(), RegistryError> {
        self.mutate(|registry| registry.uninstall(module, force))?
    }

    /// Flag every capability of `module` as zombie; returns how many were flagged
    pub fn mark_zombie(&self, module: ModuleId) -> Result<usize, RegistryError> {
        self.mutate(|registry| {
            if registry.module(module).is_none() {
                return Err(RegistryError::ModuleNotFound(module));
            }
            Ok(registry.mark_zombie(module))
        })?
    }

    pub fn purge_zombies(&self) -> Result<Vec<ModuleId>, RegistryError> {
        self.mutate(Registry::purge_zombies)
    }

    pub fn set_state(&self, module: ModuleId, state: ModuleState) -> Result<(), RegistryError> {
        self.mutate(|registry| registry.set_state(module, state))?
    }

    /// Modules affected by invalidating `seed` (zombie owners if empty)
    pub fn affected_closure(&self, seed: &BTreeSet<ModuleId>) -> BTreeSet<ModuleId> {
        closure::affected_closure(&self.registry(), seed)
    }
}

impl Default for Resolver {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tokens_are_unique() {
        let a = CallToken::new();
        let b = CallToken::new();
        assert_ne!(a, b);
        assert_ne!(CallToken::current(), CallToken::current());
    }

    #[test]
    fn test_guard_releases_ticket() {
        let resolver = Resolver::new();
        let caller = CallToken::new();
        {
            let mut shared = resolver.lock();
            let guard = SessionGuard::open(&resolver, &mut shared, caller);
            drop(shared);
            assert!(caller.is_driving_here());
            assert_eq!(CallToken::current(), caller);
            assert!(resolver.lock().ticket.is_some());
            drop(guard);
        }
        assert!(resolver.lock().ticket.is_none());
        assert!(!caller.is_driving_here());
    }

    #[test]
    fn test_mutation_inside_own_session_is_refused() {
        let resolver = Resolver::new();
        let mut shared = resolver.lock();
        let guard = SessionGuard::open(&resolver, &mut shared, CallToken::new());
        drop(shared);

        assert_eq!(
            resolver.install(&ModuleDescriptor::new("a", "1.0")),
            Err(RegistryError::SessionActive)
        );
        drop(guard);
        assert!(resolver.install(&ModuleDescriptor::new("a", "1.0")).is_ok());
    }

    #[test]
    fn test_unknown_module() {
        let resolver = Resolver::new();
        assert_eq!(
            resolver.resolve(ModuleId(7)),
            Err(ResolveError::UnknownModule(ModuleId(7)))
        );
    }
}
