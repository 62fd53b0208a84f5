//! Permission oracles consulted by the resolver
//!
//! Provides the default allow-all oracle and a grant-based permission checker
//! configured from the runtime config.

pub mod permissions;

pub use permissions::{Action, AllowAll, Permission, PermissionChecker, PermissionSet};
