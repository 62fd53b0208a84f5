//! modwire - module wiring resolver
//!
//! Resolves the requirements of independently deployable modules against the
//! capabilities other modules provide: version ranges, attribute filters,
//! optionality, uses-consistency, singletons and policy hooks, with atomic
//! all-or-nothing commit to a shared registry.
//!
//! ## Layout
//!
//! - `module::model`: capabilities, requirements, versions, wires
//! - `module::registry`: installed modules and committed wiring
//! - `module::resolver`: resolution sessions and the locking front end
//! - `module::manager`: lifecycle facade used by the CLI
//! - `config`, `utils`: runtime configuration and logging
//!
//! ```rust
//! use modwire::module::{ModuleDescriptor, Resolver};
//!
//! let resolver = Resolver::new();
//! resolver.install(&ModuleDescriptor::new("a", "1.0").export("x", "1.5")).unwrap();
//! let b = resolver.install(&ModuleDescriptor::new("b", "1.0").import("x", "[1.0,2.0)")).unwrap();
//!
//! let wires = resolver.resolve(b).unwrap();
//! assert_eq!(wires.len(), 1);
//! ```

pub mod config;
pub mod module;
pub mod utils;

pub use config::RuntimeConfig;
