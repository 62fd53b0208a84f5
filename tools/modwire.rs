//! modwire command line
//!
//! Loads a TOML file of `[[module]]` tables into a fresh registry and either
//! resolves it, printing the wires and failures, or prints the set of modules
//! affected by invalidating some of them.
//!
//! Usage:
//!   modwire [--config FILE] [-v] resolve <modules.toml> [--module NAME]
//!   modwire [--config FILE] [-v] closure <modules.toml> [--module NAME]...

use anyhow::Context;
use clap::{Parser, Subcommand};
use std::collections::BTreeSet;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::info;

use modwire::config::{LoggingConfig, RuntimeConfig};
use modwire::module::{ModuleId, ModuleManager, Registry};
use modwire::utils::init_logging_from_config;

#[derive(Parser, Debug)]
#[command(name = "modwire", version, about = "Resolve module wiring")]
struct Args {
    /// Runtime config (.toml or .json)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Debug logging (overridden by RUST_LOG)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Resolve every module (or only the named ones) and print the wiring
    Resolve {
        modules: PathBuf,
        #[arg(long = "module")]
        names: Vec<String>,
    },
    /// Print modules affected by invalidating the named modules (zombies if none)
    Closure {
        modules: PathBuf,
        #[arg(long = "module")]
        names: Vec<String>,
    },
}

fn main() -> ExitCode {
    let args = Args::parse();
    match run(args) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::from(1),
        Err(e) => {
            eprintln!("error: {:#}", e);
            ExitCode::from(2)
        }
    }
}

/// Returns false if some module failed to resolve
fn run(args: Args) -> anyhow::Result<bool> {
    let mut config = match &args.config {
        Some(path) => RuntimeConfig::from_file(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => RuntimeConfig::default(),
    };
    if args.verbose {
        config.logging.get_or_insert_with(LoggingConfig::default).filter = Some("debug".into());
    }
    init_logging_from_config(config.logging.as_ref());

    let manager = ModuleManager::from_config(&config)?;

    match args.command {
        Command::Resolve { modules, names } => {
            manager.load_module_set(&modules)?;
            let selected = select(&manager.resolver().registry(), &names)?;

            let mut ok = true;
            if selected.is_empty() {
                let report = manager.resolve_all();
                for (id, error) in &report.failed {
                    println!("FAILED {}: {}", label(&manager.resolver().registry(), *id), error);
                }
                ok = report.is_complete();
            } else {
                for id in selected {
                    if let Err(error) = manager.resolver().resolve(id) {
                        println!("FAILED {}: {}", label(&manager.resolver().registry(), id), error);
                        ok = false;
                    }
                }
            }

            print_wiring(&manager.resolver().registry());
            Ok(ok)
        }
        Command::Closure { modules, names } => {
            manager.load_module_set(&modules)?;
            manager.resolve_all();
            let registry = manager.resolver().registry();
            let seed = select(&registry, &names)?;

            let closure = manager.affected_closure(&seed);
            info!("Closure has {} module(s)", closure.len());
            for id in closure {
                println!("{}", label(&registry, id));
            }
            Ok(true)
        }
    }
}

/// Every installed module with one of the given symbolic names
fn select(registry: &Registry, names: &[String]) -> anyhow::Result<BTreeSet<ModuleId>> {
    let mut selected = BTreeSet::new();
    for name in names {
        let before = selected.len();
        selected.extend(registry.modules_named(name).map(|m| m.id));
        if selected.len() == before {
            anyhow::bail!("No installed module named {}", name);
        }
    }
    Ok(selected)
}

fn label(registry: &Registry, id: ModuleId) -> String {
    registry
        .module(id)
        .map(|m| m.to_string())
        .unwrap_or_else(|| id.to_string())
}

fn print_wiring(registry: &Registry) {
    for module in registry.modules() {
        println!("{} [{:?}]", module, module.state());
        for wire in registry.wires_of(module.id) {
            let (Some(requirement), Some(capability)) = (
                registry.requirement(wire.requirement),
                registry.capability(wire.capability),
            ) else {
                continue;
            };
            println!(
                "  {} -> {} from {}",
                requirement,
                capability,
                label(registry, wire.provider)
            );
        }
    }
}
