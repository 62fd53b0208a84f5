//! Configuration management for modwire
//!
//! Handles configuration loading (JSON or TOML, chosen by file extension)
//! and validation for the resolver, logging and permission grants.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

/// Resolver tuning
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolverConfig {
    /// Maximum nesting of speculative resolutions of candidate providers
    #[serde(default = "default_max_speculation_depth")]
    pub max_speculation_depth: usize,

    /// How long a caller waits for another caller's session (none = forever)
    #[serde(default)]
    pub session_wait_timeout_ms: Option<u64>,

    /// Accept zombie capabilities as a last-resort provider
    #[serde(default = "default_true")]
    pub allow_zombie_providers: bool,

    /// Treat a capability without `uses` as using every package its module imports
    #[serde(default = "default_true")]
    pub conservative_uses: bool,
}

fn default_max_speculation_depth() -> usize {
    64
}

fn default_true() -> bool {
    true
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            max_speculation_depth: default_max_speculation_depth(),
            session_wait_timeout_ms: None,
            allow_zombie_providers: true,
            conservative_uses: true,
        }
    }
}

impl ResolverConfig {
    pub fn session_wait_timeout(&self) -> Option<Duration> {
        self.session_wait_timeout_ms.map(Duration::from_millis)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.max_speculation_depth == 0 {
            return Err(anyhow::anyhow!(
                "max_speculation_depth must be greater than 0"
            ));
        }
        if self.session_wait_timeout_ms == Some(0) {
            return Err(anyhow::anyhow!(
                "session_wait_timeout_ms must be greater than 0 when set (omit it to wait forever)"
            ));
        }
        Ok(())
    }
}

/// Logging configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log filter (e.g. "info", "modwire::module::resolver=debug").
    /// RUST_LOG takes precedence when set.
    #[serde(default)]
    pub filter: Option<String>,

    /// Emit JSON lines (requires the `json-logging` feature)
    #[serde(default)]
    pub json_format: bool,
}

/// Permission grants, see [`crate::module::security::PermissionChecker`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PermissionsConfig {
    /// Grants for modules without an entry in `module_grants`
    #[serde(default = "default_grants")]
    pub default_grants: Vec<String>,

    /// Symbolic name -> grants; replaces the defaults for that module
    #[serde(default)]
    pub module_grants: HashMap<String, Vec<String>>,
}

fn default_grants() -> Vec<String> {
    ["export:*", "import:*", "require:*", "provide:*"]
        .into_iter()
        .map(String::from)
        .collect()
}

impl Default for PermissionsConfig {
    fn default() -> Self {
        Self {
            default_grants: default_grants(),
            module_grants: HashMap::new(),
        }
    }
}

/// Runtime configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuntimeConfig {
    #[serde(default)]
    pub resolver: ResolverConfig,

    #[serde(default)]
    pub logging: Option<LoggingConfig>,

    /// Permission grants (none = every module may do everything)
    #[serde(default)]
    pub permissions: Option<PermissionsConfig>,
}

impl RuntimeConfig {
    /// Load configuration from a `.json` or `.toml` file
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("Failed to read config {}: {}", path.display(), e))?;

        let config: RuntimeConfig = match path.extension().and_then(|e| e.to_str()) {
            Some("json") => serde_json::from_str(&content)?,
            Some("toml") => toml::from_str(&content)?,
            other => {
                return Err(anyhow::anyhow!(
                    "Unsupported config format {:?} for {} (expected .json or .toml)",
                    other,
                    path.display()
                ))
            }
        };
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to JSON file
    pub fn to_json_file(&self, path: &Path) -> anyhow::Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Validate configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        self.resolver.validate()?;

        if let Some(ref permissions) = self.permissions {
            crate::module::security::PermissionChecker::from_config(permissions)?;
        }

        Ok(())
    }
}
