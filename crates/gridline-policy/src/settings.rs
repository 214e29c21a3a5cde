//! Layered run settings
//!
//! Settings are loaded with three layers of precedence (highest wins):
//! 1. Environment variables: `GRIDLINE_MAX_ITERATIONS`,
//!    `GRIDLINE_REWRITE_TIMEOUT_SECS`, `GRIDLINE_REWRITER`
//! 2. The `[scan]` / `[fix]` tables of the project policy document
//! 3. Global: `~/.gridline/config.toml`
//!
//! CLI flags are applied on top by the binary.

use gridline_core::{ConfigError, GridlineError, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Policy file names probed under the scan root, in order
pub const POLICY_FILE_NAMES: [&str; 2] = ["gridline.toml", ".gridline/policy.toml"];

const DEFAULT_MAX_ITERATIONS: u32 = 5;
const DEFAULT_TIMEOUT_SECS: u64 = 120;

/// Which files under the root are scanned
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanSettings {
    pub include: Vec<String>,
    pub exclude: Vec<String>,
}

impl Default for ScanSettings {
    fn default() -> Self {
        Self {
            include: ["**/*.tsx", "**/*.jsx", "**/*.vue", "**/*.svelte", "**/*.html", "**/*.css"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            exclude: ["**/node_modules/**", "**/dist/**", "**/build/**", "**/.git/**"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
        }
    }
}

/// Fix loop bounds and the rewriter command
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FixSettings {
    pub max_iterations: u32,
    pub timeout_secs: u64,
    /// Program and arguments of the external rewriter; empty when unset
    pub rewriter: Vec<String>,
}

impl Default for FixSettings {
    fn default() -> Self {
        Self {
            max_iterations: DEFAULT_MAX_ITERATIONS,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            rewriter: Vec::new(),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct ScanSection {
    include: Option<Vec<String>>,
    exclude: Option<Vec<String>>,
}

#[derive(Debug, Default, Deserialize)]
struct FixSection {
    max_iterations: Option<i64>,
    timeout_secs: Option<i64>,
    rewriter: Option<Vec<String>>,
}

#[derive(Debug, Default, Deserialize)]
struct SettingsFile {
    #[serde(default)]
    scan: ScanSection,
    #[serde(default)]
    fix: FixSection,
}

/// Resolved settings for one invocation
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSettings {
    pub scan: ScanSettings,
    pub fix: FixSettings,
}

impl RunSettings {
    /// Load settings with layered precedence: global < policy document < env vars
    pub fn load(policy_doc: Option<&str>) -> Result<Self> {
        let mut settings = RunSettings::default();

        if let Some(global_path) = Self::global_config_path() {
            if global_path.exists() {
                let content = std::fs::read_to_string(&global_path)?;
                let global = parse_settings(&content).map_err(|e| {
                    GridlineError::Config(ConfigError::Parse(format!(
                        "{}: {}",
                        global_path.display(),
                        e
                    )))
                })?;
                settings.merge(global)?;
                tracing::debug!(path = %global_path.display(), "applied global settings");
            }
        }

        if let Some(doc) = policy_doc {
            settings.merge(parse_settings(doc)?)?;
        }

        settings.apply_env_overrides(|key| std::env::var(key).ok())?;
        Ok(settings)
    }

    /// Settings from a policy document only, without global or env layers
    pub fn from_policy_str(doc: &str) -> std::result::Result<Self, ConfigError> {
        let mut settings = RunSettings::default();
        settings.merge(parse_settings(doc)?)?;
        Ok(settings)
    }

    fn global_config_path() -> Option<PathBuf> {
        dirs::home_dir().map(|h| h.join(".gridline").join("config.toml"))
    }

    fn merge(&mut self, overlay: SettingsFile) -> std::result::Result<(), ConfigError> {
        if let Some(include) = overlay.scan.include {
            self.scan.include = include;
        }
        if let Some(exclude) = overlay.scan.exclude {
            self.scan.exclude = exclude;
        }
        if let Some(n) = overlay.fix.max_iterations {
            self.fix.max_iterations = to_iterations(n)?;
        }
        if let Some(secs) = overlay.fix.timeout_secs {
            self.fix.timeout_secs = to_timeout(secs)?;
        }
        if let Some(rewriter) = overlay.fix.rewriter {
            self.fix.rewriter = rewriter;
        }
        Ok(())
    }

    /// Apply `GRIDLINE_*` overrides through the given lookup
    pub fn apply_env_overrides<F>(&mut self, lookup: F) -> std::result::Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(raw) = lookup("GRIDLINE_MAX_ITERATIONS") {
            let n = raw.trim().parse::<i64>().map_err(|_| {
                ConfigError::invalid_budget("GRIDLINE_MAX_ITERATIONS", format!("'{}' is not a number", raw))
            })?;
            self.fix.max_iterations = to_iterations(n)?;
        }
        if let Some(raw) = lookup("GRIDLINE_REWRITE_TIMEOUT_SECS") {
            let secs = raw.trim().parse::<i64>().map_err(|_| {
                ConfigError::invalid_budget(
                    "GRIDLINE_REWRITE_TIMEOUT_SECS",
                    format!("'{}' is not a number", raw),
                )
            })?;
            self.fix.timeout_secs = to_timeout(secs)?;
        }
        if let Some(raw) = lookup("GRIDLINE_REWRITER") {
            let command: Vec<String> = raw.split_whitespace().map(|s| s.to_string()).collect();
            if !command.is_empty() {
                self.fix.rewriter = command;
            }
        }
        Ok(())
    }
}

fn parse_settings(doc: &str) -> std::result::Result<SettingsFile, ConfigError> {
    Ok(toml::from_str(doc)?)
}

fn to_iterations(n: i64) -> std::result::Result<u32, ConfigError> {
    u32::try_from(n).map_err(|_| {
        ConfigError::invalid_budget("fix.max_iterations", format!("must be between 0 and {}, got {}", u32::MAX, n))
    })
}

fn to_timeout(secs: i64) -> std::result::Result<u64, ConfigError> {
    if secs <= 0 {
        return Err(ConfigError::invalid_budget(
            "fix.timeout_secs",
            format!("must be a positive number of seconds, got {}", secs),
        ));
    }
    Ok(secs as u64)
}

/// Find the policy document: an explicit path wins, otherwise the first of
/// [`POLICY_FILE_NAMES`] that exists under `root`.
pub fn discover_policy(root: &Path, explicit: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit {
        return Some(path.to_path_buf());
    }
    POLICY_FILE_NAMES
        .iter()
        .map(|name| root.join(name))
        .find(|p| p.is_file())
}
