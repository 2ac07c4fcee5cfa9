//! Configuration management for anchorpatch
//!
//! anchorpatch stores configuration in ~/.anchorpatch/config.toml

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// anchorpatch configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Backup settings
    #[serde(default)]
    pub backup: BackupConfig,

    /// Patch behaviour
    #[serde(default)]
    pub patch: PatchConfig,

    /// Logging settings
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackupConfig {
    /// Maximum backup size in GB before warning
    #[serde(default = "default_max_size_gb")]
    pub max_size_gb: Option<f64>,

    /// Maximum percentage of free space to use
    #[serde(default = "default_max_disk_usage_percent")]
    pub max_disk_usage_percent: Option<f64>,

    /// Custom backup directory
    #[serde(default)]
    pub backup_dir: Option<String>,
}

impl Default for BackupConfig {
    fn default() -> Self {
        Self {
            max_size_gb: default_max_size_gb(),
            max_disk_usage_percent: default_max_disk_usage_percent(),
            backup_dir: None,
        }
    }
}

/// What to do when the anchors are not found
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OnMissing {
    /// Print the diagnostic and exit non-zero
    #[default]
    Fail,
    /// Print the diagnostic and exit zero
    Skip,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PatchConfig {
    #[serde(default)]
    pub on_missing: OnMissing,

    /// Characters of the file shown after the marker on a miss
    #[serde(default = "default_snippet_chars")]
    pub snippet_chars: Option<usize>,

    /// Context lines around the diff
    #[serde(default = "default_context_lines")]
    pub context_lines: Option<usize>,
}

impl Default for PatchConfig {
    fn default() -> Self {
        Self {
            on_missing: OnMissing::Fail,
            snippet_chars: default_snippet_chars(),
            context_lines: default_context_lines(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Append debug logs to ~/.anchorpatch/anchorpatch.log
    #[serde(default)]
    pub debug: bool,
}

// Default functions for serde
fn default_max_size_gb() -> Option<f64> { Some(2.0) }
fn default_max_disk_usage_percent() -> Option<f64> { Some(60.0) }
fn default_snippet_chars() -> Option<usize> { Some(crate::anchor::DEFAULT_SNIPPET_CHARS) }
fn default_context_lines() -> Option<usize> { Some(3) }

impl Config {
    pub fn snippet_chars(&self) -> usize {
        self.patch
            .snippet_chars
            .unwrap_or(crate::anchor::DEFAULT_SNIPPET_CHARS)
    }

    pub fn context_lines(&self) -> usize {
        self.patch.context_lines.unwrap_or(3)
    }

    pub fn max_disk_usage_percent(&self) -> f64 {
        self.backup.max_disk_usage_percent.unwrap_or(60.0)
    }

    pub fn max_size_bytes(&self) -> u64 {
        let gb = self.backup.max_size_gb.unwrap_or(2.0);
        (gb * 1024.0 * 1024.0 * 1024.0) as u64
    }
}

/// The ~/.anchorpatch directory, created on demand
pub fn app_dir() -> Result<PathBuf> {
    let home_dir =
        dirs::home_dir().ok_or_else(|| anyhow::anyhow!("Cannot determine home directory"))?;

    let dir = home_dir.join(".anchorpatch");
    fs::create_dir_all(&dir)
        .with_context(|| format!("Failed to create config directory: {}", dir.display()))?;
    Ok(dir)
}

/// Get the configuration file path
pub fn config_file_path() -> Result<PathBuf> {
    Ok(app_dir()?.join("config.toml"))
}

const DEFAULT_CONFIG: &str = r#"# anchorpatch configuration
#
# Values set here can be overridden by command-line flags.

[backup]
# Warn when a single backup exceeds this size in GB (default: 2)
max_size_gb = 2

# Refuse backups that would use more than this % of free space (default: 60)
max_disk_usage_percent = 60

# Custom backup directory (default: ~/.anchorpatch/backups/)
#backup_dir = "/mnt/backups/anchorpatch"

[patch]
# When the anchors are not found: "fail" (exit 1) or "skip" (exit 0).
# The file is never written on a miss either way.
on_missing = "fail"

# Characters of the file printed after the marker on a miss (default: 500)
snippet_chars = 500

# Context lines around the diff (default: 3, max: 20)
context_lines = 3

[logging]
# Append debug logs to ~/.anchorpatch/anchorpatch.log
debug = false
"#;

/// Write the commented default configuration to `path`
pub fn save_default_config_to(path: &Path) -> Result<()> {
    fs::write(path, DEFAULT_CONFIG)
        .with_context(|| format!("Failed to write default config file: {}", path.display()))
}

/// Load configuration from the default location, creating it if needed
pub fn load_config() -> Result<Config> {
    load_config_from(&config_file_path()?)
}

/// Load configuration from `path`
///
/// A missing file is created with defaults. A malformed file is replaced
/// with defaults after a warning.
pub fn load_config_from(path: &Path) -> Result<Config> {
    if !path.exists() {
        save_default_config_to(path)?;
    }

    let config_str = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = match toml::from_str(&config_str) {
        Ok(config) => config,
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "malformed config, restoring defaults");
            save_default_config_to(path)?;
            return Ok(Config::default());
        }
    };

    validate_config(&config)?;
    Ok(config)
}

/// Validate configuration values
pub fn validate_config(config: &Config) -> Result<()> {
    if let Some(max_gb) = config.backup.max_size_gb {
        if max_gb < 0.0 {
            anyhow::bail!("Invalid max_size_gb: {} (must be positive)", max_gb);
        }
    }

    if let Some(max_percent) = config.backup.max_disk_usage_percent {
        if !(0.0..=100.0).contains(&max_percent) {
            anyhow::bail!("Invalid max_disk_usage_percent: {} (must be 0-100)", max_percent);
        }
    }

    if let Some(chars) = config.patch.snippet_chars {
        if chars == 0 {
            anyhow::bail!("Invalid snippet_chars: 0 (must be at least 1)");
        }
    }

    if let Some(context) = config.patch.context_lines {
        if context > 20 {
            anyhow::bail!("Invalid context_lines: {} (max 20)", context);
        }
    }

    Ok(())
}
