use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Invalid or unreadable configuration
///
/// Reported with exit code 2, before any change is touched.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("invalid config {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("could not expand path '{path}' of '{name}': {message}")]
    Expand {
        name: String,
        path: String,
        message: String,
    },

    #[error("{0}")]
    Invalid(String),
}

/// Get the config directory path
pub fn config_dir() -> Result<PathBuf> {
    let home = dirs::home_dir().context("Could not determine home directory")?;
    Ok(home.join(".config").join("devbox"))
}

/// Default location of config.toml
pub fn default_config_path() -> Result<PathBuf> {
    Ok(config_dir()?.join("config.toml"))
}

// ============================================================================
// Devbox Config
// ============================================================================

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DevboxConfig {
    pub defaults: Defaults,
    pub files: Vec<FileEntry>,
    pub packages: Vec<PackageEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Defaults {
    pub file_lock_timeout_secs: u64,
    pub package_lock_timeout_secs: u64,
}

impl Default for Defaults {
    fn default() -> Self {
        Self {
            file_lock_timeout_secs: 30,
            package_lock_timeout_secs: 300,
        }
    }
}

impl Defaults {
    pub fn file_lock_timeout(&self) -> Duration {
        Duration::from_secs(self.file_lock_timeout_secs)
    }

    pub fn package_lock_timeout(&self) -> Duration {
        Duration::from_secs(self.package_lock_timeout_secs)
    }
}

/// A file whose contents devbox manages
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FileEntry {
    pub name: String,
    pub path: String,
    pub contents: String,
}

impl FileEntry {
    /// Path with `~` and environment variables expanded
    pub fn expanded_path(&self) -> std::result::Result<PathBuf, ConfigError> {
        shellexpand::full(&self.path)
            .map(|p| PathBuf::from(p.as_ref()))
            .map_err(|e| ConfigError::Expand {
                name: self.name.clone(),
                path: self.path.clone(),
                message: e.to_string(),
            })
    }
}

/// A Homebrew package devbox installs
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PackageEntry {
    /// Change name; derived from the package when omitted
    #[serde(default)]
    pub name: Option<String>,
    pub package: String,
}

impl PackageEntry {
    pub fn unit_name(&self) -> String {
        self.name
            .clone()
            .unwrap_or_else(|| self.package.replace(['-', '.', '/', '@'], "_"))
    }
}

impl DevboxConfig {
    /// Load config from an explicit path, or from the default location
    ///
    /// A missing file at the default location yields the defaults; a missing
    /// explicit file is an error.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        match explicit {
            Some(path) => Ok(Self::load_from(path, true)?),
            None => Ok(Self::load_from(&default_config_path()?, false)?),
        }
    }

    pub fn load_from(path: &Path, required: bool) -> std::result::Result<Self, ConfigError> {
        let content = match fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound && !required => {
                log::debug!("no config at {}, using defaults", path.display());
                return Ok(Self::default());
            }
            Err(source) => {
                return Err(ConfigError::Read {
                    path: path.to_path_buf(),
                    source,
                });
            }
        };

        let config: Self = toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> std::result::Result<(), ConfigError> {
        if let Some(file) = self.files.iter().find(|f| f.name.trim().is_empty()) {
            return Err(ConfigError::Invalid(format!(
                "file entry for '{}' has an empty name",
                file.path
            )));
        }
        if let Some(pkg) = self.packages.iter().find(|p| p.package.trim().is_empty()) {
            return Err(ConfigError::Invalid(format!(
                "package entry '{}' has an empty package",
                pkg.unit_name()
            )));
        }
        Ok(())
    }
}
