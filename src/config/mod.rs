//! Configuration and on-disk layout for Custodian.
//!
//! ## config.kdl - User preferences (no secrets)
//!
//! Located at `$CUST_CONFIG_DIR/config.kdl` or `~/.config/custodian/config.kdl`.
//!
//! Contains:
//! - `max-cpu-percent` - Guardian CPU threshold (default 90)
//! - `max-memory-percent` - Guardian memory threshold (default 85)
//! - `check-interval-ms` - CPU sampling window, capped at 1000
//! - `output-format` - "json" or "human"
//! - `log-level` - default tracing filter when `CUST_LOG` is unset
//!
//! ## Data directory
//!
//! Located at `$CUST_DATA_DIR` or `~/.local/share/custodian/`. Holds the
//! access file, the state map and its backup, the resource history, the
//! audit log and the log file. See [`Layout`].
//!
//! ## Security
//!
//! `access.json` MUST be 0600 (owner read/write only); it holds the token digest.
//!
//! ## Precedence
//!
//! CLI flag > config.kdl > built-in defaults. Use the [`resolver`] module.

pub mod resolver;
pub mod schema;

pub use resolver::{
    ConfigOverrides, Resolved, ResolvedConfig, ValueSource, read_config, resolve_config,
    write_config,
};
pub use schema::{CustodianConfig, OutputFormat};
#[cfg(unix)]
pub use schema::{ACCESS_FILE_MODE, CONFIG_FILE_MODE, OUTPUT_DIR_MODE};

use crate::{Error, Result};
use std::path::{Path, PathBuf};

/// Environment variable overriding the data directory.
pub const DATA_DIR_ENV: &str = "CUST_DATA_DIR";

/// Environment variable overriding the config directory.
pub const CONFIG_DIR_ENV: &str = "CUST_CONFIG_DIR";

/// Resolve the data directory: `$CUST_DATA_DIR` or `<data_dir>/custodian`.
pub fn data_dir() -> Result<PathBuf> {
    if let Ok(dir) = std::env::var(DATA_DIR_ENV) {
        if !dir.is_empty() {
            return Ok(PathBuf::from(dir));
        }
    }
    let base = dirs::data_dir()
        .ok_or_else(|| Error::Other("Could not determine data directory".to_string()))?;
    Ok(base.join("custodian"))
}

/// Resolve the config directory: `$CUST_CONFIG_DIR` or `<config_dir>/custodian`.
pub fn config_dir() -> Result<PathBuf> {
    if let Ok(dir) = std::env::var(CONFIG_DIR_ENV) {
        if !dir.is_empty() {
            return Ok(PathBuf::from(dir));
        }
    }
    let base = dirs::config_dir()
        .ok_or_else(|| Error::Other("Could not determine config directory".to_string()))?;
    Ok(base.join("custodian"))
}

/// Paths of every file Custodian persists, derived from one data directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Layout {
    root: PathBuf,
    config_dir: PathBuf,
}

impl Layout {
    /// Layout rooted at `data_dir`, with config.kdl stored alongside.
    pub fn new(data_dir: &Path) -> Self {
        Self {
            root: data_dir.to_path_buf(),
            config_dir: data_dir.to_path_buf(),
        }
    }

    /// Layout from the environment (`CUST_DATA_DIR`, `CUST_CONFIG_DIR`, XDG defaults).
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            root: data_dir()?,
            config_dir: config_dir()?,
        })
    }

    /// Replace the data directory, keeping the config directory.
    pub fn with_data_dir(mut self, data_dir: &Path) -> Self {
        self.root = data_dir.to_path_buf();
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn access_file(&self) -> PathBuf {
        self.root.join("access.json")
    }

    pub fn state_file(&self) -> PathBuf {
        self.root.join("memory").join("code_map.json")
    }

    pub fn history_file(&self) -> PathBuf {
        self.root.join("monitor").join("resource_history.json")
    }

    pub fn audit_log(&self) -> PathBuf {
        self.root.join("audit.log")
    }

    pub fn log_dir(&self) -> PathBuf {
        self.root.join("logs")
    }

    pub fn config_file(&self) -> PathBuf {
        self.config_dir.join("config.kdl")
    }
}
