//! Configuration and status commands.

use super::{Context, Output, format_percent, json};
use crate::config::{Resolved, read_config, write_config};
use crate::{Error, Result};
use serde::Serialize;
use std::path::PathBuf;

#[derive(Serialize)]
pub struct ConfigEntry {
    pub key: &'static str,
    pub value: String,
    pub source: String,
}

impl ConfigEntry {
    fn new<T>(key: &'static str, resolved: &Resolved<T>, render: impl Fn(&T) -> String) -> Self {
        Self {
            key,
            value: render(&resolved.value),
            source: resolved.source.to_string(),
        }
    }
}

#[derive(Serialize)]
pub struct ConfigShowResult {
    pub path: PathBuf,
    pub entries: Vec<ConfigEntry>,
}

impl Output for ConfigShowResult {
    fn to_json(&self) -> String {
        json(self)
    }

    fn to_human(&self) -> String {
        let mut lines = vec![format!("Config file: {}", self.path.display())];
        lines.extend(
            self.entries
                .iter()
                .map(|e| format!("  {:<20} {:<10} ({})", e.key, e.value, e.source)),
        );
        lines.join("\n")
    }
}

/// Effective configuration with the source of each value.
pub fn config_show(ctx: &Context) -> Result<ConfigShowResult> {
    let c = &ctx.config;
    Ok(ConfigShowResult {
        path: ctx.layout.config_file(),
        entries: vec![
            ConfigEntry::new("max-cpu-percent", &c.max_cpu_percent, |v| v.to_string()),
            ConfigEntry::new("max-memory-percent", &c.max_memory_percent, |v| v.to_string()),
            ConfigEntry::new("check-interval-ms", &c.check_interval, |v| {
                v.as_millis().to_string()
            }),
            ConfigEntry::new("output-format", &c.output_format, |v| v.to_string()),
            ConfigEntry::new("log-level", &c.log_level, |v| v.clone()),
        ],
    })
}

#[derive(Serialize)]
pub struct ConfigSetResult {
    pub key: String,
    pub value: String,
}

impl Output for ConfigSetResult {
    fn to_json(&self) -> String {
        json(self)
    }

    fn to_human(&self) -> String {
        format!("Set {} = {}", self.key, self.value)
    }
}

/// Update one key in config.kdl. Preferences only, so no token is needed.
pub fn config_set(ctx: &Context, key: &str, value: &str) -> Result<ConfigSetResult> {
    let mut config = read_config(&ctx.layout)?;
    config.set(key, value).map_err(Error::InvalidInput)?;
    write_config(&ctx.layout, &config)?;
    Ok(ConfigSetResult {
        key: key.to_string(),
        value: value.to_string(),
    })
}

#[derive(Serialize)]
pub struct StatusResult {
    pub version: &'static str,
    pub build_timestamp: &'static str,
    pub git_commit: &'static str,
    pub data_dir: PathBuf,
    pub configured: bool,
    pub output_path: Option<PathBuf>,
    pub allowed_directories: usize,
    pub tracked_files: usize,
    pub history_samples: usize,
    pub max_cpu_percent: f64,
    pub max_memory_percent: f64,
}

impl Output for StatusResult {
    fn to_json(&self) -> String {
        json(self)
    }

    fn to_human(&self) -> String {
        let output = self
            .output_path
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "(not set)".to_string());
        [
            format!(
                "custodian {} ({} built {})",
                self.version, self.git_commit, self.build_timestamp
            ),
            format!("Data directory:      {}", self.data_dir.display()),
            format!(
                "Configured:          {}",
                if self.configured { "yes" } else { "no, run `cust setup`" }
            ),
            format!("Output directory:    {}", output),
            format!("Allowed directories: {}", self.allowed_directories),
            format!("Tracked files:       {}", self.tracked_files),
            format!("History samples:     {}", self.history_samples),
            format!(
                "Thresholds:          CPU {} | Memory {}",
                format_percent(self.max_cpu_percent),
                format_percent(self.max_memory_percent)
            ),
        ]
        .join("\n")
    }
}

/// Summary of what is configured and stored. Reveals no secrets.
pub fn status(ctx: &Context) -> Result<StatusResult> {
    let gate = ctx.open_gate();
    let store = ctx.open_store();
    let guardian = ctx.open_guardian();
    let settings = guardian.settings();
    Ok(StatusResult {
        version: env!("CARGO_PKG_VERSION"),
        build_timestamp: option_env!("CUST_BUILD_TIMESTAMP").unwrap_or("unknown"),
        git_commit: option_env!("CUST_GIT_COMMIT").unwrap_or("unknown"),
        data_dir: ctx.layout.root().to_path_buf(),
        configured: gate.is_configured(),
        output_path: gate.output_path().map(|p| p.to_path_buf()),
        allowed_directories: gate.permissions().allowed_directories.len(),
        tracked_files: store.len(),
        history_samples: guardian.history().len(),
        max_cpu_percent: settings.max_cpu_percent,
        max_memory_percent: settings.max_memory_percent,
    })
}
