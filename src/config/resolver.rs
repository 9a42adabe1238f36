//! Precedence resolution for configuration.
//!
//! ## Precedence (highest to lowest)
//!
//! 1. CLI flags (passed at runtime)
//! 2. config.kdl (`$CUST_CONFIG_DIR/config.kdl`)
//! 3. Built-in defaults

use crate::config::{CustodianConfig, Layout, OutputFormat};
use crate::guardian::{
    DEFAULT_CHECK_INTERVAL, DEFAULT_MAX_CPU_PERCENT, DEFAULT_MAX_MEMORY_PERCENT,
    GuardianSettings,
};
use crate::persist;
use crate::{Error, Result};
use kdl::KdlDocument;
use std::fs;
use std::io;
use std::time::Duration;

/// Default tracing filter when neither `CUST_LOG` nor config sets one.
pub const DEFAULT_LOG_LEVEL: &str = "info";

/// Tracks where a resolved value came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValueSource {
    /// Value from CLI flag
    CliFlag,
    /// Value from config.kdl
    ConfigFile,
    /// Built-in default value
    Default,
}

impl std::fmt::Display for ValueSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ValueSource::CliFlag => write!(f, "cli"),
            ValueSource::ConfigFile => write!(f, "config"),
            ValueSource::Default => write!(f, "default"),
        }
    }
}

/// A resolved value with its source.
#[derive(Debug, Clone)]
pub struct Resolved<T> {
    pub value: T,
    pub source: ValueSource,
}

impl<T> Resolved<T> {
    pub fn new(value: T, source: ValueSource) -> Self {
        Self { value, source }
    }
}

/// Fully resolved configuration with source tracking.
#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    pub max_cpu_percent: Resolved<f64>,
    pub max_memory_percent: Resolved<f64>,
    pub check_interval: Resolved<Duration>,
    pub output_format: Resolved<OutputFormat>,
    pub log_level: Resolved<String>,
}

impl Default for ResolvedConfig {
    fn default() -> Self {
        Self {
            max_cpu_percent: Resolved::new(DEFAULT_MAX_CPU_PERCENT, ValueSource::Default),
            max_memory_percent: Resolved::new(DEFAULT_MAX_MEMORY_PERCENT, ValueSource::Default),
            check_interval: Resolved::new(DEFAULT_CHECK_INTERVAL, ValueSource::Default),
            output_format: Resolved::new(OutputFormat::Json, ValueSource::Default),
            log_level: Resolved::new(DEFAULT_LOG_LEVEL.to_string(), ValueSource::Default),
        }
    }
}

impl ResolvedConfig {
    /// Guardian thresholds derived from the resolved values.
    pub fn guardian_settings(&self) -> GuardianSettings {
        GuardianSettings {
            max_cpu_percent: self.max_cpu_percent.value,
            max_memory_percent: self.max_memory_percent.value,
            check_interval: self.check_interval.value,
        }
    }

    pub fn output_format(&self) -> OutputFormat {
        self.output_format.value
    }
}

/// CLI overrides for configuration values.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub max_cpu_percent: Option<f64>,
    pub max_memory_percent: Option<f64>,
    pub output_format: Option<OutputFormat>,
}

impl ConfigOverrides {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_cpu_percent(mut self, pct: f64) -> Self {
        self.max_cpu_percent = Some(pct);
        self
    }

    pub fn with_max_memory_percent(mut self, pct: f64) -> Self {
        self.max_memory_percent = Some(pct);
        self
    }

    pub fn with_output_format(mut self, format: OutputFormat) -> Self {
        self.output_format = Some(format);
        self
    }
}

/// Read config.kdl. A missing file yields an empty config.
pub fn read_config(layout: &Layout) -> Result<CustodianConfig> {
    let path = layout.config_file();
    let text = match fs::read_to_string(&path) {
        Ok(text) => text,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(CustodianConfig::default()),
        Err(e) => return Err(e.into()),
    };
    let doc: KdlDocument = text
        .parse()
        .map_err(|e| Error::ConfigIo(format!("{}: {}", path.display(), e)))?;
    let config = CustodianConfig::from_kdl(&doc);
    config
        .validate()
        .map_err(|e| Error::ConfigIo(format!("{}: {}", path.display(), e)))?;
    Ok(config)
}

/// Write config.kdl atomically with standard (0644) permissions.
pub fn write_config(layout: &Layout, config: &CustodianConfig) -> Result<()> {
    config.validate().map_err(Error::InvalidInput)?;
    let path = layout.config_file();
    persist::write_bytes_atomic(&path, config.to_kdl().to_string().as_bytes())?;
    #[cfg(unix)]
    persist::set_mode(&path, crate::config::CONFIG_FILE_MODE)?;
    Ok(())
}

/// Resolve configuration with precedence: CLI > config.kdl > defaults.
pub fn resolve_config(layout: &Layout, overrides: &ConfigOverrides) -> Result<ResolvedConfig> {
    // Flags obey the same bounds as the file.
    CustodianConfig {
        max_cpu_percent: overrides.max_cpu_percent,
        max_memory_percent: overrides.max_memory_percent,
        ..CustodianConfig::default()
    }
    .validate()
    .map_err(Error::InvalidInput)?;

    let file = read_config(layout)?;
    let mut resolved = ResolvedConfig::default();

    if let Some(pct) = overrides.max_cpu_percent {
        resolved.max_cpu_percent = Resolved::new(pct, ValueSource::CliFlag);
    } else if let Some(pct) = file.max_cpu_percent {
        resolved.max_cpu_percent = Resolved::new(pct, ValueSource::ConfigFile);
    }

    if let Some(pct) = overrides.max_memory_percent {
        resolved.max_memory_percent = Resolved::new(pct, ValueSource::CliFlag);
    } else if let Some(pct) = file.max_memory_percent {
        resolved.max_memory_percent = Resolved::new(pct, ValueSource::ConfigFile);
    }

    if let Some(ms) = file.check_interval_ms {
        resolved.check_interval =
            Resolved::new(Duration::from_millis(ms), ValueSource::ConfigFile);
    }

    if let Some(format) = overrides.output_format {
        resolved.output_format = Resolved::new(format, ValueSource::CliFlag);
    } else if let Some(format) = file.output_format {
        resolved.output_format = Resolved::new(format, ValueSource::ConfigFile);
    }

    if let Some(level) = file.log_level {
        resolved.log_level = Resolved::new(level, ValueSource::ConfigFile);
    }

    Ok(resolved)
}
