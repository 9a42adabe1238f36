//! KDL schema for config.kdl.
//!
//! This module provides:
//! - The `CustodianConfig` struct mirroring the KDL document
//! - Serialization/deserialization to/from KDL format
//! - Validation and single-key updates from the command line
//! - File mode constants for everything Custodian writes

use kdl::{KdlDocument, KdlEntry, KdlNode, KdlValue};
use serde::{Deserialize, Serialize};

/// Output format preference for CLI commands.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// JSON output (default, machine-readable)
    #[default]
    Json,
    /// Human-readable output
    Human,
}

impl OutputFormat {
    /// Parse from string, case-insensitive.
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "json" => Some(OutputFormat::Json),
            "human" => Some(OutputFormat::Human),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            OutputFormat::Json => "json",
            OutputFormat::Human => "human",
        }
    }
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Preferences stored in config.kdl.
///
/// # KDL Schema
///
/// ```kdl
/// max-cpu-percent 90.0
/// max-memory-percent 85.0
/// check-interval-ms 1000
/// output-format "human"  // or "json"
/// log-level "info"
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CustodianConfig {
    /// CPU utilization above which the guardian reports a breach
    pub max_cpu_percent: Option<f64>,

    /// Memory utilization above which the guardian reports a breach
    pub max_memory_percent: Option<f64>,

    /// CPU sampling window in milliseconds (the guardian caps this at 1000)
    pub check_interval_ms: Option<u64>,

    /// Default output format for CLI commands
    pub output_format: Option<OutputFormat>,

    /// Default tracing filter directive
    pub log_level: Option<String>,
}

/// Keys accepted by `cust config set`.
pub const CONFIG_KEYS: &[&str] = &[
    "max-cpu-percent",
    "max-memory-percent",
    "check-interval-ms",
    "output-format",
    "log-level",
];

impl CustodianConfig {
    /// Create an empty config with no values set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate the config values.
    ///
    /// Returns an error message if any value is invalid.
    pub fn validate(&self) -> Result<(), String> {
        for (key, value) in [
            ("max-cpu-percent", self.max_cpu_percent),
            ("max-memory-percent", self.max_memory_percent),
        ] {
            if let Some(pct) = value {
                if !pct.is_finite() || pct <= 0.0 || pct > 100.0 {
                    return Err(format!("{} must be in (0, 100], got {}", key, pct));
                }
            }
        }
        if self.check_interval_ms == Some(0) {
            return Err("check-interval-ms must be greater than 0".to_string());
        }
        if let Some(ref level) = self.log_level {
            if level.trim().is_empty() {
                return Err("log-level must not be empty".to_string());
            }
        }
        Ok(())
    }

    /// Parse config from a KDL document.
    ///
    /// Unknown nodes and values of the wrong type are ignored.
    pub fn from_kdl(doc: &KdlDocument) -> Self {
        let mut config = Self::new();

        config.max_cpu_percent = first_value(doc, "max-cpu-percent").and_then(as_number);
        config.max_memory_percent = first_value(doc, "max-memory-percent").and_then(as_number);

        if let Some(i) = first_value(doc, "check-interval-ms").and_then(|v| v.as_integer()) {
            if i > 0 {
                config.check_interval_ms = u64::try_from(i).ok();
            }
        }

        if let Some(s) = first_value(doc, "output-format").and_then(|v| v.as_string()) {
            config.output_format = OutputFormat::parse(s);
        }

        if let Some(s) = first_value(doc, "log-level").and_then(|v| v.as_string()) {
            config.log_level = Some(s.to_string());
        }

        config
    }

    /// Convert config to a KDL document.
    pub fn to_kdl(&self) -> KdlDocument {
        let mut doc = KdlDocument::new();

        if let Some(pct) = self.max_cpu_percent {
            push_node(&mut doc, "max-cpu-percent", KdlValue::Float(pct));
        }
        if let Some(pct) = self.max_memory_percent {
            push_node(&mut doc, "max-memory-percent", KdlValue::Float(pct));
        }
        if let Some(ms) = self.check_interval_ms {
            push_node(&mut doc, "check-interval-ms", KdlValue::Integer(ms as i128));
        }
        if let Some(format) = self.output_format {
            push_node(
                &mut doc,
                "output-format",
                KdlValue::String(format.as_str().to_string()),
            );
        }
        if let Some(ref level) = self.log_level {
            push_node(&mut doc, "log-level", KdlValue::String(level.clone()));
        }

        doc
    }

    /// Set a single key from its string form, as typed on the command line.
    pub fn set(&mut self, key: &str, value: &str) -> Result<(), String> {
        match key {
            "max-cpu-percent" => self.max_cpu_percent = Some(parse_percent(key, value)?),
            "max-memory-percent" => self.max_memory_percent = Some(parse_percent(key, value)?),
            "check-interval-ms" => {
                let ms = value
                    .parse::<u64>()
                    .map_err(|_| format!("{} must be an integer, got {}", key, value))?;
                self.check_interval_ms = Some(ms);
            }
            "output-format" => {
                self.output_format = Some(
                    OutputFormat::parse(value)
                        .ok_or_else(|| format!("output-format must be json or human, got {}", value))?,
                );
            }
            "log-level" => self.log_level = Some(value.to_string()),
            _ => {
                return Err(format!(
                    "Unknown config key '{}'. Valid keys: {}",
                    key,
                    CONFIG_KEYS.join(", ")
                ));
            }
        }
        self.validate()
    }
}

fn first_value<'a>(doc: &'a KdlDocument, name: &str) -> Option<&'a KdlValue> {
    doc.get(name)
        .and_then(|node| node.entries().first())
        .map(|entry| entry.value())
}

fn as_number(value: &KdlValue) -> Option<f64> {
    value
        .as_float()
        .or_else(|| value.as_integer().map(|i| i as f64))
}

fn push_node(doc: &mut KdlDocument, name: &str, value: KdlValue) {
    let mut node = KdlNode::new(name);
    node.push(KdlEntry::new(value));
    doc.nodes_mut().push(node);
}

fn parse_percent(key: &str, value: &str) -> Result<f64, String> {
    value
        .parse::<f64>()
        .map_err(|_| format!("{} must be a number, got {}", key, value))
}

/// Required permissions for access.json (Unix: 0600, owner read/write only).
#[cfg(unix)]
pub const ACCESS_FILE_MODE: u32 = 0o600;

/// Required permissions for the configured output directory (Unix: 0700).
#[cfg(unix)]
pub const OUTPUT_DIR_MODE: u32 = 0o700;

/// Permissions for config.kdl (Unix: 0644, readable by all).
#[cfg(unix)]
pub const CONFIG_FILE_MODE: u32 = 0o644;
