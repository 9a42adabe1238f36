//! Audit logging for Custodian commands.
//!
//! Every command invocation is appended to `audit.log` in the data directory
//! as one JSON object per line. Secrets are redacted before anything is
//! written. Set `CUST_AUDIT=0` to disable.

use crate::config::Layout;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::Path;

/// Environment variable that toggles audit logging.
pub const AUDIT_ENV: &str = "CUST_AUDIT";

const REDACTED: &str = "[REDACTED]";

/// Represents a single audit log entry.
#[derive(Debug, Serialize, Deserialize)]
pub struct AuditEntry {
    /// ISO 8601 timestamp when the command ran
    pub timestamp: DateTime<Utc>,

    /// Command name (e.g., "track", "token verify", "check")
    pub command: String,

    /// Command arguments as JSON, sanitized
    pub args: serde_json::Value,

    pub success: bool,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    pub duration_ms: u64,

    /// User who executed the command
    pub user: String,
}

/// True unless `CUST_AUDIT` is set to a false-ish value.
pub fn is_enabled() -> bool {
    match std::env::var(AUDIT_ENV) {
        Ok(v) => !matches!(v.to_lowercase().as_str(), "0" | "false" | "no" | "off"),
        Err(_) => true,
    }
}

/// Append one entry to the audit log.
///
/// Never fails: logging problems are reported through `tracing` so a broken
/// log file can't break the command being audited.
pub fn log_command(
    layout: &Layout,
    command: &str,
    args: serde_json::Value,
    success: bool,
    error: Option<String>,
    duration_ms: u64,
) {
    if !is_enabled() {
        return;
    }

    let entry = AuditEntry {
        timestamp: Utc::now(),
        command: command.to_string(),
        args: sanitize_args(&args),
        success,
        error,
        duration_ms,
        user: current_user(),
    };

    if let Err(e) = write_entry(&layout.audit_log(), &entry) {
        tracing::warn!("Failed to write audit log: {}", e);
    }
}

fn write_entry(path: &Path, entry: &AuditEntry) -> crate::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }

    let json = serde_json::to_string(entry)?;
    let mut file = OpenOptions::new().create(true).append(true).open(path)?;
    writeln!(file, "{}", json)?;

    #[cfg(unix)]
    crate::persist::set_mode(path, crate::config::ACCESS_FILE_MODE)?;

    Ok(())
}

fn is_sensitive(key: &str) -> bool {
    let key = key.to_lowercase();
    key.contains("token")
        || key.contains("password")
        || key.contains("secret")
        || key == "key"
        || key.ends_with("_key")
}

/// Redact secrets and shrink oversized values.
pub fn sanitize_args(args: &serde_json::Value) -> serde_json::Value {
    match args {
        serde_json::Value::Object(map) => {
            let mut sanitized = serde_json::Map::new();
            for (key, value) in map {
                if is_sensitive(key) && !value.is_null() {
                    sanitized.insert(key.clone(), serde_json::Value::String(REDACTED.to_string()));
                } else {
                    sanitized.insert(key.clone(), sanitize_args(value));
                }
            }
            serde_json::Value::Object(sanitized)
        }
        serde_json::Value::Array(arr) => {
            if arr.len() > 10 {
                serde_json::Value::String(format!("[Array with {} items]", arr.len()))
            } else {
                serde_json::Value::Array(arr.iter().map(sanitize_args).collect())
            }
        }
        serde_json::Value::String(s) if s.chars().count() > 200 => {
            let head: String = s.chars().take(197).collect();
            serde_json::Value::String(format!("{}... ({} chars)", head, s.chars().count()))
        }
        _ => args.clone(),
    }
}

fn current_user() -> String {
    std::env::var("USER")
        .or_else(|_| std::env::var("USERNAME"))
        .unwrap_or_else(|_| "unknown".to_string())
}
