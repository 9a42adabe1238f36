//! Custodian - secure state and resource guardian for local tooling.
//!
//! This library provides the core functionality for the `cust` CLI tool:
//! a hashed-token access gate, a crash-tolerant state store with backup
//! recovery, and a resource guardian that applies CPU/memory backpressure
//! before costly operations.

pub mod access;
pub mod audit_log;
pub mod cli;
pub mod commands;
pub mod config;
pub mod guardian;
pub mod logging;
pub mod orchestrator;
pub mod persist;
pub mod state;


/// Library-level error type for Custodian operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Access denied: invalid or missing access token")]
    AccessDenied,

    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("Path not allowed: {0}")]
    PathNotAllowed(String),

    #[error("{0}")]
    ResourceThresholdExceeded(#[from] guardian::ThresholdExceeded),

    #[error("Config IO error: {0}")]
    ConfigIo(String),

    #[error("State corruption: {0}")]
    StateCorruption(String),

    #[error("Not configured: run `cust setup` first")]
    NotConfigured,

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Unsupported: {0}")]
    Unsupported(String),

    #[error("{0}")]
    Other(String),
}

/// Result type alias for Custodian operations.
pub type Result<T> = std::result::Result<T, Error>;
