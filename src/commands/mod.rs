//! Command implementations for the Custodian CLI.
//!
//! Each command returns a result struct implementing [`Output`], which the
//! binary renders as JSON (default) or human-readable text. Commands are
//! grouped by concern:
//! - `access` - setup, token, output directory, allow-list and permissions
//! - `resources` - guardian checks, usage aggregates and history
//! - `state` - tracking files in the state map
//! - `assist` - guarded generate/fix/explain/imports
//! - `system` - config and status

mod access;
mod assist;
mod resources;
mod state;
mod system;

pub use access::*;
pub use assist::*;
pub use resources::*;
pub use state::*;
pub use system::*;

use crate::access::AccessGate;
use crate::config::{Layout, ResolvedConfig};
use crate::guardian::ResourceGuardian;
use crate::orchestrator::Orchestrator;
use crate::state::StateStore;
use crate::Result;

/// Command results that can be serialized to JSON or formatted for humans.
pub trait Output {
    /// Serialize to JSON string.
    fn to_json(&self) -> String;

    /// Format for human-readable output.
    fn to_human(&self) -> String;
}

/// Everything a command needs to open the persisted components.
#[derive(Debug, Clone)]
pub struct Context {
    pub layout: Layout,
    pub config: ResolvedConfig,
    /// Raw token from `--token` / `CUST_TOKEN`
    pub token: Option<String>,
}

impl Context {
    pub fn new(layout: Layout, config: ResolvedConfig, token: Option<String>) -> Self {
        Self {
            layout,
            config,
            token,
        }
    }

    pub fn open_gate(&self) -> AccessGate {
        AccessGate::open(self.layout.access_file())
    }

    pub fn open_store(&self) -> StateStore {
        StateStore::open(self.layout.state_file())
    }

    pub fn open_guardian(&self) -> ResourceGuardian {
        ResourceGuardian::new(self.config.guardian_settings(), self.layout.history_file())
    }

    pub fn orchestrator(&self) -> Orchestrator {
        Orchestrator::new(self.open_gate(), self.open_guardian(), self.open_store())
    }

    pub fn token(&self) -> Option<&str> {
        self.token.as_deref()
    }

    /// Require a configured gate and a token that matches it.
    pub(crate) fn authorize(&self, gate: &AccessGate) -> Result<()> {
        gate.authorize(self.token())
    }
}

/// Serialize a result struct, falling back to an error object.
pub(crate) fn json<T: serde::Serialize>(value: &T) -> String {
    serde_json::to_string(value)
        .unwrap_or_else(|e| serde_json::json!({ "error": e.to_string() }).to_string())
}

fn format_percent(value: f64) -> String {
    format!("{:.1}%", value)
}
