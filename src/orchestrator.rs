//! Guarded entry point for file operations.
//!
//! Every operation runs the same gauntlet before touching anything:
//! token check against the [`AccessGate`], permission flag and path policy,
//! then (for expensive operations) a [`ResourceGuardian`] admission check.
//! The actual work is delegated to an [`Assistant`]; files it produces or
//! modifies are recorded in the [`StateStore`].

use crate::access::AccessGate;
use crate::guardian::{ResourceGuardian, Snapshot};
use crate::state::{FileRecord, StateStore};
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// One explained line of source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Explanation {
    pub line: usize,
    pub code: String,
    pub explanation: String,
}

/// Backend that performs code operations.
pub trait Assistant {
    /// Produce a file from `prompt` inside `output_dir`. `None` if nothing was written.
    fn generate(&self, prompt: &str, output_dir: &Path) -> Result<Option<PathBuf>>;

    /// Repair `path` in place. True if the file changed.
    fn fix(&self, path: &Path) -> Result<bool>;

    fn explain(&self, path: &Path) -> Result<Vec<Explanation>>;

    /// Rewrite import paths in `path`. True if the file changed.
    fn fix_imports(&self, path: &Path) -> Result<bool>;
}

/// Placeholder used when no backend is installed.
#[derive(Debug, Clone, Copy, Default)]
pub struct Unconfigured;

impl Unconfigured {
    fn unsupported<T>(operation: &str) -> Result<T> {
        Err(Error::Unsupported(format!(
            "no assistant backend configured for {}",
            operation
        )))
    }
}

impl Assistant for Unconfigured {
    fn generate(&self, _prompt: &str, _output_dir: &Path) -> Result<Option<PathBuf>> {
        Self::unsupported("generate")
    }

    fn fix(&self, _path: &Path) -> Result<bool> {
        Self::unsupported("fix")
    }

    fn explain(&self, _path: &Path) -> Result<Vec<Explanation>> {
        Self::unsupported("explain")
    }

    fn fix_imports(&self, _path: &Path) -> Result<bool> {
        Self::unsupported("imports")
    }
}

/// Which permission flag an operation needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Capability {
    Read,
    Write,
}

pub struct Orchestrator {
    gate: AccessGate,
    guardian: ResourceGuardian,
    store: StateStore,
    assistant: Box<dyn Assistant>,
}

impl Orchestrator {
    pub fn new(gate: AccessGate, guardian: ResourceGuardian, store: StateStore) -> Self {
        Self {
            gate,
            guardian,
            store,
            assistant: Box::new(Unconfigured),
        }
    }

    pub fn with_assistant(mut self, assistant: Box<dyn Assistant>) -> Self {
        self.assistant = assistant;
        self
    }

    pub fn gate(&self) -> &AccessGate {
        &self.gate
    }

    pub fn guardian(&self) -> &ResourceGuardian {
        &self.guardian
    }

    pub fn store(&self) -> &StateStore {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut StateStore {
        &mut self.store
    }

    /// Fail unless `token` matches the stored digest. See [`AccessGate::authorize`].
    pub fn authorize(&self, token: Option<&str>) -> Result<()> {
        self.gate.authorize(token)
    }

    /// Run a guardian check; a breach becomes `ResourceThresholdExceeded`.
    pub fn admit(&self) -> Result<Snapshot> {
        Ok(self.guardian.check()?)
    }

    /// Resolve `path` and confirm it exists and sits inside an allowed directory.
    pub fn check_path(&self, path: &Path) -> Result<PathBuf> {
        if !path.exists() {
            return Err(Error::InvalidInput(format!(
                "File not found: {}",
                path.display()
            )));
        }
        self.check_location(path)
    }

    fn check_location(&self, path: &Path) -> Result<PathBuf> {
        if !self.gate.is_path_allowed(path) {
            return Err(Error::PathNotAllowed(path.display().to_string()));
        }
        crate::persist::resolve_path(path)
    }

    fn require(&self, capability: Capability) -> Result<()> {
        let permissions = self.gate.permissions();
        let granted = match capability {
            Capability::Read => permissions.can_read_files,
            Capability::Write => permissions.can_write_files,
        };
        if granted {
            Ok(())
        } else {
            let name = match capability {
                Capability::Read => "file reads are disabled",
                Capability::Write => "file writes are disabled",
            };
            Err(Error::PermissionDenied(name.to_string()))
        }
    }

    fn record(&mut self, path: &Path) -> Result<FileRecord> {
        let content = fs::read_to_string(path)?;
        self.store.try_add_file(path, &content)
    }

    /// Record `path` in the state map.
    pub fn track_file(&mut self, token: Option<&str>, path: &Path) -> Result<FileRecord> {
        self.authorize(token)?;
        self.require(Capability::Read)?;
        let path = self.check_path(path)?;
        self.admit()?;
        let record = self.record(&path)?;
        tracing::info!("Tracking {}", path.display());
        Ok(record)
    }

    /// Generate a file from `prompt`, defaulting to the configured output directory.
    pub fn generate(
        &mut self,
        token: Option<&str>,
        prompt: &str,
        output_dir: Option<&Path>,
    ) -> Result<Option<PathBuf>> {
        self.authorize(token)?;
        self.require(Capability::Write)?;
        let output_dir = match output_dir {
            Some(dir) => dir.to_path_buf(),
            None => self
                .gate
                .output_path()
                .map(Path::to_path_buf)
                .ok_or(Error::NotConfigured)?,
        };
        let output_dir = self.check_location(&output_dir)?;
        self.admit()?;

        let Some(produced) = self.assistant.generate(prompt, &output_dir)? else {
            return Ok(None);
        };
        // Produced paths are held to the same allow-list as inputs.
        let path = self.check_location(&produced)?;
        self.record(&path)?;
        tracing::info!("Generated {}", path.display());
        Ok(Some(path))
    }

    pub fn fix(&mut self, token: Option<&str>, path: &Path) -> Result<bool> {
        self.authorize(token)?;
        self.require(Capability::Write)?;
        let path = self.check_path(path)?;
        self.admit()?;

        let changed = self.assistant.fix(&path)?;
        if changed {
            self.record(&path)?;
        }
        Ok(changed)
    }

    pub fn explain(&mut self, token: Option<&str>, path: &Path) -> Result<Vec<Explanation>> {
        self.authorize(token)?;
        self.require(Capability::Read)?;
        let path = self.check_path(path)?;
        self.assistant.explain(&path)
    }

    pub fn fix_imports(&mut self, token: Option<&str>, path: &Path) -> Result<bool> {
        self.authorize(token)?;
        self.require(Capability::Write)?;
        let path = self.check_path(path)?;

        let changed = self.assistant.fix_imports(&path)?;
        if changed {
            self.record(&path)?;
        }
        Ok(changed)
    }

    /// Persist anything buffered (guardian history).
    pub fn shutdown(&self) {
        self.guardian.flush();
    }
}
