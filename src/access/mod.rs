//! Hashed-token access gate.
//!
//! The gate owns `access.json`: the configured output directory, the SHA-256
//! digest of the access token, permission flags and the allowed-directory
//! list. The raw token is hashed on the way in and never stored or logged.
//!
//! Every public operation catches its own failures: mutations return `false`
//! and emit a `tracing` error, checks return `false`. Nothing propagates to the
//! caller. The gate does no internal locking; callers serialize mutations.

use crate::persist::{self, resolve_path};
use crate::{Error, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fs;
use std::path::{Path, PathBuf};
use subtle::ConstantTimeEq;

/// Permission flags and directory allow-list.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Permissions {
    #[serde(default)]
    pub can_read_files: bool,
    #[serde(default)]
    pub can_write_files: bool,
    #[serde(default)]
    pub can_execute_commands: bool,
    /// Absolute directories under which file operations are permitted
    #[serde(default)]
    pub allowed_directories: Vec<PathBuf>,
}

/// Persisted access-control configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessConfig {
    /// Absolute output directory (exists and is 0700 once configured)
    pub output_path: Option<PathBuf>,

    /// Hex SHA-256 digest of the access token
    pub access_token: Option<String>,

    pub last_modified: DateTime<Utc>,

    #[serde(default)]
    pub permissions: Permissions,
}

impl Default for AccessConfig {
    fn default() -> Self {
        Self {
            output_path: None,
            access_token: None,
            last_modified: Utc::now(),
            permissions: Permissions::default(),
        }
    }
}

/// Hash a raw token to its stored form (lowercase hex SHA-256).
pub fn hash_token(raw: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(raw.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Generate a fresh random access token (64 hex characters).
pub fn generate_token() -> String {
    format!(
        "{}{}",
        uuid::Uuid::new_v4().simple(),
        uuid::Uuid::new_v4().simple()
    )
}

/// Access gate backed by a single JSON file.
#[derive(Debug)]
pub struct AccessGate {
    path: PathBuf,
    config: AccessConfig,
}

impl AccessGate {
    /// Open the gate, loading `path` if present.
    ///
    /// A missing or unreadable file yields the default (unconfigured) state;
    /// unreadable files are logged.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let config = match persist::read_json::<AccessConfig>(&path) {
            Ok(Some(config)) => config,
            Ok(None) => AccessConfig::default(),
            Err(e) => {
                tracing::error!("Error loading access config {}: {}", path.display(), e);
                AccessConfig::default()
            }
        };
        Self { path, config }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn config(&self) -> &AccessConfig {
        &self.config
    }

    pub fn permissions(&self) -> &Permissions {
        &self.config.permissions
    }

    pub fn output_path(&self) -> Option<&Path> {
        self.config.output_path.as_deref()
    }

    pub fn has_token(&self) -> bool {
        self.config.access_token.is_some()
    }

    /// True once both an output path and a token are set.
    pub fn is_configured(&self) -> bool {
        self.has_token() && self.config.output_path.is_some()
    }

    /// Persist the current configuration (0600 file, 0700 directory).
    pub fn save(&mut self) -> bool {
        match self.try_save() {
            Ok(()) => true,
            Err(e) => {
                tracing::error!("Error saving access config: {}", e);
                false
            }
        }
    }

    fn try_save(&mut self) -> Result<()> {
        let previous = self.config.last_modified;
        self.config.last_modified = Utc::now();
        if let Err(e) = self.write() {
            self.config.last_modified = previous;
            return Err(e);
        }
        Ok(())
    }

    fn write(&self) -> Result<()> {
        persist::write_json_atomic(&self.path, &self.config)?;
        #[cfg(unix)]
        {
            persist::set_mode(&self.path, crate::config::ACCESS_FILE_MODE)?;
            if let Some(parent) = self.path.parent() {
                persist::set_mode(parent, crate::config::OUTPUT_DIR_MODE)?;
            }
        }
        Ok(())
    }

    /// Apply `mutate` and persist; on failure the in-memory state is rolled back.
    fn commit(&mut self, mutate: impl FnOnce(&mut AccessConfig)) -> Result<()> {
        let previous = self.config.clone();
        mutate(&mut self.config);
        if let Err(e) = self.try_save() {
            self.config = previous;
            return Err(e);
        }
        Ok(())
    }

    /// Set the output directory and the access token in one persisted step.
    pub fn configure(&mut self, output_path: &Path, raw_token: &str) -> bool {
        let result = prepare_output_dir(output_path).and_then(|dir| {
            let digest = hash_token(raw_token);
            self.commit(|config| {
                config.output_path = Some(dir);
                config.access_token = Some(digest);
            })
        });
        match result {
            Ok(()) => {
                tracing::info!("Access gate configured");
                true
            }
            Err(e) => {
                tracing::error!("Error configuring access gate: {}", e);
                false
            }
        }
    }

    /// Set the secure output directory, creating it owner-only if absent.
    pub fn set_output_path(&mut self, path: &Path) -> bool {
        let result = prepare_output_dir(path)
            .and_then(|dir| self.commit(|config| config.output_path = Some(dir)));
        match result {
            Ok(()) => true,
            Err(e) => {
                tracing::error!("Error setting output path: {}", e);
                false
            }
        }
    }

    /// Replace the stored token digest.
    pub fn set_access_token(&mut self, raw_token: &str) -> bool {
        let digest = hash_token(raw_token);
        match self.commit(|config| config.access_token = Some(digest)) {
            Ok(()) => true,
            Err(e) => {
                tracing::error!("Error setting access token: {}", e);
                false
            }
        }
    }

    /// Replace the permission set. Allowed directories are stored resolved.
    pub fn set_permissions(&mut self, permissions: Permissions) -> bool {
        let result = resolve_all(&permissions.allowed_directories).and_then(|dirs| {
            self.commit(|config| {
                config.permissions = Permissions {
                    allowed_directories: dirs,
                    ..permissions
                };
            })
        });
        match result {
            Ok(()) => true,
            Err(e) => {
                tracing::error!("Error setting permissions: {}", e);
                false
            }
        }
    }

    /// Add one directory to the allow-list (no-op if already present).
    pub fn allow_directory(&mut self, dir: &Path) -> bool {
        let result = resolve_path(dir).and_then(|dir| {
            if self.config.permissions.allowed_directories.contains(&dir) {
                return Ok(());
            }
            self.commit(|config| config.permissions.allowed_directories.push(dir))
        });
        match result {
            Ok(()) => true,
            Err(e) => {
                tracing::error!("Error adding allowed directory: {}", e);
                false
            }
        }
    }

    /// Check `raw_token` against the stored digest in constant time.
    ///
    /// Always false when no token is configured.
    pub fn verify(&self, raw_token: &str) -> bool {
        let Some(stored) = self.config.access_token.as_deref() else {
            return false;
        };
        let candidate = hash_token(raw_token);
        bool::from(candidate.as_bytes().ct_eq(stored.as_bytes()))
    }

    /// Gate a request on `token`.
    ///
    /// `NotConfigured` when no token has been set up yet, `AccessDenied` when
    /// the token is missing or does not match.
    pub fn authorize(&self, token: Option<&str>) -> Result<()> {
        if !self.has_token() {
            return Err(Error::NotConfigured);
        }
        match token {
            Some(t) if self.verify(t) => Ok(()),
            _ => {
                tracing::warn!("Rejected request with invalid or missing access token");
                Err(Error::AccessDenied)
            }
        }
    }

    /// True iff `path` resolves to an allowed directory or somewhere beneath one.
    pub fn is_path_allowed(&self, path: &Path) -> bool {
        let resolved = match resolve_path(path) {
            Ok(p) => p,
            Err(e) => {
                tracing::warn!("Could not resolve {}: {}", path.display(), e);
                return false;
            }
        };
        self.config
            .permissions
            .allowed_directories
            .iter()
            .any(|dir| resolved.starts_with(dir))
    }
}

fn resolve_all(dirs: &[PathBuf]) -> Result<Vec<PathBuf>> {
    let mut out: Vec<PathBuf> = Vec::with_capacity(dirs.len());
    for dir in dirs {
        let resolved = resolve_path(dir)?;
        if !out.contains(&resolved) {
            out.push(resolved);
        }
    }
    Ok(out)
}

/// Resolve, create and lock down an output directory.
fn prepare_output_dir(path: &Path) -> Result<PathBuf> {
    let dir = resolve_path(path)?;
    fs::create_dir_all(&dir)?;
    if !dir.is_dir() {
        return Err(Error::ConfigIo(format!(
            "Output path is not a directory: {}",
            dir.display()
        )));
    }

    #[cfg(unix)]
    {
        use std::os::unix::fs::MetadataExt;

        let owner = fs::metadata(&dir)?.uid();
        let me = nix::unistd::geteuid().as_raw();
        if owner != me {
            return Err(Error::ConfigIo(format!(
                "Output path {} is owned by uid {}, not {}",
                dir.display(),
                owner,
                me
            )));
        }
        persist::set_mode(&dir, crate::config::OUTPUT_DIR_MODE)?;
    }

    Ok(dir)
}
