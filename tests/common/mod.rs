//! Common test utilities for custodian integration tests.
//!
//! Provides `TestEnv` for isolated test environments that don't pollute
//! the user's `~/.local/share/custodian/` directory.

#![allow(dead_code)]

use assert_cmd::Command;
use std::fs;
use std::path::{Path, PathBuf};
pub use tempfile::TempDir;

/// Token used by [`TestEnv::setup`].
pub const TOKEN: &str = "integration-token-0123456789";

/// Thresholds no sample can exceed and a short sampling window, so resource
/// checks never block a test.
const RELAXED_CONFIG: &str = "max-cpu-percent 100.0\nmax-memory-percent 100.0\ncheck-interval-ms 10\n";

/// A test environment with isolated data storage.
///
/// Each `TestEnv` creates two temporary directories:
/// - `work_dir`: Acts as the user's workspace
/// - `data_dir`: Holds custodian's data and config.kdl (via `CUST_DATA_DIR`
///   and `CUST_CONFIG_DIR`)
///
/// The `cust()` method returns a `Command` that sets both per-invocation,
/// making tests parallel-safe.
pub struct TestEnv {
    pub work_dir: TempDir,
    pub data_dir: TempDir,
}

impl TestEnv {
    /// Create a new test environment with relaxed guardian thresholds.
    pub fn new() -> Self {
        let env = Self {
            work_dir: TempDir::new().unwrap(),
            data_dir: TempDir::new().unwrap(),
        };
        fs::write(env.data_path().join("config.kdl"), RELAXED_CONFIG).unwrap();
        env
    }

    /// Create a new test environment and run `cust setup` with [`TOKEN`],
    /// output directory `<work>/out`.
    pub fn setup() -> Self {
        let env = Self::new();
        env.cust()
            .args(["setup", "--output"])
            .arg(env.output_dir())
            .args(["--token", TOKEN])
            .assert()
            .success();
        env
    }

    /// Get a Command for the cust binary with isolated data directory.
    ///
    /// No token is passed; see [`TestEnv::authed`].
    pub fn cust(&self) -> Command {
        let mut cmd = Command::new(env!("CARGO_BIN_EXE_cust"));
        cmd.current_dir(self.work_dir.path());
        cmd.env("CUST_DATA_DIR", self.data_dir.path());
        cmd.env("CUST_CONFIG_DIR", self.data_dir.path());
        cmd.env_remove("CUST_TOKEN");
        cmd.env_remove("CUST_LOG");
        cmd.env_remove("CUST_AUDIT");
        cmd
    }

    /// Like [`TestEnv::cust`], with [`TOKEN`] in `CUST_TOKEN`.
    pub fn authed(&self) -> Command {
        let mut cmd = self.cust();
        cmd.env("CUST_TOKEN", TOKEN);
        cmd
    }

    /// Get the path to the workspace.
    pub fn path(&self) -> &Path {
        self.work_dir.path()
    }

    /// Get the path to the data directory.
    pub fn data_path(&self) -> &Path {
        self.data_dir.path()
    }

    /// The output directory used by [`TestEnv::setup`].
    pub fn output_dir(&self) -> PathBuf {
        self.path().join("out")
    }

    pub fn state_file(&self) -> PathBuf {
        self.data_path().join("memory").join("code_map.json")
    }

    pub fn history_file(&self) -> PathBuf {
        self.data_path().join("monitor").join("resource_history.json")
    }

    /// Write a file under the workspace and return its path.
    pub fn write_file(&self, name: &str, content: &str) -> PathBuf {
        let path = self.path().join(name);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(&path, content).unwrap();
        path
    }
}

impl Default for TestEnv {
    fn default() -> Self {
        Self::new()
    }
}

/// Parse a command's stdout as JSON.
pub fn stdout_json(output: &std::process::Output) -> serde_json::Value {
    serde_json::from_slice(&output.stdout).unwrap_or_else(|e| {
        panic!(
            "stdout is not JSON ({}): {}",
            e,
            String::from_utf8_lossy(&output.stdout)
        )
    })
}
