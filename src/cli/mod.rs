//! CLI argument definitions for Custodian.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Custodian - access gate, crash-safe state map and resource guardian.
///
/// Start with `cust setup --output <dir>` to configure the access gate.
#[derive(Parser, Debug)]
#[command(name = "cust")]
#[command(author, version, about = "Guard file operations behind a token, a path policy and resource limits", long_about = None)]
pub struct Cli {
    /// Output in human-readable format instead of JSON
    #[arg(short = 'H', long = "human", global = true)]
    pub human_readable: bool,

    /// Data directory holding access, state and history files.
    /// Can also be set via CUST_DATA_DIR environment variable.
    #[arg(long = "data-dir", global = true, env = "CUST_DATA_DIR")]
    pub data_dir: Option<PathBuf>,

    /// Access token for privileged commands.
    /// Prefer the CUST_TOKEN environment variable over the flag.
    #[arg(long, global = true, env = "CUST_TOKEN", hide_env_values = true)]
    pub token: Option<String>,

    /// Override the CPU threshold (percent) for this invocation
    #[arg(long = "max-cpu", global = true)]
    pub max_cpu_percent: Option<f64>,

    /// Override the memory threshold (percent) for this invocation
    #[arg(long = "max-memory", global = true)]
    pub max_memory_percent: Option<f64>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Top-level commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Configure the output directory, access token and default permissions
    ///
    /// Uses --token as the access token when given, otherwise generates one
    /// and prints it once. Re-running setup requires the current token.
    Setup {
        /// Secure output directory (created with mode 0700)
        #[arg(short, long)]
        output: PathBuf,
    },

    /// Access token commands
    Token {
        #[command(subcommand)]
        command: TokenCommands,
    },

    /// Output directory commands
    Output {
        #[command(subcommand)]
        command: OutputCommands,
    },

    /// Add a directory to the allow-list
    Allow {
        /// Directory under which file operations are permitted
        dir: PathBuf,
    },

    /// Show permissions, or update flags when any is given
    Permissions {
        /// Allow reading tracked files
        #[arg(long)]
        read: Option<bool>,

        /// Allow writing files
        #[arg(long)]
        write: Option<bool>,

        /// Allow executing commands
        #[arg(long)]
        execute: Option<bool>,
    },

    /// Sample CPU and memory once (exit code 2 when a threshold is exceeded)
    Check,

    /// Show average and peak usage over recorded samples
    Usage {
        /// Only consider the most recent N samples
        #[arg(long)]
        last: Option<usize>,
    },

    /// Show recorded resource samples
    History,

    /// Record a file in the state map
    Track {
        /// File to track (must be inside an allowed directory)
        file: PathBuf,
    },

    /// Remove a file from the state map
    Forget {
        /// File to forget
        file: PathBuf,
    },

    /// State map commands
    State {
        #[command(subcommand)]
        command: StateCommands,
    },

    /// Generate code from a prompt
    Generate {
        /// Prompt text or path to a file containing it
        prompt: String,

        /// Output directory (defaults to the configured one)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Fix common errors in a file
    Fix {
        /// File to fix
        file: PathBuf,
    },

    /// Explain a file line by line
    Explain {
        /// File to explain
        file: PathBuf,
    },

    /// Fix import paths in a file
    Imports {
        /// File to fix imports in
        file: PathBuf,
    },

    /// Configuration management
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },

    /// Show configuration summary and build info
    Status,
}

/// Token subcommands
#[derive(Subcommand, Debug)]
pub enum TokenCommands {
    /// Replace the access token (requires the current one via --token)
    Set {
        /// New access token
        new_token: String,
    },

    /// Check the token given via --token / CUST_TOKEN
    Verify,
}

/// Output directory subcommands
#[derive(Subcommand, Debug)]
pub enum OutputCommands {
    /// Change the secure output directory
    Set {
        /// New output directory (created with mode 0700)
        dir: PathBuf,
    },
}

/// State map subcommands
#[derive(Subcommand, Debug)]
pub enum StateCommands {
    /// List all tracked files
    Show,

    /// Show the record for one file
    Get {
        /// Tracked file
        file: PathBuf,
    },
}

/// Configuration subcommands
#[derive(Subcommand, Debug)]
pub enum ConfigCommands {
    /// Show effective configuration and where each value comes from
    Show,

    /// Set a configuration value in config.kdl
    Set {
        /// Configuration key
        key: String,
        /// Configuration value
        value: String,
    },
}
