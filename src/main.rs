//! Custodian CLI - access gate, state map and resource guardian.

use clap::{CommandFactory, Parser};
use custodian::cli::{
    Cli, Commands, ConfigCommands, OutputCommands, StateCommands, TokenCommands,
};
use custodian::commands::{self, Context, Output};
use custodian::config::{ConfigOverrides, Layout, OutputFormat, resolve_config};
use custodian::{Error, audit_log, logging};
use std::path::PathBuf;
use std::process;
use std::time::Instant;

/// Exit code for a resource threshold breach, distinct from ordinary failure.
const EXIT_BACKPRESSURE: i32 = 2;

fn main() {
    let cli = Cli::parse();

    let layout = match resolve_layout(cli.data_dir.clone()) {
        Ok(layout) => layout,
        Err(e) => fail(&e, cli.human_readable),
    };

    let mut overrides = ConfigOverrides::new();
    if let Some(pct) = cli.max_cpu_percent {
        overrides = overrides.with_max_cpu_percent(pct);
    }
    if let Some(pct) = cli.max_memory_percent {
        overrides = overrides.with_max_memory_percent(pct);
    }
    if cli.human_readable {
        overrides = overrides.with_output_format(OutputFormat::Human);
    }

    let config = match resolve_config(&layout, &overrides) {
        Ok(config) => config,
        Err(e) => fail(&e, cli.human_readable),
    };
    let human = config.output_format() == OutputFormat::Human;

    // Flushes the log file on drop.
    let _log_guard = logging::init(&layout, &config.log_level.value);

    // Serialize command for the audit log
    let (cmd_name, args_json) = serialize_command(&cli.command);

    let start = Instant::now();
    let ctx = Context::new(layout.clone(), config, cli.token);
    let result = run_command(cli.command, &ctx, human);
    let duration = start.elapsed().as_millis() as u64;

    let (success, error) = match &result {
        Ok(_) => (true, None),
        Err(e) => (false, Some(e.to_string())),
    };
    audit_log::log_command(&layout, &cmd_name, args_json, success, error, duration);

    if let Err(e) = result {
        tracing::debug!("{} failed: {}", cmd_name, e);
        fail(&e, human);
    }
}

/// Data directory: --data-dir flag > CUST_DATA_DIR env > XDG default.
fn resolve_layout(data_dir: Option<PathBuf>) -> Result<Layout, Error> {
    let layout = Layout::from_env()?;
    Ok(match data_dir {
        Some(dir) => layout.with_data_dir(&dir),
        None => layout,
    })
}

fn fail(error: &Error, human: bool) -> ! {
    if human {
        eprintln!("Error: {}", error);
    } else {
        let mut body = serde_json::json!({ "error": error.to_string() });
        if let Error::ResourceThresholdExceeded(exceeded) = error {
            body["snapshot"] = serde_json::json!(exceeded.snapshot);
            body["breaches"] = serde_json::json!(exceeded.breaches);
        }
        eprintln!("{}", body);
    }
    let code = match error {
        Error::ResourceThresholdExceeded(_) => EXIT_BACKPRESSURE,
        _ => 1,
    };
    process::exit(code);
}

fn output<T: Output>(result: &T, human: bool) {
    if human {
        println!("{}", result.to_human());
    } else {
        println!("{}", result.to_json());
    }
}

fn run_command(command: Option<Commands>, ctx: &Context, human: bool) -> Result<(), Error> {
    match command {
        Some(Commands::Setup { output: dir }) => output(&commands::setup(ctx, &dir)?, human),

        Some(Commands::Token { command }) => match command {
            TokenCommands::Set { new_token } => {
                output(&commands::token_set(ctx, &new_token)?, human)
            }
            TokenCommands::Verify => output(&commands::token_verify(ctx)?, human),
        },

        Some(Commands::Output { command }) => match command {
            OutputCommands::Set { dir } => output(&commands::output_set(ctx, &dir)?, human),
        },

        Some(Commands::Allow { dir }) => output(&commands::allow(ctx, &dir)?, human),

        Some(Commands::Permissions {
            read,
            write,
            execute,
        }) => output(&commands::permissions(ctx, read, write, execute)?, human),

        Some(Commands::Check) => output(&commands::check(ctx)?, human),

        Some(Commands::Usage { last }) => output(&commands::usage(ctx, last)?, human),

        Some(Commands::History) => output(&commands::history(ctx)?, human),

        Some(Commands::Track { file }) => output(&commands::track(ctx, &file)?, human),

        Some(Commands::Forget { file }) => output(&commands::forget(ctx, &file)?, human),

        Some(Commands::State { command }) => match command {
            StateCommands::Show => output(&commands::state_show(ctx)?, human),
            StateCommands::Get { file } => output(&commands::state_get(ctx, &file)?, human),
        },

        Some(Commands::Generate {
            prompt,
            output: dir,
        }) => output(&commands::generate(ctx, &prompt, dir.as_deref())?, human),

        Some(Commands::Fix { file }) => output(&commands::fix(ctx, &file)?, human),

        Some(Commands::Explain { file }) => output(&commands::explain(ctx, &file)?, human),

        Some(Commands::Imports { file }) => output(&commands::imports(ctx, &file)?, human),

        Some(Commands::Config { command }) => match command {
            ConfigCommands::Show => output(&commands::config_show(ctx)?, human),
            ConfigCommands::Set { key, value } => {
                output(&commands::config_set(ctx, &key, &value)?, human)
            }
        },

        Some(Commands::Status) => output(&commands::status(ctx)?, human),

        None => {
            Cli::command().print_help()?;
            println!();
        }
    }

    Ok(())
}

/// Name and arguments of a command for the audit log. Secrets are redacted
/// later by [`audit_log::sanitize_args`].
fn serialize_command(command: &Option<Commands>) -> (String, serde_json::Value) {
    match command {
        Some(Commands::Setup { output }) => (
            "setup".to_string(),
            serde_json::json!({ "output": output }),
        ),

        Some(Commands::Token { command }) => match command {
            TokenCommands::Set { new_token } => (
                "token set".to_string(),
                serde_json::json!({ "new_token": new_token }),
            ),
            TokenCommands::Verify => ("token verify".to_string(), serde_json::json!({})),
        },

        Some(Commands::Output { command }) => match command {
            OutputCommands::Set { dir } => {
                ("output set".to_string(), serde_json::json!({ "dir": dir }))
            }
        },

        Some(Commands::Allow { dir }) => ("allow".to_string(), serde_json::json!({ "dir": dir })),

        Some(Commands::Permissions {
            read,
            write,
            execute,
        }) => (
            "permissions".to_string(),
            serde_json::json!({ "read": read, "write": write, "execute": execute }),
        ),

        Some(Commands::Check) => ("check".to_string(), serde_json::json!({})),

        Some(Commands::Usage { last }) => {
            ("usage".to_string(), serde_json::json!({ "last": last }))
        }

        Some(Commands::History) => ("history".to_string(), serde_json::json!({})),

        Some(Commands::Track { file }) => {
            ("track".to_string(), serde_json::json!({ "file": file }))
        }

        Some(Commands::Forget { file }) => {
            ("forget".to_string(), serde_json::json!({ "file": file }))
        }

        Some(Commands::State { command }) => match command {
            StateCommands::Show => ("state show".to_string(), serde_json::json!({})),
            StateCommands::Get { file } => {
                ("state get".to_string(), serde_json::json!({ "file": file }))
            }
        },

        Some(Commands::Generate { prompt, output }) => (
            "generate".to_string(),
            serde_json::json!({ "prompt": prompt, "output": output }),
        ),

        Some(Commands::Fix { file }) => ("fix".to_string(), serde_json::json!({ "file": file })),

        Some(Commands::Explain { file }) => {
            ("explain".to_string(), serde_json::json!({ "file": file }))
        }

        Some(Commands::Imports { file }) => {
            ("imports".to_string(), serde_json::json!({ "file": file }))
        }

        Some(Commands::Config { command }) => match command {
            ConfigCommands::Show => ("config show".to_string(), serde_json::json!({})),
            ConfigCommands::Set { key, value } => (
                "config set".to_string(),
                serde_json::json!({ "name": key, "value": value }),
            ),
        },

        Some(Commands::Status) => ("status".to_string(), serde_json::json!({})),

        None => ("help".to_string(), serde_json::json!({})),
    }
}
