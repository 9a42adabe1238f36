//! Diagnostic logging setup.
//!
//! Two sinks hang off one `tracing_subscriber` registry:
//! - `logs/custodian.log` in the data directory, filtered by `CUST_LOG` or the
//!   configured `log-level`
//! - stderr, warnings and errors only unless `CUST_LOG` is set, so stdout stays
//!   clean for JSON output

use crate::config::Layout;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::{EnvFilter, Layer, layer::SubscriberExt, util::SubscriberInitExt};

/// Environment variable holding an `EnvFilter` directive.
pub const LOG_ENV: &str = "CUST_LOG";

/// File name inside [`Layout::log_dir`].
pub const LOG_FILE: &str = "custodian.log";

fn file_filter(level: &str) -> EnvFilter {
    EnvFilter::try_from_env(LOG_ENV)
        .or_else(|_| EnvFilter::try_new(level))
        .unwrap_or_else(|_| EnvFilter::new(crate::config::resolver::DEFAULT_LOG_LEVEL))
}

fn stderr_filter() -> EnvFilter {
    EnvFilter::try_from_env(LOG_ENV)
        .unwrap_or_else(|_| EnvFilter::default().add_directive(LevelFilter::WARN.into()))
}

/// Install the global subscriber.
///
/// Keep the returned guard alive for the life of the process; dropping it
/// flushes the file writer. Returns `None` if the log directory can't be
/// created, in which case only stderr logging is installed.
pub fn init(layout: &Layout, level: &str) -> Option<WorkerGuard> {
    let stderr_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_filter(stderr_filter());

    let log_dir = layout.log_dir();
    if let Err(e) = std::fs::create_dir_all(&log_dir) {
        let _ = tracing_subscriber::registry().with(stderr_layer).try_init();
        tracing::warn!("Could not create log directory {}: {}", log_dir.display(), e);
        return None;
    }

    let appender = tracing_appender::rolling::never(&log_dir, LOG_FILE);
    let (writer, guard) = tracing_appender::non_blocking(appender);
    let file_layer = tracing_subscriber::fmt::layer()
        .with_writer(writer)
        .with_ansi(false)
        .with_filter(file_filter(level));

    // A subscriber may already be installed (tests); that's fine.
    let _ = tracing_subscriber::registry()
        .with(stderr_layer)
        .with(file_layer)
        .try_init();

    Some(guard)
}
