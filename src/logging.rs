use std::fs;
use std::path::Path;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Used when `RUST_LOG` is not set: info for this crate, warnings elsewhere.
pub const DEFAULT_FILTER: &str = "nepremicnine_bot=info,warn";

/// Initializes the logging system with both console and file output.
///
/// The returned guard flushes the file writer on drop, so the caller keeps it
/// alive until the process exits.
pub fn init_logging(log_dir: &Path) -> WorkerGuard {
    let _ = fs::create_dir_all(log_dir);

    // Daily rotated JSON log next to the human readable console output
    let file_appender = tracing_appender::rolling::daily(log_dir, "bot.log");
    let (non_blocking_writer, guard) = tracing_appender::non_blocking(file_appender);

    let file_layer = fmt::layer().json().with_writer(non_blocking_writer);

    let console_layer = fmt::layer().with_target(true).with_writer(std::io::stdout);

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(file_layer)
        .with(console_layer)
        .init();

    guard
}
