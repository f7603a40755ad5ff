use std::path::Path;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const LOG_FILE_PREFIX: &str = "engine.log";

/// Keeps the non-blocking file writer alive; drop flushes remaining lines.
pub struct FileLogGuard {
    _guard: WorkerGuard,
}

/// Install the tracing subscriber for a host embedding the engine. Stdout
/// output is always on; a daily-rolling file layer is added when `log_dir`
/// is provided. The returned guard must be held for the process lifetime
/// when file logging is active.
pub fn init_tracing(log_level: &str, log_dir: Option<&Path>) -> Option<FileLogGuard> {
    let env_filter = EnvFilter::try_new(log_level).unwrap_or_else(|_| EnvFilter::new("info"));
    let stdout_layer = fmt::layer().with_target(true);
    let registry = tracing_subscriber::registry()
        .with(env_filter)
        .with(stdout_layer);

    let file_layer = log_dir.and_then(|dir| match std::fs::create_dir_all(dir) {
        Ok(()) => {
            let appender = RollingFileAppender::new(Rotation::DAILY, dir, LOG_FILE_PREFIX);
            Some(tracing_appender::non_blocking(appender))
        }
        Err(err) => {
            eprintln!("failed to create log directory {}: {err}", dir.display());
            None
        }
    });

    match file_layer {
        Some((writer, guard)) => {
            registry
                .with(fmt::layer().with_writer(writer).with_ansi(false).with_target(true))
                .init();
            Some(FileLogGuard { _guard: guard })
        }
        None => {
            registry.init();
            None
        }
    }
}

/// Convenience wrapper reading `RUST_LOG` and `LOG_DIR` from the environment.
pub fn init_tracing_from_env() -> Option<FileLogGuard> {
    let log_level = std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());
    let log_dir = std::env::var("LOG_DIR").ok();
    init_tracing(&log_level, log_dir.as_deref().map(Path::new))
}
