//! dualsub Core Library
//!
//! Bilingual caption engine: transcript normalization, time-synchronized
//! caption lookup, caption file export and burned-in video export.

pub mod core;

use std::path::Path;
use std::sync::OnceLock;

static LOG_GUARD: OnceLock<tracing_appender::non_blocking::WorkerGuard> = OnceLock::new();

/// Installs the global tracing subscriber
///
/// Logs go to stderr, filtered by `RUST_LOG` on top of `default_level`. With a
/// `log_dir` a daily-rolling `dualsub.log` is written there as well.
/// Calling this more than once is a no-op.
pub fn init_logging(default_level: tracing::Level, log_dir: Option<&Path>) {
    use tracing_subscriber::prelude::*;

    let env_filter = tracing_subscriber::EnvFilter::from_default_env()
        .add_directive(default_level.into());

    let stderr_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_ansi(cfg!(debug_assertions));

    let file_layer = log_dir.and_then(|dir| {
        std::fs::create_dir_all(dir).ok()?;
        let file_appender = tracing_appender::rolling::daily(dir, "dualsub.log");
        let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
        let _ = LOG_GUARD.set(guard);
        Some(
            tracing_subscriber::fmt::layer()
                .with_writer(non_blocking)
                .with_ansi(false),
        )
    });

    let subscriber = tracing_subscriber::registry()
        .with(env_filter)
        .with(stderr_layer)
        .with(file_layer);

    // Already initialized in tests or by an embedding host.
    let _ = tracing::subscriber::set_global_default(subscriber);
}
