/*!
 * Logging Module
 * Subscriber setup: rolling log files plus console output
 */
pub mod middleware;

use std::io;
use tracing::Subscriber;
use tracing_appender::{
    non_blocking,
    non_blocking::{NonBlocking, WorkerGuard},
    rolling,
};
use tracing_subscriber::{
    filter::LevelFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer,
};

use crate::config::settings;

/// Background writer handles. Dropping them flushes and stops the writers, so
/// the caller keeps this alive until shutdown.
pub struct LogGuards {
    _file: WorkerGuard,
    _error: WorkerGuard,
    _console: WorkerGuard,
}

/// Default directives when neither `RUST_LOG` nor a usable `LOG_LEVEL` is set.
fn default_directives(level: &str) -> String {
    format!(
        "devfolio_backend={},tower_http=info,axum=info,sqlx=warn,reqwest=info",
        level
    )
}

/// Destinations for the three output layers.
struct Writers {
    file: NonBlocking,
    error: NonBlocking,
    console: NonBlocking,
}

/// Errors always go to `error.log` as JSON; the other layers switch between
/// JSON (production) and human-readable output.
fn build_subscriber(
    is_production: bool,
    env_filter: EnvFilter,
    writers: Writers,
) -> Box<dyn Subscriber + Send + Sync> {
    let error_layer = fmt::layer()
        .json()
        .with_writer(writers.error)
        .with_target(true)
        .with_file(true)
        .with_line_number(true)
        .with_filter(LevelFilter::ERROR);

    let subscriber = tracing_subscriber::registry()
        .with(env_filter)
        .with(error_layer);

    if is_production {
        let file_layer = fmt::layer()
            .json()
            .with_writer(writers.file)
            .with_target(true)
            .with_thread_ids(true)
            .with_file(true)
            .with_line_number(true);

        let console_layer = fmt::layer()
            .json()
            .with_writer(writers.console)
            .with_target(false);

        Box::new(subscriber.with(file_layer).with(console_layer))
    } else {
        let file_layer = fmt::layer()
            .with_writer(writers.file)
            .with_target(true)
            .with_file(true)
            .with_line_number(true)
            .with_ansi(false);

        let console_layer = fmt::layer()
            .with_writer(writers.console)
            .with_target(true)
            .pretty();

        Box::new(subscriber.with(file_layer).with(console_layer))
    }
}

/// Initialize the logging system
pub fn init() -> LogGuards {
    let is_production = settings().is_production();

    std::fs::create_dir_all("logs").ok();

    let (file_writer, file_guard) = non_blocking(rolling::daily("logs", "app.log"));
    let (error_writer, error_guard) = non_blocking(rolling::daily("logs", "error.log"));
    let (console_writer, console_guard) = non_blocking(io::stdout());

    let log_level = std::env::var("LOG_LEVEL")
        .unwrap_or_else(|_| if is_production { "info" } else { "debug" }.to_string());

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directives(&log_level)));

    let writers = Writers {
        file: file_writer,
        error: error_writer,
        console: console_writer,
    };
    build_subscriber(is_production, env_filter, writers).init();

    tracing::info!(environment = %settings().environment, "logging initialized");

    LogGuards {
        _file: file_guard,
        _error: error_guard,
        _console: console_guard,
    }
}
