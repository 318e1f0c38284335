//! Logging initialization.
//!
//! Every crate in the workspace logs through `tracing` macros with structured
//! fields; this module installs the subscriber once at process start. Output
//! goes to stderr so command output on stdout stays machine-readable.

use tracing_subscriber::EnvFilter;

/// Initialize the logging system.
///
/// - Filter from `RUST_LOG`, falling back to `level`
/// - Compact text output, or JSON lines when `PACEDREAM_LOG_FORMAT=json`
///
/// Calling this more than once is harmless; later calls keep the first
/// subscriber.
pub fn init_logging(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let json = std::env::var("PACEDREAM_LOG_FORMAT")
        .map(|format| format.trim().eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    let result = if json {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .with_target(true)
            .json()
            .try_init()
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .with_target(true)
            .compact()
            .try_init()
    };

    if result.is_err() {
        tracing::debug!("Logging already initialized");
    }
}

/// Parse a log level string into a tracing Level.
pub fn parse_level(level: &str) -> tracing::Level {
    match level.to_lowercase().as_str() {
        "trace" => tracing::Level::TRACE,
        "debug" => tracing::Level::DEBUG,
        "info" => tracing::Level::INFO,
        "warn" | "warning" => tracing::Level::WARN,
        "error" => tracing::Level::ERROR,
        _ => tracing::Level::INFO,
    }
}
