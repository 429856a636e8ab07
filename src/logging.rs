//! Structured logging setup
//!
//! Library code only emits `tracing` events; the binary decides where they go.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Filter used when `RUST_LOG` is not set
const DEFAULT_FILTER: &str = "info,rdtctl=debug";

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// Human readable, one line per event
    Pretty,
    /// One JSON object per event
    Json,
}

/// Initialize the tracing subscriber
///
/// Safe to call more than once; later calls are no-ops.
///
/// # Example
/// ```ignore
/// init_tracing(LogFormat::Pretty);
/// ```
pub fn init_tracing(format: LogFormat) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    let result = match format {
        LogFormat::Pretty => tracing_subscriber::registry()
            .with(filter)
            .with(
                tracing_subscriber::fmt::layer()
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_writer(std::io::stderr),
            )
            .try_init(),
        LogFormat::Json => tracing_subscriber::registry()
            .with(filter)
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_writer(std::io::stderr),
            )
            .try_init(),
    };

    if result.is_ok() {
        tracing::debug!(?format, "tracing initialized");
    }
}
