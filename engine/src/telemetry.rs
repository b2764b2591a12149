//! Logging setup for the `docia` binary
//!
//! Engine and sdk events are shown at the configured level while HTTP and
//! runtime crates stay at `warn`. Everything goes to stderr; stdout carries
//! only answers.

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Filter directives used when `RUST_LOG` is not set
pub fn default_filter(log_level: &str) -> String {
    format!("warn,docia_engine={level},sdk={level}", level = log_level)
}

/// Install the global subscriber
///
/// `RUST_LOG` replaces [`default_filter`] entirely when present. Debug builds
/// print human-readable lines; release builds emit one JSON object per event
/// with the current span attached. Calling this twice is a no-op.
pub fn init_telemetry_with_level(log_level: &str) {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_filter(log_level)));

    #[cfg(debug_assertions)]
    {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(
                fmt::layer()
                    .pretty()
                    .with_target(false)
                    .with_writer(std::io::stderr),
            )
            .try_init()
            .ok();
    }

    #[cfg(not(debug_assertions))]
    {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(
                fmt::layer()
                    .json()
                    .with_current_span(true)
                    .with_writer(std::io::stderr),
            )
            .try_init()
            .ok();
    }
}
