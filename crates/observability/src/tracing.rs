//! Subscriber installation.

use tracing_subscriber::EnvFilter;

/// Directive used when `RUST_LOG` is unset or unparseable.
pub const DEFAULT_FILTER: &str = "info";

/// Install the JSON subscriber, filtered by `RUST_LOG` or [`DEFAULT_FILTER`].
/// Later calls leave the first subscriber in place.
pub fn init() {
    init_with_default(DEFAULT_FILTER);
}

/// As [`init`], with a different fallback directive (`"gstflow_infra=debug"`).
pub fn init_with_default(fallback: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .json()
        .with_timer(tracing_subscriber::fmt::time::SystemTime)
        .with_target(false)
        .with_current_span(true)
        .try_init();
}
