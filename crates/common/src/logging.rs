use crate::config::Environment;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Install the process-wide subscriber: pretty output in development, JSON in
/// production. `RUST_LOG` wins over `log_level` when set.
///
/// Returns `false` when a subscriber was already installed; the existing one is kept.
pub fn setup_logging(log_level: String, environment: Environment) -> bool {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));
    let registry = tracing_subscriber::registry().with(env_filter);

    let installed = match environment {
        Environment::Production => registry
            .with(fmt::layer().json().with_level(true).with_current_span(true))
            .try_init(),
        Environment::Development => registry
            .with(fmt::layer().pretty().with_ansi(true))
            .try_init(),
    };

    installed.is_ok()
}

/// Creates an info-level span and enters it.
#[macro_export]
macro_rules! span {
    ($name:literal) => {
        tracing::info_span!($name).entered()
    };
}

/// Creates a debug-level span and enters it.
#[macro_export]
macro_rules! span_debug {
    ($name:literal) => {
        tracing::debug_span!($name).entered()
    };
}
