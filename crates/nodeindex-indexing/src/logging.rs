//! Tracing subscriber setup.

use tracing_subscriber::EnvFilter;

use nodeindex_types::Settings;

use crate::error::IndexingError;

/// Install a global fmt subscriber.
///
/// `RUST_LOG` takes precedence; `level` is the fallback filter.
pub fn init_logging(level: &str) -> Result<(), IndexingError> {
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level)))
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .map_err(|e| IndexingError::Logging(format!("Failed to set tracing subscriber: {e}")))
}

/// [`init_logging`] with the configured `log_level`.
pub fn init_logging_from_settings(settings: &Settings) -> Result<(), IndexingError> {
    init_logging(&settings.log_level)
}
