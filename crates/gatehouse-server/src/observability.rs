// Tracing initialization with a reloadable log filter.
use std::sync::OnceLock;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing_subscriber::{EnvFilter, fmt, prelude::*, reload};

static LOG_RELOAD_HANDLE: OnceLock<reload::Handle<EnvFilter, tracing_subscriber::Registry>> =
    OnceLock::new();

// Set when RUST_LOG chose the filter; configured levels are ignored then.
static ENV_OVERRIDE: AtomicBool = AtomicBool::new(false);

pub fn init_tracing() {
    init_tracing_with_level("info");
}

pub fn init_tracing_with_level(level: &str) {
    // Prefer RUST_LOG from env, otherwise use provided level string.
    let env_filter = std::env::var("RUST_LOG")
        .ok()
        .and_then(|_| EnvFilter::try_from_default_env().ok());
    ENV_OVERRIDE.store(env_filter.is_some(), Ordering::Relaxed);
    let base_filter = env_filter.unwrap_or_else(|| EnvFilter::new(level));

    let (reload_layer, handle) = reload::Layer::new(base_filter);
    let _ = LOG_RELOAD_HANDLE.set(handle);

    let _ = tracing_subscriber::registry()
        .with(reload_layer)
        .with(fmt::layer())
        .try_init();
}

/// Apply a new logging level at runtime.
///
/// Returns `false` when the directive is invalid; the previous filter stays.
pub fn apply_logging_level(level: &str) -> bool {
    if ENV_OVERRIDE.load(Ordering::Relaxed) {
        tracing::debug!(level, "RUST_LOG is set; ignoring configured log level");
        return true;
    }

    let filter = match EnvFilter::try_new(level) {
        Ok(filter) => filter,
        Err(e) => {
            tracing::warn!(level, error = %e, "Invalid log level directive; keeping current filter");
            return false;
        }
    };

    if let Some(handle) = LOG_RELOAD_HANDLE.get() {
        let _ = handle.modify(|f| {
            *f = filter;
        });
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_apply_logging_level_rejects_bad_directive() {
        assert!(!apply_logging_level("gatehouse_auth=notalevel"));
    }

    #[test]
    fn test_apply_logging_level_without_subscriber() {
        assert!(apply_logging_level("debug"));
    }
}
