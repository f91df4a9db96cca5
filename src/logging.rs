//! Structured logging setup for binaries and demos

use tracing_subscriber::EnvFilter;

/// Install a `tracing-subscriber` fmt subscriber.
///
/// `RUST_LOG` wins over `level` when set. Calling this twice is a no-op, so
/// tests and demos can both call it.
pub fn init(level: &str) {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let installed = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .try_init()
        .is_ok();
    if installed {
        tracing::debug!(level, "Logging initialized");
    }
}
