use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, fmt};

/// Installs the global subscriber: compact console output filtered by
/// `RUST_LOG`, `info` when unset. Calling it again is a no-op.
pub fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let console = fmt::layer().compact().with_target(false);
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(console)
        .try_init();
}
