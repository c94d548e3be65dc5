use std::sync::OnceLock;
use tracing::subscriber::SetGlobalDefaultError;
use tracing_subscriber::{fmt, layer::SubscriberExt, EnvFilter, Registry};

static SUBSCRIBER_GUARD: OnceLock<()> = OnceLock::new();

/// Variable consulted before `RUST_LOG` when building the default filter.
pub const LOG_ENV: &str = "NEONOPS_LOG";

/// Filter from `NEONOPS_LOG`, then `RUST_LOG`, then `fallback`.
pub fn default_filter(fallback: &str) -> EnvFilter {
    EnvFilter::try_from_env(LOG_ENV)
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| EnvFilter::new(fallback))
}

/// Initialize the global tracing subscriber.
///
/// Logs go to stderr so streamed replies on stdout stay clean. Repeated calls
/// are no-ops, which lets tests and binaries share the same entry point.
pub fn init_tracing(filter: EnvFilter) -> Result<(), SetGlobalDefaultError> {
    if SUBSCRIBER_GUARD.get().is_some() {
        return Ok(());
    }

    let subscriber = Registry::default()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr).with_target(false));
    tracing::subscriber::set_global_default(subscriber)?;
    SUBSCRIBER_GUARD.set(()).ok();

    Ok(())
}
