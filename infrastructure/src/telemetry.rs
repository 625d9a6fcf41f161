use tracing::{debug, level_filters::LevelFilter};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Installs a formatted subscriber filtered by `RUST_LOG` (default `info`).
///
/// Safe to call more than once; later calls leave the installed subscriber
/// in place.
pub fn init_tracing() {
    let filter: EnvFilter = EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy();
    match tracing_subscriber::registry()
        .with(fmt::layer())
        .with(filter)
        .try_init()
    {
        Ok(()) => debug!("Tracing subscriber installed."),
        Err(e) => debug!("Tracing subscriber already installed: {}", e),
    }
}
