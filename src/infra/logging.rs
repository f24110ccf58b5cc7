use tracing_subscriber::fmt::format::{DefaultFields, Format};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

const DEFAULT_FILTER: &str = "forest_rl=debug,info";

/// Install the global `tracing` subscriber.
///
/// The filter comes from `RUST_LOG` when set. Returns `false` if a subscriber
/// was already installed, which is the normal case when several environments
/// share one process.
pub fn init_logging() -> bool {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));
    tracing::subscriber::set_global_default(subscriber(filter)).is_ok()
}

fn subscriber(filter: EnvFilter) -> FmtSubscriber<DefaultFields, Format, EnvFilter> {
    FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .with_ansi(true)
        .finish()
}
