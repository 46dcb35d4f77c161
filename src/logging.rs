use tracing_subscriber::{fmt, EnvFilter};

/// Used when `RUST_LOG` is unset
pub const DEFAULT_FILTER: &str = "info,sqlx=warn";

/// Install the global subscriber. Safe to call more than once; later calls
/// are ignored.
pub fn init() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));
    let _ = fmt().with_env_filter(env_filter).with_target(true).try_init();
}
