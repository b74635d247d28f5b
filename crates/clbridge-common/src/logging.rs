use tracing_subscriber::{fmt, EnvFilter};

/// Environment variable holding the log filter directive.
pub const LOG_ENV: &str = "CLBRIDGE_LOG";

/// Install a subscriber unless the embedding process already has one.
/// Set CLBRIDGE_LOG=debug (or trace, info, warn, error) for verbosity control.
///
/// Called from bridge load, where the host application usually owns logging.
pub fn try_init_logging() {
    let filter = EnvFilter::try_from_env(LOG_ENV)
        .unwrap_or_else(|_| EnvFilter::new("warn"));

    let _ = fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(true)
        .try_init();
}
