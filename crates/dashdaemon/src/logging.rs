//! Logging setup for the daemon binary.
//!
//! Console output only; the daemon runs under a service manager that collects
//! stdout. Filter precedence: `--log-level`, then `RUST_LOG`, then `info`.

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

/// Default filter when neither flag nor environment is set
pub const DEFAULT_LOG_LEVEL: &str = "info";

/// Install the global subscriber. Call once, before anything logs.
pub fn init_logging(level: Option<&str>) {
    let env_filter = match level {
        Some(level) => EnvFilter::new(level),
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_LEVEL)),
    };

    let stdout_layer = tracing_subscriber::fmt::layer()
        .with_target(true)
        .with_ansi(std::io::IsTerminal::is_terminal(&std::io::stdout()));

    tracing_subscriber::registry().with(env_filter).with(stdout_layer).init();
}
