use std::str::FromStr;

use tracing::Level;
use tracing_subscriber::FmtSubscriber;

use super::errors::{Result, StackerError};

/// Environment variable consulted when no explicit verbosity is given.
pub const LOG_ENV: &str = "STACKPLAN_LOG";

/// Map `-v` style counts to a level: 0 is info, 1 debug, 2 or more trace.
pub fn level_for_verbosity(verbosity: u8) -> Level {
    match verbosity {
        0 => Level::INFO,
        1 => Level::DEBUG,
        _ => Level::TRACE,
    }
}

/// Level from `STACKPLAN_LOG` (`error`, `warn`, `info`, `debug`, `trace`).
pub fn level_from_env() -> Option<Level> {
    std::env::var(LOG_ENV)
        .ok()
        .and_then(|v| Level::from_str(v.trim()).ok())
}

/// Install the global fmt subscriber writing to stderr.
///
/// An explicit `verbosity` wins over the environment; with neither the
/// level is `info`. Fails if a global subscriber is already set.
pub fn init_logging(verbosity: Option<u8>) -> Result<()> {
    let level = verbosity
        .map(level_for_verbosity)
        .or_else(level_from_env)
        .unwrap_or(Level::INFO);

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .with_writer(std::io::stderr)
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .map_err(|e| StackerError::internal(format!("failed to set tracing subscriber: {e}")))
}
