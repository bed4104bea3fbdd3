//! Logging bootstrap.
//!
//! The library only emits `tracing` events; binaries call [`init_logging`]
//! once to print them. Output goes to stderr so command output on stdout
//! stays machine readable.

use tracing_subscriber::{fmt, EnvFilter};

/// Install a compact stderr subscriber.
///
/// `RUST_LOG` takes precedence over `level`; an unparsable directive falls
/// back to `info`. Calling this again, or after another subscriber was
/// installed, is a no-op and returns `false`.
pub fn init_logging(level: &str) -> bool {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .compact()
        .try_init()
        .is_ok()
}
