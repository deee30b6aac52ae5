//! Logging setup for binaries and applications embedding the client

use tracing_subscriber::{fmt, EnvFilter};

const DEFAULT_FILTER: &str = "limestone=info";

/// Install a global tracing subscriber.
///
/// `RUST_LOG` overrides the default filter. Returns false if a subscriber
/// was already installed.
pub fn init_tracing(json: bool) -> bool {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    if json {
        fmt()
            .json()
            .with_env_filter(filter)
            .with_target(true)
            .try_init()
            .is_ok()
    } else {
        fmt().with_env_filter(filter).with_target(false).try_init().is_ok()
    }
}
