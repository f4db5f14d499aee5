//! Tracing setup for testgen binaries.

use tracing::Level;
use tracing_subscriber::{fmt, EnvFilter};

/// Install the global tracing subscriber.
///
/// `RUST_LOG` takes precedence when set. Otherwise `level` applies to the
/// testgen crates while everything else stays at `warn`, keeping backend
/// process noise out of hook output. With `json` the subscriber emits
/// newline-delimited JSON lines for log shippers.
///
/// Calling this more than once is a no-op; the first caller wins.
pub fn init_tracing(json: bool, level: Level) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("warn,testgen={level},testgen_core={level}")));

    let builder = fmt().with_env_filter(filter).with_target(false);
    if json {
        builder.json().try_init().ok();
    } else {
        builder.try_init().ok();
    }
}
