//! `tracing` subscriber installation.

use std::sync::OnceLock;

use tracing_subscriber::{fmt, EnvFilter};

/// Installs a stderr `fmt` subscriber once per process.
///
/// `RUST_LOG` wins over `default_directive`; an unparsable directive falls back
/// to `info`. A subscriber installed elsewhere is left in place.
pub fn init(default_directive: &str) {
    static INSTALLED: OnceLock<()> = OnceLock::new();
    INSTALLED.get_or_init(|| {
        let filter = EnvFilter::try_from_default_env()
            .or_else(|_| EnvFilter::try_new(default_directive))
            .unwrap_or_else(|_| EnvFilter::new("info"));
        let _ = fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .with_target(true)
            .try_init();
    });
}
