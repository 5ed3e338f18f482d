//! Diagnostic logging via `tracing`.
//!
//! User-facing lines go through the color helpers; this subscriber only carries
//! lifecycle diagnostics and stays silent unless `STARDOC_LOG` is set
//! (e.g. `STARDOC_LOG=stardoc=debug`).

use once_cell::sync::OnceCell;
use tracing_subscriber::EnvFilter;

static INIT: OnceCell<()> = OnceCell::new();

pub const LOG_ENV: &str = "STARDOC_LOG";

/// Install the global subscriber once. Safe to call multiple times.
pub fn init() {
    INIT.get_or_init(|| {
        let filter = std::env::var(LOG_ENV)
            .ok()
            .filter(|s| !s.trim().is_empty())
            .and_then(|s| EnvFilter::try_new(s).ok())
            .unwrap_or_else(|| EnvFilter::new("off"));
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .with_ansi(atty::is(atty::Stream::Stderr))
            .with_target(true)
            .try_init();
    });
}
