use std::sync::Once;

use tracing_subscriber::{fmt, EnvFilter};

static INIT: Once = Once::new();

/// Initialises the global tracing subscriber once. `MPYBINDGEN_LOG`
/// overrides the default `warn` filter.
pub fn init_logging() {
    INIT.call_once(|| {
        let filter = EnvFilter::try_from_env("MPYBINDGEN_LOG")
            .unwrap_or_else(|_| EnvFilter::new("warn"));
        let _ = fmt()
            .with_env_filter(filter)
            .with_target(false)
            .with_writer(std::io::stderr)
            .try_init();
    });
}
