use std::sync::Once;
use tracing_subscriber::EnvFilter;

static INIT: Once = Once::new();

/// Install a test-friendly subscriber once per process.
///
/// Output goes through the test harness writer, so it is only shown for
/// failing tests. Set `RUST_LOG=rebind_core=trace` for per-call-site
/// decisions.
pub fn init_test_logging() {
    INIT.call_once(|| {
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
        // Another test binary helper may have installed one already
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .without_time()
            .try_init();
    });
}
