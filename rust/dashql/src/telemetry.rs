use once_cell::sync::OnceCell;
use tracing_subscriber::{fmt, EnvFilter};

/// Overrides `RUST_LOG` for this crate's subscriber.
pub const LOG_ENV: &str = "DASHQL_LOG";

static INIT: OnceCell<()> = OnceCell::new();

/// Installs the fmt subscriber once per process. A subscriber installed
/// elsewhere is left in place.
pub fn init_tracing() {
    let _ = INIT.get_or_init(|| {
        let _ = fmt()
            .with_env_filter(log_filter())
            .with_target(false)
            .try_init();
    });
}

/// Like [`init_tracing`], but writes through the test harness so output is
/// captured per test.
pub fn init_test_tracing() {
    let _ = INIT.get_or_init(|| {
        let _ = fmt()
            .with_env_filter(log_filter())
            .with_test_writer()
            .try_init();
    });
}

fn log_filter() -> EnvFilter {
    EnvFilter::try_from_env(LOG_ENV)
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| EnvFilter::new("info"))
}
