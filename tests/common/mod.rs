//! Shared helpers for the integration suites.

/// Install an env-filtered subscriber once per test binary (`RUST_LOG=lazer=debug` to see exploration steps).
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_test_writer()
        .try_init();
}
