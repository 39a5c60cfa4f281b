//! Tracing initialization helpers.

/// Initialize tracing with an env-filter.
///
/// Honors `RUST_LOG`; falls back to the provided default directive.
/// Panics if a global subscriber is already set; use [`try_init`] from
/// tests.
pub fn init(default_directive: &str) {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_directive)),
        )
        .init();
}

/// Like [`init`] but silently ignores an already-installed subscriber.
pub fn try_init() {
    let _ = tracing_subscriber::fmt::try_init();
}
