//! Tracing initialisation helpers for tests.
//!
//! Call [`init_test_tracing`] at the top of any test that wants transport
//! retries, stale-id revalidation and the like captured by the test harness.
//! Tests annotated with `#[test_log::test]` get the same effect for free.
//!
//! The subscriber is initialised at most once per process, so it is safe to
//! call from every test function.

use tracing_subscriber::EnvFilter;

/// Initialise a subscriber that writes to the test-harness writer, honours
/// `RUST_LOG`, and otherwise shows `hapadmin` crates at debug level.
///
/// # Example
///
/// ```ignore
/// #[tokio::test]
/// async fn my_test() {
///     hapadmin_test_utils::tracing_setup::init_test_tracing();
///     tracing::debug!("visible in test output");
/// }
/// ```
pub fn init_test_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("warn,hapadmin_core=debug")),
        )
        .with_test_writer()
        .try_init();
}
