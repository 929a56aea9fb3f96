//! Tracing initialization helpers.
//!
//! Provides a single place to configure the [`tracing_subscriber`] stack so that
//! every binary and test in the workspace logs consistently. Log levels are
//! controlled through the `RUST_LOG` environment variable.

use std::sync::Once;

use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Default directives applied when `RUST_LOG` is not set.
const DEFAULT_DIRECTIVES: &str = "starsync=info";

static TEST_TRACING: Once = Once::new();

/// Initializes tracing for a long-running process.
///
/// Panics if a global subscriber was already installed, which indicates a setup
/// bug in the calling binary.
pub fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| DEFAULT_DIRECTIVES.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// Initializes tracing for tests.
///
/// Safe to call from every test. Only the first call installs a subscriber; the
/// output is routed through the libtest capture writer so it shows up with the
/// failing test instead of interleaving with other tests.
pub fn init_test_tracing() {
    TEST_TRACING.call_once(|| {
        let _ = tracing_subscriber::registry()
            .with(
                EnvFilter::try_from_default_env().unwrap_or_else(|_| DEFAULT_DIRECTIVES.into()),
            )
            .with(tracing_subscriber::fmt::layer().with_test_writer())
            .try_init();
    });
}
