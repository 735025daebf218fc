// (c) 2025 peerlink developers

//! Tracing helpers

use std::sync::atomic::{AtomicBool, Ordering};

use tracing_subscriber::EnvFilter;

static TRACING_INITIALIZED: AtomicBool = AtomicBool::new(false);

/// Installs a global subscriber reading `RUST_LOG` (default `peerlink=info`).
/// Safe to call from multiple tests; only the first call takes effect.
pub fn setup_tracing_for_tests() {
    if TRACING_INITIALIZED.swap(true, Ordering::SeqCst) {
        return;
    }
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("peerlink=info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_test_writer()
        .try_init();
}
