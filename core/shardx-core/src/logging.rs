//! Logging utilities for ShardX
//!
//! Provides helpers for initializing tracing subscribers. The pipeline itself
//! only emits `tracing` events; installing a subscriber is left to the host.

#[cfg(feature = "logging")]
use tracing_subscriber::{EnvFilter, fmt};

/// Initialize logging with default settings
///
/// # Environment Variables
/// - `RUST_LOG` - Log level filter (default: `warn,shardx_core=info`)
///
/// # Example
///
/// ```rust
/// shardx_core::logging::init();
/// tracing::info!("router ready");
/// ```
#[cfg(feature = "logging")]
pub fn init() {
    init_with_level("info")
}

/// Initialize logging with a specific level
///
/// Set `shardx_core=debug` to see route decisions and merge strategy
/// selection; `sql_show` rewrite output is logged at `info`.
#[cfg(feature = "logging")]
pub fn init_with_level(level: &str) {
    // 다른 크레이트는 warn 으로 두고 파이프라인만 요청한 레벨로
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("warn,shardx_core={level}")));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(true)
        .with_line_number(true)
        .init();
}

/// Initialize logging for tests; safe to call from every test.
#[cfg(feature = "logging")]
pub fn init_test() {
    let _ = fmt()
        .with_env_filter(EnvFilter::new("shardx_core=trace"))
        .with_test_writer()
        .try_init();
}

// Stub implementations when logging feature is disabled
#[cfg(not(feature = "logging"))]
pub fn init() {}

#[cfg(not(feature = "logging"))]
pub fn init_with_level(_level: &str) {}

#[cfg(not(feature = "logging"))]
pub fn init_test() {}
