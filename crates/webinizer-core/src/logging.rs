//! Structured logging setup
//!
//! A thin wrapper around `tracing_subscriber` so both the library's own tests
//! and the CLI binary configure logging identically: an `EnvFilter` seeded
//! from [`crate::engine_config::EngineConfig::log_verbosity`] (itself
//! overridable via `RUST_LOG`), formatted for a terminal by default or as
//! JSON lines when `json` is requested.

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Initialize the global tracing subscriber. Safe to call more than once
/// (later calls are ignored) so both library tests and the CLI can call it
/// without coordinating.
pub fn init(default_level: &str, json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let registry = tracing_subscriber::registry().with(filter);
    let result = if json {
        registry.with(fmt::layer().json()).try_init()
    } else {
        registry.with(fmt::layer()).try_init()
    };
    // try_init fails if a global subscriber is already set; that's expected
    // when multiple tests in the same process call init().
    let _ = result;
}
