//! Core engine for diagnosing and remediating native C/C++ projects being
//! ported to WebAssembly via Emscripten.
//!
//! The pieces compose roughly in this order: a [`project::Project`] holds
//! persisted [`project::ProjectConfig`] state; [`builder`]s drive the actual
//! toolchain subprocesses for its active target; a builder failure is routed
//! through [`advisor`]s to produce [`advisor::Recipe`]s of [`action::Action`]s;
//! [`orchestrator`] ties the whole loop together and tracks build status
//! process-wide. [`registry`] underlies the typed-JSON dispatch that lets
//! [`extension`]s add new action/advisor/builder kinds without the core crate
//! knowing about them in advance.

pub mod action;
pub mod advisor;
pub mod builder;
pub mod cache;
pub mod change_manager;
pub mod engine_config;
pub mod errors;
pub mod extension;
pub mod logging;
pub mod orchestrator;
pub mod project;
pub mod registry;
pub mod template;

pub use errors::{Result, WebinizerError};

/// The crate's own version, exposed so the CLI can report it without
/// duplicating the number from `Cargo.toml`.
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
