//! Process-wide engine configuration
//!
//! Read once at process init (see [`crate::init`]) from the environment, this
//! carries the ambient knobs that are not part of any one project's persisted
//! `config.json`: which toolchain binaries to invoke, where to look for
//! extensions, and how verbose logging should be.

use std::env;
use std::path::PathBuf;

fn env_override(name: &str, default: &str) -> String {
    env::var(name).unwrap_or_else(|_| default.to_string())
}

/// Toolchain binary names and extension/logging knobs, each overridable by an
/// environment variable so CI and sandboxed test environments can point at a
/// non-system Emscripten install without touching project files.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    pub emcc_bin: String,
    pub em_config_bin: String,
    pub make_bin: String,
    pub cmake_bin: String,
    pub configure_bin: String,
    pub cc_bin: String,
    pub extension_search_paths: Vec<PathBuf>,
    pub log_verbosity: String,
}

impl EngineConfig {
    /// Build from the process environment:
    /// - `WEBINIZER_EMCC_BIN` (default `emcc`)
    /// - `WEBINIZER_EM_CONFIG_BIN` (default `em-config`)
    /// - `WEBINIZER_MAKE_BIN` (default `make`)
    /// - `WEBINIZER_CMAKE_BIN` (default `cmake`)
    /// - `WEBINIZER_CONFIGURE_BIN` (default `./configure`)
    /// - `WEBINIZER_CC_BIN` (default `cc`)
    /// - `WEBINIZER_EXTENSION_PATH` (`:`-separated, default empty)
    /// - `WEBINIZER_LOG` (default `info`, consumed by [`crate::logging::init`])
    pub fn from_env() -> Self {
        let extension_search_paths = env::var("WEBINIZER_EXTENSION_PATH")
            .map(|raw| env::split_paths(&raw).collect())
            .unwrap_or_default();

        Self {
            emcc_bin: env_override("WEBINIZER_EMCC_BIN", "emcc"),
            em_config_bin: env_override("WEBINIZER_EM_CONFIG_BIN", "em-config"),
            make_bin: env_override("WEBINIZER_MAKE_BIN", "make"),
            cmake_bin: env_override("WEBINIZER_CMAKE_BIN", "cmake"),
            configure_bin: env_override("WEBINIZER_CONFIGURE_BIN", "./configure"),
            cc_bin: env_override("WEBINIZER_CC_BIN", "cc"),
            extension_search_paths,
            log_verbosity: env_override("WEBINIZER_LOG", "info"),
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            emcc_bin: "emcc".to_string(),
            em_config_bin: "em-config".to_string(),
            make_bin: "make".to_string(),
            cmake_bin: "cmake".to_string(),
            configure_bin: "./configure".to_string(),
            cc_bin: "cc".to_string(),
            extension_search_paths: Vec::new(),
            log_verbosity: "info".to_string(),
        }
    }
}
