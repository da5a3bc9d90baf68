//! Error types and handling
//!
//! This module provides domain-specific error types for the diagnosis-and-remediation
//! engine, following the error taxonomy in the governing specification.

use thiserror::Error;

/// Domain errors for the Webinizer build-automation engine.
#[derive(Error, Debug)]
pub enum WebinizerError {
    /// The Emscripten toolchain could not be reached during init.
    #[error("toolchain check failed: {message}")]
    InitToolchainCheckFail { message: String },

    /// A single extension module failed to load during init.
    #[error("failed to load extension module '{module}': {message}")]
    InitModuleLoadFail { module: String, message: String },

    /// A well-known extension directory does not exist.
    #[error("extension directory does not exist: {path}")]
    InitModuleDirNoExist { path: String },

    /// A tag was registered twice in a typed-JSON factory registry.
    #[error("duplicate registration for tag '{tag}' in {registry} registry")]
    JsonFactoryDupReg { registry: String, tag: String },

    /// An array of polymorphic JSON records contained an entry with an unknown tag.
    #[error("failed to deserialize element {index} in {registry} registry: {message}")]
    JsonFactoryDeserializeFail {
        registry: String,
        index: usize,
        message: String,
    },

    /// Two `BuildStepChange` regions intersect under the rebased coordinate system.
    #[error("build step region [{new_start}, {new_end}) intersects an existing change [{existing_start}, {existing_end})")]
    ActionBuildStepIntersect {
        new_start: usize,
        new_end: usize,
        existing_start: usize,
        existing_end: usize,
    },

    /// Two `FileChange` regions intersect under the rebased coordinate system.
    #[error("file change region [{new_start}, {new_end}) in '{file}' intersects an existing change [{existing_start}, {existing_end})")]
    ActionFileIntersect {
        file: String,
        new_start: usize,
        new_end: usize,
        existing_start: usize,
        existing_end: usize,
    },

    /// A region was constructed with `end < start`.
    #[error("invalid region: end {end} is before start {start}")]
    InvalidRegion { start: usize, end: usize },

    /// A build was attempted with no builders configured for the active target.
    #[error("no builders configured for target '{target}' of project at {root}")]
    BuilderUndefined { root: String, target: String },

    /// A concurrent build was attempted for a project root already building.
    #[error("project at {root} is already building")]
    ProcessMultiBuild { root: String },

    /// A config mutation was attempted while the project is building.
    #[error("cannot update project at {root} while it is building")]
    ProcessUpdateUnderBuild { root: String },

    /// The project root does not exist on disk.
    #[error("project root does not exist: {path}")]
    RootNoExist { path: String },

    /// A cache file's `__type__` discriminator did not match what was expected.
    #[error("cache file {path} has unexpected type tag '{found}', expected '{expected}'")]
    CacheTypeMismatch {
        path: String,
        expected: String,
        found: String,
    },

    /// A template literal referenced a name not present in the project's constant map.
    #[error("unknown template literal '${{{name}}}' in '{source_text}'")]
    UnknownTemplateLiteral { name: String, source_text: String },

    /// Generic I/O failure, wrapped with enough context to act on.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// Generic JSON (de)serialization failure, wrapped with context.
    #[error("JSON error at {context}: {source}")]
    Json {
        context: String,
        #[source]
        source: serde_json::Error,
    },

    /// A builder's subprocess could not be spawned at all (as opposed to exiting non-zero).
    #[error("failed to spawn builder '{builder}': {message}")]
    BuilderSpawnFail { builder: String, message: String },
}

/// Convenience type alias for Results with [`WebinizerError`].
pub type Result<T> = std::result::Result<T, WebinizerError>;

impl WebinizerError {
    /// Stable machine-readable kind string, matching the taxonomy in the spec.
    pub fn kind(&self) -> &'static str {
        match self {
            WebinizerError::InitToolchainCheckFail { .. } => "INIT_TOOLCHAIN_CHECK_FAIL",
            WebinizerError::InitModuleLoadFail { .. } => "INIT_MODULE_LOAD_FAIL",
            WebinizerError::InitModuleDirNoExist { .. } => "INIT_MODULE_DIR_NOEXT",
            WebinizerError::JsonFactoryDupReg { .. } => "JSONFACTORY_DUP_REG",
            WebinizerError::JsonFactoryDeserializeFail { .. } => "JSONFACTORY_DESERIALIZE_FAIL",
            WebinizerError::ActionBuildStepIntersect { .. } => "ACTION_BUILDSTEP_INTERSECT",
            WebinizerError::ActionFileIntersect { .. } => "ACTION_FILE_INTERSECT",
            WebinizerError::InvalidRegion { .. } => "INVALID_REGION",
            WebinizerError::BuilderUndefined { .. } => "BUILDER_UNDEFINED",
            WebinizerError::ProcessMultiBuild { .. } => "PROCESS_MULTI_BUILD",
            WebinizerError::ProcessUpdateUnderBuild { .. } => "PROCESS_UPDATE_UNDER_BUILD",
            WebinizerError::RootNoExist { .. } => "ROOT_NOEXT",
            WebinizerError::CacheTypeMismatch { .. } => "CACHE_TYPE_MISMATCH",
            WebinizerError::UnknownTemplateLiteral { .. } => "UNKNOWN_TEMPLATE_LITERAL",
            WebinizerError::Io { .. } => "IO_ERROR",
            WebinizerError::Json { .. } => "JSON_ERROR",
            WebinizerError::BuilderSpawnFail { .. } => "BUILDER_SPAWN_FAIL",
        }
    }
}
