//! Project model
//!
//! A [`Project`] is identified by its absolute root path. It owns a persisted
//! [`ProjectConfig`] (the `config.json` cache file), gives access to the other
//! three cache files (log, recipe, result), and exposes the [`template`] constant
//! map used to expand `${projectRoot}`-style markers found anywhere in the config.
//!
//! Projects are constructed per API call rather than kept alive as a long-lived
//! owning graph: a project's `dependencies` field names other project roots by
//! path, and callers build an ephemeral [`Project`] for each one on demand. This
//! keeps cyclic dependency graphs between projects from ever becoming cycles of
//! Rust ownership.

use crate::cache::{self, CacheDocument};
use crate::errors::{Result, WebinizerError};
use crate::template::{ConstantMap, KNOWN_NAMES};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::{debug, instrument};

/// Compiler/linker flag strings for one environment slice.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Envs {
    #[serde(default)]
    pub cflags: String,
    #[serde(default)]
    pub ldflags: String,
}

impl Envs {
    /// Concatenate `other`'s flags after this one's, separated by a single space,
    /// with surrounding whitespace collapsed. Used to build the overall env from
    /// the project's own env plus each dependency's published env.
    pub fn merged_with(&self, other: &Envs) -> Envs {
        Envs {
            cflags: join_nonempty(&self.cflags, &other.cflags),
            ldflags: join_nonempty(&self.ldflags, &other.ldflags),
        }
    }
}

fn join_nonempty(a: &str, b: &str) -> String {
    let a = a.trim();
    let b = b.trim();
    match (a.is_empty(), b.is_empty()) {
        (true, true) => String::new(),
        (true, false) => b.to_string(),
        (false, true) => a.to_string(),
        (false, false) => format!("{a} {b}"),
    }
}

/// `pkg-config` environment for a build target.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PkgConfigEnv {
    #[serde(default)]
    pub prefix: Option<String>,
    #[serde(default)]
    pub libdir: Option<String>,
}

/// Closed set of named feature toggles with documented cflags/ldflags effects,
/// plus an open sidecar for forward-compatible unknown keys.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct BuildOptions {
    /// Implies `-pthread` on both cflags and ldflags.
    #[serde(default)]
    pub need_pthread: bool,
    /// No direct flag effect; consulted by `MainLoopAdvisor`-style extensions to
    /// suggest `emscripten_set_main_loop` usage.
    #[serde(default)]
    pub need_main_loop: bool,
    /// Implies `-msimd128` on cflags.
    #[serde(default)]
    pub need_simd: bool,
    /// Implies `-sMEMORY64=1` on cflags and ldflags.
    #[serde(default)]
    pub need_wasm64: bool,
    /// Unknown option keys, preserved verbatim so newer clients' settings survive
    /// a round trip through an older engine.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, Value>,
}

impl BuildOptions {
    /// Apply this target's known flags onto `envs`, merging (not replacing) via
    /// the same `merge` semantics as [`crate::action::update_args`].
    pub fn apply_implied_flags(&self, envs: &mut Envs) {
        if self.need_pthread {
            envs.cflags = crate::action::update_args(&envs.cflags, &[crate::action::ArgEdit::merge("-pthread", None)]);
            envs.ldflags = crate::action::update_args(&envs.ldflags, &[crate::action::ArgEdit::merge("-pthread", None)]);
        }
        if self.need_simd {
            envs.cflags = crate::action::update_args(&envs.cflags, &[crate::action::ArgEdit::merge("-msimd128", None)]);
        }
        if self.need_wasm64 {
            envs.cflags = crate::action::update_args(
                &envs.cflags,
                &[crate::action::ArgEdit::merge("-sMEMORY64", Some("1"))],
            );
            envs.ldflags = crate::action::update_args(
                &envs.ldflags,
                &[crate::action::ArgEdit::merge("-sMEMORY64", Some("1"))],
            );
        }
    }
}

/// A persisted build-step descriptor. The concrete executable behavior for a
/// given `type_tag` lives in [`crate::builder`]; this struct is the serializable
/// shape stored in `config.json`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct BuilderRecord {
    #[serde(rename = "__type__")]
    pub type_tag: String,
    pub id: usize,
    pub root_build_file_path: String,
    #[serde(default)]
    pub args: String,
}

impl BuilderRecord {
    pub fn new(type_tag: impl Into<String>, id: usize, root_build_file_path: impl Into<String>, args: impl Into<String>) -> Self {
        Self {
            type_tag: type_tag.into(),
            id,
            root_build_file_path: root_build_file_path.into(),
            args: args.into(),
        }
    }
}

/// Per-target build configuration: the ordered step list plus everything a
/// builder or advisor needs to know about how this target should be built.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct BuildConfig {
    #[serde(default)]
    pub builders: Vec<BuilderRecord>,
    #[serde(default)]
    pub envs: Envs,
    #[serde(default)]
    pub options: BuildOptions,
    #[serde(default)]
    pub pkg_config: PkgConfigEnv,
    #[serde(default)]
    pub exported_funcs: Vec<String>,
    #[serde(default)]
    pub preload_files: Vec<String>,
    /// Whether this target produces a library consumed by other projects
    /// (affects `MakeBuilder`'s `PREFIX=` injection, see [`crate::builder`]).
    #[serde(default)]
    pub is_library: bool,
}

impl BuildConfig {
    /// Re-derive `envs` from `options`, preserving any manually-added flags that
    /// are not themselves implied by an option (idempotent: calling this twice
    /// in a row yields the same `envs` as calling it once, since the underlying
    /// `update_args` merge is idempotent for already-present flags).
    pub fn refresh_envs_from_options(&mut self) {
        self.options.apply_implied_flags(&mut self.envs);
    }
}

/// Top-level, persisted project configuration. This is `config.json`'s payload.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ProjectConfig {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub desc: String,
    #[serde(default)]
    pub img: String,
    #[serde(default)]
    pub use_default_config: bool,
    #[serde(default)]
    pub build_targets: IndexMap<String, BuildConfig>,
    /// Per-dependency envs as published by each dependency, keyed by dependency root.
    #[serde(default)]
    pub overall_envs_map: IndexMap<String, Envs>,
    #[serde(default)]
    pub overall_envs: Envs,
    /// Name of the currently active entry in `build_targets`.
    #[serde(default)]
    pub target: String,
    /// Dependency project roots, in build order.
    #[serde(default)]
    pub dependencies: Vec<String>,
    #[serde(default)]
    pub resolutions: IndexMap<String, String>,
    /// Roots of projects that depend on this one; used to propagate
    /// `reset_build_status` upward.
    #[serde(default)]
    pub required_by: Vec<String>,
}

impl CacheDocument for ProjectConfig {
    fn type_tag() -> &'static str {
        "Config"
    }
}

impl ProjectConfig {
    pub fn active_target(&self) -> Option<&BuildConfig> {
        self.build_targets.get(&self.target)
    }

    pub fn active_target_mut(&mut self) -> Option<&mut BuildConfig> {
        self.build_targets.get_mut(&self.target)
    }

    /// Recompute `overall_envs` as this target's own env merged with every
    /// dependency's published env, in `dependencies` order.
    pub fn recompute_overall_envs(&mut self) {
        let mut merged = self
            .active_target()
            .map(|t| t.envs.clone())
            .unwrap_or_default();
        for dep_root in &self.dependencies {
            if let Some(dep_envs) = self.overall_envs_map.get(dep_root) {
                merged = merged.merged_with(dep_envs);
            }
        }
        self.overall_envs = merged;
    }
}

/// `log.json`: the interleaved stdout/stderr record of the most recent build.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct LogCacheFile {
    #[serde(default)]
    pub entries: Vec<LogEntry>,
}

impl CacheDocument for LogCacheFile {
    fn type_tag() -> &'static str {
        "Log"
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct LogEntry {
    pub builder_id: Option<usize>,
    pub stream: LogStream,
    pub text: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogStream {
    Stdout,
    Stderr,
}

/// `recipe.json`: the ordered list of recipes produced by the most recent
/// failed build, stored as raw JSON since [`crate::advisor::Recipe`] holds
/// trait objects and serializes itself via `to_json` rather than `derive(Serialize)`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct RecipeCacheFile {
    #[serde(default)]
    pub recipes: Vec<Value>,
}

impl CacheDocument for RecipeCacheFile {
    fn type_tag() -> &'static str {
        "Recipe"
    }
}

/// `result.json`: a summary of the most recent build attempt.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ResultCacheFile {
    pub success: bool,
    pub target: String,
    pub started_at: String,
    pub finished_at: String,
    pub duration_ms: i64,
}

impl CacheDocument for ResultCacheFile {
    fn type_tag() -> &'static str {
        "Result"
    }
}

/// A project rooted at an absolute path on disk.
#[derive(Debug)]
pub struct Project {
    pub root: PathBuf,
    pub constants: ConstantMap,
    config: Mutex<ProjectConfig>,
}

impl Project {
    /// Open (or initialize) the project at `root`, expanding its dist directory
    /// as `<root>/dist` and recording `pool_dir` as `${projectPool}` — the pool
    /// itself is managed by an external collaborator (see spec §1 out-of-scope).
    #[instrument(skip(root, pool_dir))]
    pub fn new(root: impl Into<PathBuf>, pool_dir: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        if !root.exists() {
            return Err(WebinizerError::RootNoExist {
                path: root.display().to_string(),
            });
        }
        let dist = root.join("dist");
        let constants = ConstantMap::new(
            root.display().to_string(),
            dist.display().to_string(),
            pool_dir.into().display().to_string(),
        );

        let config_path = Self::cache_dir(&root).join("config.json");
        let loaded = cache::read_cache_file::<ProjectConfig>(&config_path)?.unwrap_or_default();
        debug!(root = %root.display(), "loaded project config");

        Ok(Self {
            root,
            constants,
            config: Mutex::new(loaded),
        })
    }

    fn cache_dir(root: &Path) -> PathBuf {
        root.join(".webinizer")
    }

    pub fn config_path(&self) -> PathBuf {
        Self::cache_dir(&self.root).join("config.json")
    }

    pub fn log_path(&self) -> PathBuf {
        Self::cache_dir(&self.root).join("log.json")
    }

    pub fn recipe_path(&self) -> PathBuf {
        Self::cache_dir(&self.root).join("recipe.json")
    }

    pub fn result_path(&self) -> PathBuf {
        Self::cache_dir(&self.root).join("result.json")
    }

    /// Expand `${projectRoot}`/`${projectDist}`/`${projectPool}` tokens in `s`.
    pub fn expand(&self, s: &str) -> String {
        self.constants.expand(s)
    }

    /// Report any `${name}` tokens in `s` that are not among this project's
    /// known constant names.
    pub fn validate_template_literals(&self, s: &str) -> Vec<String> {
        crate::template::validate_template_literals(s, KNOWN_NAMES)
    }

    pub fn read_config<R>(&self, f: impl FnOnce(&ProjectConfig) -> R) -> R {
        let guard = self.config.lock().unwrap();
        f(&guard)
    }

    pub fn mutate_config<R>(&self, f: impl FnOnce(&mut ProjectConfig) -> R) -> R {
        let mut guard = self.config.lock().unwrap();
        f(&mut guard)
    }

    pub fn config_snapshot(&self) -> ProjectConfig {
        self.config.lock().unwrap().clone()
    }

    pub fn persist_config(&self) -> Result<()> {
        let snapshot = self.config_snapshot();
        cache::write_cache_file(&self.config_path(), &snapshot)
    }

    /// Snapshot `config.json` to a sibling `backup_config.json` before a risky
    /// mutation (e.g. replaying a possibly-bad recipe).
    pub fn backup_config(&self) -> Result<()> {
        cache::backup_cache_file(&self.config_path())
    }

    /// Restore `config.json` from the backup taken by [`Project::backup_config`].
    pub fn restore_config_backup(&self) -> Result<()> {
        cache::restore_cache_file(&self.config_path())
    }

    /// Clear the log, result, and recipe caches; called at the start of a build.
    pub fn clear_build_caches(&self) -> Result<()> {
        cache::clear_cache_file(&self.log_path())?;
        cache::clear_cache_file(&self.result_path())?;
        cache::clear_cache_file(&self.recipe_path())?;
        Ok(())
    }

    pub fn append_log_entry(&self, entry: LogEntry) -> Result<()> {
        let mut doc = cache::read_cache_file::<LogCacheFile>(&self.log_path())?.unwrap_or_default();
        doc.entries.push(entry);
        cache::write_cache_file(&self.log_path(), &doc)
    }

    pub fn persist_recipes(&self, recipes: &[crate::advisor::Recipe]) -> Result<()> {
        let doc = RecipeCacheFile {
            recipes: recipes.iter().map(|r| r.to_json()).collect(),
        };
        cache::write_cache_file(&self.recipe_path(), &doc)
    }

    pub fn persist_result(&self, result: &ResultCacheFile) -> Result<()> {
        cache::write_cache_file(&self.result_path(), result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn new_project() -> (tempfile::TempDir, Project) {
        let dir = tempdir().unwrap();
        let pool = dir.path().join("pool");
        let proj = Project::new(dir.path(), pool).unwrap();
        (dir, proj)
    }

    #[test]
    fn new_project_fails_when_root_missing() {
        let err = Project::new("/no/such/root/ever", "/tmp/pool").unwrap_err();
        assert_eq!(err.kind(), "ROOT_NOEXT");
    }

    #[test]
    fn config_round_trips_through_persist_and_reload() {
        let (dir, proj) = new_project();
        proj.mutate_config(|cfg| {
            cfg.name = "hello".to_string();
            cfg.target = "wasm".to_string();
            cfg.build_targets.insert("wasm".to_string(), BuildConfig::default());
        });
        proj.persist_config().unwrap();

        let reopened = Project::new(dir.path(), dir.path().join("pool")).unwrap();
        assert_eq!(reopened.read_config(|c| c.name.clone()), "hello");
        assert!(reopened.read_config(|c| c.build_targets.contains_key("wasm")));
    }

    #[test]
    fn template_expansion_uses_project_constants() {
        let (_dir, proj) = new_project();
        let expanded = proj.expand("${projectRoot}/Makefile");
        assert!(expanded.ends_with("/Makefile"));
        assert!(!expanded.contains("${"));
    }

    #[test]
    fn overall_envs_merge_self_and_dependencies() {
        let (_dir, proj) = new_project();
        proj.mutate_config(|cfg| {
            cfg.target = "wasm".to_string();
            let mut bc = BuildConfig::default();
            bc.envs.cflags = "-O2".to_string();
            cfg.build_targets.insert("wasm".to_string(), bc);
            cfg.dependencies = vec!["/dep".to_string()];
            cfg.overall_envs_map.insert(
                "/dep".to_string(),
                Envs {
                    cflags: "-Idep/include".to_string(),
                    ldflags: "-Ldep/lib".to_string(),
                },
            );
            cfg.recompute_overall_envs();
        });
        let overall = proj.read_config(|c| c.overall_envs.clone());
        assert_eq!(overall.cflags, "-O2 -Idep/include");
        assert_eq!(overall.ldflags, "-Ldep/lib");
    }

    #[test]
    fn build_options_imply_flags_idempotently() {
        let mut bc = BuildConfig::default();
        bc.options.need_pthread = true;
        bc.options.need_simd = true;
        bc.refresh_envs_from_options();
        let once = bc.envs.clone();
        bc.refresh_envs_from_options();
        assert_eq!(bc.envs, once);
        assert!(bc.envs.cflags.contains("-pthread"));
        assert!(bc.envs.cflags.contains("-msimd128"));
        assert!(bc.envs.ldflags.contains("-pthread"));
    }

    #[test]
    fn unknown_option_keys_round_trip_via_extra_map() {
        let json = serde_json::json!({
            "needPthread": true,
            "futureFlag": "keep-me"
        });
        let opts: BuildOptions = serde_json::from_value(json).unwrap();
        assert!(opts.need_pthread);
        assert_eq!(
            opts.extra.get("futureFlag").and_then(|v| v.as_str()),
            Some("keep-me")
        );
        let back = serde_json::to_value(&opts).unwrap();
        assert_eq!(back.get("futureFlag").and_then(|v| v.as_str()), Some("keep-me"));
    }
}
