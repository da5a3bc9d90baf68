//! Actions: the atomic remediation operations a [`crate::advisor::Recipe`] applies
//!
//! An `Action` is a typed-JSON record (dispatched through the `action` [`crate::registry::Registry`])
//! plus the behavior that applies it to a [`Project`] and, where relevant, the
//! per-build change managers. Actions never roll back on failure; a Recipe simply
//! stops applying its remaining actions (see [`crate::advisor::Recipe::apply`]).

use crate::change_manager::{BuildStepChangeManager, BuildStepRegion, FileChangeManager, FileRegion};
use crate::errors::Result;
use crate::project::{BuilderRecord, Project};
use serde_json::{json, Value};
use tracing::warn;

/// Per-build mutable state an [`Action`] may need beyond the project itself.
pub struct BuildContext {
    pub build_step_changes: BuildStepChangeManager,
    pub file_changes: FileChangeManager,
}

impl BuildContext {
    pub fn new() -> Self {
        Self {
            build_step_changes: BuildStepChangeManager::new(),
            file_changes: FileChangeManager::new(),
        }
    }
}

impl Default for BuildContext {
    fn default() -> Self {
        Self::new()
    }
}

/// A single remediation step. `apply` returns `Ok(false)` for an expected,
/// recoverable application failure (e.g. an intersecting region); it returns
/// `Err` only for conditions the caller cannot reasonably continue past.
pub trait Action: Send + Sync + std::fmt::Debug {
    fn type_tag(&self) -> &'static str;
    fn apply(&self, project: &Project, ctx: &mut BuildContext) -> Result<bool>;
    fn to_json(&self) -> Value;
}

/// How an [`ArgEdit`] mutates an existing whitespace-separated argument string.
#[derive(Debug, Clone, PartialEq, Eq)]
enum ArgEditKind {
    /// Add `option[=value]` if absent, or update the value of an existing
    /// occurrence in place (preserving its position).
    Merge,
    /// Replace the first occurrence of `option` with `option[=value]`, or
    /// append if absent.
    Replace,
    /// Remove `value` as a substring from the first matching token (or the
    /// whole token if `value` is `None`).
    Delete,
    /// Remove every occurrence of `option`.
    DeleteAll,
}

/// One requested edit to an argument string, as used by [`update_args`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArgEdit {
    kind: ArgEditKind,
    option: String,
    value: Option<String>,
}

impl ArgEdit {
    pub fn merge(option: impl Into<String>, value: Option<&str>) -> ArgEdit {
        ArgEdit {
            kind: ArgEditKind::Merge,
            option: option.into(),
            value: value.map(str::to_string),
        }
    }

    pub fn replace(option: impl Into<String>, value: Option<&str>) -> ArgEdit {
        ArgEdit {
            kind: ArgEditKind::Replace,
            option: option.into(),
            value: value.map(str::to_string),
        }
    }

    /// Remove `value` from the first matching token, e.g. `delete("-s", Some("MEMORY64=1"))`
    /// against `-sMEMORY64=1` leaves `-s`. Passing `None` drops the whole token.
    pub fn delete(option: impl Into<String>, value: Option<&str>) -> ArgEdit {
        ArgEdit {
            kind: ArgEditKind::Delete,
            option: option.into(),
            value: value.map(str::to_string),
        }
    }

    pub fn delete_all(option: impl Into<String>) -> ArgEdit {
        ArgEdit {
            kind: ArgEditKind::DeleteAll,
            option: option.into(),
            value: None,
        }
    }

    fn rendered(&self) -> String {
        match &self.value {
            Some(v) => format!("{}={}", self.option, v),
            None => self.option.clone(),
        }
    }

    /// True if `token` is this edit's option, either bare or as `option=value`.
    fn matches(&self, token: &str) -> bool {
        token == self.option || token.starts_with(&format!("{}=", self.option))
    }
}

/// Tokenize `old` with shell-lexing, apply every edit in order, and re-join with
/// single spaces. Tokens that cannot be shell-lexed (unbalanced quotes) are
/// treated as a single opaque token rather than failing the whole string.
pub fn update_args(old: &str, edits: &[ArgEdit]) -> String {
    let mut tokens: Vec<String> = shell_words::split(old).unwrap_or_else(|_| {
        old.split_whitespace().map(str::to_string).collect()
    });

    for edit in edits {
        match edit.kind {
            ArgEditKind::Merge => {
                if let Some(pos) = tokens.iter().position(|t| edit.matches(t)) {
                    tokens[pos] = edit.rendered();
                } else {
                    tokens.push(edit.rendered());
                }
            }
            ArgEditKind::Replace => {
                if let Some(pos) = tokens.iter().position(|t| edit.matches(t)) {
                    tokens[pos] = edit.rendered();
                } else {
                    tokens.push(edit.rendered());
                }
            }
            ArgEditKind::Delete => {
                if let Some(pos) = tokens.iter().position(|t| edit.matches(t)) {
                    match &edit.value {
                        Some(substring) => {
                            let stripped = tokens[pos].replace(substring.as_str(), "");
                            if stripped.is_empty() {
                                tokens.remove(pos);
                            } else {
                                tokens[pos] = stripped;
                            }
                        }
                        None => {
                            tokens.remove(pos);
                        }
                    }
                }
            }
            ArgEditKind::DeleteAll => {
                tokens.retain(|t| !edit.matches(t));
            }
        }
    }

    shell_words::join(tokens)
}

fn apply_failed(kind: &str, err: &crate::errors::WebinizerError) -> Result<bool> {
    warn!(action = kind, error = %err, "action application failed, recipe will stop here");
    Ok(false)
}

/// Edits one builder's `args` string (e.g. extra `emcc` flags) via [`ArgEdit`]s.
#[derive(Debug, Clone)]
pub struct BuilderArgsChangeAction {
    pub builder_id: usize,
    pub edits: Vec<ArgEdit>,
}

impl Action for BuilderArgsChangeAction {
    fn type_tag(&self) -> &'static str {
        "BuilderArgsChangeAction"
    }

    fn apply(&self, project: &Project, _ctx: &mut BuildContext) -> Result<bool> {
        let applied = project.mutate_config(|cfg| -> bool {
            let Some(target) = cfg.active_target_mut() else {
                return false;
            };
            let Some(builder) = target.builders.iter_mut().find(|b| b.id == self.builder_id) else {
                return false;
            };
            builder.args = update_args(&builder.args, &self.edits);
            true
        });
        Ok(applied)
    }

    fn to_json(&self) -> Value {
        json!({
            "__type__": self.type_tag(),
            "builderId": self.builder_id,
            "edits": self.edits.iter().map(|e| {
                json!({
                    "kind": format!("{:?}", e.kind),
                    "option": e.option,
                    "value": e.value,
                })
            }).collect::<Vec<_>>(),
        })
    }
}

/// Splices the active target's builder list at a region authored against the
/// pre-advise coordinate system.
#[derive(Debug, Clone)]
pub struct BuildStepChangeAction {
    pub target: String,
    pub region: BuildStepRegion,
    pub new_steps: Vec<BuilderRecord>,
}

impl Action for BuildStepChangeAction {
    fn type_tag(&self) -> &'static str {
        "BuildStepChangeAction"
    }

    fn apply(&self, project: &Project, ctx: &mut BuildContext) -> Result<bool> {
        match ctx
            .build_step_changes
            .apply(project, &self.target, self.region, self.new_steps.clone())
        {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == "ACTION_BUILDSTEP_INTERSECT" => apply_failed(self.type_tag(), &e),
            Err(e) => Err(e),
        }
    }

    fn to_json(&self) -> Value {
        json!({
            "__type__": self.type_tag(),
            "target": self.target,
            "region": {"start": self.region.start, "end": self.region.end},
            "newSteps": self.new_steps,
        })
    }
}

/// Merges an [`Envs`](crate::project::Envs)-shaped patch onto the active target's envs.
#[derive(Debug, Clone)]
pub struct ConfigEnvChangeAction {
    pub cflags_edits: Vec<ArgEdit>,
    pub ldflags_edits: Vec<ArgEdit>,
}

impl Action for ConfigEnvChangeAction {
    fn type_tag(&self) -> &'static str {
        "ConfigEnvChangeAction"
    }

    fn apply(&self, project: &Project, _ctx: &mut BuildContext) -> Result<bool> {
        let applied = project.mutate_config(|cfg| -> bool {
            let Some(target) = cfg.active_target_mut() else {
                return false;
            };
            target.envs.cflags = update_args(&target.envs.cflags, &self.cflags_edits);
            target.envs.ldflags = update_args(&target.envs.ldflags, &self.ldflags_edits);
            true
        });
        if applied {
            project.mutate_config(|cfg| cfg.recompute_overall_envs());
        }
        Ok(applied)
    }

    fn to_json(&self) -> Value {
        json!({
            "__type__": self.type_tag(),
            "cflagsEdits": self.cflags_edits.iter().map(|e| e.rendered()).collect::<Vec<_>>(),
            "ldflagsEdits": self.ldflags_edits.iter().map(|e| e.rendered()).collect::<Vec<_>>(),
        })
    }
}

/// Toggles one of the active target's known [`BuildOptions`](crate::project::BuildOptions) flags.
#[derive(Debug, Clone)]
pub struct ConfigOptionChangeAction {
    pub option: String,
    pub value: bool,
}

impl Action for ConfigOptionChangeAction {
    fn type_tag(&self) -> &'static str {
        "ConfigOptionChangeAction"
    }

    fn apply(&self, project: &Project, _ctx: &mut BuildContext) -> Result<bool> {
        let applied = project.mutate_config(|cfg| -> bool {
            let Some(target) = cfg.active_target_mut() else {
                return false;
            };
            match self.option.as_str() {
                "needPthread" => target.options.need_pthread = self.value,
                "needMainLoop" => target.options.need_main_loop = self.value,
                "needSimd" => target.options.need_simd = self.value,
                "needWasm64" => target.options.need_wasm64 = self.value,
                _ => return false,
            }
            target.refresh_envs_from_options();
            true
        });
        Ok(applied)
    }

    fn to_json(&self) -> Value {
        json!({
            "__type__": self.type_tag(),
            "option": self.option,
            "value": self.value,
        })
    }
}

/// Splices lines into a source file at a region authored against the pre-advise
/// coordinate system.
#[derive(Debug, Clone)]
pub struct FileChangeAction {
    pub region: FileRegion,
    pub new_lines: Vec<String>,
}

impl Action for FileChangeAction {
    fn type_tag(&self) -> &'static str {
        "FileChangeAction"
    }

    fn apply(&self, project: &Project, ctx: &mut BuildContext) -> Result<bool> {
        match ctx.file_changes.apply(project, self.region.clone(), self.new_lines.clone()) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == "ACTION_FILE_INTERSECT" => apply_failed(self.type_tag(), &e),
            Err(e) => Err(e),
        }
    }

    fn to_json(&self) -> Value {
        json!({
            "__type__": self.type_tag(),
            "file": self.region.file,
            "lineStart": self.region.line_start,
            "lineEnd": self.region.line_end,
            "newLines": self.new_lines,
        })
    }
}

/// Presents informational text to the user with no project mutation; always
/// succeeds.
#[derive(Debug, Clone)]
pub struct ShowSuggestionAction {
    pub message: String,
}

impl Action for ShowSuggestionAction {
    fn type_tag(&self) -> &'static str {
        "ShowSuggestionAction"
    }

    fn apply(&self, _project: &Project, _ctx: &mut BuildContext) -> Result<bool> {
        tracing::info!(message = %self.message, "suggestion");
        Ok(true)
    }

    fn to_json(&self) -> Value {
        json!({ "__type__": self.type_tag(), "message": self.message })
    }
}

/// Points the user at the recipe queued for a dependency project; always
/// succeeds (the dependency's own build handles actually applying it).
#[derive(Debug, Clone)]
pub struct ShowDepRecipeAction {
    pub dependency_root: String,
    pub recipe_description: String,
}

impl Action for ShowDepRecipeAction {
    fn type_tag(&self) -> &'static str {
        "ShowDepRecipeAction"
    }

    fn apply(&self, _project: &Project, _ctx: &mut BuildContext) -> Result<bool> {
        tracing::info!(
            dependency = %self.dependency_root,
            recipe = %self.recipe_description,
            "dependency recipe queued"
        );
        Ok(true)
    }

    fn to_json(&self) -> Value {
        json!({
            "__type__": self.type_tag(),
            "dependencyRoot": self.dependency_root,
            "recipeDescription": self.recipe_description,
        })
    }
}

/// Requests free-form input from the user (e.g. a missing `--prefix`);
/// the caller is expected to have resolved `answer` before construction, since
/// this engine has no interactive prompt of its own.
#[derive(Debug, Clone)]
pub struct GetUserInputAction {
    pub prompt: String,
    pub answer: Option<String>,
}

impl Action for GetUserInputAction {
    fn type_tag(&self) -> &'static str {
        "GetUserInputAction"
    }

    fn apply(&self, _project: &Project, _ctx: &mut BuildContext) -> Result<bool> {
        Ok(self.answer.is_some())
    }

    fn to_json(&self) -> Value {
        json!({
            "__type__": self.type_tag(),
            "prompt": self.prompt,
            "answer": self.answer,
        })
    }
}

/// Register every built-in Action's factory with the shared `action` registry.
/// Extensions may register their own tags in the same registry at load time.
pub fn register_builtins(registry: &crate::registry::Registry<std::sync::Arc<dyn Action>>) -> Result<()> {
    use std::sync::Arc;

    registry.register("ShowSuggestionAction", |obj, _index| {
        let message = obj.get("message")?.as_str()?.to_string();
        Some(Arc::new(ShowSuggestionAction { message }) as Arc<dyn Action>)
    })?;

    registry.register("GetUserInputAction", |obj, _index| {
        let prompt = obj.get("prompt")?.as_str()?.to_string();
        let answer = obj.get("answer").and_then(|v| v.as_str()).map(str::to_string);
        Some(Arc::new(GetUserInputAction { prompt, answer }) as Arc<dyn Action>)
    })?;

    registry.register("ShowDepRecipeAction", |obj, _index| {
        let dependency_root = obj.get("dependencyRoot")?.as_str()?.to_string();
        let recipe_description = obj.get("recipeDescription")?.as_str()?.to_string();
        Some(Arc::new(ShowDepRecipeAction {
            dependency_root,
            recipe_description,
        }) as Arc<dyn Action>)
    })?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn merge_appends_when_absent() {
        let out = update_args("-O2", &[ArgEdit::merge("-pthread", None)]);
        assert_eq!(out, "-O2 -pthread");
    }

    #[test]
    fn merge_is_idempotent_when_present() {
        let once = update_args("-O2 -pthread", &[ArgEdit::merge("-pthread", None)]);
        let twice = update_args(&once, &[ArgEdit::merge("-pthread", None)]);
        assert_eq!(once, twice);
        assert_eq!(once, "-O2 -pthread");
    }

    #[test]
    fn merge_updates_value_in_place() {
        let out = update_args(
            "-sMEMORY64=0 -O2",
            &[ArgEdit::merge("-sMEMORY64", Some("1"))],
        );
        assert_eq!(out, "-sMEMORY64=1 -O2");
    }

    #[test]
    fn replace_rewrites_only_the_first_occurrence() {
        let out = update_args(
            "-sASSERTIONS=1 -O2 -sASSERTIONS=1",
            &[ArgEdit::replace("-sASSERTIONS", Some("0"))],
        );
        assert_eq!(out, "-sASSERTIONS=0 -O2 -sASSERTIONS=1");
    }

    #[test]
    fn delete_removes_whole_token_when_no_value_given() {
        let out = update_args("-g -g -O2", &[ArgEdit::delete("-g", None)]);
        assert_eq!(out, "-g -O2");
    }

    #[test]
    fn delete_strips_substring_from_first_matching_token() {
        let out = update_args(
            "-sMEMORY64=1 -O2",
            &[ArgEdit::delete("-sMEMORY64", Some("=1"))],
        );
        assert_eq!(out, "-sMEMORY64 -O2");
    }

    #[test]
    fn delete_all_removes_every_occurrence() {
        let out = update_args("-g -g -O2", &[ArgEdit::delete_all("-g")]);
        assert_eq!(out, "-O2");
    }

    #[test]
    fn update_args_preserves_quoted_tokens() {
        let out = update_args(r#"-DNAME="hello world""#, &[ArgEdit::merge("-O2", None)]);
        assert_eq!(out, r#"-DNAME="hello world" -O2"#);
    }

    #[test]
    fn get_user_input_fails_without_answer() {
        let action = GetUserInputAction {
            prompt: "prefix?".to_string(),
            answer: None,
        };
        let dir = tempfile::tempdir().unwrap();
        let project = Project::new(dir.path(), dir.path().join("pool")).unwrap();
        let mut ctx = BuildContext::new();
        assert!(!action.apply(&project, &mut ctx).unwrap());
    }

    #[test]
    fn get_user_input_succeeds_with_answer() {
        let action = GetUserInputAction {
            prompt: "prefix?".to_string(),
            answer: Some("/usr/local".to_string()),
        };
        let dir = tempfile::tempdir().unwrap();
        let project = Project::new(dir.path(), dir.path().join("pool")).unwrap();
        let mut ctx = BuildContext::new();
        assert!(action.apply(&project, &mut ctx).unwrap());
    }

    #[test]
    fn build_step_change_action_fails_gracefully_on_intersect() {
        let dir = tempfile::tempdir().unwrap();
        let project = Project::new(dir.path(), dir.path().join("pool")).unwrap();
        project.mutate_config(|cfg| {
            cfg.target = "wasm".to_string();
            let mut bc = crate::project::BuildConfig::default();
            bc.builders.push(BuilderRecord::new("EmccBuilder", 0, "${projectRoot}", ""));
            cfg.build_targets.insert("wasm".to_string(), bc);
        });
        let mut ctx = BuildContext::new();

        let a = BuildStepChangeAction {
            target: "wasm".to_string(),
            region: BuildStepRegion::new(0, 0).unwrap(),
            new_steps: vec![BuilderRecord::new("CMakeBuilder", 0, "${projectRoot}", "")],
        };
        assert!(a.apply(&project, &mut ctx).unwrap());

        let b = BuildStepChangeAction {
            target: "wasm".to_string(),
            region: BuildStepRegion::new(0, 1).unwrap(),
            new_steps: vec![BuilderRecord::new("ConfigureBuilder", 0, "${projectRoot}", "")],
        };
        assert!(!b.apply(&project, &mut ctx).unwrap());
    }
}
