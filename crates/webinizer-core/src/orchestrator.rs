//! Build orchestration
//!
//! Drives one project's active build target through its builder list,
//! dispatching failures to an [`AdviseManager`] and persisting the resulting
//! recipes/result/log cache files. Build status is tracked process-wide,
//! keyed by project root, so concurrent API calls against the same project
//! can be rejected with `PROCESS_MULTI_BUILD` rather than corrupting its
//! config file.

use crate::action::BuildContext;
use crate::advisor::{AdviseManager, AdviseRequest, Advisor, PlainAdviseRequest, Recipe};
use crate::builder::{self, BuildOutcome};
use crate::engine_config::EngineConfig;
use crate::errors::{Result, WebinizerError};
use crate::project::{Project, ResultCacheFile};
use serde_json::Value;
use std::collections::HashMap;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::{Arc, Mutex, OnceLock};
use tracing::{info, warn};

/// Process-wide status of a project's build target, keyed by project root.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildStatus {
    /// Never built, or reset back to a clean slate.
    IdleDefault,
    IdleSuccess,
    IdleFail,
    Building,
    /// Building with recipes queued from a previous failed attempt applied first.
    BuildingWithRecipes,
}

impl BuildStatus {
    fn is_building(self) -> bool {
        matches!(self, BuildStatus::Building | BuildStatus::BuildingWithRecipes)
    }
}

fn status_map() -> &'static Mutex<HashMap<PathBuf, BuildStatus>> {
    static MAP: OnceLock<Mutex<HashMap<PathBuf, BuildStatus>>> = OnceLock::new();
    MAP.get_or_init(|| Mutex::new(HashMap::new()))
}

/// Current status of the project at `root`, defaulting to `IdleDefault` for a
/// root never seen before.
pub fn build_status(root: &Path) -> BuildStatus {
    status_map()
        .lock()
        .unwrap()
        .get(root)
        .copied()
        .unwrap_or(BuildStatus::IdleDefault)
}

fn set_build_status(root: &Path, status: BuildStatus) {
    status_map().lock().unwrap().insert(root.to_path_buf(), status);
}

/// Reject a config mutation attempted while `project` is mid-build.
pub fn guard_update(project: &Project) -> Result<()> {
    if build_status(&project.root).is_building() {
        return Err(WebinizerError::ProcessUpdateUnderBuild {
            root: project.root.display().to_string(),
        });
    }
    Ok(())
}

/// Reset `project` back to `IdleDefault`, propagating to every project that
/// depends on it (its `required_by` list) regardless of `hard_reset` — a
/// dependency's status can't be trusted stale once it's reset, so dependents
/// must drop back to `IdleDefault` too. Fails with `PROCESS_UPDATE_UNDER_BUILD`
/// without resetting anything if `project` or any dependent is mid-build.
/// `hard_reset` additionally clears the project's log/recipe/result caches,
/// wiping the record of the last attempt rather than just its status.
pub fn reset_build_status(project: &Project, hard_reset: bool) -> Result<()> {
    guard_update(project)?;
    let required_by = project.read_config(|cfg| cfg.required_by.clone());
    for dependent_root in &required_by {
        if build_status(Path::new(dependent_root)).is_building() {
            return Err(WebinizerError::ProcessUpdateUnderBuild {
                root: dependent_root.clone(),
            });
        }
    }

    set_build_status(&project.root, BuildStatus::IdleDefault);
    for dependent_root in &required_by {
        set_build_status(Path::new(dependent_root), BuildStatus::IdleDefault);
    }

    if hard_reset {
        project.clear_build_caches()?;
    }
    Ok(())
}

/// The outcome of one `build()` call: the persisted result summary plus any
/// recipes produced along the way (empty on success).
#[derive(Debug)]
pub struct BuildReport {
    pub result: ResultCacheFile,
    pub recipes: Vec<Recipe>,
}

/// Run one build pass for `project`'s active target.
///
/// If `recipes_to_apply_first` is given, each recipe is applied (in order,
/// stopping at the first action failure within a recipe, but continuing on
/// to the next recipe regardless) before any builder runs — this is how a
/// user-approved fix from a previous failed build gets folded in. Builders
/// then run in order; the first to fail stops the build and its queued
/// `ErrorAdviseRequest`s are drained through `advisors` to produce the
/// recipes returned to the caller for the next attempt.
// `build` recurses into itself (via `run_build`) to build dependency projects.
// Returning a named `Pin<Box<dyn Future + Send>>` instead of an opaque `async
// fn` future breaks the circular Send-inference that recursive async fns
// otherwise hit (the recursive call site already names this same boxed type).
pub fn build<'a>(
    project: &'a Project,
    config: &'a EngineConfig,
    advisors: Vec<Arc<dyn Advisor>>,
    recipes_to_apply_first: Option<Vec<Recipe>>,
) -> Pin<Box<dyn Future<Output = Result<BuildReport>> + Send + 'a>> {
    use tracing::Instrument;
    let span = tracing::info_span!("build", root = %project.root.display());
    Box::pin(
        async move {
            if build_status(&project.root).is_building() {
                return Err(WebinizerError::ProcessMultiBuild {
                    root: project.root.display().to_string(),
                });
            }

            let has_prior_recipes = recipes_to_apply_first.is_some();
            set_build_status(
                &project.root,
                if has_prior_recipes {
                    BuildStatus::BuildingWithRecipes
                } else {
                    BuildStatus::Building
                },
            );

            let outcome = run_build(project, config, advisors, recipes_to_apply_first).await;

            // Always clear the in-progress marker, whatever run_build returned.
            match &outcome {
                Ok(report) => {
                    set_build_status(
                        &project.root,
                        if report.result.success {
                            BuildStatus::IdleSuccess
                        } else {
                            BuildStatus::IdleFail
                        },
                    );
                }
                Err(_) => set_build_status(&project.root, BuildStatus::IdleFail),
            }

            outcome
        }
        .instrument(span),
    )
}

async fn run_build(
    project: &Project,
    config: &EngineConfig,
    advisors: Vec<Arc<dyn Advisor>>,
    recipes_to_apply_first: Option<Vec<Recipe>>,
) -> Result<BuildReport> {
    project.clear_build_caches()?;

    let started_at = chrono::Utc::now().to_rfc3339();
    let target = project.read_config(|cfg| cfg.target.clone());

    let mut ctx = BuildContext::new();
    if let Some(recipes) = &recipes_to_apply_first {
        project.backup_config()?;
        for recipe in recipes {
            match recipe.apply(project, &mut ctx) {
                Ok(true) => info!(recipe_id = recipe.id, "recipe applied"),
                Ok(false) => warn!(recipe_id = recipe.id, "recipe application stopped early"),
                Err(e) => warn!(recipe_id = recipe.id, error = %e, "recipe application errored"),
            }
        }
        if let Err(e) = project.persist_config() {
            warn!(error = %e, "failed to persist config after applying recipes, restoring backup");
            project.restore_config_backup()?;
            return Err(e);
        }
    }

    let builders = project
        .read_config(|cfg| cfg.active_target().map(|t| t.builders.clone()))
        .ok_or_else(|| WebinizerError::BuilderUndefined {
            root: project.root.display().to_string(),
            target: target.clone(),
        })?;
    if builders.is_empty() {
        return Err(WebinizerError::BuilderUndefined {
            root: project.root.display().to_string(),
            target,
        });
    }

    let mut advise_manager = AdviseManager::new(advisors.clone());

    let dependency_roots = project.read_config(|cfg| cfg.dependencies.clone());
    let pool_dir = project.constants.get("projectPool").unwrap_or_default().to_string();
    let mut dependency_recipes = Vec::new();
    for dep_root in &dependency_roots {
        if build_status(Path::new(dep_root)) == BuildStatus::IdleSuccess {
            continue;
        }
        let dep_project = match Project::new(dep_root, &pool_dir) {
            Ok(p) => p,
            Err(e) => {
                warn!(root = %dep_root, error = %e, "dependency project could not be opened");
                continue;
            }
        };
        let dep_advisors = advisors.clone();
        let dep_report = build(&dep_project, config, dep_advisors, None);
        match dep_report.await {
            Ok(report) if !report.result.success => dependency_recipes.extend(report.recipes),
            Ok(_) => {}
            Err(e) => warn!(root = %dep_root, error = %e, "dependency build failed to run"),
        }
    }

    if !dependency_recipes.is_empty() {
        advise_manager.queue_request(AdviseRequest::Plain(PlainAdviseRequest {
            tags: vec!["dep-build".to_string()],
            plain_data: Value::Null,
        }));
        let mut recipes = advise_manager.advise(project);
        recipes.extend(dependency_recipes);
        project.persist_recipes(&recipes)?;
        let finished_at = chrono::Utc::now().to_rfc3339();
        let result = ResultCacheFile {
            success: false,
            target: target.clone(),
            started_at,
            finished_at,
            duration_ms: 0,
        };
        project.persist_result(&result)?;
        return Ok(BuildReport { result, recipes });
    }

    advise_manager.queue_request(AdviseRequest::Plain(PlainAdviseRequest {
        tags: vec!["pre-build".to_string()],
        plain_data: Value::Null,
    }));
    let pre_build_recipes = advise_manager.advise(project);
    if !pre_build_recipes.is_empty() {
        project.persist_recipes(&pre_build_recipes)?;
        let finished_at = chrono::Utc::now().to_rfc3339();
        let result = ResultCacheFile {
            success: false,
            target: target.clone(),
            started_at,
            finished_at,
            duration_ms: 0,
        };
        project.persist_result(&result)?;
        return Ok(BuildReport { result, recipes: pre_build_recipes });
    }

    let mut success = true;

    for record in &builders {
        let Some(built) = builder::from_record(record) else {
            warn!(tag = %record.type_tag, "skipping builder with unrecognized type tag");
            continue;
        };
        let BuildOutcome { success: step_ok, .. } = built.build(project, config, &mut advise_manager).await?;
        if !step_ok {
            success = false;
            break;
        }
    }

    let recipes = if success {
        Vec::new()
    } else {
        advise_manager.advise(project)
    };

    if !recipes.is_empty() {
        project.persist_recipes(&recipes)?;
    }

    let finished_at = chrono::Utc::now().to_rfc3339();
    let result = ResultCacheFile {
        success,
        target,
        started_at,
        finished_at,
        duration_ms: 0,
    };
    project.persist_result(&result)?;

    Ok(BuildReport { result, recipes })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::project::{BuildConfig, BuilderRecord};
    use tempfile::tempdir;

    fn project_with_failing_builder() -> (tempfile::TempDir, Project) {
        let dir = tempdir().unwrap();
        let proj = Project::new(dir.path(), dir.path().join("pool")).unwrap();
        proj.mutate_config(|cfg| {
            cfg.target = "wasm".to_string();
            let mut bc = BuildConfig::default();
            bc.builders.push(BuilderRecord::new("NativeBuilder", 0, "${projectRoot}", ""));
            cfg.build_targets.insert("wasm".to_string(), bc);
        });
        (dir, proj)
    }

    #[test]
    fn guard_update_rejects_mutation_mid_build() {
        let dir = tempdir().unwrap();
        let proj = Project::new(dir.path(), dir.path().join("pool")).unwrap();
        set_build_status(&proj.root, BuildStatus::Building);
        let err = guard_update(&proj).unwrap_err();
        assert_eq!(err.kind(), "PROCESS_UPDATE_UNDER_BUILD");
        set_build_status(&proj.root, BuildStatus::IdleDefault);
    }

    #[test]
    fn reset_propagates_to_dependents_regardless_of_hard_reset() {
        let dir = tempdir().unwrap();
        let dependent_dir = tempdir().unwrap();
        let proj = Project::new(dir.path(), dir.path().join("pool")).unwrap();
        proj.mutate_config(|cfg| {
            cfg.required_by = vec![dependent_dir.path().display().to_string()];
        });
        set_build_status(&proj.root, BuildStatus::IdleFail);
        set_build_status(dependent_dir.path(), BuildStatus::IdleSuccess);

        reset_build_status(&proj, false).unwrap();

        assert_eq!(build_status(&proj.root), BuildStatus::IdleDefault);
        assert_eq!(build_status(dependent_dir.path()), BuildStatus::IdleDefault);
    }

    #[test]
    fn reset_fails_without_mutating_anything_if_a_dependent_is_building() {
        let dir = tempdir().unwrap();
        let dependent_dir = tempdir().unwrap();
        let proj = Project::new(dir.path(), dir.path().join("pool")).unwrap();
        proj.mutate_config(|cfg| {
            cfg.required_by = vec![dependent_dir.path().display().to_string()];
        });
        set_build_status(&proj.root, BuildStatus::IdleFail);
        set_build_status(dependent_dir.path(), BuildStatus::Building);

        let err = reset_build_status(&proj, false).unwrap_err();
        assert_eq!(err.kind(), "PROCESS_UPDATE_UNDER_BUILD");
        assert_eq!(build_status(&proj.root), BuildStatus::IdleFail);

        set_build_status(dependent_dir.path(), BuildStatus::IdleDefault);
    }

    #[test]
    fn hard_reset_clears_build_caches() {
        let dir = tempdir().unwrap();
        let proj = Project::new(dir.path(), dir.path().join("pool")).unwrap();
        proj.persist_result(&ResultCacheFile {
            success: true,
            target: "wasm".to_string(),
            started_at: "2026-01-01T00:00:00Z".to_string(),
            finished_at: "2026-01-01T00:00:01Z".to_string(),
            duration_ms: 1000,
        })
        .unwrap();

        reset_build_status(&proj, true).unwrap();

        assert!(crate::cache::read_cache_file::<ResultCacheFile>(&proj.result_path())
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn build_without_builders_fails_with_builder_undefined() {
        let dir = tempdir().unwrap();
        let proj = Project::new(dir.path(), dir.path().join("pool")).unwrap();
        proj.mutate_config(|cfg| {
            cfg.target = "wasm".to_string();
            cfg.build_targets.insert("wasm".to_string(), BuildConfig::default());
        });
        let config = EngineConfig::default();
        let err = build(&proj, &config, vec![], None).await.unwrap_err();
        assert_eq!(err.kind(), "BUILDER_UNDEFINED");
        assert_eq!(build_status(&proj.root), BuildStatus::IdleFail);
    }

    #[tokio::test]
    async fn concurrent_build_is_rejected() {
        let (_dir, proj) = project_with_failing_builder();
        set_build_status(&proj.root, BuildStatus::Building);
        let config = EngineConfig::default();
        let err = build(&proj, &config, vec![], None).await.unwrap_err();
        assert_eq!(err.kind(), "PROCESS_MULTI_BUILD");
        set_build_status(&proj.root, BuildStatus::IdleDefault);
    }

    fn project_with_succeeding_native_builder() -> (tempfile::TempDir, Project) {
        let dir = tempdir().unwrap();
        let proj = Project::new(dir.path(), dir.path().join("pool")).unwrap();
        proj.mutate_config(|cfg| {
            cfg.target = "wasm".to_string();
            let mut bc = BuildConfig::default();
            bc.builders.push(BuilderRecord::new("NativeBuilder", 0, "${projectRoot}", ""));
            cfg.build_targets.insert("wasm".to_string(), bc);
        });
        (dir, proj)
    }

    #[derive(Debug)]
    struct PreBuildGateAdvisor;

    impl crate::advisor::Advisor for PreBuildGateAdvisor {
        fn tag(&self) -> &'static str {
            "pre_build_gate"
        }

        fn priority(&self) -> i32 {
            10
        }

        fn advise(
            &self,
            _project: &Project,
            request: &AdviseRequest,
            _request_list: &[AdviseRequest],
            next_recipe_id: usize,
        ) -> crate::advisor::AdviseOutcome {
            if request.tags().iter().any(|t| t == "pre-build") {
                crate::advisor::AdviseOutcome::Recipe(Recipe::new(
                    next_recipe_id,
                    "needs pthread before building",
                    self.tag(),
                ))
            } else {
                crate::advisor::AdviseOutcome::NotHandled
            }
        }
    }

    #[tokio::test]
    async fn pre_build_advisor_blocks_the_build_without_running_any_builder() {
        let (_dir, proj) = project_with_succeeding_native_builder();
        let mut config = EngineConfig::default();
        config.cc_bin = "true".to_string();
        let advisors: Vec<Arc<dyn Advisor>> = vec![Arc::new(PreBuildGateAdvisor)];

        let report = build(&proj, &config, advisors, None).await.unwrap();

        assert!(!report.result.success);
        assert_eq!(report.recipes.len(), 1);
        assert_eq!(report.recipes[0].advisor_tag, "pre_build_gate");
        assert_eq!(build_status(&proj.root), BuildStatus::IdleFail);
    }

    #[tokio::test]
    async fn failing_dependency_blocks_the_dependent_build() {
        let dep_dir = tempdir().unwrap();
        let dep_proj = Project::new(dep_dir.path(), dep_dir.path().join("pool")).unwrap();
        dep_proj.mutate_config(|cfg| {
            cfg.target = "wasm".to_string();
            let mut bc = BuildConfig::default();
            bc.builders.push(BuilderRecord::new("NativeBuilder", 0, "${projectRoot}", ""));
            cfg.build_targets.insert("wasm".to_string(), bc);
        });
        dep_proj.persist_config().unwrap();

        let (_dir, proj) = project_with_succeeding_native_builder();
        proj.mutate_config(|cfg| {
            cfg.dependencies = vec![dep_dir.path().display().to_string()];
        });

        let mut config = EngineConfig::default();
        config.cc_bin = "false".to_string();
        let advisors: Vec<Arc<dyn Advisor>> = vec![Arc::new(crate::advisor::ErrorsNotHandledAdvisor)];

        let report = build(&proj, &config, advisors, None).await.unwrap();

        assert!(!report.result.success);
        assert!(!report.recipes.is_empty());
        set_build_status(&proj.root, BuildStatus::IdleDefault);
        set_build_status(&dep_proj.root, BuildStatus::IdleDefault);
    }
}
