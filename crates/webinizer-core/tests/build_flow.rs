//! End-to-end coverage of a project moving through init, a failed build, and
//! a second build with the resulting recipe applied.

use std::sync::Arc;
use tempfile::tempdir;
use webinizer_core::action::{self, Action};
use webinizer_core::advisor::{AdviseManager, Advisor, ErrorsNotHandledAdvisor, Recipe};
use webinizer_core::builder;
use webinizer_core::engine_config::EngineConfig;
use webinizer_core::orchestrator::{self, BuildStatus};
use webinizer_core::project::{BuildConfig, BuilderRecord, Project};
use webinizer_core::registry::Registry;

fn project_with_target(builder_tag: &str) -> (tempfile::TempDir, Project) {
    let dir = tempdir().unwrap();
    let proj = Project::new(dir.path(), dir.path().join("pool")).unwrap();
    proj.mutate_config(|cfg| {
        cfg.name = "demo".to_string();
        cfg.target = "wasm".to_string();
        let mut bc = BuildConfig::default();
        bc.builders.push(BuilderRecord::new(builder_tag, 0, "${projectRoot}", ""));
        cfg.build_targets.insert("wasm".to_string(), bc);
    });
    proj.persist_config().unwrap();
    (dir, proj)
}

fn actions_registry() -> Registry<Arc<dyn Action>> {
    let registry = Registry::new("action");
    action::register_builtins(&registry).unwrap();
    registry
}

#[tokio::test]
async fn successful_build_persists_result_and_clears_status() {
    let (_dir, proj) = project_with_target("NativeBuilder");
    let mut config = EngineConfig::default();
    config.cc_bin = "true".to_string();

    let report = orchestrator::build(&proj, &config, vec![], None).await.unwrap();

    assert!(report.result.success);
    assert!(report.recipes.is_empty());
    assert_eq!(orchestrator::build_status(&proj.root), BuildStatus::IdleSuccess);
}

fn default_advisors() -> Vec<Arc<dyn Advisor>> {
    vec![Arc::new(ErrorsNotHandledAdvisor)]
}

#[tokio::test]
async fn failing_build_falls_back_to_errors_not_handled_recipe() {
    let (_dir, proj) = project_with_target("NativeBuilder");
    let mut config = EngineConfig::default();
    config.cc_bin = "false".to_string();

    let report = orchestrator::build(&proj, &config, default_advisors(), None).await.unwrap();

    assert!(!report.result.success);
    assert_eq!(report.recipes.len(), 1);
    assert_eq!(report.recipes[0].advisor_tag, "errors_not_handled");
    assert_eq!(orchestrator::build_status(&proj.root), BuildStatus::IdleFail);
}

#[tokio::test]
async fn recipe_round_trips_through_cache_and_reapplies_on_next_build() {
    let (_dir, proj) = project_with_target("NativeBuilder");
    let mut failing_config = EngineConfig::default();
    failing_config.cc_bin = "false".to_string();

    let first = orchestrator::build(&proj, &failing_config, default_advisors(), None).await.unwrap();
    assert!(!first.result.success);

    let actions = actions_registry();
    let stored = webinizer_core::cache::read_cache_file::<webinizer_core::project::RecipeCacheFile>(
        &proj.recipe_path(),
    )
    .unwrap()
    .expect("a recipe cache file should have been written");

    let reconstructed: Vec<Recipe> = stored
        .recipes
        .iter()
        .filter_map(|v| Recipe::from_json(v, &actions))
        .collect();
    assert_eq!(reconstructed.len(), 1);

    let mut succeeding_config = EngineConfig::default();
    succeeding_config.cc_bin = "true".to_string();

    let second = orchestrator::build(&proj, &succeeding_config, vec![], Some(reconstructed))
        .await
        .unwrap();
    assert!(second.result.success);
    assert_eq!(orchestrator::build_status(&proj.root), BuildStatus::IdleSuccess);
}

#[derive(Debug)]
struct AlwaysMatchesAdvisor;

impl Advisor for AlwaysMatchesAdvisor {
    fn tag(&self) -> &'static str {
        "always_matches"
    }

    fn priority(&self) -> i32 {
        100
    }

    fn advise(
        &self,
        _project: &Project,
        _request: &webinizer_core::advisor::AdviseRequest,
        _request_list: &[webinizer_core::advisor::AdviseRequest],
        next_recipe_id: usize,
    ) -> webinizer_core::advisor::AdviseOutcome {
        webinizer_core::advisor::AdviseOutcome::Recipe(Recipe::new(next_recipe_id, "turn on pthreads", self.tag()))
    }
}

#[tokio::test]
async fn higher_priority_advisor_wins_over_fallback() {
    let (_dir, proj) = project_with_target("NativeBuilder");
    let mut config = EngineConfig::default();
    config.cc_bin = "false".to_string();

    let advisors: Vec<Arc<dyn Advisor>> = vec![Arc::new(ErrorsNotHandledAdvisor), Arc::new(AlwaysMatchesAdvisor)];
    let report = orchestrator::build(&proj, &config, advisors, None).await.unwrap();

    assert_eq!(report.recipes.len(), 1);
    assert_eq!(report.recipes[0].advisor_tag, "always_matches");
}

#[tokio::test]
async fn unknown_builder_tag_is_skipped_not_fatal() {
    let (dir, _proj) = project_with_target("NativeBuilder");
    let proj = Project::new(dir.path(), dir.path().join("pool")).unwrap();
    proj.mutate_config(|cfg| {
        let bc = cfg.build_targets.get_mut("wasm").unwrap();
        bc.builders.insert(0, BuilderRecord::new("MysteryBuilder", 10, "${projectRoot}", ""));
    });
    proj.persist_config().unwrap();

    let mut config = EngineConfig::default();
    config.cc_bin = "true".to_string();
    let builders = proj.read_config(|cfg| cfg.active_target().unwrap().builders.clone());
    assert!(builder::from_record(&builders[0]).is_none());

    let report = orchestrator::build(&proj, &config, vec![], None).await.unwrap();
    assert!(report.result.success);
}

#[tokio::test]
async fn advise_manager_drains_queue_into_recipes() {
    let (_dir, proj) = project_with_target("NativeBuilder");
    let mut manager = AdviseManager::new(vec![Arc::new(AlwaysMatchesAdvisor)]);
    manager.queue_request(webinizer_core::advisor::AdviseRequest::Error(
        webinizer_core::advisor::ErrorAdviseRequest {
            tags: vec!["anything".to_string()],
            error: "boom".to_string(),
            file_location: None,
            builder_id: Some(0),
        },
    ));
    let recipes = manager.advise(&proj);
    assert_eq!(recipes.len(), 1);
}
