use crate::demos;
use crate::ui::BuildSpinner;
use anyhow::Result;
use std::path::Path;
use webinizer_core::advisor::Recipe;
use webinizer_core::cache;
use webinizer_core::engine_config::EngineConfig;
use webinizer_core::orchestrator;
use webinizer_core::project::{Project, RecipeCacheFile};

pub async fn run(path: &Path, apply_recipes: bool) -> Result<()> {
    let project = Project::new(path, std::env::temp_dir().join("webinizer-pool"))?;
    let config = EngineConfig::from_env();
    let ctx = webinizer_core::extension::init_engine(&config, &demos::all()).await?;

    let recipes_to_apply_first = if apply_recipes {
        let stored = cache::read_cache_file::<RecipeCacheFile>(&project.recipe_path())?;
        match stored {
            Some(doc) => Some(
                doc.recipes
                    .iter()
                    .filter_map(|r| Recipe::from_json(r, &ctx.actions))
                    .collect::<Vec<_>>(),
            ),
            None => {
                println!("no recipes from a previous failed build to apply");
                None
            }
        }
    } else {
        None
    };

    let target = project.read_config(|cfg| cfg.target.clone());
    let spinner = BuildSpinner::start(&target);

    let report = orchestrator::build(&project, &config, ctx.advisors.all(), recipes_to_apply_first).await?;

    if report.result.success {
        spinner.finish_success(&target);
    } else {
        spinner.finish_failure(&target, report.recipes.len());
        for recipe in &report.recipes {
            println!("  - {}", recipe.description);
        }
    }
    Ok(())
}
