use anyhow::Result;
use console::style;
use std::path::Path;
use webinizer_core::orchestrator::{self, BuildStatus};
use webinizer_core::project::Project;

pub fn run(path: &Path) -> Result<()> {
    let project = Project::new(path, std::env::temp_dir().join("webinizer-pool"))?;
    let status = orchestrator::build_status(&project.root);
    let label = match status {
        BuildStatus::IdleDefault => style("idle (never built)").dim(),
        BuildStatus::IdleSuccess => style("idle (last build succeeded)").green(),
        BuildStatus::IdleFail => style("idle (last build failed)").red(),
        BuildStatus::Building => style("building").yellow(),
        BuildStatus::BuildingWithRecipes => style("building (applying recipes)").yellow(),
    };
    println!("{}: {}", project.root.display(), label);
    Ok(())
}
