use anyhow::Result;
use console::style;
use std::path::Path;
use webinizer_core::orchestrator;
use webinizer_core::project::Project;

pub fn run(path: &Path, hard: bool) -> Result<()> {
    let project = Project::new(path, std::env::temp_dir().join("webinizer-pool"))?;
    orchestrator::reset_build_status(&project, hard)?;
    println!(
        "{} reset build status for {}{}",
        style("webinizer").green().bold(),
        project.root.display(),
        if hard { " (and dependents)" } else { "" }
    );
    Ok(())
}
