use anyhow::Result;
use console::style;
use std::path::Path;
use webinizer_core::project::Project;

pub fn run(path: &Path) -> Result<()> {
    let project = Project::new(path, std::env::temp_dir().join("webinizer-pool"))?;
    project.mutate_config(|cfg| {
        if cfg.name.is_empty() {
            cfg.name = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| "project".to_string());
        }
    });
    project.persist_config()?;
    println!(
        "{} initialized project config at {}",
        style("webinizer").green().bold(),
        project.config_path().display()
    );
    Ok(())
}
