use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;

fn default_style() -> ProgressStyle {
    ProgressStyle::with_template("{spinner:.green} {msg}")
        .unwrap()
        .tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏ ")
}

fn done_style() -> ProgressStyle {
    ProgressStyle::with_template("{msg}").unwrap()
}

/// Ticks a spinner on stderr while a build runs, then leaves a plain
/// success/failure line behind once it finishes.
pub struct BuildSpinner {
    pb: ProgressBar,
}

impl BuildSpinner {
    pub fn start(target: &str) -> Self {
        let pb = ProgressBar::new_spinner();
        pb.enable_steady_tick(Duration::from_millis(80));
        pb.set_style(default_style());
        pb.set_message(format!("building target '{target}'…"));
        Self { pb }
    }

    pub fn finish_success(&self, target: &str) {
        self.pb.set_style(done_style());
        self.pb
            .finish_with_message(format!("{}", style(format!("target '{target}' built")).green()));
    }

    pub fn finish_failure(&self, target: &str, recipe_count: usize) {
        self.pb.set_style(done_style());
        self.pb.finish_with_message(format!(
            "{}",
            style(format!(
                "target '{target}' failed, {recipe_count} recipe(s) available"
            ))
            .red()
        ));
    }
}

impl Drop for BuildSpinner {
    fn drop(&mut self) {
        if !self.pb.is_finished() {
            self.pb.finish_and_clear();
        }
    }
}
