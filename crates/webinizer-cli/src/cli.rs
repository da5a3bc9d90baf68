use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = env!("CARGO_PKG_NAME"),
    version,
    about = "Diagnose and remediate a native C/C++ project's port to WebAssembly"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Initialize a project's `.webinizer` config at the given root.
    Init {
        #[arg(default_value = ".")]
        path: PathBuf,
    },
    /// Run one build pass for the project's active target.
    Build {
        #[arg(default_value = ".")]
        path: PathBuf,
        /// Apply the recipes from the previous failed build before building.
        #[arg(long)]
        apply_recipes: bool,
    },
    /// Print the project's current build status.
    Status {
        #[arg(default_value = ".")]
        path: PathBuf,
    },
    /// Reset a project's build status back to its default, idle state.
    Reset {
        #[arg(default_value = ".")]
        path: PathBuf,
        /// Also reset every project that depends on this one.
        #[arg(long)]
        hard: bool,
    },
}
