//! Builders: the concrete subprocess-driving steps of a build
//!
//! Each [`crate::project::BuilderRecord`] persisted in a target's step list
//! names a `__type__` tag; the `builder` [`crate::registry::Registry`] turns
//! that tag plus the record's fields back into a `Box<dyn Builder>` that
//! knows how to actually invoke the underlying toolchain. A builder never
//! retries or times out internally: a failed subprocess produces an
//! [`ErrorAdviseRequest`] and the orchestrator decides what happens next.

use crate::advisor::{AdviseManager, AdviseRequest, ErrorAdviseRequest};
use crate::engine_config::EngineConfig;
use crate::errors::{Result, WebinizerError};
use crate::project::{LogEntry, LogStream, Project};
use async_trait::async_trait;
use std::process::Output;
use tokio::process::Command;
use tracing::{info, instrument, warn};

/// Whether a builder's subprocess ran to completion and what it produced.
#[derive(Debug, Clone)]
pub struct BuildOutcome {
    pub success: bool,
    pub exit_code: Option<i32>,
}

/// One step capable of driving a subprocess toolchain invocation.
#[async_trait]
pub trait Builder: Send + Sync + std::fmt::Debug {
    fn type_tag(&self) -> &'static str;
    fn id(&self) -> usize;

    /// Run this builder's underlying subprocess, capture its output into the
    /// project's log cache, and on a non-zero exit queue an
    /// [`ErrorAdviseRequest`] onto `advise`.
    async fn build(
        &self,
        project: &Project,
        config: &EngineConfig,
        advise: &mut AdviseManager,
    ) -> Result<BuildOutcome>;
}

fn expand_args(project: &Project, args: &str) -> Vec<String> {
    let expanded = project.expand(args);
    shell_words::split(&expanded).unwrap_or_else(|_| {
        expanded.split_whitespace().map(str::to_string).collect()
    })
}

/// Invoke `program` with `args` in `cwd`, with `extra_env` applied on top of
/// the process environment, recording both streams to the project's log.
#[instrument(skip(project, extra_env))]
async fn run_and_log(
    project: &Project,
    builder_id: usize,
    program: &str,
    args: &[String],
    cwd: &str,
    extra_env: &[(&str, String)],
) -> Result<Output> {
    let mut cmd = Command::new(program);
    cmd.args(args).current_dir(cwd);
    for (key, value) in extra_env {
        cmd.env(key, value);
    }

    let output = cmd.output().await.map_err(|e| WebinizerError::BuilderSpawnFail {
        builder: program.to_string(),
        message: e.to_string(),
    })?;

    if !output.stdout.is_empty() {
        project.append_log_entry(LogEntry {
            builder_id: Some(builder_id),
            stream: LogStream::Stdout,
            text: String::from_utf8_lossy(&output.stdout).into_owned(),
        })?;
    }
    if !output.stderr.is_empty() {
        project.append_log_entry(LogEntry {
            builder_id: Some(builder_id),
            stream: LogStream::Stderr,
            text: String::from_utf8_lossy(&output.stderr).into_owned(),
        })?;
    }
    Ok(output)
}

fn queue_error_advise(
    advise: &mut AdviseManager,
    tags: &[&str],
    output: &Output,
    builder_id: usize,
) {
    advise.queue_request(AdviseRequest::Error(ErrorAdviseRequest {
        tags: tags.iter().map(|t| t.to_string()).collect(),
        error: String::from_utf8_lossy(&output.stderr).into_owned(),
        file_location: None,
        builder_id: Some(builder_id),
    }));
}

/// Drives `emcc` directly over a single source/root build file.
#[derive(Debug, Clone)]
pub struct EmccBuilder {
    pub id: usize,
    pub root_build_file_path: String,
    pub args: String,
}

#[async_trait]
impl Builder for EmccBuilder {
    fn type_tag(&self) -> &'static str {
        "EmccBuilder"
    }

    fn id(&self) -> usize {
        self.id
    }

    async fn build(
        &self,
        project: &Project,
        config: &EngineConfig,
        advise: &mut AdviseManager,
    ) -> Result<BuildOutcome> {
        let cwd = project.expand(&self.root_build_file_path);
        let args = expand_args(project, &self.args);
        let output = run_and_log(project, self.id, &config.emcc_bin, &args, &cwd, &[]).await?;

        let success = output.status.success();
        if !success {
            queue_error_advise(advise, &["emcc", "cfg_args"], &output, self.id);
        } else {
            info!(builder_id = self.id, "emcc build step succeeded");
        }
        Ok(BuildOutcome {
            success,
            exit_code: output.status.code(),
        })
    }
}

/// Drives `make`, injecting the active target's `CFLAGS`/`CXXFLAGS`/`LDFLAGS`
/// and, for library targets, a `PREFIX=` pointing at the dist directory.
#[derive(Debug, Clone)]
pub struct MakeBuilder {
    pub id: usize,
    pub root_build_file_path: String,
    pub args: String,
}

#[async_trait]
impl Builder for MakeBuilder {
    fn type_tag(&self) -> &'static str {
        "MakeBuilder"
    }

    fn id(&self) -> usize {
        self.id
    }

    async fn build(
        &self,
        project: &Project,
        config: &EngineConfig,
        advise: &mut AdviseManager,
    ) -> Result<BuildOutcome> {
        let cwd = project.expand(&self.root_build_file_path);
        let mut args = expand_args(project, &self.args);

        let is_clean_step = self.args.contains("clean");
        let prior_builders = project.read_config(|cfg| {
            cfg.active_target()
                .map(|t| t.builders.clone())
                .unwrap_or_default()
        });
        let is_first_real_build_step = !is_clean_step && is_prev_builders_all_native(&prior_builders, self.id);

        let mut extra_env = Vec::new();
        if is_first_real_build_step {
            let (cflags, ldflags, is_library) = project.read_config(|cfg| {
                cfg.active_target()
                    .map(|t| (t.envs.cflags.clone(), t.envs.ldflags.clone(), t.is_library))
                    .unwrap_or_default()
            });
            extra_env.push(("CFLAGS", cflags.clone()));
            extra_env.push(("CXXFLAGS", cflags));
            extra_env.push(("LDFLAGS", ldflags));
            if is_library {
                let prefix = project.expand("${projectDist}");
                args.push(format!("PREFIX={prefix}"));
                extra_env.push(("PREFIX", prefix));
            }
        }

        let output = run_and_log(project, self.id, &config.make_bin, &args, &cwd, &extra_env).await?;

        let success = output.status.success();
        if !success {
            queue_error_advise(advise, &["make"], &output, self.id);
        }
        Ok(BuildOutcome {
            success,
            exit_code: output.status.code(),
        })
    }
}

/// Drives `cmake` as a configure step ahead of `make`.
#[derive(Debug, Clone)]
pub struct CMakeBuilder {
    pub id: usize,
    pub root_build_file_path: String,
    pub args: String,
}

#[async_trait]
impl Builder for CMakeBuilder {
    fn type_tag(&self) -> &'static str {
        "CMakeBuilder"
    }

    fn id(&self) -> usize {
        self.id
    }

    async fn build(
        &self,
        project: &Project,
        config: &EngineConfig,
        advise: &mut AdviseManager,
    ) -> Result<BuildOutcome> {
        let cwd = project.expand(&self.root_build_file_path);
        let args = expand_args(project, &self.args);
        let output = run_and_log(project, self.id, &config.cmake_bin, &args, &cwd, &[]).await?;

        let success = output.status.success();
        if !success {
            queue_error_advise(advise, &["cmake", "cfg_args"], &output, self.id);
        }
        Ok(BuildOutcome {
            success,
            exit_code: output.status.code(),
        })
    }
}

/// Drives an autotools `./configure` script.
#[derive(Debug, Clone)]
pub struct ConfigureBuilder {
    pub id: usize,
    pub root_build_file_path: String,
    pub args: String,
}

#[async_trait]
impl Builder for ConfigureBuilder {
    fn type_tag(&self) -> &'static str {
        "ConfigureBuilder"
    }

    fn id(&self) -> usize {
        self.id
    }

    async fn build(
        &self,
        project: &Project,
        config: &EngineConfig,
        advise: &mut AdviseManager,
    ) -> Result<BuildOutcome> {
        let cwd = project.expand(&self.root_build_file_path);
        let args = expand_args(project, &self.args);
        let output = run_and_log(project, self.id, &config.configure_bin, &args, &cwd, &[]).await?;

        let success = output.status.success();
        if !success {
            queue_error_advise(advise, &["configure", "cfg_args"], &output, self.id);
        }
        Ok(BuildOutcome {
            success,
            exit_code: output.status.code(),
        })
    }
}

/// Drives a plain native-toolchain invocation (e.g. `cc`), used for steps
/// that intentionally stay outside the Emscripten toolchain (test harnesses,
/// codegen tools run at build time).
#[derive(Debug, Clone)]
pub struct NativeBuilder {
    pub id: usize,
    pub root_build_file_path: String,
    pub args: String,
}

#[async_trait]
impl Builder for NativeBuilder {
    fn type_tag(&self) -> &'static str {
        "NativeBuilder"
    }

    fn id(&self) -> usize {
        self.id
    }

    async fn build(
        &self,
        project: &Project,
        config: &EngineConfig,
        advise: &mut AdviseManager,
    ) -> Result<BuildOutcome> {
        let cwd = project.expand(&self.root_build_file_path);
        let args = expand_args(project, &self.args);
        let output = run_and_log(project, self.id, &config.cc_bin, &args, &cwd, &[]).await?;

        let success = output.status.success();
        if !success {
            warn!(builder_id = self.id, "native build step failed");
            queue_error_advise(advise, &["native"], &output, self.id);
        }
        Ok(BuildOutcome {
            success,
            exit_code: output.status.code(),
        })
    }
}

/// True if every builder in `builders` before `upto_id` (exclusive) is either
/// a `NativeBuilder` or a `MakeBuilder` invoked with `clean` in its args — a
/// clean step doesn't count as a real build step either. Consulted by
/// [`MakeBuilder::build`] to decide whether it's the first real build step
/// (and so should get the `CFLAGS`/`CXXFLAGS`/`LDFLAGS`/`PREFIX` injection) or
/// a later one running after the toolchain has already switched into
/// Emscripten proper.
pub fn is_prev_builders_all_native(builders: &[crate::project::BuilderRecord], upto_id: usize) -> bool {
    builders.iter().take_while(|b| b.id < upto_id).all(|b| {
        b.type_tag == "NativeBuilder" || (b.type_tag == "MakeBuilder" && b.args.contains("clean"))
    })
}

/// Construct a `Box<dyn Builder>` from a persisted [`crate::project::BuilderRecord`].
/// Returns `None` for an unrecognized `type_tag` (an extension-provided
/// builder kind not registered in this process).
pub fn from_record(record: &crate::project::BuilderRecord) -> Option<Box<dyn Builder>> {
    let root_build_file_path = record.root_build_file_path.clone();
    let args = record.args.clone();
    match record.type_tag.as_str() {
        "EmccBuilder" => Some(Box::new(EmccBuilder {
            id: record.id,
            root_build_file_path,
            args,
        })),
        "MakeBuilder" => Some(Box::new(MakeBuilder {
            id: record.id,
            root_build_file_path,
            args,
        })),
        "CMakeBuilder" => Some(Box::new(CMakeBuilder {
            id: record.id,
            root_build_file_path,
            args,
        })),
        "ConfigureBuilder" => Some(Box::new(ConfigureBuilder {
            id: record.id,
            root_build_file_path,
            args,
        })),
        "NativeBuilder" => Some(Box::new(NativeBuilder {
            id: record.id,
            root_build_file_path,
            args,
        })),
        _ => None,
    }
}
