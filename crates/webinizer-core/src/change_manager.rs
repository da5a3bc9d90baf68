//! Build-step and file change managers
//!
//! Within one advise pass, multiple Recipes may independently edit the builder
//! step list, or the same source file, against the *pre-advise* coordinate
//! system. A naive sequential application would invalidate later indices as
//! soon as an earlier edit changed the length of the list/file. The managers
//! here accumulate every edit authored in that original coordinate system,
//! rebase each new edit's region against everything recorded so far, and
//! reject edits whose region conflicts with one already applied.
//!
//! Both managers are single-use per build: a fresh instance is constructed at
//! the start of each [`crate::orchestrator`] build and discarded at the end.

use crate::errors::{Result, WebinizerError};
use crate::project::{BuilderRecord, Project};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;

/// A half-open `[start, end)` range over a builder step list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildStepRegion {
    pub start: usize,
    pub end: usize,
}

impl BuildStepRegion {
    /// Construct a region, rejecting `end < start`.
    pub fn new(start: usize, end: usize) -> Result<Self> {
        if end < start {
            return Err(WebinizerError::InvalidRegion { start, end });
        }
        Ok(Self { start, end })
    }

    fn as_pair(&self) -> (usize, usize) {
        (self.start, self.end)
    }
}

/// A half-open `[line_start, line_end)` range over one file's lines.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileRegion {
    pub file: String,
    pub line_start: usize,
    pub line_end: usize,
}

impl FileRegion {
    pub fn new(file: impl Into<String>, line_start: usize, line_end: usize) -> Result<Self> {
        if line_end < line_start {
            return Err(WebinizerError::InvalidRegion {
                start: line_start,
                end: line_end,
            });
        }
        Ok(Self {
            file: file.into(),
            line_start,
            line_end,
        })
    }

    fn as_pair(&self) -> (usize, usize) {
        (self.line_start, self.line_end)
    }
}

/// Whether two half-open ranges (possibly zero-width insertion points)
/// conflict. A zero-width point at `p` conflicts with a positive-width range
/// `[s, e)` iff `s <= p < e` (landing anywhere inside the covered span, but
/// not merely adjacent to it). Two positive-width ranges conflict under the
/// ordinary half-open overlap rule. Two points conflict only if equal.
fn regions_conflict(a: (usize, usize), b: (usize, usize)) -> bool {
    let a_point = if a.0 == a.1 { Some(a.0) } else { None };
    let b_point = if b.0 == b.1 { Some(b.0) } else { None };
    match (a_point, b_point) {
        (Some(pa), Some(pb)) => pa == pb,
        (Some(p), None) => b.0 <= p && p < b.1,
        (None, Some(p)) => a.0 <= p && p < a.1,
        (None, None) => a.0 < b.1 && b.0 < a.1,
    }
}

/// Compute the rebase delta for `new_region` against one already-recorded
/// `(region, produced_count)` pair, or an intersect error.
fn rebase_delta(
    new_region: (usize, usize),
    recorded_region: (usize, usize),
    recorded_n_new: usize,
    file: Option<&str>,
) -> Result<isize> {
    if regions_conflict(new_region, recorded_region) {
        return Err(match file {
            None => WebinizerError::ActionBuildStepIntersect {
                new_start: new_region.0,
                new_end: new_region.1,
                existing_start: recorded_region.0,
                existing_end: recorded_region.1,
            },
            Some(file) => WebinizerError::ActionFileIntersect {
                file: file.to_string(),
                new_start: new_region.0,
                new_end: new_region.1,
                existing_start: recorded_region.0,
                existing_end: recorded_region.1,
            },
        });
    }
    if recorded_region.0 >= new_region.1 {
        // Prior change starts at or after this region ends: it comes later
        // in the original list, so it contributes no shift.
        Ok(0)
    } else {
        let old_width = recorded_region.1 as isize - recorded_region.0 as isize;
        Ok(recorded_n_new as isize - old_width)
    }
}

/// Accumulates applied [`crate::action::BuilderArgsChangeAction`]-adjacent
/// `BuildStepChange` edits for one build and rebases new edits against them.
#[derive(Debug, Default)]
pub struct BuildStepChangeManager {
    applied: Vec<((usize, usize), usize)>,
}

impl BuildStepChangeManager {
    pub fn new() -> Self {
        Self { applied: Vec::new() }
    }

    /// Apply a builder-list splice at `region` (authored against the original,
    /// pre-build coordinate system) replacing it with `new_steps`. Mutates the
    /// project's active build target's `builders` vector in place.
    pub fn apply(
        &mut self,
        project: &Project,
        target: &str,
        region: BuildStepRegion,
        new_steps: Vec<BuilderRecord>,
    ) -> Result<()> {
        let new_region = region.as_pair();
        let n_new = new_steps.len();

        let mut delta: isize = 0;
        for (recorded_region, recorded_n_new) in &self.applied {
            delta += rebase_delta(new_region, *recorded_region, *recorded_n_new, None)?;
        }

        let rebased_start = (new_region.0 as isize + delta).max(0) as usize;
        let rebased_end = (new_region.1 as isize + delta).max(0) as usize;

        project.mutate_config(|cfg| -> Result<()> {
            let build_target = cfg.build_targets.get_mut(target).ok_or_else(|| {
                WebinizerError::BuilderUndefined {
                    root: String::new(),
                    target: target.to_string(),
                }
            })?;
            let len = build_target.builders.len();
            let start = rebased_start.min(len);
            let end = rebased_end.min(len).max(start);
            build_target.builders.splice(start..end, new_steps);
            Ok(())
        })?;

        self.applied.push((new_region, n_new));
        Ok(())
    }
}

/// Accumulates applied `FileChange` edits for one build, keyed by file path,
/// and rebases new edits against the ones recorded for the same file. Edits
/// to different files never conflict with each other.
#[derive(Debug, Default)]
pub struct FileChangeManager {
    applied: HashMap<String, Vec<((usize, usize), usize)>>,
}

impl FileChangeManager {
    pub fn new() -> Self {
        Self {
            applied: HashMap::new(),
        }
    }

    /// Apply a line-range splice at `region` to the file it names (resolved
    /// via `project.expand`), replacing the given lines with `new_lines`.
    pub fn apply(
        &mut self,
        project: &Project,
        region: FileRegion,
        new_lines: Vec<String>,
    ) -> Result<()> {
        let new_region = region.as_pair();
        let n_new = new_lines.len();

        let history = self.applied.entry(region.file.clone()).or_default();
        let mut delta: isize = 0;
        for (recorded_region, recorded_n_new) in history.iter() {
            delta += rebase_delta(new_region, *recorded_region, *recorded_n_new, Some(&region.file))?;
        }

        let rebased_start = (new_region.0 as isize + delta).max(0) as usize;
        let rebased_end = (new_region.1 as isize + delta).max(0) as usize;

        let path = project.expand(&region.file);
        let contents = fs::read_to_string(&path).map_err(|e| WebinizerError::Io {
            path: path.clone(),
            source: e,
        })?;
        let mut lines: Vec<String> = contents.lines().map(str::to_string).collect();
        let len = lines.len();
        let start = rebased_start.min(len);
        let end = rebased_end.min(len).max(start);
        lines.splice(start..end, new_lines);

        let mut new_contents = lines.join("\n");
        if contents.ends_with('\n') {
            new_contents.push('\n');
        }
        fs::write(&path, new_contents).map_err(|e| WebinizerError::Io {
            path: path.clone(),
            source: e,
        })?;

        self.applied
            .entry(region.file.clone())
            .or_default()
            .push((new_region, n_new));
        Ok(())
    }
}
