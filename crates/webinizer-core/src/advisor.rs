//! Advisors: turn a build failure or plain observation into a [`Recipe`] of
//! remediation [`Action`]s
//!
//! Advisors are dispatched from an [`AdviseManager`]'s FIFO request queue in
//! descending priority order, with registration order breaking ties among
//! advisors that share a priority. The lowest-priority advisor,
//! [`ErrorsNotHandledAdvisor`], always matches so every request produces
//! exactly one recipe even when nothing more specific recognizes it.

use crate::action::{Action, BuildContext, ShowSuggestionAction};
use crate::errors::Result;
use crate::project::Project;
use serde_json::{json, Value};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

/// Where in a source file an `ErrorAdviseRequest` originated, if known.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileLocation {
    pub file: String,
    pub line: Option<usize>,
}

/// A builder emitted an error; the advisor pool gets a chance to recognize it.
#[derive(Debug, Clone)]
pub struct ErrorAdviseRequest {
    /// Advisor tags this request is routed toward (e.g. `cfg_args`, `make`).
    pub tags: Vec<String>,
    pub error: String,
    pub file_location: Option<FileLocation>,
    pub builder_id: Option<usize>,
}

/// A non-error observation (e.g. "this target wants pthreads") routed to
/// advisors by tag.
#[derive(Debug, Clone)]
pub struct PlainAdviseRequest {
    pub tags: Vec<String>,
    pub plain_data: Value,
}

/// One request queued to the [`AdviseManager`].
#[derive(Debug, Clone)]
pub enum AdviseRequest {
    Error(ErrorAdviseRequest),
    Plain(PlainAdviseRequest),
}

impl AdviseRequest {
    pub fn tags(&self) -> &[String] {
        match self {
            AdviseRequest::Error(r) => &r.tags,
            AdviseRequest::Plain(r) => &r.tags,
        }
    }

    fn description(&self) -> String {
        match self {
            AdviseRequest::Error(r) => r.error.clone(),
            AdviseRequest::Plain(r) => r.plain_data.to_string(),
        }
    }
}

/// An ordered set of [`Action`]s produced by one advisor in response to one
/// request. Applying a recipe stops at the first action that fails (no
/// rollback of already-applied actions); the recipe's own description and
/// originating advisor are kept so a partially-applied recipe can still be
/// reported to the user.
#[derive(Debug)]
pub struct Recipe {
    pub id: usize,
    pub description: String,
    pub advisor_tag: String,
    pub actions: Vec<Arc<dyn Action>>,
    /// Set by [`ErrorsNotHandledAdvisor`]: signals the CLI/UI that no advisor
    /// recognized the originating request, so the single action in this
    /// recipe is a generic "no help available" suggestion rather than a
    /// targeted fix.
    pub show_no_advisor: bool,
}

impl Recipe {
    pub fn new(id: usize, description: impl Into<String>, advisor_tag: impl Into<String>) -> Self {
        Self {
            id,
            description: description.into(),
            advisor_tag: advisor_tag.into(),
            actions: Vec::new(),
            show_no_advisor: false,
        }
    }

    pub fn with_action(mut self, action: Arc<dyn Action>) -> Self {
        self.actions.push(action);
        self
    }

    /// Apply every action in order, stopping at the first one that fails.
    /// Returns `Ok(true)` only if every action succeeded.
    pub fn apply(&self, project: &Project, ctx: &mut BuildContext) -> Result<bool> {
        for action in &self.actions {
            if !action.apply(project, ctx)? {
                return Ok(false);
            }
        }
        Ok(true)
    }

    pub fn to_json(&self) -> Value {
        json!({
            "id": self.id,
            "description": self.description,
            "advisorTag": self.advisor_tag,
            "showNoAdvisor": self.show_no_advisor,
            "actions": self.actions.iter().map(|a| a.to_json()).collect::<Vec<_>>(),
        })
    }

    /// Reconstruct a recipe from its persisted JSON shape (the inverse of
    /// [`Recipe::to_json`]), resolving each action through `actions_registry`.
    /// Returns `None` if the payload is malformed or names an action tag the
    /// registry does not recognize.
    pub fn from_json(value: &Value, actions_registry: &crate::registry::Registry<Arc<dyn Action>>) -> Option<Recipe> {
        let id = value.get("id")?.as_u64()? as usize;
        let description = value.get("description")?.as_str()?.to_string();
        let advisor_tag = value.get("advisorTag")?.as_str()?.to_string();
        let show_no_advisor = value.get("showNoAdvisor").and_then(|v| v.as_bool()).unwrap_or(false);
        let actions_json = value.get("actions")?.as_array()?;
        let actions = actions_registry.from_json_array(actions_json).ok()?;

        Some(Recipe {
            id,
            description,
            advisor_tag,
            actions,
            show_no_advisor,
        })
    }
}

/// What an [`Advisor`] decided to do with one request it was handed.
#[derive(Debug)]
pub enum AdviseOutcome {
    /// This advisor doesn't recognize the request; the next advisor in
    /// priority order gets a turn.
    NotHandled,
    /// This advisor produced a recipe for the request.
    Recipe(Recipe),
    /// This advisor recognized the request but couldn't produce a recipe for
    /// it directly — instead it breaks the request down into more specific
    /// sub-requests (e.g. one compiler error spanning several independent
    /// undefined symbols) that get advised in its place, ahead of whatever
    /// else is still queued. No recipe is produced for the original request.
    Split(Vec<AdviseRequest>),
}

/// A source of remediation knowledge for one or more tags.
pub trait Advisor: Send + Sync + std::fmt::Debug {
    fn tag(&self) -> &'static str;

    /// Dispatch priority; advisors are tried highest-priority first.
    /// [`ErrorsNotHandledAdvisor`] registers at `i32::MIN`.
    fn priority(&self) -> i32 {
        0
    }

    /// Inspect `request` (with the full `request_list` for cross-referencing
    /// sibling requests from the same advise pass) and decide what to do with
    /// it; see [`AdviseOutcome`].
    fn advise(
        &self,
        project: &Project,
        request: &AdviseRequest,
        request_list: &[AdviseRequest],
        next_recipe_id: usize,
    ) -> AdviseOutcome;
}

/// Fallback advisor: matches every `ErrorAdviseRequest` nothing more specific
/// recognized, so a build failure never goes silently unexplained. Plain
/// observational requests (`pre-build`, `dep-build` gating checks) are left
/// unmatched — those are only supposed to produce a recipe when something
/// concrete flags an issue, not on every build.
#[derive(Debug)]
pub struct ErrorsNotHandledAdvisor;

impl Advisor for ErrorsNotHandledAdvisor {
    fn tag(&self) -> &'static str {
        "errors_not_handled"
    }

    fn priority(&self) -> i32 {
        i32::MIN
    }

    fn advise(
        &self,
        _project: &Project,
        request: &AdviseRequest,
        _request_list: &[AdviseRequest],
        next_recipe_id: usize,
    ) -> AdviseOutcome {
        if let AdviseRequest::Plain(_) = request {
            return AdviseOutcome::NotHandled;
        }
        let message = format!(
            "no advisor recognized this: {}",
            request.description()
        );
        let mut recipe = Recipe::new(next_recipe_id, message.clone(), self.tag())
            .with_action(Arc::new(ShowSuggestionAction { message }));
        recipe.show_no_advisor = true;
        AdviseOutcome::Recipe(recipe)
    }
}

/// Breaks a linker error naming more than one undefined symbol into one
/// sub-request per symbol line, so a symbol-specific advisor (pthread, SIMD,
/// ...) can match against just its own line instead of needing to parse a
/// multi-symbol blob itself. Runs ahead of every other advisor; a single-symbol
/// error passes through untouched.
#[derive(Debug)]
pub struct UndefinedSymbolSplitterAdvisor;

impl Advisor for UndefinedSymbolSplitterAdvisor {
    fn tag(&self) -> &'static str {
        "undefined_symbol_splitter"
    }

    fn priority(&self) -> i32 {
        i32::MAX
    }

    fn advise(
        &self,
        _project: &Project,
        request: &AdviseRequest,
        _request_list: &[AdviseRequest],
        _next_recipe_id: usize,
    ) -> AdviseOutcome {
        let AdviseRequest::Error(err) = request else {
            return AdviseOutcome::NotHandled;
        };
        let lines: Vec<&str> = err
            .error
            .lines()
            .filter(|line| line.contains("undefined reference to"))
            .collect();
        if lines.len() < 2 {
            return AdviseOutcome::NotHandled;
        }

        let sub_requests = lines
            .into_iter()
            .map(|line| {
                AdviseRequest::Error(ErrorAdviseRequest {
                    tags: err.tags.clone(),
                    error: line.to_string(),
                    file_location: err.file_location.clone(),
                    builder_id: err.builder_id,
                })
            })
            .collect();
        AdviseOutcome::Split(sub_requests)
    }
}

/// Process-wide registry of compiled-in advisors, populated by
/// [`crate::extension`] loading at init time. Unlike the typed-JSON
/// [`crate::registry::Registry`], advisors are not constructed from JSON —
/// they are long-lived trait objects registered once and handed to a fresh
/// [`AdviseManager`] at the start of every build.
#[derive(Debug, Default)]
pub struct AdvisorRegistry {
    advisors: Mutex<Vec<Arc<dyn Advisor>>>,
}

impl AdvisorRegistry {
    pub fn new() -> Self {
        Self {
            advisors: Mutex::new(vec![
                Arc::new(ErrorsNotHandledAdvisor),
                Arc::new(UndefinedSymbolSplitterAdvisor),
            ]),
        }
    }

    pub fn register(&self, advisor: Arc<dyn Advisor>) {
        self.advisors.lock().unwrap().push(advisor);
    }

    /// All registered advisors, in registration order (the fallback is always
    /// first in, so it still sorts last by priority).
    pub fn all(&self) -> Vec<Arc<dyn Advisor>> {
        self.advisors.lock().unwrap().clone()
    }
}

/// Dispatches queued [`AdviseRequest`]s to registered [`Advisor`]s in
/// descending-priority order, with registration order breaking ties.
pub struct AdviseManager {
    advisors: Vec<Arc<dyn Advisor>>,
    queue: VecDeque<AdviseRequest>,
    next_recipe_id: usize,
}

impl AdviseManager {
    /// Build a manager from advisors in registration order; sorting by
    /// priority is stable, so equal-priority advisors keep their relative
    /// registration order.
    pub fn new(advisors: Vec<Arc<dyn Advisor>>) -> Self {
        let mut advisors = advisors;
        advisors.sort_by(|a, b| b.priority().cmp(&a.priority()));
        Self {
            advisors,
            queue: VecDeque::new(),
            next_recipe_id: 0,
        }
    }

    pub fn queue_request(&mut self, request: AdviseRequest) {
        self.queue.push_back(request);
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// Drain the queue, producing one recipe per request that an advisor
    /// actually turns into one (guaranteed for every `Error` request by
    /// [`ErrorsNotHandledAdvisor`] matching everything that falls through).
    /// An advisor that returns [`AdviseOutcome::Split`] produces no recipe for
    /// that request; instead its sub-requests are pushed to the front of the
    /// queue and advised next, ahead of whatever else is still pending.
    pub fn advise(&mut self, project: &Project) -> Vec<Recipe> {
        let mut recipes = Vec::new();

        while let Some(request) = self.queue.pop_front() {
            let request_list: Vec<AdviseRequest> = std::iter::once(request.clone())
                .chain(self.queue.iter().cloned())
                .collect();

            for advisor in &self.advisors {
                match advisor.advise(project, &request, &request_list, self.next_recipe_id) {
                    AdviseOutcome::Recipe(recipe) => {
                        self.next_recipe_id += 1;
                        recipes.push(recipe);
                        break;
                    }
                    AdviseOutcome::Split(sub_requests) => {
                        for sub in sub_requests.into_iter().rev() {
                            self.queue.push_front(sub);
                        }
                        break;
                    }
                    AdviseOutcome::NotHandled => continue,
                }
            }
        }
        recipes
    }
}
