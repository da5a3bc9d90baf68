use std::sync::Arc;
use webinizer_core::action::{Action, ConfigOptionChangeAction, ShowSuggestionAction};
use webinizer_core::advisor::{AdviseOutcome, AdviseRequest, Advisor, Recipe};
use webinizer_core::errors::Result;
use webinizer_core::extension::{Extension, ExtensionContext};
use webinizer_core::project::Project;

/// Recognizes an unresolved `pthread_create` reference from `emcc`/`make` and
/// suggests (and applies) `needPthread`.
#[derive(Debug)]
struct PthreadAdvisor;

impl Advisor for PthreadAdvisor {
    fn tag(&self) -> &'static str {
        "pthread"
    }

    fn priority(&self) -> i32 {
        10
    }

    fn advise(
        &self,
        _project: &Project,
        request: &AdviseRequest,
        _request_list: &[AdviseRequest],
        next_recipe_id: usize,
    ) -> AdviseOutcome {
        let AdviseRequest::Error(err) = request else {
            return AdviseOutcome::NotHandled;
        };
        if !err.error.contains("pthread_create") && !err.error.contains("-pthread") {
            return AdviseOutcome::NotHandled;
        }
        let actions: Vec<Arc<dyn Action>> = vec![
            Arc::new(ConfigOptionChangeAction {
                option: "needPthread".to_string(),
                value: true,
            }),
            Arc::new(ShowSuggestionAction {
                message: "enabled needPthread: recompile with -pthread on both cflags and ldflags".to_string(),
            }),
        ];
        let mut recipe = Recipe::new(next_recipe_id, "add -pthread to the build", self.tag());
        recipe.actions = actions;
        AdviseOutcome::Recipe(recipe)
    }
}

/// Recognizes an unresolved SIMD intrinsic reference and suggests `needSimd`.
#[derive(Debug)]
struct SimdAdvisor;

impl Advisor for SimdAdvisor {
    fn tag(&self) -> &'static str {
        "simd"
    }

    fn priority(&self) -> i32 {
        10
    }

    fn advise(
        &self,
        _project: &Project,
        request: &AdviseRequest,
        _request_list: &[AdviseRequest],
        next_recipe_id: usize,
    ) -> AdviseOutcome {
        let AdviseRequest::Error(err) = request else {
            return AdviseOutcome::NotHandled;
        };
        if !err.error.contains("wasm_simd128.h") && !err.error.contains("-msimd128") {
            return AdviseOutcome::NotHandled;
        }
        let actions: Vec<Arc<dyn Action>> = vec![
            Arc::new(ConfigOptionChangeAction {
                option: "needSimd".to_string(),
                value: true,
            }),
            Arc::new(ShowSuggestionAction {
                message: "enabled needSimd: recompile with -msimd128".to_string(),
            }),
        ];
        let mut recipe = Recipe::new(next_recipe_id, "add -msimd128 to the build", self.tag());
        recipe.actions = actions;
        AdviseOutcome::Recipe(recipe)
    }
}

const MAIN_LOOP_SOURCE_EXTS: &[&str] = &["c", "cc", "cpp", "cxx", "h", "hpp"];
const BLOCKING_LOOP_PATTERNS: &[&str] = &["while (1)", "while(1)", "while (true)", "while(true)"];
const MAX_SCAN_DEPTH: usize = 6;

/// True if any source file under `root` contains a bare blocking loop with no
/// `emscripten_set_main_loop` call anywhere in the same file to hand control
/// back to the browser event loop.
fn has_blocking_main_loop(root: &std::path::Path) -> bool {
    fn scan(dir: &std::path::Path, depth: usize) -> bool {
        if depth > MAX_SCAN_DEPTH {
            return false;
        }
        let Ok(entries) = std::fs::read_dir(dir) else {
            return false;
        };
        for entry in entries.flatten() {
            let path = entry.path();
            if path.is_dir() {
                if scan(&path, depth + 1) {
                    return true;
                }
                continue;
            }
            let is_source = path
                .extension()
                .and_then(|e| e.to_str())
                .map(|ext| MAIN_LOOP_SOURCE_EXTS.contains(&ext))
                .unwrap_or(false);
            if !is_source {
                continue;
            }
            let Ok(contents) = std::fs::read_to_string(&path) else {
                continue;
            };
            if contents.contains("emscripten_set_main_loop") {
                continue;
            }
            if BLOCKING_LOOP_PATTERNS.iter().any(|p| contents.contains(p)) {
                return true;
            }
        }
        false
    }
    scan(root, 0)
}

/// Reacts to the orchestrator's `pre-build` gating check by scanning the
/// project's source tree for a bare blocking loop with no corresponding
/// `emscripten_set_main_loop` call, and suggests switching to it so the
/// browser event loop keeps running.
#[derive(Debug)]
struct MainLoopAdvisor;

impl Advisor for MainLoopAdvisor {
    fn tag(&self) -> &'static str {
        "main_loop"
    }

    fn priority(&self) -> i32 {
        5
    }

    fn advise(
        &self,
        project: &Project,
        request: &AdviseRequest,
        _request_list: &[AdviseRequest],
        next_recipe_id: usize,
    ) -> AdviseOutcome {
        if !request.tags().iter().any(|t| t == "pre-build") {
            return AdviseOutcome::NotHandled;
        }
        if !has_blocking_main_loop(&project.root) {
            return AdviseOutcome::NotHandled;
        }
        let mut recipe = Recipe::new(next_recipe_id, "switch to emscripten_set_main_loop", self.tag());
        recipe.actions = vec![Arc::new(ShowSuggestionAction {
            message: "replace the blocking render loop with emscripten_set_main_loop so the browser event loop keeps running".to_string(),
        })];
        AdviseOutcome::Recipe(recipe)
    }
}

/// Bundles the pthread/simd/main-loop advisors as one compiled-in extension.
#[derive(Debug)]
pub struct StandardAdvisorsExtension;

impl Extension for StandardAdvisorsExtension {
    fn name(&self) -> &'static str {
        "standard-advisors"
    }

    fn init(&self, ctx: &ExtensionContext) -> Result<()> {
        ctx.advisors.register(Arc::new(PthreadAdvisor));
        ctx.advisors.register(Arc::new(SimdAdvisor));
        ctx.advisors.register(Arc::new(MainLoopAdvisor));
        Ok(())
    }
}
