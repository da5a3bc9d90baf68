//! Template-literal expansion
//!
//! String fields throughout a project's configuration may contain `${projectRoot}`,
//! `${projectDist}`, or `${projectPool}` markers. This module expands those markers
//! against a project's fixed constant map by plain substitution (no shell or regex
//! semantics beyond locating the `${name}` tokens themselves).

use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashMap;

static TOKEN_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\$\{([A-Za-z0-9_]+)\}").expect("valid template token regex"));

/// The fixed set of names a project's constant map is allowed to provide values for.
pub const KNOWN_NAMES: &[&str] = &["projectRoot", "projectDist", "projectPool"];

/// An immutable map of template names to their expansions, fixed for the lifetime
/// of a [`crate::project::Project`] instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConstantMap {
    values: HashMap<String, String>,
}

impl ConstantMap {
    /// Build the constant map for a project rooted at `project_root`, with dist and
    /// pool directories derived the conventional way (siblings of the root named
    /// `dist` and living under a shared pool directory respectively).
    pub fn new(project_root: impl Into<String>, project_dist: impl Into<String>, project_pool: impl Into<String>) -> Self {
        let mut values = HashMap::new();
        values.insert("projectRoot".to_string(), project_root.into());
        values.insert("projectDist".to_string(), project_dist.into());
        values.insert("projectPool".to_string(), project_pool.into());
        Self { values }
    }

    /// Look up the expansion for a known name.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.values.get(name).map(|s| s.as_str())
    }

    /// Expand every `${name}` token in `input`. Unknown names are left untouched
    /// (the caller can separately call [`validate_template_literals`] to surface them).
    ///
    /// Expansion is idempotent: since the constant map's values never themselves
    /// contain `${...}` tokens in practice, re-expanding an already-expanded string
    /// is a no-op.
    pub fn expand(&self, input: &str) -> String {
        TOKEN_PATTERN
            .replace_all(input, |caps: &regex::Captures| {
                let name = &caps[1];
                self.values
                    .get(name)
                    .cloned()
                    .unwrap_or_else(|| caps[0].to_string())
            })
            .into_owned()
    }
}

/// Collect every `${name}` token in `input` whose `name` is not in `known`.
pub fn validate_template_literals(input: &str, known: &[&str]) -> Vec<String> {
    TOKEN_PATTERN
        .captures_iter(input)
        .filter_map(|caps| {
            let name = caps[1].to_string();
            if known.contains(&name.as_str()) {
                None
            } else {
                Some(name)
            }
        })
        .collect()
}
