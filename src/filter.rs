//! Ordered include/exclude pattern stack evaluated on relative paths.
//!
//! Semantics follow rsync-style globs: `*` stays within a path segment,
//! `**` crosses segments, a leading `/` anchors the pattern to the tree
//! root, a trailing `/` restricts the rule to directories. Rules are tried
//! in order; the first match decides, and unmatched paths are included.

use std::path::Path;

use anyhow::{Context, Result};
use globset::{GlobBuilder, GlobMatcher};

/// Whether a matching rule keeps or drops the path.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FilterMode {
    Include,
    Exclude,
}

/// One user-supplied rule, uncompiled.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FilterRule {
    pub mode: FilterMode,
    pub pattern: String,
}

impl FilterRule {
    pub fn include(pattern: impl Into<String>) -> Self {
        Self {
            mode: FilterMode::Include,
            pattern: pattern.into(),
        }
    }

    pub fn exclude(pattern: impl Into<String>) -> Self {
        Self {
            mode: FilterMode::Exclude,
            pattern: pattern.into(),
        }
    }
}

struct CompiledRule {
    mode: FilterMode,
    dir_only: bool,
    /// Matchers for the rule's own path.
    direct: Vec<GlobMatcher>,
    /// Matchers covering everything below an excluded directory rule.
    descendants: Vec<GlobMatcher>,
}

impl CompiledRule {
    fn compile(rule: &FilterRule) -> Result<Self> {
        let anchored = rule.pattern.starts_with('/');
        let dir_only = rule.pattern.ends_with('/');
        let core = rule
            .pattern
            .trim_start_matches('/')
            .trim_end_matches('/')
            .to_string();

        let mut direct_pats = vec![core.clone()];
        if !anchored {
            direct_pats.push(format!("**/{core}"));
        }
        // An exclude that hits a directory takes its whole subtree with it.
        // Includes match only the named path: contents need their own rule.
        let mut desc_pats = Vec::new();
        if rule.mode == FilterMode::Exclude {
            desc_pats.push(format!("{core}/**"));
            if !anchored {
                desc_pats.push(format!("**/{core}/**"));
            }
        }

        Ok(Self {
            mode: rule.mode,
            dir_only,
            direct: compile_globs(&direct_pats, &rule.pattern)?,
            descendants: compile_globs(&desc_pats, &rule.pattern)?,
        })
    }

    fn matches(&self, rel: &Path, is_dir: bool) -> bool {
        for m in &self.direct {
            if m.is_match(rel) && (!self.dir_only || is_dir) {
                return true;
            }
        }
        self.descendants.iter().any(|m| m.is_match(rel))
    }
}

fn compile_globs(patterns: &[String], original: &str) -> Result<Vec<GlobMatcher>> {
    patterns
        .iter()
        .map(|p| {
            GlobBuilder::new(p)
                .literal_separator(true)
                .backslash_escape(true)
                .build()
                .map(|g| g.compile_matcher())
                .with_context(|| format!("bad filter pattern: {original}"))
        })
        .collect()
}

/// Compiled predicate over relative paths. Empty stack includes everything.
#[derive(Default)]
pub struct FilterSet {
    rules: Vec<CompiledRule>,
}

impl FilterSet {
    pub fn compile(rules: &[FilterRule]) -> Result<Self> {
        let rules = rules
            .iter()
            .map(CompiledRule::compile)
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { rules })
    }

    /// True when `rel` should be part of the tree. First matching rule wins.
    pub fn includes(&self, rel: &Path, is_dir: bool) -> bool {
        for rule in &self.rules {
            if rule.matches(rel, is_dir) {
                return rule.mode == FilterMode::Include;
            }
        }
        true
    }
}
