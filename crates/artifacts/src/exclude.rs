//! Exclude patterns for the artifact scan.
//!
//! Patterns are shell globs (`glob` crate) matched against the relative
//! key and against the bare file name, so `.DS_Store` and `*.map` apply at
//! any depth while `assets/*.map` only applies under `assets/`. A trailing
//! `/` excludes a whole directory from the artifact root (`drafts/`).

use glob::{MatchOptions, Pattern};
use shipfront_core::{Error, Result};

/// `*` and `?` stop at `/`; `**` crosses directories
const MATCH_OPTIONS: MatchOptions = MatchOptions {
    case_sensitive: true,
    require_literal_separator: true,
    require_literal_leading_dot: false,
};

#[derive(Debug, Clone, Default)]
pub struct ExcludeSet {
    patterns: Vec<Pattern>,
}

impl ExcludeSet {
    /// Compile `patterns`; blank entries are skipped
    pub fn new<S: AsRef<str>>(patterns: &[S]) -> Result<Self> {
        let patterns = patterns
            .iter()
            .map(|p| p.as_ref().trim())
            .filter(|p| !p.is_empty())
            .map(|p| {
                let source = match p.strip_suffix('/') {
                    Some(dir) => format!("{}/**", dir),
                    None => p.to_string(),
                };
                Pattern::new(&source).map_err(|e| {
                    Error::ConfigParse(format!("Invalid exclude pattern '{}': {}", p, e))
                })
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { patterns })
    }

    /// `relative` uses `/` separators and has no leading slash
    pub fn is_excluded(&self, relative: &str) -> bool {
        let file_name = relative.rsplit('/').next().unwrap_or(relative);
        self.patterns.iter().any(|p| {
            p.matches_with(relative, MATCH_OPTIONS) || p.matches_with(file_name, MATCH_OPTIONS)
        })
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }
}
