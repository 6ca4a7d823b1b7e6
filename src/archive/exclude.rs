// Exclude patterns for the archive walk.
// A pattern without '/' is a glob over any single path component.
// A pattern with '/' is a glob anchored at the source root; it excludes the
// matching path and everything below it.

use crate::error::{Result, SidecarError};
use glob::{MatchOptions, Pattern};
use std::path::{Component, Path};

/// Reproducible or heavyweight subtrees skipped by default.
pub const DEFAULT_EXCLUDES: &[&str] = &[".git", "__pycache__", "node_modules", "target", "*.pyc"];

/// Virtualenv directories; skipped unless `include_venv` is set.
pub const VENV_DIRS: &[&str] = &["venv", ".venv", "env"];

const ANCHORED: MatchOptions = MatchOptions {
    case_sensitive: true,
    require_literal_separator: true,
    require_literal_leading_dot: false,
};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExcludeSet {
    names: Vec<Pattern>,
    anchored: Vec<Pattern>,
}

impl ExcludeSet {
    pub fn new<I, S>(patterns: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut set = Self::default();
        for pattern in patterns {
            set.push(pattern.as_ref())?;
        }
        Ok(set)
    }

    /// Built-in excludes plus `extra`, with virtualenvs unless `include_venv`.
    pub fn for_backup(extra: &[String], include_venv: bool) -> Result<Self> {
        let mut set = Self::new(DEFAULT_EXCLUDES)?;
        if !include_venv {
            for dir in VENV_DIRS {
                set.push(dir)?;
            }
        }
        for pattern in extra {
            set.push(pattern)?;
        }
        Ok(set)
    }

    /// Exclude one subtree given relative to the source root, matched literally.
    pub fn with_prefix(mut self, rel: &Path) -> Self {
        let rel = rel.to_string_lossy();
        if rel.is_empty() {
            return self;
        }
        if let Ok(pattern) = Pattern::new(&Pattern::escape(&rel)) {
            if !self.anchored.contains(&pattern) {
                self.anchored.push(pattern);
            }
        }
        self
    }

    fn push(&mut self, pattern: &str) -> Result<()> {
        let pattern = pattern.trim();
        if pattern.is_empty() {
            return Ok(());
        }
        let (list, source) = if pattern.contains('/') {
            (
                &mut self.anchored,
                pattern.trim_start_matches("./").trim_end_matches('/'),
            )
        } else {
            (&mut self.names, pattern)
        };
        if source.is_empty() {
            return Ok(());
        }
        let compiled = compile(source)?;
        if !list.contains(&compiled) {
            list.push(compiled);
        }
        Ok(())
    }

    /// `rel` is relative to the source root.
    pub fn is_excluded(&self, rel: &Path) -> bool {
        let anchored = rel
            .ancestors()
            .filter(|a| !a.as_os_str().is_empty())
            .any(|a| self.anchored.iter().any(|p| p.matches_path_with(a, ANCHORED)));
        if anchored {
            return true;
        }
        rel.components().any(|c| match c {
            Component::Normal(name) => {
                let name = name.to_string_lossy();
                self.names.iter().any(|p| p.matches(&name))
            }
            _ => false,
        })
    }
}

/// Compile one exclude pattern; malformed globs are configuration errors.
fn compile(pattern: &str) -> Result<Pattern> {
    Pattern::new(pattern).map_err(|e| {
        SidecarError::Configuration(format!("invalid exclude pattern {pattern:?}: {e}"))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn name_globs_cover_wildcards_and_classes() {
        let set = ExcludeSet::new(["*.py[co]", "cache?"]).unwrap();
        assert!(set.is_excluded(Path::new("a.pyc")));
        assert!(set.is_excluded(Path::new("pkg/b.pyo")));
        assert!(!set.is_excluded(Path::new("pkg/b.py")));
        assert!(set.is_excluded(Path::new("cache1/x")));
        assert!(!set.is_excluded(Path::new("cache12/x")));
    }

    #[test]
    fn name_pattern_matches_any_depth() {
        let set = ExcludeSet::new(["node_modules"]).unwrap();
        assert!(set.is_excluded(Path::new("node_modules")));
        assert!(set.is_excluded(Path::new("web/node_modules/react/index.js")));
        assert!(!set.is_excluded(Path::new("web/src/index.js")));
    }

    #[test]
    fn path_pattern_is_anchored_at_root() {
        let set = ExcludeSet::new(["data/cache/", "logs/*/raw"]).unwrap();
        assert!(set.is_excluded(Path::new("data/cache")));
        assert!(set.is_excluded(Path::new("data/cache/a.bin")));
        assert!(!set.is_excluded(Path::new("other/data/cache")));
        assert!(!set.is_excluded(Path::new("data/cached")));
        assert!(set.is_excluded(Path::new("logs/2026/raw/a.log")));
        assert!(!set.is_excluded(Path::new("logs/2026/10/raw")));
    }

    #[test]
    fn literal_prefix_is_not_globbed() {
        let set = ExcludeSet::default().with_prefix(Path::new("stage[1]"));
        assert!(set.is_excluded(Path::new("stage[1]/a.tar.gz")));
        assert!(!set.is_excluded(Path::new("stage1/a.tar.gz")));
    }

    #[test]
    fn malformed_pattern_is_configuration_error() {
        let err = ExcludeSet::new(["[unclosed"]).unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::Configuration);
        assert!(err.to_string().contains("[unclosed"));
    }

    #[test]
    fn venv_excluded_unless_included() {
        let without = ExcludeSet::for_backup(&[], false).unwrap();
        assert!(without.is_excluded(Path::new("venv/lib/site.py")));
        let with = ExcludeSet::for_backup(&[], true).unwrap();
        assert!(!with.is_excluded(Path::new("venv/lib/site.py")));
        assert!(with.is_excluded(Path::new(".git/HEAD")));
    }
}
