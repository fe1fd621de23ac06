//! Test-definition sources
//!
//! A source plays the part of a test file: a named function that declares
//! suites and tests against the root suite created for it.

use anyhow::{Context, Result};
use std::fmt;
use std::sync::Arc;
use tracing::warn;

use crate::tree::Suite;

type Define = Arc<dyn Fn(&Arc<Suite>) -> Result<()> + Send + Sync>;

/// A named test-definition source
#[derive(Clone)]
pub struct Source {
    name: String,
    define: Define,
}

impl Source {
    pub fn new<F>(name: impl Into<String>, define: F) -> Self
    where
        F: Fn(&Arc<Suite>) -> Result<()> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            define: Arc::new(define),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Evaluate the source against its root suite
    pub fn define(&self, root: &Arc<Suite>) -> Result<()> {
        (self.define)(root)
    }
}

impl fmt::Debug for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Source").field("name", &self.name).finish()
    }
}

/// Registered sources, selectable by name or glob pattern
#[derive(Clone, Debug, Default)]
pub struct SourceSet {
    sources: Vec<Source>,
}

impl SourceSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a source
    pub fn with<F>(mut self, name: impl Into<String>, define: F) -> Self
    where
        F: Fn(&Arc<Suite>) -> Result<()> + Send + Sync + 'static,
    {
        self.register(Source::new(name, define));
        self
    }

    pub fn register(&mut self, source: Source) {
        self.sources.push(source);
    }

    pub fn len(&self) -> usize {
        self.sources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }

    pub fn names(&self) -> Vec<&str> {
        self.sources.iter().map(Source::name).collect()
    }

    /// Sources whose name equals or glob-matches any pattern, in registration order
    ///
    /// No patterns selects every source.
    pub fn select(&self, patterns: &[String]) -> Result<Vec<Source>> {
        if patterns.is_empty() {
            return Ok(self.sources.clone());
        }

        let globs = patterns
            .iter()
            .map(|pattern| {
                glob::Pattern::new(pattern)
                    .with_context(|| format!("Invalid source pattern: {pattern}"))
            })
            .collect::<Result<Vec<_>>>()?;

        for (pattern, glob) in patterns.iter().zip(&globs) {
            let matched = self
                .sources
                .iter()
                .any(|source| source.name == *pattern || glob.matches(&source.name));
            if !matched {
                warn!("No source matches {}", pattern);
            }
        }

        Ok(self
            .sources
            .iter()
            .filter(|source| {
                patterns
                    .iter()
                    .zip(&globs)
                    .any(|(pattern, glob)| source.name == *pattern || glob.matches(&source.name))
            })
            .cloned()
            .collect())
    }
}

impl IntoIterator for SourceSet {
    type Item = Source;
    type IntoIter = std::vec::IntoIter<Source>;

    fn into_iter(self) -> Self::IntoIter {
        self.sources.into_iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set() -> SourceSet {
        SourceSet::new()
            .with("math.test", |_| Ok(()))
            .with("strings.test", |_| Ok(()))
            .with("io/files.test", |_| Ok(()))
    }

    fn names(sources: &[Source]) -> Vec<&str> {
        sources.iter().map(Source::name).collect()
    }

    #[test]
    fn test_select_all_by_default() {
        let set = set();
        assert_eq!(set.len(), 3);
        assert_eq!(names(&set.select(&[]).unwrap()), set.names());
    }

    #[test]
    fn test_select_by_name_and_glob() {
        let set = set();

        let exact = set.select(&["strings.test".to_string()]).unwrap();
        assert_eq!(names(&exact), ["strings.test"]);

        let glob = set.select(&["io/*".to_string(), "math*".to_string()]).unwrap();
        assert_eq!(names(&glob), ["math.test", "io/files.test"]);

        assert!(set.select(&["nothing".to_string()]).unwrap().is_empty());
    }

    #[test]
    fn test_invalid_glob() {
        assert!(set().select(&["[".to_string()]).is_err());
    }

    #[test]
    fn test_define_runs_against_root() {
        let source = Source::new("defines", |root| {
            root.it("declared", || async { Ok(()) })?;
            Ok(())
        });
        let root = Suite::root(source.name(), crate::tree::Config::new());

        source.define(&root).unwrap();
        assert!(root.child("declared").is_some());
    }
}
