//! Selective execution by source line or test name
//!
//! A suite declared at a selected line is *line hit*: everything nested inside
//! it runs. Outside such a suite, a test runs only when its own call site is
//! selected or its qualified name matches one of the name filters.

use regex::Regex;
use std::sync::{Arc, OnceLock};

use super::config::Config;
use super::node::ConfigNode;
use super::suite::Suite;
use super::test_case::Test;
use crate::error::EngineError;
use crate::utils::Memoizer;

fn patterns() -> &'static Memoizer<String, Regex> {
    static PATTERNS: OnceLock<Memoizer<String, Regex>> = OnceLock::new();
    PATTERNS.get_or_init(Memoizer::new)
}

/// Compile a name filter, reusing an earlier compilation of the same pattern
pub fn compile(pattern: &str) -> Result<Arc<Regex>, EngineError> {
    patterns().get_or_try_insert_with(pattern.to_string(), |pattern| {
        Regex::new(pattern).map_err(|source| EngineError::InvalidPattern {
            pattern: pattern.clone(),
            source,
        })
    })
}

pub fn is_compiled(pattern: &str) -> bool {
    patterns().contains(&pattern.to_string())
}

/// Whether a suite about to be created under `parent` is line hit
pub(crate) fn line_hit(parent: Option<&Arc<Suite>>, config: &Config, call_site: Option<u32>) -> bool {
    if parent.is_some_and(|parent| parent.is_line_hit()) {
        return true;
    }

    let lines = config
        .line
        .clone()
        .or_else(|| parent.and_then(|parent| parent.effective(|c| c.line.clone())));

    match (lines, call_site) {
        (Some(lines), Some(line)) => lines.contains(&line),
        _ => false,
    }
}

/// Whether `test` survives the configured line and name selection
pub(crate) fn selected(parent: &Suite, test: &Test) -> Result<bool, EngineError> {
    if parent.is_line_hit() {
        return Ok(true);
    }

    let lines = test.lines();
    let filters = test.test_name_filter();
    if lines.is_none() && filters.is_none() {
        return Ok(true);
    }

    if let (Some(lines), Some(line)) = (&lines, test.call_site()) {
        if lines.contains(&line) {
            return Ok(true);
        }
    }

    for pattern in filters.iter().flatten() {
        if compile(pattern)?.is_match(test.qualified_name()) {
            return Ok(true);
        }
    }

    Ok(false)
}
