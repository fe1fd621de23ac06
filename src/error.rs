//! Error types
//!
//! Engine errors raised while building or running a test tree, and the
//! shared failure record stamped onto nodes.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Errors produced by the engine itself
#[derive(Debug, Error)]
pub enum EngineError {
    /// A sibling with the same name already exists
    #[error("Rewriting suite {path}")]
    DuplicateChild { path: String },

    /// A child was declared after the suite started or its aggregates were read
    #[error("Suite {path} can no longer be changed")]
    Frozen { path: String },

    /// A test name filter is not a valid regular expression
    #[error("Invalid test name filter `{pattern}`: {source}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    /// A node exceeded its wall-clock budget
    #[error("{message}")]
    Timeout { budget: Duration, message: String },

    /// A callback panicked
    #[error("{0}")]
    Panic(String),

    /// A declarative call was made with no current suite installed
    #[error("`{0}` called outside of a test source")]
    NoCurrentSuite(&'static str),
}

/// Failure recorded on a node
///
/// Cloning is cheap and keeps identity, so one construction or hook error can
/// be stamped onto every affected test and still compare equal.
#[derive(Clone)]
pub struct Failure(Arc<anyhow::Error>);

impl Failure {
    pub fn new(error: anyhow::Error) -> Self {
        Self(Arc::new(error))
    }

    /// Whether both records point at the same underlying error
    pub fn ptr_eq(&self, other: &Failure) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    pub fn error(&self) -> &anyhow::Error {
        &self.0
    }

    pub fn is_timeout(&self) -> bool {
        matches!(
            self.0.downcast_ref::<EngineError>(),
            Some(EngineError::Timeout { .. })
        )
    }

    pub fn is_panic(&self) -> bool {
        matches!(self.0.downcast_ref::<EngineError>(), Some(EngineError::Panic(_)))
    }

    /// Full descriptive text including the cause chain
    pub fn report(&self) -> String {
        let mut text = self.0.to_string();
        for cause in self.0.chain().skip(1) {
            text.push_str(&format!("\ncaused by: {cause}"));
        }
        text
    }
}

impl From<anyhow::Error> for Failure {
    fn from(error: anyhow::Error) -> Self {
        Self::new(error)
    }
}

impl From<EngineError> for Failure {
    fn from(error: EngineError) -> Self {
        Self::new(error.into())
    }
}

impl fmt::Display for Failure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Debug for Failure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Failure({:?})", self.0.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_duplicate_child_message() {
        let err = EngineError::DuplicateChild {
            path: "root/child".to_string(),
        };
        assert_eq!(err.to_string(), "Rewriting suite root/child");
    }

    #[test]
    fn test_failure_identity() {
        let failure = Failure::new(anyhow::anyhow!("boom"));
        let stamped = failure.clone();
        let other = Failure::new(anyhow::anyhow!("boom"));

        assert!(failure.ptr_eq(&stamped));
        assert!(!failure.ptr_eq(&other));
        assert_eq!(failure.to_string(), "boom");
    }

    #[test]
    fn test_failure_report_includes_causes() {
        let err = anyhow::anyhow!("disk full").context("writing fixture");
        let failure = Failure::new(err);

        assert_eq!(failure.to_string(), "writing fixture");
        assert_eq!(failure.report(), "writing fixture\ncaused by: disk full");
    }

    #[test]
    fn test_failure_kinds() {
        let timeout = Failure::from(EngineError::Timeout {
            budget: Duration::from_millis(10),
            message: "Timed out after 10ms.".to_string(),
        });
        assert!(timeout.is_timeout());
        assert!(!timeout.is_panic());

        let panic = Failure::from(EngineError::Panic("assertion failed".to_string()));
        assert!(panic.is_panic());
        assert_eq!(panic.to_string(), "assertion failed");
    }
}
