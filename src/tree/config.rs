//! Node configuration
//!
//! Every node carries a bag of *own* values. Effective values are resolved on
//! each read by walking own value, then ancestors, then the defaults of the
//! querying node's kind. Nothing here is cached: ancestors may still be
//! reconfigured after a node is built.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::OnceLock;
use std::time::Duration;

/// Default per-test budget
pub const DEFAULT_TEST_TIMEOUT_MS: u64 = 1500;

/// Wall-clock budget
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "TimeoutRepr", into = "TimeoutRepr")]
pub enum Timeout {
    /// Explicitly no budget
    Disabled,
    After(Duration),
}

impl Timeout {
    /// `0` disables the budget
    pub fn from_millis(ms: u64) -> Self {
        if ms == 0 {
            Timeout::Disabled
        } else {
            Timeout::After(Duration::from_millis(ms))
        }
    }

    pub fn budget(self) -> Option<Duration> {
        match self {
            Timeout::Disabled => None,
            Timeout::After(budget) => Some(budget),
        }
    }
}

#[derive(Clone, Copy, Serialize, Deserialize)]
#[serde(untagged)]
enum TimeoutRepr {
    Millis(u64),
    Flag(bool),
}

impl From<TimeoutRepr> for Timeout {
    fn from(repr: TimeoutRepr) -> Self {
        match repr {
            TimeoutRepr::Millis(ms) => Timeout::from_millis(ms),
            TimeoutRepr::Flag(false) => Timeout::Disabled,
            TimeoutRepr::Flag(true) => Timeout::from_millis(DEFAULT_TEST_TIMEOUT_MS),
        }
    }
}

impl From<Timeout> for TimeoutRepr {
    fn from(timeout: Timeout) -> Self {
        match timeout {
            Timeout::Disabled => TimeoutRepr::Millis(0),
            Timeout::After(budget) => TimeoutRepr::Millis(budget.as_millis() as u64),
        }
    }
}

/// Own configuration values of a node
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Run a suite's children concurrently
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parallel: Option<bool>,

    /// Do not execute the node or its subtree
    #[serde(skip_serializing_if = "Option::is_none")]
    pub skip: Option<bool>,

    /// Per-test budget covering hooks and body
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout: Option<Timeout>,

    /// Budget for a whole suite lifecycle
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suite_timeout: Option<Timeout>,

    /// Single-argument bodies finish only when their `Done` handle fires
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mocha_done: Option<bool>,

    /// Source lines selected for execution
    #[serde(skip_serializing_if = "Option::is_none")]
    pub line: Option<Vec<u32>>,

    /// Regex patterns matched against qualified test names
    #[serde(skip_serializing_if = "Option::is_none")]
    pub test_name_filter: Option<Vec<String>>,

    /// Emit re-run hints for failing root suites
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failing_tests: Option<bool>,

    /// User-defined keys, resolved through the same chain
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub custom: BTreeMap<String, Value>,
}

impl Config {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn parallel(mut self, parallel: bool) -> Self {
        self.parallel = Some(parallel);
        self
    }

    pub fn skip(mut self, skip: bool) -> Self {
        self.skip = Some(skip);
        self
    }

    pub fn timeout(mut self, timeout: Timeout) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn timeout_ms(self, ms: u64) -> Self {
        self.timeout(Timeout::from_millis(ms))
    }

    pub fn suite_timeout_ms(mut self, ms: u64) -> Self {
        self.suite_timeout = Some(Timeout::from_millis(ms));
        self
    }

    pub fn mocha_done(mut self, mocha_done: bool) -> Self {
        self.mocha_done = Some(mocha_done);
        self
    }

    pub fn line(mut self, lines: impl IntoIterator<Item = u32>) -> Self {
        self.line = Some(lines.into_iter().collect());
        self
    }

    pub fn test_name_filter<S: Into<String>>(mut self, patterns: impl IntoIterator<Item = S>) -> Self {
        self.test_name_filter = Some(patterns.into_iter().map(Into::into).collect());
        self
    }

    pub fn failing_tests(mut self, failing_tests: bool) -> Self {
        self.failing_tests = Some(failing_tests);
        self
    }

    /// Set a user-defined key
    pub fn set(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.custom.insert(key.into(), value.into());
        self
    }

    /// Overlay `other`'s set values onto this bag
    pub fn merge(&mut self, other: &Config) {
        if other.parallel.is_some() {
            self.parallel = other.parallel;
        }
        if other.skip.is_some() {
            self.skip = other.skip;
        }
        if other.timeout.is_some() {
            self.timeout = other.timeout;
        }
        if other.suite_timeout.is_some() {
            self.suite_timeout = other.suite_timeout;
        }
        if other.mocha_done.is_some() {
            self.mocha_done = other.mocha_done;
        }
        if other.line.is_some() {
            self.line = other.line.clone();
        }
        if other.test_name_filter.is_some() {
            self.test_name_filter = other.test_name_filter.clone();
        }
        if other.failing_tests.is_some() {
            self.failing_tests = other.failing_tests;
        }
        for (key, value) in &other.custom {
            self.custom.insert(key.clone(), value.clone());
        }
    }
}

/// Kind of tree node, which selects the defaults table
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NodeKind {
    Suite,
    Test,
}

impl NodeKind {
    /// Type-level defaults consulted after the ancestor chain
    pub fn defaults(self) -> &'static Config {
        static SUITE: OnceLock<Config> = OnceLock::new();
        static TEST: OnceLock<Config> = OnceLock::new();

        match self {
            NodeKind::Suite => SUITE.get_or_init(|| shared_defaults().parallel(true)),
            NodeKind::Test => {
                TEST.get_or_init(|| shared_defaults().timeout_ms(DEFAULT_TEST_TIMEOUT_MS))
            }
        }
    }
}

fn shared_defaults() -> Config {
    Config::new()
        .skip(false)
        .mocha_done(false)
        .failing_tests(false)
}
