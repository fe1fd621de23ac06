//! Shared node state and configuration resolution
//!
//! [`NodeCore`] is embedded in both [`Suite`] and [`Test`]; the
//! [`ConfigNode`] trait gives them the common read-side API.

use futures::future::BoxFuture;
use futures::FutureExt;
use serde_json::Value;
use std::panic::Location;
use std::sync::{Arc, Mutex, OnceLock, RwLock, Weak};
use std::time::Duration;

use super::config::{Config, NodeKind, Timeout};
use super::suite::Suite;
use super::test_case::Test;
use crate::error::Failure;
use crate::models::NodeStatus;
use crate::utils::{clock, lock, read, write, Memo};

/// Source line of the caller of a declarative call
///
/// Declarative entry points are `#[track_caller]`, so this reports the line in
/// the test source rather than inside the engine.
#[track_caller]
pub fn resolve_call_site_line() -> Option<u32> {
    Some(Location::caller().line())
}

/// State common to every node
pub struct NodeCore {
    name: String,
    kind: NodeKind,
    parent: Weak<Suite>,
    config: RwLock<Config>,
    call_site: Option<u32>,
    err: Mutex<Option<Failure>>,
    start: OnceLock<f64>,
    end: OnceLock<f64>,
    depth: Memo<usize>,
    qualified_name: Memo<String>,
    duration: Memo<Duration>,
}

impl NodeCore {
    pub(crate) fn new(
        name: String,
        kind: NodeKind,
        config: Config,
        parent: Option<&Arc<Suite>>,
        call_site: Option<u32>,
    ) -> Self {
        Self {
            name,
            kind,
            parent: parent.map(Arc::downgrade).unwrap_or_default(),
            config: RwLock::new(config),
            call_site,
            err: Mutex::new(None),
            start: OnceLock::new(),
            end: OnceLock::new(),
            depth: Memo::new(),
            qualified_name: Memo::new(),
            duration: Memo::new(),
        }
    }

    pub fn kind(&self) -> NodeKind {
        self.kind
    }

    pub fn is_depth_memoized(&self) -> bool {
        self.depth.is_memoized()
    }

    pub fn is_duration_memoized(&self) -> bool {
        self.duration.is_memoized()
    }

    pub(crate) fn own<T>(&self, get: impl Fn(&Config) -> Option<T>) -> Option<T> {
        get(&read(&self.config))
    }

    pub(crate) fn update(&self, change: impl FnOnce(&mut Config)) {
        change(&mut write(&self.config));
    }

    /// Record a failure; a later stamp replaces an earlier one
    pub(crate) fn set_err(&self, failure: Failure) {
        *lock(&self.err) = Some(failure);
    }

    pub(crate) fn mark_started(&self) {
        let _ = self.start.set(clock());
    }

    pub(crate) fn mark_ended(&self) {
        let _ = self.end.set(clock());
    }
}

/// Read-side API shared by suites and tests
pub trait ConfigNode {
    fn core(&self) -> &NodeCore;

    fn name(&self) -> &str {
        &self.core().name
    }

    fn parent(&self) -> Option<Arc<Suite>> {
        self.core().parent.upgrade()
    }

    /// Snapshot of the node's own configuration
    fn own_config(&self) -> Config {
        read(&self.core().config).clone()
    }

    /// Mutate the node's own configuration
    fn configure(&self, change: impl FnOnce(&mut Config))
    where
        Self: Sized,
    {
        self.core().update(change);
    }

    /// Own value, else nearest ancestor's own value, else this kind's default
    fn effective<T>(&self, get: impl Fn(&Config) -> Option<T>) -> Option<T>
    where
        Self: Sized,
    {
        resolve(self, get)
    }

    fn is_parallel(&self) -> bool
    where
        Self: Sized,
    {
        self.effective(|c| c.parallel).unwrap_or(false)
    }

    fn is_skipped(&self) -> bool
    where
        Self: Sized,
    {
        self.effective(|c| c.skip).unwrap_or(false)
    }

    fn timeout(&self) -> Timeout
    where
        Self: Sized,
    {
        self.effective(|c| c.timeout).unwrap_or(Timeout::Disabled)
    }

    fn suite_timeout(&self) -> Timeout
    where
        Self: Sized,
    {
        self.effective(|c| c.suite_timeout).unwrap_or(Timeout::Disabled)
    }

    fn mocha_done(&self) -> bool
    where
        Self: Sized,
    {
        self.effective(|c| c.mocha_done).unwrap_or(false)
    }

    /// Configured line selection; an empty list counts as unset
    fn lines(&self) -> Option<Vec<u32>>
    where
        Self: Sized,
    {
        self.effective(|c| c.line.clone()).filter(|lines| !lines.is_empty())
    }

    /// Configured name patterns; an empty list counts as unset
    fn test_name_filter(&self) -> Option<Vec<String>>
    where
        Self: Sized,
    {
        self.effective(|c| c.test_name_filter.clone())
            .filter(|patterns| !patterns.is_empty())
    }

    fn failing_tests(&self) -> bool
    where
        Self: Sized,
    {
        self.effective(|c| c.failing_tests).unwrap_or(false)
    }

    fn effective_custom(&self, key: &str) -> Option<Value>
    where
        Self: Sized,
    {
        self.effective(|c| c.custom.get(key).cloned())
    }

    /// Set the per-test budget on this node
    fn set_timeout(&self, timeout: Timeout) {
        self.core().update(|c| c.timeout = Some(timeout));
    }

    /// Line of the declarative call that created this node
    fn call_site(&self) -> Option<u32> {
        self.core().call_site
    }

    /// Distance from the root; the root is 0
    fn depth(&self) -> usize {
        *self.core().depth.get_or_init(|| {
            let mut depth = 0;
            let mut cur = self.parent();
            while let Some(suite) = cur {
                depth += 1;
                cur = suite.parent();
            }
            depth
        })
    }

    /// Root-to-node names joined by `/`
    fn qualified_name(&self) -> &str {
        self.core().qualified_name.get_or_init(|| {
            let mut path = self.name().to_string();
            let mut cur = self.parent();
            while let Some(suite) = cur {
                path = format!("{}/{}", suite.name(), path);
                cur = suite.parent();
            }
            path
        })
    }

    /// Qualified name, optionally extended by one more segment
    fn path(&self, next: Option<&str>) -> String {
        match next {
            Some(next) => format!("{}/{}", self.qualified_name(), next),
            None => self.qualified_name().to_string(),
        }
    }

    fn err(&self) -> Option<Failure> {
        lock(&self.core().err).clone()
    }

    /// Start time in milliseconds on [`clock`]
    fn started_at(&self) -> Option<f64> {
        self.core().start.get().copied()
    }

    fn ended_at(&self) -> Option<f64> {
        self.core().end.get().copied()
    }

    /// Time between start and end; only available once the node finished
    fn duration(&self) -> Option<Duration> {
        let core = self.core();
        if let Some(duration) = core.duration.peek() {
            return Some(*duration);
        }
        let (start, end) = (core.start.get()?, core.end.get()?);
        let elapsed = (end - start).max(0.0) / 1000.0;
        Some(*core.duration.get_or_init(|| Duration::from_secs_f64(elapsed)))
    }
}

/// Walk own value, then each ancestor's own value, then the defaults table
pub fn resolve<N, T>(node: &N, get: impl Fn(&Config) -> Option<T>) -> Option<T>
where
    N: ConfigNode + ?Sized,
{
    if let Some(value) = node.core().own(&get) {
        return Some(value);
    }

    let mut cur = node.parent();
    while let Some(suite) = cur {
        if let Some(value) = suite.core().own(&get) {
            return Some(value);
        }
        cur = suite.parent();
    }

    get(node.core().kind().defaults())
}

/// A child of a suite
#[derive(Clone)]
pub enum Node {
    Suite(Arc<Suite>),
    Test(Arc<Test>),
}

impl Node {
    pub fn name(&self) -> &str {
        match self {
            Node::Suite(suite) => suite.name(),
            Node::Test(test) => test.name(),
        }
    }

    pub fn qualified_name(&self) -> &str {
        match self {
            Node::Suite(suite) => suite.qualified_name(),
            Node::Test(test) => test.qualified_name(),
        }
    }

    pub fn pass(&self) -> bool {
        match self {
            Node::Suite(suite) => suite.pass(),
            Node::Test(test) => test.pass(),
        }
    }

    pub fn fail(&self) -> bool {
        match self {
            Node::Suite(suite) => suite.fail(),
            Node::Test(test) => test.fail(),
        }
    }

    pub fn status(&self) -> NodeStatus {
        match self {
            Node::Suite(suite) => suite.status(),
            Node::Test(test) => test.status(),
        }
    }

    pub fn as_suite(&self) -> Option<&Arc<Suite>> {
        match self {
            Node::Suite(suite) => Some(suite),
            Node::Test(_) => None,
        }
    }

    pub fn as_test(&self) -> Option<&Arc<Test>> {
        match self {
            Node::Test(test) => Some(test),
            Node::Suite(_) => None,
        }
    }

    pub fn run(self) -> BoxFuture<'static, ()> {
        match self {
            Node::Suite(suite) => suite.run(),
            Node::Test(test) => test.run().boxed(),
        }
    }
}

impl From<Arc<Suite>> for Node {
    fn from(suite: Arc<Suite>) -> Self {
        Node::Suite(suite)
    }
}

impl From<Arc<Test>> for Node {
    fn from(test: Arc<Test>) -> Self {
        Node::Test(test)
    }
}
