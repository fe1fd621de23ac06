//! Suites: construction API, scheduling and aggregation

use futures::future::{join_all, BoxFuture};
use futures::FutureExt;
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::{Arc, Mutex};
use tracing::{debug, warn};

use super::config::{Config, NodeKind};
use super::focus;
use super::node::{resolve_call_site_line, ConfigNode, Node, NodeCore};
use super::test_case::{Body, CallbackFuture, Done, Test};
use crate::error::{EngineError, Failure};
use crate::models::NodeStatus;
use crate::utils::{guard_call, guard_sync, lock, timeout, Memo};

/// Hook receiving the suite it was registered on
pub type SuiteHook = Arc<dyn Fn(Arc<Suite>) -> CallbackFuture + Send + Sync>;

/// Hook receiving the test it wraps
pub type TestHook = Arc<dyn Fn(Arc<Test>) -> CallbackFuture + Send + Sync>;

/// Aggregates cached after the first read
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Aggregate {
    Pass,
    Fail,
    Tests,
    PassingTests,
    FailingTests,
    SkippedTests,
}

impl Aggregate {
    pub const ALL: [Aggregate; 6] = [
        Aggregate::Pass,
        Aggregate::Fail,
        Aggregate::Tests,
        Aggregate::PassingTests,
        Aggregate::FailingTests,
        Aggregate::SkippedTests,
    ];
}

#[derive(Default)]
struct Children {
    list: Vec<Node>,
    by_name: HashMap<String, Node>,
}

#[derive(Default)]
struct Hooks {
    before: Vec<SuiteHook>,
    after: Vec<SuiteHook>,
    before_each: Vec<TestHook>,
    after_each: Vec<TestHook>,
}

/// A group of tests and nested suites
pub struct Suite {
    core: NodeCore,
    line_hit: bool,
    children: Mutex<Children>,
    hooks: Mutex<Hooks>,
    pass: Memo<bool>,
    fail: Memo<bool>,
    tests: Memo<Vec<Arc<Test>>>,
    passing_tests: Memo<Vec<Arc<Test>>>,
    failing_tests: Memo<Vec<Arc<Test>>>,
    skipped_tests: Memo<Vec<Arc<Test>>>,
}

impl ConfigNode for Suite {
    fn core(&self) -> &NodeCore {
        &self.core
    }
}

impl Suite {
    /// Create a root suite, one per loaded source
    pub fn root(name: impl Into<String>, config: Config) -> Arc<Self> {
        Self::build(name.into(), config, None, None)
    }

    /// Build a suite under `parent` without linking it
    #[track_caller]
    pub fn new(name: impl Into<String>, config: Config, parent: Option<&Arc<Suite>>) -> Arc<Self> {
        Self::build(name.into(), config, parent, resolve_call_site_line())
    }

    fn build(
        name: String,
        config: Config,
        parent: Option<&Arc<Suite>>,
        call_site: Option<u32>,
    ) -> Arc<Self> {
        let line_hit = focus::line_hit(parent, &config, call_site);

        Arc::new(Self {
            core: NodeCore::new(name, NodeKind::Suite, config, parent, call_site),
            line_hit,
            children: Mutex::new(Children::default()),
            hooks: Mutex::new(Hooks::default()),
            pass: Memo::new(),
            fail: Memo::new(),
            tests: Memo::new(),
            passing_tests: Memo::new(),
            failing_tests: Memo::new(),
            skipped_tests: Memo::new(),
        })
    }

    /// Declared at a selected line, or nested inside such a suite
    pub fn is_line_hit(&self) -> bool {
        self.line_hit
    }

    #[track_caller]
    pub fn describe<F>(self: &Arc<Self>, name: impl Into<String>, define: F) -> Result<Arc<Suite>, EngineError>
    where
        F: FnOnce(&Arc<Suite>) -> anyhow::Result<()>,
    {
        self.describe_with(name, Config::new(), define)
    }

    /// Create a child suite and populate it with `define`
    ///
    /// An error or panic from `define` is recorded on the new suite and on
    /// every test it declared before failing; only a duplicate name is
    /// returned to the caller.
    #[track_caller]
    pub fn describe_with<F>(
        self: &Arc<Self>,
        name: impl Into<String>,
        config: Config,
        define: F,
    ) -> Result<Arc<Suite>, EngineError>
    where
        F: FnOnce(&Arc<Suite>) -> anyhow::Result<()>,
    {
        let suite = Self::build(name.into(), config, Some(self), resolve_call_site_line());
        self.add(Node::Suite(suite.clone()))?;

        if let Err(err) = guard_sync(|| define(&suite)) {
            suite.record_construction_error(err);
        }

        Ok(suite)
    }

    #[track_caller]
    pub fn it<F, Fut>(self: &Arc<Self>, name: impl Into<String>, body: F) -> Result<Arc<Test>, EngineError>
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.add_test(name, Config::new(), Body::nullary(body))
    }

    #[track_caller]
    pub fn it_with<F, Fut>(
        self: &Arc<Self>,
        name: impl Into<String>,
        config: Config,
        body: F,
    ) -> Result<Arc<Test>, EngineError>
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.add_test(name, config, Body::nullary(body))
    }

    /// Declare a test that is never run
    #[track_caller]
    pub fn it_skip<F, Fut>(self: &Arc<Self>, name: impl Into<String>, body: F) -> Result<Arc<Test>, EngineError>
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.add_test(name, Config::new().skip(true), Body::nullary(body))
    }

    /// Declare a test that finishes when its [`Done`] handle resolves
    #[track_caller]
    pub fn it_done<F, Fut>(self: &Arc<Self>, name: impl Into<String>, body: F) -> Result<Arc<Test>, EngineError>
    where
        F: Fn(Done) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.it_done_with(name, Config::new(), body)
    }

    #[track_caller]
    pub fn it_done_with<F, Fut>(
        self: &Arc<Self>,
        name: impl Into<String>,
        mut config: Config,
        body: F,
    ) -> Result<Arc<Test>, EngineError>
    where
        F: Fn(Done) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        config.mocha_done.get_or_insert(true);
        self.add_test(name, config, Body::unary(body))
    }

    /// Declare a test with an explicit body
    ///
    /// Tests outside a line-hit suite are marked skipped here when line or
    /// name selection is configured and does not pick them.
    #[track_caller]
    pub fn add_test(
        self: &Arc<Self>,
        name: impl Into<String>,
        config: Config,
        body: Body,
    ) -> Result<Arc<Test>, EngineError> {
        let test = Test::with_call_site(name.into(), config, body, self, resolve_call_site_line());

        if !focus::selected(self, &test)? {
            debug!(test = %test.qualified_name(), "not selected");
            test.configure(|c| c.skip = Some(true));
        }

        self.add(Node::Test(test.clone()))?;
        Ok(test)
    }

    /// Link a child node; names are unique among siblings
    ///
    /// The shape of a suite is fixed once it, or any suite above it, has
    /// started running or memoized an aggregate.
    pub(crate) fn add(&self, node: Node) -> Result<Node, EngineError> {
        if self.is_frozen() {
            return Err(EngineError::Frozen { path: self.path(None) });
        }

        let mut children = lock(&self.children);
        if children.by_name.contains_key(node.name()) {
            return Err(EngineError::DuplicateChild {
                path: self.path(Some(node.name())),
            });
        }

        children.by_name.insert(node.name().to_string(), node.clone());
        children.list.push(node.clone());
        Ok(node)
    }

    fn is_frozen(&self) -> bool {
        let settled = |suite: &Suite| {
            suite.started_at().is_some()
                || Aggregate::ALL.iter().any(|aggregate| suite.is_memoized(*aggregate))
        };
        if settled(self) {
            return true;
        }
        let mut parent = self.parent();
        while let Some(suite) = parent {
            if settled(&suite) {
                return true;
            }
            parent = suite.parent();
        }
        false
    }

    pub fn before<F, Fut>(&self, hook: F)
    where
        F: Fn(Arc<Suite>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        lock(&self.hooks).before.push(Arc::new(move |suite| hook(suite).boxed()));
    }

    pub fn after<F, Fut>(&self, hook: F)
    where
        F: Fn(Arc<Suite>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        lock(&self.hooks).after.push(Arc::new(move |suite| hook(suite).boxed()));
    }

    pub fn before_each<F, Fut>(&self, hook: F)
    where
        F: Fn(Arc<Test>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        lock(&self.hooks).before_each.push(Arc::new(move |test| hook(test).boxed()));
    }

    pub fn after_each<F, Fut>(&self, hook: F)
    where
        F: Fn(Arc<Test>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        lock(&self.hooks).after_each.push(Arc::new(move |test| hook(test).boxed()));
    }

    pub fn befores(&self) -> Vec<SuiteHook> {
        lock(&self.hooks).before.clone()
    }

    pub fn afters(&self) -> Vec<SuiteHook> {
        lock(&self.hooks).after.clone()
    }

    pub fn before_eaches(&self) -> Vec<TestHook> {
        lock(&self.hooks).before_each.clone()
    }

    pub fn after_eaches(&self) -> Vec<TestHook> {
        lock(&self.hooks).after_each.clone()
    }

    /// Children in declaration order
    pub fn children(&self) -> Vec<Node> {
        lock(&self.children).list.clone()
    }

    pub fn child(&self, name: &str) -> Option<Node> {
        lock(&self.children).by_name.get(name).cloned()
    }

    /// Record an error raised while the suite was being defined
    pub fn record_construction_error(&self, err: anyhow::Error) {
        warn!(suite = %self.qualified_name(), error = %err, "suite definition failed");
        self.stamp(Failure::new(err));
    }

    /// Set the suite's error and copy it onto every test below
    fn stamp(&self, failure: Failure) {
        for test in self.tests() {
            test.stamp(failure.clone());
        }
        self.core.set_err(failure);
    }

    /// Run hooks and children
    ///
    /// Does nothing when skipped, when the suite already failed to build or
    /// when it already ran. A suite runs at most once.
    pub fn run(self: Arc<Self>) -> BoxFuture<'static, ()> {
        async move {
            if self.started_at().is_some() {
                debug!(suite = %self.qualified_name(), "suite already ran");
                return;
            }
            if self.is_skipped() || self.err().is_some() {
                debug!(suite = %self.qualified_name(), "skipping suite");
                return;
            }

            self.core.mark_started();
            debug!(suite = %self.qualified_name(), parallel = self.is_parallel(), "running suite");

            match self.suite_timeout().budget() {
                Some(budget) => {
                    let lifecycle = self.clone().lifecycle().map(Ok);
                    if let Err(err) = timeout(lifecycle, budget, None).await {
                        warn!(suite = %self.qualified_name(), error = %err, "suite timed out");
                        self.stamp_unfinished(Failure::new(err));
                    }
                }
                None => self.clone().lifecycle().await,
            }

            self.core.mark_ended();
        }
        .boxed()
    }

    async fn lifecycle(self: Arc<Self>) {
        for hook in self.befores() {
            let suite = self.clone();
            if let Err(err) = guard_call(move || hook(suite)).await {
                warn!(suite = %self.qualified_name(), error = %err, "before hook failed");
                self.stamp(Failure::new(err));
                return;
            }
        }

        let children = self.children();
        if self.is_parallel() {
            join_all(children.into_iter().map(Node::run)).await;
        } else {
            for child in children {
                child.run().await;
            }
        }

        for hook in self.afters() {
            let suite = self.clone();
            if let Err(err) = guard_call(move || hook(suite)).await {
                warn!(suite = %self.qualified_name(), error = %err, "after hook failed");
                self.stamp(Failure::new(err));
                return;
            }
        }
    }

    /// Stamp the suite and every test that had not settled when its budget ran out
    fn stamp_unfinished(&self, failure: Failure) {
        for test in self.tests() {
            let unfinished = test.ended_at().is_none() && test.err().is_none() && !test.is_skipped();
            if unfinished {
                test.stamp(failure.clone());
            }
        }
        self.core.set_err(failure);
    }

    /// No own error and every child passes; an empty suite passes
    pub fn pass(&self) -> bool {
        *self.pass.get_or_init(|| {
            self.err().is_none() && self.children().iter().all(Node::pass)
        })
    }

    /// Own error or any failing child
    pub fn fail(&self) -> bool {
        *self.fail.get_or_init(|| {
            self.err().is_some() || self.children().iter().any(Node::fail)
        })
    }

    /// Every test below this suite, depth first in declaration order
    pub fn tests(&self) -> &[Arc<Test>] {
        self.tests.get_or_init(|| {
            self.children()
                .into_iter()
                .flat_map(|child| match child {
                    Node::Suite(suite) => suite.tests().to_vec(),
                    Node::Test(test) => vec![test],
                })
                .collect()
        })
    }

    pub fn passing_tests(&self) -> &[Arc<Test>] {
        self.passing_tests
            .get_or_init(|| self.tests().iter().filter(|t| t.pass()).cloned().collect())
    }

    pub fn failing_tests(&self) -> &[Arc<Test>] {
        self.failing_tests
            .get_or_init(|| self.tests().iter().filter(|t| t.fail()).cloned().collect())
    }

    /// Tests that did not fail and are configured to skip
    pub fn skipped_tests(&self) -> &[Arc<Test>] {
        self.skipped_tests.get_or_init(|| {
            self.tests()
                .iter()
                .filter(|t| !t.fail() && t.is_skipped())
                .cloned()
                .collect()
        })
    }

    pub fn is_memoized(&self, aggregate: Aggregate) -> bool {
        match aggregate {
            Aggregate::Pass => self.pass.is_memoized(),
            Aggregate::Fail => self.fail.is_memoized(),
            Aggregate::Tests => self.tests.is_memoized(),
            Aggregate::PassingTests => self.passing_tests.is_memoized(),
            Aggregate::FailingTests => self.failing_tests.is_memoized(),
            Aggregate::SkippedTests => self.skipped_tests.is_memoized(),
        }
    }

    /// Suites with nothing left to run report as skipped
    pub fn status(&self) -> NodeStatus {
        if self.fail() {
            NodeStatus::Fail
        } else if self.pass() {
            NodeStatus::Pass
        } else {
            NodeStatus::Skip
        }
    }

    /// Fold over this suite and everything below it, suite before children
    pub fn traverse<A>(self: &Arc<Self>, acc: A, mut visit: impl FnMut(A, &Node) -> A) -> A {
        self.walk(acc, &mut visit)
    }

    fn walk<A>(self: &Arc<Self>, acc: A, visit: &mut dyn FnMut(A, &Node) -> A) -> A {
        let mut acc = visit(acc, &Node::Suite(self.clone()));
        for child in self.children() {
            acc = match &child {
                Node::Suite(suite) => suite.walk(acc, visit),
                Node::Test(_) => visit(acc, &child),
            };
        }
        acc
    }
}

impl fmt::Debug for Suite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Suite")
            .field("name", &self.qualified_name())
            .field("children", &lock(&self.children).list.len())
            .field("err", &self.err())
            .finish()
    }
}
