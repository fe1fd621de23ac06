//! Test cases
//!
//! A [`Test`] runs its body inside the inherited `before_each`/`after_each`
//! chains, all raced against one timeout budget.

use futures::future::BoxFuture;
use futures::FutureExt;
use std::fmt;
use std::future::Future;
use std::sync::{Arc, Mutex};
use tokio::sync::oneshot;
use tracing::debug;

use super::config::{Config, NodeKind};
use super::node::{ConfigNode, NodeCore};
use super::suite::{Suite, TestHook};
use crate::error::Failure;
use crate::models::NodeStatus;
use crate::utils::{guard_call, lock, timeout, Memo};

/// Future returned by every user callback
pub type CallbackFuture = BoxFuture<'static, anyhow::Result<()>>;

type NullaryBody = Arc<dyn Fn() -> CallbackFuture + Send + Sync>;
type UnaryBody = Arc<dyn Fn(Done) -> CallbackFuture + Send + Sync>;

/// A test body
#[derive(Clone)]
pub enum Body {
    /// Takes no arguments; finishes when its future does
    Nullary(NullaryBody),
    /// Receives a [`Done`] handle
    ///
    /// With `mocha_done` in effect the test finishes when the handle is
    /// resolved, otherwise when the future does.
    Unary(UnaryBody),
}

impl Body {
    pub fn nullary<F, Fut>(body: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        Body::Nullary(Arc::new(move || body().boxed()))
    }

    pub fn unary<F, Fut>(body: F) -> Self
    where
        F: Fn(Done) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        Body::Unary(Arc::new(move |done| body(done).boxed()))
    }

    pub fn is_unary(&self) -> bool {
        matches!(self, Body::Unary(_))
    }
}

impl fmt::Debug for Body {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Body::Nullary(_) => write!(f, "Body::Nullary"),
            Body::Unary(_) => write!(f, "Body::Unary"),
        }
    }
}

type Resolver = Arc<Mutex<Option<oneshot::Sender<anyhow::Result<()>>>>>;

/// Completion handle passed to unary bodies
///
/// Only the first resolution counts; later calls are ignored.
#[derive(Clone)]
pub struct Done {
    test: Arc<Test>,
    resolver: Resolver,
}

impl Done {
    fn new(test: Arc<Test>) -> (Self, oneshot::Receiver<anyhow::Result<()>>) {
        let (sender, receiver) = oneshot::channel();
        let done = Self {
            test,
            resolver: Arc::new(Mutex::new(Some(sender))),
        };
        (done, receiver)
    }

    /// The test this handle completes
    pub fn test(&self) -> &Arc<Test> {
        &self.test
    }

    pub fn ok(&self) -> bool {
        self.finish(Ok(()))
    }

    pub fn fail(&self, err: impl Into<anyhow::Error>) -> bool {
        self.finish(Err(err.into()))
    }

    /// Resolve the test; returns false if it was already resolved
    pub fn finish(&self, result: anyhow::Result<()>) -> bool {
        match lock(&self.resolver).take() {
            Some(sender) => {
                let _ = sender.send(result);
                true
            }
            None => false,
        }
    }

    pub fn is_resolved(&self) -> bool {
        lock(&self.resolver).is_none()
    }
}

impl fmt::Debug for Done {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Done")
            .field("test", &self.test.qualified_name())
            .field("resolved", &self.is_resolved())
            .finish()
    }
}

/// A single test case
pub struct Test {
    core: NodeCore,
    body: Body,
    pass: Memo<bool>,
    fail: Memo<bool>,
}

impl ConfigNode for Test {
    fn core(&self) -> &NodeCore {
        &self.core
    }
}

impl Test {
    /// Build a test under `parent` without linking it
    ///
    /// Use [`Suite::add`] to link it, or one of the `it` variants to do both.
    #[track_caller]
    pub fn new(name: impl Into<String>, config: Config, body: Body, parent: &Arc<Suite>) -> Arc<Self> {
        let call_site = super::node::resolve_call_site_line();
        Self::with_call_site(name.into(), config, body, parent, call_site)
    }

    pub(crate) fn with_call_site(
        name: String,
        config: Config,
        body: Body,
        parent: &Arc<Suite>,
        call_site: Option<u32>,
    ) -> Arc<Self> {
        Arc::new(Self {
            core: NodeCore::new(name, NodeKind::Test, config, Some(parent), call_site),
            body,
            pass: Memo::new(),
            fail: Memo::new(),
        })
    }

    pub fn body(&self) -> &Body {
        &self.body
    }

    /// Run the test once; does nothing when skipped, already failed or already started
    pub async fn run(self: Arc<Self>) {
        if self.started_at().is_some() {
            debug!(test = %self.qualified_name(), "test already ran");
            return;
        }
        if self.is_skipped() || self.err().is_some() {
            debug!(test = %self.qualified_name(), "skipping test");
            return;
        }

        self.core.mark_started();
        debug!(test = %self.qualified_name(), "running test");

        let completion = self.uses_completion();
        let result = match self.timeout().budget() {
            Some(budget) => {
                let message = completion.then(|| {
                    format!("Expected `done` to be called within {}ms", budget.as_millis())
                });
                timeout(self.clone().execute(completion), budget, message).await
            }
            None => self.clone().execute(completion).await,
        };

        if let Err(err) = result {
            debug!(test = %self.qualified_name(), error = %err, "test failed");
            self.core.set_err(Failure::new(err));
        }

        self.core.mark_ended();
    }

    fn uses_completion(&self) -> bool {
        self.body.is_unary() && self.mocha_done()
    }

    async fn execute(self: Arc<Self>, completion: bool) -> anyhow::Result<()> {
        for hook in self.before_each_chain() {
            let test = self.clone();
            guard_call(move || hook(test)).await?;
        }

        match &self.body {
            Body::Nullary(body) => guard_call(|| body()).await?,
            Body::Unary(body) if completion => self.await_done(body.clone()).await?,
            Body::Unary(body) => {
                let (done, _) = Done::new(self.clone());
                guard_call(|| body(done)).await?
            }
        }

        for hook in self.after_each_chain() {
            let test = self.clone();
            guard_call(move || hook(test)).await?;
        }

        Ok(())
    }

    /// Spawn the body and wait for its handle to resolve
    ///
    /// The body keeps running after resolution; whatever it does afterwards
    /// is discarded. An error returned before resolution fails the test.
    async fn await_done(self: &Arc<Self>, body: UnaryBody) -> anyhow::Result<()> {
        let (done, receiver) = Done::new(self.clone());
        let handle = done.clone();

        tokio::spawn(async move {
            if let Err(err) = guard_call(move || body(done)).await {
                handle.fail(err);
            }
        });

        match receiver.await {
            Ok(result) => result,
            // Every handle is gone without resolving: only the timeout can end this.
            Err(_) => futures::future::pending().await,
        }
    }

    /// Ancestors ordered root first
    fn ancestors(&self) -> Vec<Arc<Suite>> {
        let mut chain = Vec::new();
        let mut cur = self.parent();
        while let Some(suite) = cur {
            cur = suite.parent();
            chain.push(suite);
        }
        chain.reverse();
        chain
    }

    /// Inherited `before_each` hooks, root suite first
    pub fn before_each_chain(&self) -> Vec<TestHook> {
        self.ancestors()
            .iter()
            .flat_map(|suite| suite.before_eaches())
            .collect()
    }

    /// Inherited `after_each` hooks, root suite first as well
    pub fn after_each_chain(&self) -> Vec<TestHook> {
        self.ancestors()
            .iter()
            .flat_map(|suite| suite.after_eaches())
            .collect()
    }

    /// Passed: no error and not skipped. Read once the run has settled.
    pub fn pass(&self) -> bool {
        *self.pass.get_or_init(|| self.err().is_none() && !self.is_skipped())
    }

    pub fn fail(&self) -> bool {
        *self.fail.get_or_init(|| self.err().is_some())
    }

    pub fn is_memoized(&self) -> bool {
        self.pass.is_memoized() || self.fail.is_memoized()
    }

    pub fn status(&self) -> NodeStatus {
        if self.fail() {
            NodeStatus::Fail
        } else if self.is_skipped() {
            NodeStatus::Skip
        } else {
            NodeStatus::Pass
        }
    }

    pub(crate) fn stamp(&self, failure: Failure) {
        self.core.set_err(failure);
    }
}

impl fmt::Debug for Test {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Test")
            .field("name", &self.qualified_name())
            .field("body", &self.body)
            .field("err", &self.err())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::EngineError;
    use crate::utils::{clock, sleep, time};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn root() -> Arc<Suite> {
        Suite::root("test_case", Config::new())
    }

    #[tokio::test]
    async fn test_passing_body() {
        let suite = root();
        let test = suite.it("passes", || async { Ok(()) }).unwrap();

        test.clone().run().await;

        assert!(test.pass());
        assert!(!test.fail());
        assert!(test.duration().is_some());
        assert_eq!(test.status(), NodeStatus::Pass);
    }

    #[tokio::test]
    async fn test_failing_body_records_error() {
        let suite = root();
        let test = suite
            .it("fails", || async { anyhow::bail!("expected failure") })
            .unwrap();

        test.clone().run().await;

        assert!(test.fail());
        assert_eq!(test.err().unwrap().to_string(), "expected failure");
    }

    #[tokio::test]
    async fn test_panicking_body_records_error() {
        let suite = root();
        let test = suite
            .it("panics", || async {
                assert_eq!(1 + 1, 3, "math is broken");
                Ok(())
            })
            .unwrap();

        test.clone().run().await;

        assert!(test.err().unwrap().is_panic());
    }

    #[tokio::test]
    async fn test_skipped_test_never_starts() {
        let suite = root();
        let test = suite.it_skip("skipped", || async { anyhow::bail!("ran") }).unwrap();

        test.clone().run().await;

        assert!(!test.pass());
        assert!(!test.fail());
        assert!(test.started_at().is_none());
        assert!(test.duration().is_none());
        assert_eq!(test.status(), NodeStatus::Skip);
    }

    #[tokio::test]
    async fn test_timeout_fails_fast() {
        let suite = root();
        let test = suite
            .it_with("slow", Config::new().timeout_ms(10), || async {
                sleep(1000).await;
                Ok(())
            })
            .unwrap();

        test.clone().run().await;

        let err = test.err().unwrap();
        assert!(err.is_timeout());
        assert_eq!(err.to_string(), "Timed out after 10ms.");
        let duration = test.duration().unwrap();
        assert!(duration >= Duration::from_millis(10));
        assert!(duration < Duration::from_millis(100));
    }

    #[tokio::test]
    async fn test_disabled_timeout_lets_body_finish() {
        let suite = root();
        suite.set_timeout(crate::tree::Timeout::Disabled);
        let test = suite
            .it_with("unbounded", Config::new(), || async {
                sleep(15).await;
                Ok(())
            })
            .unwrap();

        test.clone().run().await;

        assert!(test.pass());
    }

    #[tokio::test]
    async fn test_done_never_called_times_out() {
        let suite = root();
        let test = suite
            .it_done_with("never", Config::new().timeout_ms(10), |_done| async { Ok(()) })
            .unwrap();

        test.clone().run().await;

        let err = test.err().unwrap();
        assert_eq!(err.to_string(), "Expected `done` to be called within 10ms");
        assert!(matches!(
            err.error().downcast_ref::<EngineError>(),
            Some(EngineError::Timeout { .. })
        ));
    }

    #[tokio::test]
    async fn test_done_called_synchronously() {
        let suite = root();
        let test = suite
            .it_done("sync", |done| {
                done.ok();
                async { Ok(()) }
            })
            .unwrap();

        let timed = time(test.clone().run()).await;

        assert!(test.pass());
        assert!(timed.duration < Duration::from_millis(50));
    }

    #[tokio::test]
    async fn test_done_ignores_later_failures() {
        let suite = root();
        let test = suite
            .it_done("continues", |done| async move {
                sleep(5).await;
                done.ok();
                sleep(5).await;
                anyhow::bail!("too late to matter")
            })
            .unwrap();

        test.clone().run().await;
        sleep(20).await;

        assert!(test.err().is_none());
    }

    #[tokio::test]
    async fn test_done_with_error() {
        let suite = root();
        let test = suite
            .it_done("rejects", |done| async move {
                done.fail(anyhow::anyhow!("reported through done"));
                Ok(())
            })
            .unwrap();

        test.clone().run().await;

        assert_eq!(test.err().unwrap().to_string(), "reported through done");
    }

    #[tokio::test]
    async fn test_done_handle_exposes_test() {
        let suite = root();
        let test = suite
            .it_done("handle", |done| async move {
                assert_eq!(done.test().name(), "handle");
                assert!(!done.is_resolved());
                assert!(done.ok());
                assert!(!done.ok());
                Ok(())
            })
            .unwrap();

        test.clone().run().await;

        assert!(test.pass());
    }

    #[tokio::test]
    async fn test_unary_body_without_completion_mode() {
        let suite = root();
        suite.configure(|c| c.mocha_done = Some(false));
        let test = suite
            .add_test("plain", Config::new(), Body::unary(|_done| async { Ok(()) }))
            .unwrap();

        test.clone().run().await;

        assert!(!test.mocha_done());
        assert!(test.pass());
    }

    #[tokio::test]
    async fn test_runs_at_most_once() {
        let suite = root();
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let test = suite
            .it("once", move || {
                let counter = counter.clone();
                async move {
                    if counter.fetch_add(1, Ordering::SeqCst) > 0 {
                        anyhow::bail!("ran again");
                    }
                    Ok(())
                }
            })
            .unwrap();

        test.clone().run().await;
        let started = test.started_at();
        test.clone().run().await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(test.started_at(), started);
        assert!(test.pass());
        assert!(!test.fail());
    }

    #[tokio::test]
    async fn test_failing_before_each_blocks_rest_of_test() {
        let suite = root();
        let log: Arc<Mutex<Vec<&str>>> = Arc::default();

        suite.before_each(|_| async { anyhow::bail!("setup") });
        let second = log.clone();
        suite.before_each(move |_| {
            let log = second.clone();
            async move {
                log.lock().unwrap().push("second before_each");
                Ok(())
            }
        });
        let after = log.clone();
        suite.after_each(move |_| {
            let log = after.clone();
            async move {
                log.lock().unwrap().push("after_each");
                Ok(())
            }
        });
        let body = log.clone();
        let test = suite
            .it("guarded", move || {
                let log = body.clone();
                async move {
                    log.lock().unwrap().push("body");
                    Ok(())
                }
            })
            .unwrap();

        test.clone().run().await;

        assert!(log.lock().unwrap().is_empty());
        assert_eq!(test.err().unwrap().to_string(), "setup");
        assert!(test.fail());
    }

    #[tokio::test]
    async fn test_timestamps_follow_clock() {
        let suite = root();
        let test = suite
            .it("timed", || async {
                sleep(10).await;
                Ok(())
            })
            .unwrap();

        let before = clock();
        test.clone().run().await;
        let after = clock();

        let (start, end) = (test.started_at().unwrap(), test.ended_at().unwrap());
        assert!(before <= start && start <= end && end <= after);
        assert!(test.duration().unwrap() >= Duration::from_millis(9));
    }
}
