//! Free-function declaration API
//!
//! While a source loads with `globals` enabled, the runner installs its root
//! suite as the *current* suite of the loading thread. The functions here
//! declare against that suite, so sources can be written without threading a
//! suite handle through every call. `describe` makes the new suite current
//! for the duration of its body.

use std::cell::RefCell;
use std::future::Future;
use std::sync::Arc;

use crate::error::EngineError;
use crate::tree::{Config, Done, Suite, Test};

thread_local! {
    static CURRENT: RefCell<Vec<Arc<Suite>>> = const { RefCell::new(Vec::new()) };
}

/// Keeps a suite current until dropped
#[must_use = "the suite stops being current when the scope is dropped"]
pub struct Scope {
    _private: (),
}

impl Drop for Scope {
    fn drop(&mut self) {
        CURRENT.with(|stack| {
            stack.borrow_mut().pop();
        });
    }
}

/// Make `suite` the current suite of this thread
pub fn install(suite: Arc<Suite>) -> Scope {
    CURRENT.with(|stack| stack.borrow_mut().push(suite));
    Scope { _private: () }
}

/// The suite free functions currently declare against
pub fn current() -> Option<Arc<Suite>> {
    CURRENT.with(|stack| stack.borrow().last().cloned())
}

fn require(call: &'static str) -> Result<Arc<Suite>, EngineError> {
    current().ok_or(EngineError::NoCurrentSuite(call))
}

#[track_caller]
pub fn describe<F>(name: impl Into<String>, define: F) -> Result<Arc<Suite>, EngineError>
where
    F: FnOnce(&Arc<Suite>) -> anyhow::Result<()>,
{
    describe_with(name, Config::new(), define)
}

#[track_caller]
pub fn describe_with<F>(name: impl Into<String>, config: Config, define: F) -> Result<Arc<Suite>, EngineError>
where
    F: FnOnce(&Arc<Suite>) -> anyhow::Result<()>,
{
    require("describe")?.describe_with(name, config, |suite| {
        let _scope = install(suite.clone());
        define(suite)
    })
}

#[track_caller]
pub fn it<F, Fut>(name: impl Into<String>, body: F) -> Result<Arc<Test>, EngineError>
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    require("it")?.it(name, body)
}

#[track_caller]
pub fn it_with<F, Fut>(name: impl Into<String>, config: Config, body: F) -> Result<Arc<Test>, EngineError>
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    require("it")?.it_with(name, config, body)
}

#[track_caller]
pub fn it_skip<F, Fut>(name: impl Into<String>, body: F) -> Result<Arc<Test>, EngineError>
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    require("it")?.it_skip(name, body)
}

#[track_caller]
pub fn it_done<F, Fut>(name: impl Into<String>, body: F) -> Result<Arc<Test>, EngineError>
where
    F: Fn(Done) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    require("it")?.it_done(name, body)
}

#[track_caller]
pub fn it_done_with<F, Fut>(name: impl Into<String>, config: Config, body: F) -> Result<Arc<Test>, EngineError>
where
    F: Fn(Done) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    require("it")?.it_done_with(name, config, body)
}

pub fn before<F, Fut>(hook: F) -> Result<(), EngineError>
where
    F: Fn(Arc<Suite>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    require("before")?.before(hook);
    Ok(())
}

pub fn after<F, Fut>(hook: F) -> Result<(), EngineError>
where
    F: Fn(Arc<Suite>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    require("after")?.after(hook);
    Ok(())
}

pub fn before_each<F, Fut>(hook: F) -> Result<(), EngineError>
where
    F: Fn(Arc<Test>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    require("before_each")?.before_each(hook);
    Ok(())
}

pub fn after_each<F, Fut>(hook: F) -> Result<(), EngineError>
where
    F: Fn(Arc<Test>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    require("after_each")?.after_each(hook);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tree::ConfigNode;

    #[test]
    fn test_calls_without_current_suite_fail() {
        let err = it("orphan", || async { Ok(()) }).unwrap_err();
        assert!(matches!(err, EngineError::NoCurrentSuite("it")));
        assert!(current().is_none());
    }

    #[test]
    fn test_describe_nests_current_suite() {
        let root = Suite::root("globals", Config::new());
        {
            let _scope = install(root.clone());
            it("top", || async { Ok(()) }).unwrap();
            describe("outer", |_| {
                it("inner", || async { Ok(()) })?;
                before_each(|_| async { Ok(()) })?;
                Ok(())
            })
            .unwrap();
            it("after outer", || async { Ok(()) }).unwrap();
        }

        assert!(current().is_none());
        let names: Vec<_> = root.tests().iter().map(|t| t.qualified_name().to_string()).collect();
        assert_eq!(names, ["globals/top", "globals/outer/inner", "globals/after outer"]);

        let outer = root.child("outer").unwrap();
        assert_eq!(outer.as_suite().unwrap().before_eaches().len(), 1);
    }

    #[test]
    fn test_failed_describe_restores_current_suite() {
        let root = Suite::root("restore", Config::new());
        let _scope = install(root.clone());

        let suite = describe("broken", |_| anyhow::bail!("bad definition")).unwrap();
        it("still at root", || async { Ok(()) }).unwrap();

        assert!(suite.err().is_some());
        assert!(root.child("still at root").is_some());
    }
}
