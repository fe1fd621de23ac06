//! The test tree
//!
//! Suites own their children; every node holds a weak link to its parent
//! which configuration lookups walk on each read.

mod config;
mod focus;
mod node;
mod suite;
mod test_case;

pub use config::{Config, NodeKind, Timeout, DEFAULT_TEST_TIMEOUT_MS};
pub use focus::{compile as compile_filter, is_compiled as is_filter_compiled};
pub use node::{resolve, resolve_call_site_line, ConfigNode, Node, NodeCore};
pub use suite::{Aggregate, Suite, SuiteHook, TestHook};
pub use test_case::{Body, CallbackFuture, Done, Test};
