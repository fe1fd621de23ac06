//! vt - hierarchical async test runner
//!
//! Tests are grouped into suites that form a tree. Every node carries its own
//! configuration and inherits unset values from its ancestors, so a timeout or
//! scheduling mode set on a suite applies to everything below it.
//!
//! ## Features
//!
//! - Parallel or serial execution, chosen per suite
//! - `before`/`after` hooks per suite and `before_each`/`after_each` hooks
//!   inherited by every test below
//! - Per-test timeouts and completion-handle (`done`) test bodies
//! - Focus by declaration line or by qualified-name patterns
//! - Tree, JSON, CSV and summary reports with re-run hints
//!
//! ## Usage
//!
//! ```no_run
//! use vt::executor::SourceSet;
//!
//! fn main() -> std::process::ExitCode {
//!     let sources = SourceSet::new().with("math", |root| {
//!         root.describe("addition", |suite| {
//!             suite.it("adds", || async {
//!                 assert_eq!(1 + 1, 2);
//!                 Ok(())
//!             })?;
//!             Ok(())
//!         })?;
//!         Ok(())
//!     });
//!
//!     vt::cli::main(sources)
//! }
//! ```

pub mod cli;
pub mod config;
pub mod error;
pub mod executor;
pub mod globals;
pub mod models;
pub mod output;
pub mod tree;
pub mod utils;

pub use config::RunnerConfig;
pub use error::{EngineError, Failure};
pub use executor::{Runner, Source, SourceSet};
pub use tree::{Config, ConfigNode, Done, Node, Suite, Test, Timeout};
