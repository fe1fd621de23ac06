//! Test execution engine
//!
//! Loads test-definition sources into root suites and runs them.

mod runner;
mod source;

pub use runner::{Runner, PROGRAM};
pub use source::{Source, SourceSet};
