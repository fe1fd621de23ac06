//! Data models for run reports
//!
//! Snapshots of settled test trees used by every output format.

mod report;

pub use report::{rerun_hint, Counts, NodeReport, NodeStatus, ReportKind, RunSummary};
