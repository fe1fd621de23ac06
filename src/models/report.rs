//! Report models
//!
//! Serializable snapshots of a settled test tree.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::tree::{ConfigNode, Node, Suite, Test};

/// Outcome of a node
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeStatus {
    Pass,
    Fail,
    Skip,
}

impl NodeStatus {
    pub fn symbol(&self) -> &'static str {
        match self {
            NodeStatus::Pass => "✓",
            NodeStatus::Fail => "✗",
            NodeStatus::Skip => "☐",
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, NodeStatus::Pass)
    }
}

impl fmt::Display for NodeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NodeStatus::Pass => write!(f, "PASS"),
            NodeStatus::Fail => write!(f, "FAIL"),
            NodeStatus::Skip => write!(f, "SKIP"),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportKind {
    Suite,
    Test,
}

/// Snapshot of one node and its subtree
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct NodeReport {
    pub name: String,
    pub path: String,
    pub kind: ReportKind,
    pub status: NodeStatus,
    pub depth: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub line: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Passing tests below a suite
    pub passing: usize,
    /// Tests below a suite that were not skipped
    pub total: usize,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<NodeReport>,
}

fn millis(duration: Option<Duration>) -> Option<f64> {
    duration.map(|d| d.as_secs_f64() * 1000.0)
}

impl NodeReport {
    pub fn from_suite(suite: &Arc<Suite>) -> Self {
        let total = suite.tests().len() - suite.skipped_tests().len();

        Self {
            name: suite.name().to_string(),
            path: suite.qualified_name().to_string(),
            kind: ReportKind::Suite,
            status: suite.status(),
            depth: suite.depth(),
            line: suite.call_site(),
            duration_ms: millis(suite.duration()),
            error: suite.err().map(|err| err.report()),
            passing: suite.passing_tests().len(),
            total,
            children: suite.children().iter().map(NodeReport::from_node).collect(),
        }
    }

    pub fn from_test(test: &Arc<Test>) -> Self {
        let status = test.status();

        Self {
            name: test.name().to_string(),
            path: test.qualified_name().to_string(),
            kind: ReportKind::Test,
            status,
            depth: test.depth(),
            line: test.call_site(),
            duration_ms: millis(test.duration()),
            error: test.err().map(|err| err.report()),
            passing: usize::from(status == NodeStatus::Pass),
            total: usize::from(status != NodeStatus::Skip),
            children: Vec::new(),
        }
    }

    pub fn from_node(node: &Node) -> Self {
        match node {
            Node::Suite(suite) => Self::from_suite(suite),
            Node::Test(test) => Self::from_test(test),
        }
    }

    /// Tests in this subtree, depth first
    pub fn tests(&self) -> Vec<&NodeReport> {
        match self.kind {
            ReportKind::Test => vec![self],
            ReportKind::Suite => self.children.iter().flat_map(NodeReport::tests).collect(),
        }
    }
}

/// Pass/fail/skip tally
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Counts {
    pub passed: usize,
    pub failed: usize,
    pub skipped: usize,
}

impl Counts {
    pub fn record(&mut self, status: NodeStatus) {
        match status {
            NodeStatus::Pass => self.passed += 1,
            NodeStatus::Fail => self.failed += 1,
            NodeStatus::Skip => self.skipped += 1,
        }
    }

    pub fn total(&self) -> usize {
        self.passed + self.failed + self.skipped
    }
}

impl fmt::Display for Counts {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} passed, {} failed", self.passed, self.failed)?;
        if self.skipped > 0 {
            write!(f, ", {} skipped", self.skipped)?;
        }
        Ok(())
    }
}

/// Quote a shell argument when it contains whitespace
fn shell_arg(arg: &str) -> String {
    if arg.chars().any(char::is_whitespace) {
        format!("\"{arg}\"")
    } else {
        arg.to_string()
    }
}

/// Command that re-runs only the failing tests of a root suite
///
/// Each failing test is named by its qualified name relative to the suite,
/// escaped and anchored on the preceding `/` and the end of the name so a
/// filter such as `fails1` does not also pick `fails10`. Returns `None` when
/// nothing in the suite failed.
pub fn rerun_hint(program: &str, suite: &Suite) -> Option<String> {
    let failing = suite.failing_tests();
    if failing.is_empty() {
        return None;
    }

    let prefix = format!("{}/", suite.qualified_name());
    let filters: Vec<String> = failing
        .iter()
        .map(|test| {
            let name = test.qualified_name();
            let relative = name.strip_prefix(&prefix).unwrap_or(name);
            format!("\"/{}$\"", regex::escape(relative))
        })
        .collect();

    Some(format!(
        "{} {} --test-name-filter {}",
        program,
        shell_arg(suite.name()),
        filters.join(" ")
    ))
}

/// Totals for a whole run
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RunSummary {
    pub started_at: DateTime<Utc>,
    pub duration_ms: f64,
    /// Root suites, one per loaded source
    pub files: Counts,
    /// Nested suites
    pub suites: Counts,
    pub tests: Counts,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub rerun: Vec<String>,
}

impl RunSummary {
    pub fn new(started_at: DateTime<Utc>, duration: Duration, roots: &[Arc<Suite>]) -> Self {
        let mut files = Counts::default();
        let mut suites = Counts::default();
        let mut tests = Counts::default();

        for root in roots {
            files.record(root.status());
            root.traverse((), |(), node| {
                match node {
                    Node::Suite(suite) if suite.depth() > 0 => suites.record(suite.status()),
                    Node::Suite(_) => {}
                    Node::Test(test) => tests.record(test.status()),
                }
            });
        }

        Self {
            started_at,
            duration_ms: duration.as_secs_f64() * 1000.0,
            files,
            suites,
            tests,
            rerun: Vec::new(),
        }
    }

    /// Attach re-run hints for every failing root
    pub fn with_rerun_hints(mut self, program: &str, roots: &[Arc<Suite>]) -> Self {
        self.rerun = roots
            .iter()
            .filter_map(|root| rerun_hint(program, root))
            .collect();
        self
    }

    pub fn is_all_passed(&self) -> bool {
        self.files.failed == 0 && self.tests.failed == 0
    }
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Files:  {}", self.files)?;
        writeln!(f, "Suites: {}", self.suites)?;
        writeln!(f, "Tests:  {}", self.tests)?;
        write!(f, "Time:   {:.2}ms", self.duration_ms)?;
        for hint in &self.rerun {
            write!(f, "\n{hint}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tree::Config;

    async fn fails_suite() -> Arc<Suite> {
        let suite = Suite::root("fails", Config::new());
        suite.it("passes", || async { Ok(()) }).unwrap();
        suite.it("fails1", || async { anyhow::bail!("first") }).unwrap();
        suite.it("fails2", || async { anyhow::bail!("second") }).unwrap();
        suite.clone().run().await;
        suite
    }

    #[test]
    fn test_status_symbols() {
        assert_eq!(NodeStatus::Pass.symbol(), "✓");
        assert_eq!(NodeStatus::Fail.symbol(), "✗");
        assert_eq!(NodeStatus::Skip.symbol(), "☐");
        assert_eq!(NodeStatus::Fail.to_string(), "FAIL");
        assert!(NodeStatus::Pass.is_success());
    }

    #[tokio::test]
    async fn test_rerun_hint() {
        let suite = fails_suite().await;

        assert_eq!(
            rerun_hint("vt", &suite).unwrap(),
            "vt fails --test-name-filter \"/fails1$\" \"/fails2$\""
        );
    }

    #[tokio::test]
    async fn test_rerun_hint_selects_only_failing_tests() {
        let suite = Suite::root("fails", Config::new());
        suite.it("fails1", || async { anyhow::bail!("first") }).unwrap();
        suite.it("fails10", || async { Ok(()) }).unwrap();
        suite.clone().run().await;

        let hint = rerun_hint("vt", &suite).unwrap();
        assert_eq!(hint, "vt fails --test-name-filter \"/fails1$\"");

        let filter = hint.rsplit('"').nth(1).unwrap().to_string();
        let rerun = Suite::root("fails", Config::new().test_name_filter([filter]));
        let picked = rerun.it("fails1", || async { Ok(()) }).unwrap();
        let passed = rerun.it("fails10", || async { Ok(()) }).unwrap();

        assert!(!picked.is_skipped());
        assert!(passed.is_skipped());
    }

    #[tokio::test]
    async fn test_rerun_hint_nested_and_escaped() {
        let suite = Suite::root("my file", Config::new());
        suite
            .describe("group", |group| {
                group.it("a.b (1)", || async { anyhow::bail!("broken") })?;
                Ok(())
            })
            .unwrap();
        suite.clone().run().await;

        assert_eq!(
            rerun_hint("vt", &suite).unwrap(),
            "vt \"my file\" --test-name-filter \"/group/a\\.b \\(1\\)$\""
        );
    }

    #[tokio::test]
    async fn test_no_hint_for_passing_suite() {
        let suite = Suite::root("green", Config::new());
        suite.it("passes", || async { Ok(()) }).unwrap();
        suite.clone().run().await;

        assert!(rerun_hint("vt", &suite).is_none());
    }

    #[tokio::test]
    async fn test_node_report_counts() {
        let suite = fails_suite().await;
        let report = NodeReport::from_suite(&suite);

        assert_eq!(report.status, NodeStatus::Fail);
        assert_eq!(report.passing, 1);
        assert_eq!(report.total, 3);
        assert_eq!(report.tests().len(), 3);
        assert!(report.children[1].error.as_deref().unwrap().starts_with("first"));
        assert_eq!(report.children[0].path, "fails/passes");
    }

    #[tokio::test]
    async fn test_run_summary() {
        let suite = fails_suite().await;
        let roots = vec![suite];
        let summary = RunSummary::new(Utc::now(), Duration::from_millis(5), &roots)
            .with_rerun_hints("vt", &roots);

        assert_eq!(summary.files.failed, 1);
        assert_eq!(summary.suites.total(), 0);
        assert_eq!(summary.tests, Counts { passed: 1, failed: 2, skipped: 0 });
        assert_eq!(summary.rerun.len(), 1);
        assert!(!summary.is_all_passed());
        assert!(summary.to_string().contains("Tests:  1 passed, 2 failed"));
    }
}
