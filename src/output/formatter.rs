//! Output formatters for run reports
//!
//! Provides tree, JSON, CSV and summary output formats.

use anyhow::{Context, Result};
use serde::Serialize;
use std::io::Write;
use std::sync::Arc;

use crate::models::{Counts, NodeReport, NodeStatus, RunSummary};
use crate::tree::{ConfigNode, Node, Suite, Test};

const GREEN: &str = "\x1b[32m";
const RED: &str = "\x1b[31m";
const YELLOW: &str = "\x1b[33m";
const GRAY: &str = "\x1b[90m";
const RESET: &str = "\x1b[0m";

/// Output format options
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OutputFormat {
    Tree,
    Json,
    JsonPretty,
    Csv,
    Summary,
}

impl OutputFormat {
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "tree" => Some(OutputFormat::Tree),
            "json" => Some(OutputFormat::Json),
            "json-pretty" | "jsonpretty" => Some(OutputFormat::JsonPretty),
            "csv" => Some(OutputFormat::Csv),
            "summary" => Some(OutputFormat::Summary),
            _ => None,
        }
    }
}

#[derive(Serialize)]
struct JsonReport<'a> {
    summary: &'a RunSummary,
    suites: Vec<NodeReport>,
}

/// Report formatter
pub struct ReportFormatter {
    format: OutputFormat,
    colorize: bool,
}

impl ReportFormatter {
    pub fn new(format: OutputFormat) -> Self {
        Self {
            format,
            colorize: true,
        }
    }

    pub fn no_color(mut self) -> Self {
        self.colorize = false;
        self
    }

    fn paint(&self, color: &str, text: &str) -> String {
        if self.colorize {
            format!("{color}{text}{RESET}")
        } else {
            text.to_string()
        }
    }

    fn status_color(status: NodeStatus) -> &'static str {
        match status {
            NodeStatus::Pass => GREEN,
            NodeStatus::Fail => RED,
            NodeStatus::Skip => YELLOW,
        }
    }

    fn duration(&self, node: &impl ConfigNode) -> Option<String> {
        node.duration().map(|d| {
            self.paint(GRAY, &format!("({:.2}ms)", d.as_secs_f64() * 1000.0))
        })
    }

    fn error_block(&self, depth: usize, report: &str) -> String {
        let indent = "  ".repeat(depth + 1);
        report
            .lines()
            .map(|line| self.paint(RED, &format!("{indent}{line}")))
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Render every root suite followed by the run summary
    pub fn format_report(&self, roots: &[Arc<Suite>], summary: &RunSummary) -> Result<String> {
        match self.format {
            OutputFormat::Tree => {
                let mut output: Vec<String> = roots.iter().map(|root| self.format_suite(root)).collect();
                output.push(String::new());
                output.push(self.format_summary(summary));
                Ok(output.join("\n"))
            }
            OutputFormat::Json | OutputFormat::JsonPretty => {
                let report = JsonReport {
                    summary,
                    suites: roots.iter().map(NodeReport::from_suite).collect(),
                };
                if self.format == OutputFormat::JsonPretty {
                    serde_json::to_string_pretty(&report).context("Failed to serialize report")
                } else {
                    serde_json::to_string(&report).context("Failed to serialize report")
                }
            }
            OutputFormat::Csv => self.format_csv(roots),
            OutputFormat::Summary => Ok(self.format_summary(summary)),
        }
    }

    /// A suite and, unless it was skipped entirely, everything below it
    pub fn format_suite(&self, suite: &Arc<Suite>) -> String {
        let skipped = suite.is_skipped() || suite.tests().len() == suite.skipped_tests().len();
        let color = if suite.fail() {
            RED
        } else if skipped {
            YELLOW
        } else {
            GREEN
        };

        let mut header = format!("{}{}", "  ".repeat(suite.depth()), self.paint(color, suite.name()));
        if !skipped {
            let counted = suite.tests().len() - suite.skipped_tests().len();
            header.push_str(&format!(" [{}/{}]", suite.passing_tests().len(), counted));
            if let Some(duration) = self.duration(suite.as_ref()) {
                header.push(' ');
                header.push_str(&duration);
            }
        }

        let mut lines = vec![header];
        if let Some(err) = suite.err() {
            lines.push(self.error_block(suite.depth(), &err.report()));
        }
        if !skipped {
            for child in suite.children() {
                lines.push(match &child {
                    Node::Suite(suite) => self.format_suite(suite),
                    Node::Test(test) => self.format_test(test),
                });
            }
        }

        lines.join("\n")
    }

    pub fn format_test(&self, test: &Arc<Test>) -> String {
        let status = test.status();
        let mut line = format!(
            "{}{} {}",
            "  ".repeat(test.depth()),
            self.paint(Self::status_color(status), status.symbol()),
            test.name()
        );

        if status != NodeStatus::Skip {
            if let Some(duration) = self.duration(test.as_ref()) {
                line.push(' ');
                line.push_str(&duration);
            }
        }

        match test.err() {
            Some(err) => format!("{line}\n{}", self.error_block(test.depth(), &err.report())),
            None => line,
        }
    }

    pub fn format_summary(&self, summary: &RunSummary) -> String {
        let tests = &summary.tests;
        let mut output = vec![
            format!("Files:  {}", self.format_counts(&summary.files)),
            format!("Suites: {}", self.format_counts(&summary.suites)),
            format!("Tests:  {}", self.format_counts(tests)),
            format!("Time:   {:.2}ms", summary.duration_ms),
        ];

        if !summary.rerun.is_empty() {
            output.push(String::new());
            output.push("Re-run failing tests:".to_string());
            output.extend(summary.rerun.iter().map(|hint| format!("  {hint}")));
        }

        output.join("\n")
    }

    fn format_counts(&self, counts: &Counts) -> String {
        let mut parts = vec![
            self.paint(GREEN, &format!("{} passed", counts.passed)),
            if counts.failed > 0 {
                self.paint(RED, &format!("{} failed", counts.failed))
            } else {
                format!("{} failed", counts.failed)
            },
        ];
        if counts.skipped > 0 {
            parts.push(self.paint(YELLOW, &format!("{} skipped", counts.skipped)));
        }
        format!("{} ({} total)", parts.join(", "), counts.total())
    }

    fn format_csv(&self, roots: &[Arc<Suite>]) -> Result<String> {
        let mut writer = csv::Writer::from_writer(Vec::new());
        writer.write_record(["path", "status", "line", "duration_ms", "error"])?;

        for root in roots {
            let report = NodeReport::from_suite(root);
            for test in report.tests() {
                writer.write_record([
                    test.path.clone(),
                    test.status.to_string(),
                    test.line.map(|l| l.to_string()).unwrap_or_default(),
                    test.duration_ms.map(|d| format!("{d:.2}")).unwrap_or_default(),
                    test.error.clone().unwrap_or_default(),
                ])?;
            }
        }

        let bytes = writer
            .into_inner()
            .map_err(|err| anyhow::anyhow!("Failed to flush CSV output: {}", err.error()))?;
        String::from_utf8(bytes).context("CSV output is not UTF-8")
    }
}

impl Default for ReportFormatter {
    fn default() -> Self {
        Self::new(OutputFormat::Tree)
    }
}

/// Write a report to a file without colors
pub fn write_report_to_file(
    path: &str,
    roots: &[Arc<Suite>],
    summary: &RunSummary,
    format: OutputFormat,
) -> Result<()> {
    let formatter = ReportFormatter::new(format).no_color();
    let content = formatter.format_report(roots, summary)?;

    let mut file = std::fs::File::create(path)
        .with_context(|| format!("Failed to create report file: {path}"))?;
    file.write_all(content.as_bytes())?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tree::Config;
    use chrono::Utc;
    use std::time::Duration;

    async fn sample() -> Vec<Arc<Suite>> {
        let root = Suite::root("sample", Config::new());
        root.it("passes", || async { Ok(()) }).unwrap();
        root.describe("group", |group| {
            group.it("fails", || async { anyhow::bail!("wrong answer") })?;
            group.it_skip("later", || async { Ok(()) })?;
            Ok(())
        })
        .unwrap();
        root.clone().run().await;
        vec![root]
    }

    fn summary(roots: &[Arc<Suite>]) -> RunSummary {
        RunSummary::new(Utc::now(), Duration::from_millis(3), roots).with_rerun_hints("vt", roots)
    }

    #[test]
    fn test_output_format_from_str() {
        assert_eq!(OutputFormat::from_str("json"), Some(OutputFormat::Json));
        assert_eq!(OutputFormat::from_str("TREE"), Some(OutputFormat::Tree));
        assert_eq!(OutputFormat::from_str("unknown"), None);
    }

    #[test]
    fn test_formatter_creation() {
        let formatter = ReportFormatter::new(OutputFormat::Json).no_color();
        assert_eq!(formatter.format, OutputFormat::Json);
        assert!(!formatter.colorize);
    }

    #[tokio::test]
    async fn test_tree_output() {
        let roots = sample().await;
        let output = ReportFormatter::new(OutputFormat::Tree)
            .no_color()
            .format_report(&roots, &summary(&roots))
            .unwrap();

        let lines: Vec<&str> = output.lines().collect();
        assert!(lines[0].starts_with("sample [1/2] ("));
        assert!(lines[1].starts_with("  ✓ passes ("));
        assert!(lines[2].starts_with("  group [0/1] ("));
        assert!(lines[3].starts_with("    ✗ fails ("));
        assert_eq!(lines[4], "      wrong answer");
        assert_eq!(lines[5], "    ☐ later");
        assert!(output.contains("Tests:  1 passed, 1 failed, 1 skipped (3 total)"));
        assert!(output.contains("  vt sample --test-name-filter \"/group/fails$\""));
        assert!(!output.contains('\x1b'));
    }

    #[tokio::test]
    async fn test_colored_output() {
        let roots = sample().await;
        let output = ReportFormatter::new(OutputFormat::Tree).format_suite(&roots[0]);

        assert!(output.contains("\x1b[31m✗\x1b[0m fails"));
        assert!(output.contains("\x1b[32m✓\x1b[0m passes"));
    }

    #[tokio::test]
    async fn test_json_output() {
        let roots = sample().await;
        let output = ReportFormatter::new(OutputFormat::Json)
            .format_report(&roots, &summary(&roots))
            .unwrap();

        let value: serde_json::Value = serde_json::from_str(&output).unwrap();
        assert_eq!(value["summary"]["tests"]["failed"], 1);
        assert_eq!(value["suites"][0]["name"], "sample");
        assert_eq!(value["suites"][0]["children"][1]["children"][1]["status"], "skip");
    }

    #[tokio::test]
    async fn test_csv_output() {
        let roots = sample().await;
        let output = ReportFormatter::new(OutputFormat::Csv)
            .format_report(&roots, &summary(&roots))
            .unwrap();

        let lines: Vec<&str> = output.lines().collect();
        assert_eq!(lines[0], "path,status,line,duration_ms,error");
        assert_eq!(lines.len(), 4);
        assert!(lines[2].starts_with("sample/group/fails,FAIL,"));
        assert!(lines[3].starts_with("sample/group/later,SKIP,"));
    }

    #[tokio::test]
    async fn test_write_report_to_file() {
        let roots = sample().await;
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("report.txt");

        write_report_to_file(
            path.to_str().unwrap(),
            &roots,
            &summary(&roots),
            OutputFormat::Summary,
        )
        .unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.starts_with("Files:  0 passed, 1 failed (1 total)"));
    }
}
