//! Test execution runner
//!
//! Loads sources into root suites, runs the forest and reports the outcome.

use anyhow::Result;
use chrono::{DateTime, Utc};
use futures::future::join_all;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

use super::source::Source;
use crate::config::RunnerConfig;
use crate::globals;
use crate::models::RunSummary;
use crate::output::ReportFormatter;
use crate::tree::{Config, ConfigNode, Suite, Test};
use crate::utils::{guard_sync, time, Memo};

/// Program name used in re-run hints
pub const PROGRAM: &str = "vt";

/// Orchestrates loading and running of root suites
pub struct Runner {
    config: RunnerConfig,
    sources: Vec<Source>,
    suites: Vec<Arc<Suite>>,
    loaded: usize,
    started_at: Option<DateTime<Utc>>,
    duration: Option<Duration>,
    tests: Memo<Vec<Arc<Test>>>,
    passing_tests: Memo<Vec<Arc<Test>>>,
    failing_tests: Memo<Vec<Arc<Test>>>,
    skipped_tests: Memo<Vec<Arc<Test>>>,
}

impl Runner {
    pub fn new(config: RunnerConfig) -> Self {
        Self {
            config,
            sources: Vec::new(),
            suites: Vec::new(),
            loaded: 0,
            started_at: None,
            duration: None,
            tests: Memo::new(),
            passing_tests: Memo::new(),
            failing_tests: Memo::new(),
            skipped_tests: Memo::new(),
        }
    }

    /// Add sources to load
    pub fn with_sources(mut self, sources: impl IntoIterator<Item = Source>) -> Self {
        for source in sources {
            self.add_source(source);
        }
        self
    }

    pub fn add_source(&mut self, source: Source) {
        self.sources.push(source);
    }

    pub fn config(&self) -> &RunnerConfig {
        &self.config
    }

    /// Own configuration given to every root suite
    pub fn suite_config(&self) -> Config {
        self.config.suite_config()
    }

    /// Declare a root suite outside of any source
    #[track_caller]
    pub fn describe<F>(&mut self, name: impl Into<String>, define: F) -> Arc<Suite>
    where
        F: FnOnce(&Arc<Suite>) -> Result<()>,
    {
        let suite = Suite::new(name, self.suite_config(), None);
        self.define(&suite, define);
        self.suites.push(suite.clone());
        self.reset();
        suite
    }

    fn define<F>(&self, suite: &Arc<Suite>, define: F)
    where
        F: FnOnce(&Arc<Suite>) -> Result<()>,
    {
        let _scope = self.config.globals.then(|| globals::install(suite.clone()));
        if let Err(err) = guard_sync(|| define(suite)) {
            suite.record_construction_error(err);
        }
    }

    /// Evaluate every pending source into its own root suite, one at a time
    ///
    /// Sources already loaded are not evaluated again.
    pub fn load(&mut self) {
        if self.loaded == self.sources.len() {
            return;
        }

        let pending = self.sources[self.loaded..].to_vec();
        for source in pending {
            debug!("Loading source {}", source.name());
            let root = Suite::root(source.name(), self.suite_config());
            self.define(&root, |root| source.define(root));
            self.suites.push(root);
        }

        self.loaded = self.sources.len();
        self.reset();
        info!("Loaded {} root suites with {} tests", self.suites.len(), self.tests().len());
    }

    fn reset(&mut self) {
        self.tests = Memo::new();
        self.passing_tests = Memo::new();
        self.failing_tests = Memo::new();
        self.skipped_tests = Memo::new();
    }

    /// Load if needed, then run every root suite
    pub async fn run(&mut self) {
        self.load();

        info!(
            "Running {} root suites ({})",
            self.suites.len(),
            if self.config.parallel { "parallel" } else { "serial" }
        );

        self.started_at = Some(Utc::now());
        let suites = self.suites.clone();
        let parallel = self.config.parallel;
        let timed = time(async move {
            if parallel {
                join_all(suites.into_iter().map(Suite::run)).await;
            } else {
                for suite in suites {
                    suite.run().await;
                }
            }
        })
        .await;
        self.duration = Some(timed.duration);
        self.reset();

        info!(
            "Run completed in {:.2}ms - Pass: {}/{}, skipped: {}",
            timed.duration_ms(),
            self.passing_tests().len(),
            self.tests().len() - self.skipped_tests().len(),
            self.skipped_tests().len()
        );
    }

    pub fn suites(&self) -> &[Arc<Suite>] {
        &self.suites
    }

    /// Every test of every root suite, in load order
    pub fn tests(&self) -> &[Arc<Test>] {
        self.tests.get_or_init(|| {
            self.suites
                .iter()
                .flat_map(|suite| suite.tests().iter().cloned())
                .collect()
        })
    }

    pub fn passing_tests(&self) -> &[Arc<Test>] {
        self.passing_tests.get_or_init(|| {
            self.suites
                .iter()
                .flat_map(|suite| suite.passing_tests().iter().cloned())
                .collect()
        })
    }

    pub fn failing_tests(&self) -> &[Arc<Test>] {
        self.failing_tests.get_or_init(|| {
            self.suites
                .iter()
                .flat_map(|suite| suite.failing_tests().iter().cloned())
                .collect()
        })
    }

    pub fn skipped_tests(&self) -> &[Arc<Test>] {
        self.skipped_tests.get_or_init(|| {
            self.suites
                .iter()
                .flat_map(|suite| suite.skipped_tests().iter().cloned())
                .collect()
        })
    }

    pub fn pass(&self) -> bool {
        self.suites.iter().all(|suite| suite.pass())
    }

    pub fn fail(&self) -> bool {
        self.suites.iter().any(|suite| suite.fail())
    }

    /// Process exit status: non-zero when anything failed
    pub fn exit_code(&self) -> i32 {
        i32::from(self.fail())
    }

    /// Wall time of the last run
    pub fn duration(&self) -> Option<Duration> {
        self.duration
    }

    /// Totals of the last run, with re-run hints for roots that ask for them
    pub fn summary(&self) -> RunSummary {
        let summary = RunSummary::new(
            self.started_at.unwrap_or_else(Utc::now),
            self.duration.unwrap_or_default(),
            &self.suites,
        );

        let hinted: Vec<Arc<Suite>> = self
            .suites
            .iter()
            .filter(|suite| ConfigNode::failing_tests(suite.as_ref()))
            .cloned()
            .collect();
        summary.with_rerun_hints(PROGRAM, &hinted)
    }

    /// Render the report in the configured format
    pub fn report(&self) -> Result<String> {
        let mut formatter = ReportFormatter::new(self.config.output_format()?);
        if !self.config.color {
            formatter = formatter.no_color();
        }
        formatter.format_report(&self.suites, &self.summary())
    }
}
