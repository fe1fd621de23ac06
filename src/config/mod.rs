//! Configuration module
//!
//! Handles loading and layering the runner configuration.

mod env;
mod file;

pub use env::EnvConfig;
pub use file::{ConfigFile, CONFIG_LOCATIONS};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::Path;

use crate::output::OutputFormat;
use crate::tree::{Config, Timeout};

/// Runner configuration
///
/// Everything except the output settings is merged into each root suite's
/// own configuration.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunnerConfig {
    /// Run root suites concurrently; also the default for every suite
    pub parallel: bool,

    /// Single-argument test bodies finish when `done` is called
    pub mocha_done: bool,

    /// Install the free-function declaration API while sources load
    pub globals: bool,

    /// Per-test budget overriding the default
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout: Option<Timeout>,

    /// Source lines selected for execution
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub line: Vec<u32>,

    /// Regex patterns selecting tests by qualified name
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub test_name_filter: Vec<String>,

    /// Print a re-run command per failing source
    pub failing_tests: bool,

    /// Report format
    pub format: String,

    /// Colored terminal output
    pub color: bool,

    /// Source names or glob patterns; empty selects every source
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub sources: Vec<String>,

    /// User-defined keys visible to every node
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub custom: BTreeMap<String, Value>,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            parallel: true,
            mocha_done: false,
            globals: false,
            timeout: None,
            line: Vec::new(),
            test_name_filter: Vec::new(),
            failing_tests: false,
            format: "tree".to_string(),
            color: true,
            sources: Vec::new(),
            custom: BTreeMap::new(),
        }
    }
}

impl RunnerConfig {
    /// Own configuration given to every root suite
    pub fn suite_config(&self) -> Config {
        Config {
            parallel: Some(self.parallel),
            mocha_done: Some(self.mocha_done),
            timeout: self.timeout,
            line: (!self.line.is_empty()).then(|| self.line.clone()),
            test_name_filter: (!self.test_name_filter.is_empty())
                .then(|| self.test_name_filter.clone()),
            failing_tests: Some(self.failing_tests),
            custom: self.custom.clone(),
            ..Config::default()
        }
    }

    pub fn output_format(&self) -> Result<OutputFormat> {
        OutputFormat::from_str(&self.format)
            .with_context(|| format!("Unknown output format: {}", self.format))
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        self.output_format()?;

        for pattern in &self.test_name_filter {
            crate::tree::compile_filter(pattern)?;
        }

        Ok(())
    }

    /// Load configuration from file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        Ok(ConfigFile::load(path)?.runner)
    }

    /// Save configuration to file
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        ConfigFile::from(self.clone()).save(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = RunnerConfig::default();
        assert!(config.parallel);
        assert!(!config.mocha_done);
        assert_eq!(config.format, "tree");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_suite_config() {
        let config = RunnerConfig {
            parallel: false,
            timeout: Some(Timeout::from_millis(250)),
            line: vec![4],
            ..RunnerConfig::default()
        };

        let suite = config.suite_config();
        assert_eq!(suite.parallel, Some(false));
        assert_eq!(suite.mocha_done, Some(false));
        assert_eq!(suite.timeout, Some(Timeout::from_millis(250)));
        assert_eq!(suite.line, Some(vec![4]));
        assert_eq!(suite.test_name_filter, None);
        assert_eq!(suite.skip, None);
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let config = RunnerConfig {
            format: "xml".to_string(),
            ..RunnerConfig::default()
        };
        assert!(config.validate().is_err());

        let config = RunnerConfig {
            test_name_filter: vec!["[".to_string()],
            ..RunnerConfig::default()
        };
        assert!(config.validate().is_err());
    }
}
