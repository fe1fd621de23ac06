//! Environment variable configuration
//!
//! Provides environment variable overrides for configuration.

use std::env;

use super::RunnerConfig;
use crate::tree::Timeout;

/// Environment variable prefix
const ENV_PREFIX: &str = "VT";

/// Environment configuration from environment variables
#[derive(Clone, Debug, Default, PartialEq)]
pub struct EnvConfig {
    /// Parallel from VT_PARALLEL
    pub parallel: Option<bool>,
    /// Completion-argument mode from VT_MOCHA_DONE
    pub mocha_done: Option<bool>,
    /// Globals from VT_GLOBALS
    pub globals: Option<bool>,
    /// Per-test timeout in ms from VT_TIMEOUT
    pub timeout: Option<u64>,
    /// Comma separated lines from VT_LINE
    pub line: Option<Vec<u32>>,
    /// Comma separated patterns from VT_TEST_NAME_FILTER
    pub test_name_filter: Option<Vec<String>>,
    /// Re-run hints from VT_FAILING_TESTS
    pub failing_tests: Option<bool>,
    /// Config file from VT_CONFIG
    pub config_file: Option<String>,
    /// Output format from VT_FORMAT
    pub format: Option<String>,
}

impl EnvConfig {
    /// Load configuration from environment variables
    pub fn load() -> Self {
        Self {
            parallel: get_env_bool("PARALLEL"),
            mocha_done: get_env_bool("MOCHA_DONE"),
            globals: get_env_bool("GLOBALS"),
            timeout: get_env_parse("TIMEOUT"),
            line: get_env_list("LINE").map(|lines| {
                lines.iter().filter_map(|line| line.parse().ok()).collect()
            }),
            test_name_filter: get_env_list("TEST_NAME_FILTER"),
            failing_tests: get_env_bool("FAILING_TESTS"),
            config_file: get_env("CONFIG"),
            format: get_env("FORMAT"),
        }
    }

    /// Check if any environment variables are set
    pub fn has_any(&self) -> bool {
        self != &Self::default()
    }

    /// Overlay the set values onto `config`
    pub fn apply(&self, config: &mut RunnerConfig) {
        if let Some(parallel) = self.parallel {
            config.parallel = parallel;
        }
        if let Some(mocha_done) = self.mocha_done {
            config.mocha_done = mocha_done;
        }
        if let Some(globals) = self.globals {
            config.globals = globals;
        }
        if let Some(ms) = self.timeout {
            config.timeout = Some(Timeout::from_millis(ms));
        }
        if let Some(line) = &self.line {
            config.line = line.clone();
        }
        if let Some(patterns) = &self.test_name_filter {
            config.test_name_filter = patterns.clone();
        }
        if let Some(failing_tests) = self.failing_tests {
            config.failing_tests = failing_tests;
        }
        if let Some(format) = &self.format {
            config.format = format.clone();
        }
    }
}

/// Get environment variable with prefix
fn get_env(name: &str) -> Option<String> {
    env::var(format!("{ENV_PREFIX}_{name}")).ok()
}

/// Get environment variable and parse to type
fn get_env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    get_env(name).and_then(|v| v.parse().ok())
}

/// Get environment variable as boolean
fn get_env_bool(name: &str) -> Option<bool> {
    get_env(name).map(|v| {
        matches!(
            v.to_lowercase().as_str(),
            "1" | "true" | "yes" | "on" | "enabled"
        )
    })
}

/// Get environment variable as a comma separated list
fn get_env_list(name: &str) -> Option<Vec<String>> {
    get_env(name).map(|v| {
        v.split(',')
            .map(str::trim)
            .filter(|item| !item.is_empty())
            .map(String::from)
            .collect()
    })
}

/// Builder for setting environment variables (useful for testing)
#[cfg(test)]
pub(crate) struct EnvBuilder {
    vars: Vec<(String, String)>,
}

#[cfg(test)]
impl EnvBuilder {
    pub fn new() -> Self {
        Self { vars: Vec::new() }
    }

    pub fn var(mut self, name: &str, value: impl Into<String>) -> Self {
        self.vars.push((format!("{ENV_PREFIX}_{name}"), value.into()));
        self
    }

    /// Apply and return guard that restores on drop
    pub fn apply_scoped(self) -> EnvGuard {
        let previous: Vec<_> = self
            .vars
            .iter()
            .map(|(k, _)| (k.clone(), env::var(k).ok()))
            .collect();

        for (key, value) in self.vars {
            env::set_var(key, value);
        }

        EnvGuard { previous }
    }
}

/// Guard that restores environment variables on drop
#[cfg(test)]
pub(crate) struct EnvGuard {
    previous: Vec<(String, Option<String>)>,
}

#[cfg(test)]
impl Drop for EnvGuard {
    fn drop(&mut self) {
        for (key, value) in &self.previous {
            match value {
                Some(v) => env::set_var(key, v),
                None => env::remove_var(key),
            }
        }
    }
}
