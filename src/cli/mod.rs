//! CLI argument parsing
//!
//! Defines the command-line interface using clap and drives a run.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::Path;
use std::process::ExitCode;
use tracing::{debug, info};

use crate::config::{ConfigFile, EnvConfig, RunnerConfig};
use crate::executor::{Runner, SourceSet};
use crate::output::write_report_to_file;
use crate::tree::Timeout;
use crate::utils::logger::{init_logger, LogLevel};

/// Hierarchical async test runner
#[derive(Parser, Debug)]
#[command(name = "vt")]
#[command(version)]
#[command(about = "Run suites of async tests with inherited configuration and focus filters")]
#[command(long_about = None)]
#[command(args_conflicts_with_subcommands = true)]
pub struct Args {
    #[command(subcommand)]
    pub command: Option<Command>,

    #[command(flatten)]
    pub run: RunArgs,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// List registered sources
    List,

    /// Manage configuration files
    Config(ConfigArgs),
}

/// Arguments for a test run
#[derive(Parser, Debug, Default)]
pub struct RunArgs {
    /// Source names or glob patterns to run (default: all)
    pub sources: Vec<String>,

    /// Run suites' children concurrently (--parallel=false for serial)
    #[arg(long, num_args = 0..=1, require_equals = true, default_missing_value = "true")]
    pub parallel: Option<bool>,

    /// Single-argument test bodies finish when `done` is called
    #[arg(long, num_args = 0..=1, require_equals = true, default_missing_value = "true")]
    pub mocha_done: Option<bool>,

    /// Allow sources to use the free-function declaration API
    #[arg(long, num_args = 0..=1, require_equals = true, default_missing_value = "true")]
    pub globals: Option<bool>,

    /// Only run tests and suites declared at these lines
    #[arg(short, long, value_delimiter = ',')]
    pub line: Vec<u32>,

    /// Only run tests whose qualified name matches one of these patterns
    #[arg(short, long, num_args = 1..)]
    pub test_name_filter: Vec<String>,

    /// Print a re-run command for every failing source
    #[arg(long, num_args = 0..=1, require_equals = true, default_missing_value = "true")]
    pub failing_tests: Option<bool>,

    /// Per-test timeout in milliseconds (0 disables)
    #[arg(long)]
    pub timeout: Option<u64>,

    /// Output format (tree, json, json-pretty, csv, summary)
    #[arg(short, long)]
    pub format: Option<String>,

    /// Disable colored output
    #[arg(long)]
    pub no_color: bool,

    /// Configuration file
    #[arg(short, long)]
    pub config: Option<String>,

    /// Also save the report to a file
    #[arg(short, long)]
    pub output: Option<String>,
}

impl RunArgs {
    /// Overlay the flags that were given onto `config`
    pub fn apply(&self, config: &mut RunnerConfig) {
        if !self.sources.is_empty() {
            config.sources = self.sources.clone();
        }
        if let Some(parallel) = self.parallel {
            config.parallel = parallel;
        }
        if let Some(mocha_done) = self.mocha_done {
            config.mocha_done = mocha_done;
        }
        if let Some(globals) = self.globals {
            config.globals = globals;
        }
        if !self.line.is_empty() {
            config.line = self.line.clone();
        }
        if !self.test_name_filter.is_empty() {
            config.test_name_filter = self.test_name_filter.clone();
        }
        if let Some(failing_tests) = self.failing_tests {
            config.failing_tests = failing_tests;
        }
        if let Some(ms) = self.timeout {
            config.timeout = Some(Timeout::from_millis(ms));
        }
        if let Some(format) = &self.format {
            config.format = format.clone();
        }
        if self.no_color {
            config.color = false;
        }
    }
}

/// Arguments for configuration management
#[derive(Parser, Debug)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub action: ConfigAction,
}

#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Write a configuration file with the default settings
    Init {
        /// Output file path
        #[arg(short, long, default_value = "./vt.yaml")]
        output: String,

        /// Overwrite an existing file
        #[arg(short, long)]
        force: bool,
    },

    /// Show the configuration a run would use
    Show {
        /// Output format (yaml, json)
        #[arg(short, long, default_value = "yaml")]
        format: String,
    },

    /// Validate a configuration file
    Validate {
        /// File to validate (default: the file a run would load)
        file: Option<String>,
    },
}

/// Layer defaults, configuration file, `VT_*` variables and flags
pub fn resolve_config(args: &RunArgs) -> Result<RunnerConfig> {
    resolve_config_with(args, EnvConfig::load())
}

fn resolve_config_with(args: &RunArgs, env: EnvConfig) -> Result<RunnerConfig> {
    let file = match args.config.as_ref().or(env.config_file.as_ref()) {
        Some(path) => ConfigFile::load(path)?,
        None => ConfigFile::load_default()?,
    };

    let mut config = file.runner;
    if env.has_any() {
        debug!("Applying VT_* environment overrides");
        env.apply(&mut config);
    }
    args.apply(&mut config);

    config.validate()?;
    Ok(config)
}

/// Execute a parsed command line against the registered sources
///
/// Returns the process exit status.
pub async fn run(args: Args, sources: SourceSet) -> Result<i32> {
    match args.command {
        Some(Command::List) => {
            list_sources(&sources);
            Ok(0)
        }
        Some(Command::Config(config_args)) => {
            manage_config(config_args, &args.run)?;
            Ok(0)
        }
        None => {
            let config = resolve_config(&args.run)?;
            run_tests(config, args.run.output.as_deref(), sources).await
        }
    }
}

async fn run_tests(config: RunnerConfig, output: Option<&str>, sources: SourceSet) -> Result<i32> {
    let selected = sources.select(&config.sources)?;
    let format = config.output_format()?;

    info!("Running {} of {} sources", selected.len(), sources.len());

    let mut runner = Runner::new(config).with_sources(selected);
    runner.run().await;

    println!("{}", runner.report()?);

    if let Some(output) = output {
        write_report_to_file(output, runner.suites(), &runner.summary(), format)?;
        info!("Report saved to {}", output);
    }

    Ok(runner.exit_code())
}

fn list_sources(sources: &SourceSet) {
    println!("Registered sources ({} total)", sources.len());
    for name in sources.names() {
        println!("  {name}");
    }
}

fn manage_config(args: ConfigArgs, run: &RunArgs) -> Result<()> {
    match args.action {
        ConfigAction::Init { output, force } => {
            let path = Path::new(&output);
            if path.exists() && !force {
                anyhow::bail!(
                    "Configuration file already exists: {output}. Use --force to overwrite."
                );
            }

            ConfigFile::default().save(path)?;
            println!("✓ Configuration file created: {output}");
        }

        ConfigAction::Show { format } => {
            let config = ConfigFile::from(resolve_config(run)?);
            let output = if format == "json" {
                serde_json::to_string_pretty(&config)?
            } else {
                serde_yaml::to_string(&config)?
            };
            println!("{output}");
        }

        ConfigAction::Validate { file } => {
            let path = file
                .or_else(|| ConfigFile::find().map(|p| p.to_string_lossy().to_string()))
                .context("No configuration file found")?;

            match ConfigFile::load(&path) {
                Ok(_) => println!("✓ Configuration file is valid: {path}"),
                Err(e) => {
                    println!("✗ Configuration file is invalid: {path}");
                    println!("  Error: {e:#}");
                    return Err(e);
                }
            }
        }
    }

    Ok(())
}

/// Parse the process arguments, run and map the outcome to an exit code
///
/// Everything runs on a single-threaded runtime, so "parallel" children
/// interleave cooperatively.
pub fn main(sources: SourceSet) -> ExitCode {
    let args = Args::parse();
    init_logger(LogLevel::from_verbose(args.verbose));

    let runtime = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            eprintln!("Error: failed to start runtime: {e}");
            return ExitCode::from(2);
        }
    };

    match runtime.block_on(run(args, sources)) {
        Ok(0) => ExitCode::SUCCESS,
        Ok(_) => ExitCode::FAILURE,
        Err(e) => {
            eprintln!("Error: {e:#}");
            ExitCode::from(2)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RunnerConfig;

    fn parse(args: &[&str]) -> Args {
        Args::parse_from(std::iter::once("vt").chain(args.iter().copied()))
    }

    #[test]
    fn test_args_parsing() {
        let args = parse(&["math", "--parallel=false", "--mocha-done", "-l", "12,40"]);
        assert!(args.command.is_none());
        assert_eq!(args.run.sources, ["math"]);
        assert_eq!(args.run.parallel, Some(false));
        assert_eq!(args.run.mocha_done, Some(true));
        assert_eq!(args.run.globals, None);
        assert_eq!(args.run.line, [12, 40]);
    }

    #[test]
    fn test_rerun_hint_parses() {
        let args = parse(&["fails", "--test-name-filter", "fails1", "fails2"]);
        assert_eq!(args.run.sources, ["fails"]);
        assert_eq!(args.run.test_name_filter, ["fails1", "fails2"]);
    }

    #[test]
    fn test_subcommands() {
        let args = parse(&["list"]);
        assert!(matches!(args.command, Some(Command::List)));

        let args = parse(&["config", "init", "--force"]);
        match args.command {
            Some(Command::Config(ConfigArgs {
                action: ConfigAction::Init { force, .. },
            })) => assert!(force),
            _ => panic!("Expected config init"),
        }
    }

    #[test]
    fn test_flags_override_config() {
        let mut config = RunnerConfig {
            parallel: false,
            failing_tests: true,
            ..RunnerConfig::default()
        };
        let args = parse(&["--parallel", "--timeout", "0", "--no-color", "-f", "json"]);
        args.run.apply(&mut config);

        assert!(config.parallel);
        assert!(config.failing_tests);
        assert_eq!(config.timeout, Some(Timeout::Disabled));
        assert!(!config.color);
        assert_eq!(config.format, "json");
    }

    #[test]
    fn test_resolve_config_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("vt.yaml");
        std::fs::write(&path, "parallel: false\nfailing_tests: true\nformat: summary\n").unwrap();

        let args = parse(&["-c", path.to_str().unwrap(), "--format", "csv"]);
        let config = resolve_config_with(&args.run, EnvConfig::default()).unwrap();

        assert!(!config.parallel);
        assert!(config.failing_tests);
        assert_eq!(config.format, "csv");
    }

    #[test]
    fn test_resolve_config_rejects_bad_flags() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("vt.json");
        std::fs::write(&path, "{}").unwrap();

        let args = parse(&["-c", path.to_str().unwrap(), "-t", "("]);
        assert!(resolve_config_with(&args.run, EnvConfig::default()).is_err());
    }

    #[tokio::test]
    async fn test_run_exit_code() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("vt.json");
        std::fs::write(&path, "{}").unwrap();
        let file = path.to_str().unwrap();

        let sources = || {
            SourceSet::new()
                .with("passing", |root| {
                    root.it("ok", || async { Ok(()) })?;
                    Ok(())
                })
                .with("failing", |root| {
                    root.it("broken", || async { anyhow::bail!("boom") })?;
                    Ok(())
                })
        };
        let exit_code = |flags: &[&str]| {
            let mut argv = vec!["-c", file, "--no-color"];
            argv.extend_from_slice(flags);
            let config = resolve_config_with(&parse(&argv).run, EnvConfig::default()).unwrap();
            run_tests(config, None, sources())
        };

        assert_eq!(exit_code(&["passing"]).await.unwrap(), 0);
        assert_eq!(exit_code(&[]).await.unwrap(), 1);
        assert_eq!(exit_code(&["failing", "-t", "^nothing$"]).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_list_command() {
        let sources = SourceSet::new().with("only", |_| Ok(()));
        assert_eq!(run(parse(&["list"]), sources).await.unwrap(), 0);
    }
}
