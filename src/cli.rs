//! Command-line interface argument parsing.
//!
//! This module handles all CLI argument parsing using clap,
//! including validation and default values.

use crate::models::Severity;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// ShieldOps - SRE and security operations automation
///
/// Runs the analytics engines behind a REST API, and drives the SOC analyst,
/// security scan and incident investigation agents through the supervisor.
///
/// Examples:
///   shieldops serve --bind 0.0.0.0:8080
///   shieldops supervise --event incident.json --format json
///   shieldops scan --path ./infra --fail-on high
///   shieldops engine report slo-budget --server http://localhost:8080
///   shieldops init-config
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Args {
    /// Path to configuration file
    ///
    /// If not specified, looks for .shieldops.toml in the current directory
    #[arg(short, long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Enable verbose logging output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Run in quiet mode (minimal output)
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Ollama model used when LLM assistance is enabled
    #[arg(long, global = true, env = "SHIELDOPS_MODEL")]
    pub model: Option<String>,

    /// Ollama API endpoint URL
    #[arg(long, global = true, env = "OLLAMA_URL")]
    pub ollama_url: Option<String>,

    /// Enable LLM assistance for workflow steps
    #[arg(long, global = true)]
    pub llm: bool,

    /// Per-runner timeout in seconds
    #[arg(long, global = true, value_name = "SECS")]
    pub timeout: Option<u64>,

    #[command(subcommand)]
    pub command: Command,
}

/// Top-level commands.
#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Start the REST API server
    Serve {
        /// Bind address (overrides [server].bind)
        #[arg(short, long, value_name = "ADDR")]
        bind: Option<String>,
    },

    /// Run the supervisor on an event read from a JSON file
    Supervise {
        /// JSON file containing the event
        #[arg(short, long, value_name = "FILE")]
        event: PathBuf,

        #[command(flatten)]
        output: OutputArgs,
    },

    /// Run the security scan workflow against a local directory
    Scan {
        /// Directory to scan
        #[arg(short, long, value_name = "DIR")]
        path: PathBuf,

        #[command(flatten)]
        output: OutputArgs,
    },

    /// Query a running server's engines
    Engine {
        /// What to fetch
        #[arg(value_name = "ACTION")]
        action: EngineAction,

        /// Engine name (not needed for `list`)
        #[arg(value_name = "NAME")]
        name: Option<String>,

        /// Server base URL
        #[arg(long, default_value = "http://127.0.0.1:8080", env = "SHIELDOPS_SERVER")]
        server: String,

        /// API token
        #[arg(long, env = "SHIELDOPS_API_TOKEN")]
        token: Option<String>,
    },

    /// Generate a default .shieldops.toml configuration file
    InitConfig,
}

/// Report output options shared by `supervise` and `scan`.
#[derive(clap::Args, Debug, Clone)]
pub struct OutputArgs {
    /// Output file path for the report (stdout when omitted)
    #[arg(short, long, value_name = "FILE")]
    pub output: Option<PathBuf>,

    /// Output format (markdown, json)
    #[arg(long, default_value = "markdown", value_name = "FORMAT")]
    pub format: OutputFormat,

    /// Fail if findings at or above this severity are found
    ///
    /// Useful for CI pipelines. Exit code 2 when threshold is exceeded.
    #[arg(long, value_name = "LEVEL")]
    pub fail_on: Option<FailOnLevel>,
}

/// Engine query actions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum EngineAction {
    List,
    Report,
    Rankings,
    Stats,
}

/// Output format for the report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum OutputFormat {
    /// Markdown format (default)
    #[default]
    Markdown,
    /// JSON format
    Json,
}

/// Severity level for --fail-on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, clap::ValueEnum)]
pub enum FailOnLevel {
    Info,
    Low,
    Medium,
    High,
    Critical,
}

impl From<FailOnLevel> for Severity {
    fn from(level: FailOnLevel) -> Self {
        match level {
            FailOnLevel::Info => Severity::Info,
            FailOnLevel::Low => Severity::Low,
            FailOnLevel::Medium => Severity::Medium,
            FailOnLevel::High => Severity::High,
            FailOnLevel::Critical => Severity::Critical,
        }
    }
}

impl Args {
    /// Parse command-line arguments.
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Validate the parsed arguments.
    pub fn validate(&self) -> Result<(), String> {
        if self.verbose && self.quiet {
            return Err("Cannot use both --verbose and --quiet".to_string());
        }

        if let Some(ref url) = self.ollama_url {
            if !url.starts_with("http://") && !url.starts_with("https://") {
                return Err("Ollama URL must start with 'http://' or 'https://'".to_string());
            }
        }

        if let Some(timeout) = self.timeout {
            if timeout == 0 {
                return Err("Timeout must be at least 1 second".to_string());
            }
        }

        match &self.command {
            Command::Supervise { event, .. } => {
                if !event.is_file() {
                    return Err(format!("Event file does not exist: {}", event.display()));
                }
            }
            Command::Scan { path, .. } => {
                if !path.exists() {
                    return Err(format!("Directory does not exist: {}", path.display()));
                }
                if !path.is_dir() {
                    return Err(format!("Path is not a directory: {}", path.display()));
                }
            }
            Command::Engine {
                action,
                name,
                server,
                ..
            } => {
                if *action != EngineAction::List && name.is_none() {
                    return Err(format!("Engine name is required for {:?}", action));
                }
                if !server.starts_with("http://") && !server.starts_with("https://") {
                    return Err("Server URL must start with 'http://' or 'https://'".to_string());
                }
            }
            Command::Serve { .. } | Command::InitConfig => {}
        }

        Ok(())
    }

    /// Returns the log level based on verbosity settings.
    pub fn log_level(&self) -> tracing::Level {
        if self.quiet {
            tracing::Level::ERROR
        } else if self.verbose {
            tracing::Level::DEBUG
        } else {
            tracing::Level::INFO
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_args(command: Command) -> Args {
        Args {
            config: None,
            verbose: false,
            quiet: false,
            model: None,
            ollama_url: None,
            llm: false,
            timeout: None,
            command,
        }
    }

    #[test]
    fn test_parse_subcommands() {
        let args = Args::parse_from(["shieldops", "-v", "serve", "--bind", "0.0.0.0:9000"]);
        assert!(args.verbose);
        assert!(matches!(args.command, Command::Serve { bind: Some(ref b) } if b == "0.0.0.0:9000"));

        let args = Args::parse_from([
            "shieldops",
            "scan",
            "--path",
            ".",
            "--format",
            "json",
            "--fail-on",
            "high",
        ]);
        match args.command {
            Command::Scan { output, .. } => {
                assert_eq!(output.format, OutputFormat::Json);
                assert_eq!(output.fail_on, Some(FailOnLevel::High));
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_validation_conflicting_options() {
        let mut args = make_args(Command::InitConfig);
        args.verbose = true;
        args.quiet = true;
        assert!(args.validate().is_err());
    }

    #[test]
    fn test_validation_engine_requires_name() {
        let args = make_args(Command::Engine {
            action: EngineAction::Report,
            name: None,
            server: "http://localhost:8080".to_string(),
            token: None,
        });
        assert!(args.validate().is_err());

        let args = make_args(Command::Engine {
            action: EngineAction::List,
            name: None,
            server: "http://localhost:8080".to_string(),
            token: None,
        });
        assert!(args.validate().is_ok());
    }

    #[test]
    fn test_validation_missing_scan_dir() {
        let args = make_args(Command::Scan {
            path: PathBuf::from("/definitely/not/here"),
            output: OutputArgs {
                output: None,
                format: OutputFormat::Markdown,
                fail_on: None,
            },
        });
        assert!(args.validate().is_err());
    }

    #[test]
    fn test_log_level() {
        let mut args = make_args(Command::InitConfig);
        assert_eq!(args.log_level(), tracing::Level::INFO);

        args.verbose = true;
        assert_eq!(args.log_level(), tracing::Level::DEBUG);

        args.verbose = false;
        args.quiet = true;
        assert_eq!(args.log_level(), tracing::Level::ERROR);
    }

    #[test]
    fn test_fail_on_to_severity() {
        assert_eq!(Severity::from(FailOnLevel::Critical), Severity::Critical);
        assert_eq!(Severity::from(FailOnLevel::Info), Severity::Info);
    }
}
