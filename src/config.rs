//! `.shieldops.toml` loading, defaults and CLI overrides.

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{debug, info, warn};

/// Default configuration file name, looked up in the working directory.
pub const DEFAULT_CONFIG_FILE: &str = ".shieldops.toml";

/// Everything that can be set in `.shieldops.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// CLI report defaults.
    #[serde(default)]
    pub general: GeneralConfig,

    /// HTTP server settings.
    #[serde(default)]
    pub server: ServerConfig,

    /// LLM settings.
    #[serde(default)]
    pub model: ModelConfig,

    /// Parallel executor and supervisor settings.
    #[serde(default)]
    pub executor: ExecutorConfig,

    /// File scanner settings for the security scan workflow.
    #[serde(default)]
    pub scanner: ScannerConfig,

    /// Engine capacity and thresholds.
    #[serde(default)]
    pub engines: EnginesConfig,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GeneralConfig {
    /// Report file used by `supervise` and `scan` when `--output` is not
    /// given. Reports go to stdout when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
}

/// A bearer token and the role it grants.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenConfig {
    pub token: String,
    /// One of "viewer", "operator", "admin".
    pub role: String,
}

/// HTTP server settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Address to bind the REST API to.
    #[serde(default = "default_bind")]
    pub bind: String,

    /// API tokens. Authentication is disabled when empty.
    #[serde(default)]
    pub tokens: Vec<TokenConfig>,

    /// Allow cross-origin requests from any origin.
    #[serde(default)]
    pub permissive_cors: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            tokens: Vec::new(),
            permissive_cors: false,
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:8080".to_string()
}

/// LLM model settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Use the LLM to assist workflow steps. Deterministic fallbacks are
    /// always available.
    #[serde(default)]
    pub enabled: bool,

    /// Ollama model tag.
    #[serde(default = "default_model")]
    pub name: String,

    /// Base URL of the Ollama server.
    #[serde(default = "default_ollama_url")]
    pub ollama_url: String,

    /// Sampling temperature; keep low for repeatable triage.
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Seconds before an LLM call is abandoned.
    #[serde(default = "default_model_timeout")]
    pub timeout_seconds: u64,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            name: default_model(),
            ollama_url: default_ollama_url(),
            temperature: default_temperature(),
            timeout_seconds: default_model_timeout(),
        }
    }
}

fn default_model() -> String {
    "llama3.2:latest".to_string()
}

fn default_ollama_url() -> String {
    "http://localhost:11434".to_string()
}

fn default_temperature() -> f32 {
    0.1
}

fn default_model_timeout() -> u64 {
    120
}

/// Parallel executor and supervisor settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutorConfig {
    /// Per-runner timeout in seconds.
    #[serde(default = "default_executor_timeout")]
    pub timeout_seconds: u64,

    /// Number of supervisor sessions kept in memory.
    #[serde(default = "default_max_history")]
    pub max_history: usize,

    /// Sessions whose merged confidence is below this value are escalated.
    #[serde(default = "default_escalation_confidence")]
    pub escalation_confidence: f64,

    /// Threat score at which the SOC workflow moves to containment.
    #[serde(default = "default_containment_threshold")]
    pub containment_threshold: f64,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            timeout_seconds: default_executor_timeout(),
            max_history: default_max_history(),
            escalation_confidence: default_escalation_confidence(),
            containment_threshold: default_containment_threshold(),
        }
    }
}

impl ExecutorConfig {
    fn validate(&self) -> Result<()> {
        if self.timeout_seconds == 0 {
            bail!("[executor].timeout_seconds must be at least 1");
        }
        for (name, value) in [
            ("escalation_confidence", self.escalation_confidence),
            ("containment_threshold", self.containment_threshold),
        ] {
            if !(0.0..=1.0).contains(&value) {
                bail!("[executor].{} must be between 0 and 1 (got {})", name, value);
            }
        }
        Ok(())
    }
}

fn default_executor_timeout() -> u64 {
    300
}

fn default_max_history() -> usize {
    500
}

fn default_escalation_confidence() -> f64 {
    0.5
}

fn default_containment_threshold() -> f64 {
    0.7
}

/// File scanner settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScannerConfig {
    /// Maximum files to scan.
    #[serde(default = "default_max_files")]
    pub max_files: usize,

    /// File extensions to include.
    #[serde(default = "default_extensions")]
    pub extensions: Vec<String>,

    /// Directory or file names to exclude.
    #[serde(default = "default_excludes")]
    pub excludes: Vec<String>,

    /// Maximum file size in bytes.
    #[serde(default = "default_max_file_size")]
    pub max_file_size: usize,
}

impl Default for ScannerConfig {
    fn default() -> Self {
        Self {
            max_files: default_max_files(),
            extensions: default_extensions(),
            excludes: default_excludes(),
            max_file_size: default_max_file_size(),
        }
    }
}

fn default_max_files() -> usize {
    500
}

fn default_extensions() -> Vec<String> {
    vec![
        "rs", "py", "js", "ts", "go", "java", "rb", "php", "sh", "yaml", "yml", "json", "toml",
        "tf", "env", "ini", "cfg", "conf", "properties", "xml",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

fn default_excludes() -> Vec<String> {
    vec![
        ".git",
        "target",
        "node_modules",
        "vendor",
        "dist",
        "build",
        "__pycache__",
        ".venv",
        "venv",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

fn default_max_file_size() -> usize {
    512 * 1024
}

/// Engine capacity and thresholds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnginesConfig {
    /// Records kept per engine before the oldest are evicted.
    #[serde(default = "default_max_records")]
    pub max_records: usize,

    /// Alerts below this correlation score are considered uncorrelated.
    #[serde(default = "default_min_correlation_score")]
    pub min_correlation_score: f64,

    /// Alert count per service above which the service is flagged noisy.
    #[serde(default = "default_noise_threshold")]
    pub noise_threshold: usize,

    /// Spend allocated below this percentage is flagged.
    #[serde(default = "default_allocation_target")]
    pub allocation_target_pct: f64,

    /// Target compliance rate per framework.
    #[serde(default = "default_compliance_target")]
    pub compliance_target_pct: f64,

    /// Error budget remaining below this percentage marks an SLO at risk.
    #[serde(default = "default_at_risk_threshold")]
    pub slo_at_risk_threshold_pct: f64,

    /// Utilization above this percentage is flagged as low headroom.
    #[serde(default = "default_headroom_threshold")]
    pub headroom_threshold_pct: f64,

    /// Exhaustion forecasts within this many months are reported.
    #[serde(default = "default_forecast_horizon")]
    pub forecast_horizon_months: f64,
}

impl Default for EnginesConfig {
    fn default() -> Self {
        Self {
            max_records: default_max_records(),
            min_correlation_score: default_min_correlation_score(),
            noise_threshold: default_noise_threshold(),
            allocation_target_pct: default_allocation_target(),
            compliance_target_pct: default_compliance_target(),
            slo_at_risk_threshold_pct: default_at_risk_threshold(),
            headroom_threshold_pct: default_headroom_threshold(),
            forecast_horizon_months: default_forecast_horizon(),
        }
    }
}

fn default_max_records() -> usize {
    200_000
}

fn default_min_correlation_score() -> f64 {
    0.7
}

fn default_noise_threshold() -> usize {
    50
}

fn default_allocation_target() -> f64 {
    90.0
}

fn default_compliance_target() -> f64 {
    95.0
}

fn default_at_risk_threshold() -> f64 {
    25.0
}

fn default_headroom_threshold() -> f64 {
    80.0
}

fn default_forecast_horizon() -> f64 {
    6.0
}

impl Config {
    /// Read and parse a config file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;
        config
            .validate()
            .with_context(|| format!("Invalid config file: {}", path.display()))?;

        Ok(config)
    }

    /// Reject values serde accepts but the runtime cannot use.
    pub fn validate(&self) -> Result<()> {
        self.executor.validate()?;
        if self.model.timeout_seconds == 0 {
            bail!("[model].timeout_seconds must be at least 1");
        }
        Ok(())
    }

    /// Config for a CLI run: `--config` when given (errors are fatal), else
    /// `.shieldops.toml` in the working directory, else defaults.
    pub fn resolve(explicit: Option<&Path>) -> Result<Self> {
        Self::resolve_from(explicit, Path::new(DEFAULT_CONFIG_FILE))
    }

    fn resolve_from(explicit: Option<&Path>, default_path: &Path) -> Result<Self> {
        if let Some(path) = explicit {
            info!("Loading config from: {}", path.display());
            return Self::load(path);
        }

        if !default_path.exists() {
            debug!("No config file found, using defaults");
            return Ok(Self::default());
        }

        match Self::load(default_path) {
            Ok(config) => {
                info!("Loaded default config from {}", default_path.display());
                Ok(config)
            }
            Err(e) => {
                warn!("Failed to load config, using defaults: {:#}", e);
                Ok(Self::default())
            }
        }
    }

    /// Apply explicitly given CLI flags on top of the file values.
    pub fn merge_with_args(&mut self, args: &crate::cli::Args) {
        if let Some(ref model) = args.model {
            self.model.name = model.clone();
        }
        if let Some(ref url) = args.ollama_url {
            self.model.ollama_url = url.clone();
        }
        if args.llm {
            self.model.enabled = true;
        }

        if let Some(timeout) = args.timeout {
            self.executor.timeout_seconds = timeout;
        }
    }

    /// Default config rendered as TOML, used by `init-config`.
    pub fn default_toml() -> String {
        let config = Config::default();
        toml::to_string_pretty(&config).unwrap_or_else(|_| String::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.model.name, "llama3.2:latest");
        assert!(!config.model.enabled);
        assert_eq!(config.server.bind, "127.0.0.1:8080");
        assert!(config.server.tokens.is_empty());
        assert_eq!(config.executor.timeout_seconds, 300);
        assert!(config.scanner.extensions.contains(&"tf".to_string()));
    }

    #[test]
    fn test_parse_config() {
        let toml_content = r#"
[server]
bind = "0.0.0.0:9000"

[[server.tokens]]
token = "s3cret"
role = "admin"

[model]
enabled = true
name = "qwen2.5:14b"

[executor]
timeout_seconds = 30

[engines]
max_records = 10
noise_threshold = 3
"#;

        let config: Config = toml::from_str(toml_content).unwrap();
        assert_eq!(config.server.bind, "0.0.0.0:9000");
        assert_eq!(
            config.server.tokens,
            vec![TokenConfig {
                token: "s3cret".to_string(),
                role: "admin".to_string()
            }]
        );
        assert!(config.model.enabled);
        assert_eq!(config.model.name, "qwen2.5:14b");
        assert_eq!(config.model.temperature, 0.1);
        assert_eq!(config.executor.timeout_seconds, 30);
        assert_eq!(config.executor.max_history, 500);
        assert_eq!(config.engines.max_records, 10);
        assert_eq!(config.engines.noise_threshold, 3);
        assert_eq!(config.engines.compliance_target_pct, 95.0);
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("shieldops.toml");
        std::fs::write(&path, "[general]\noutput = \"out.json\"\n").unwrap();

        let config = Config::load(&path).unwrap();
        assert_eq!(config.general.output.as_deref(), Some("out.json"));

        std::fs::write(&path, "[general\n").unwrap();
        assert!(Config::load(&path).is_err());
    }

    #[test]
    fn test_cli_flags_override_file() {
        let mut config: Config = toml::from_str(
            "[model]\nname = \"mistral\"\nollama_url = \"http://file:11434\"\n\n[executor]\ntimeout_seconds = 30\n",
        )
        .unwrap();

        let untouched = crate::cli::Args::parse_from(["shieldops", "serve"]);
        config.merge_with_args(&untouched);
        assert_eq!(config.model.name, "mistral");
        assert!(!config.model.enabled);
        assert_eq!(config.executor.timeout_seconds, 30);

        let args = crate::cli::Args::parse_from([
            "shieldops",
            "--model",
            "qwen2.5:7b",
            "--ollama-url",
            "http://gpu:11434",
            "--timeout",
            "42",
            "--llm",
            "serve",
        ]);
        config.merge_with_args(&args);
        assert_eq!(config.model.name, "qwen2.5:7b");
        assert_eq!(config.model.ollama_url, "http://gpu:11434");
        assert!(config.model.enabled);
        assert_eq!(config.executor.timeout_seconds, 42);
    }

    #[test]
    fn test_resolve_lookup_order() {
        let dir = tempfile::TempDir::new().unwrap();
        let missing = dir.path().join("absent.toml");
        let good = dir.path().join("good.toml");
        let broken = dir.path().join("broken.toml");
        std::fs::write(&good, "[server]\nbind = \"0.0.0.0:7000\"\n").unwrap();
        std::fs::write(&broken, "[server\n").unwrap();

        let config = Config::resolve_from(None, &missing).unwrap();
        assert_eq!(config.server.bind, "127.0.0.1:8080");

        let config = Config::resolve_from(None, &good).unwrap();
        assert_eq!(config.server.bind, "0.0.0.0:7000");

        // A broken file found by default lookup falls back to defaults.
        let config = Config::resolve_from(None, &broken).unwrap();
        assert_eq!(config.server.bind, "127.0.0.1:8080");

        // An explicit --config wins over the default file and must be valid.
        let config = Config::resolve_from(Some(good.as_path()), &broken).unwrap();
        assert_eq!(config.server.bind, "0.0.0.0:7000");
        assert!(Config::resolve_from(Some(broken.as_path()), &good).is_err());
        assert!(Config::resolve_from(Some(missing.as_path()), &good).is_err());
    }

    #[test]
    fn test_malformed_toml_is_rejected() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("bad.toml");
        std::fs::write(&path, "[executor]\ntimeout_seconds = \"soon\"\n").unwrap();

        let err = Config::load(&path).unwrap_err();
        assert!(format!("{:#}", err).contains("Failed to parse config file"));
    }

    #[test]
    fn test_executor_values_are_validated() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("executor.toml");

        for (body, field) in [
            ("timeout_seconds = 0", "timeout_seconds"),
            ("containment_threshold = 1.5", "containment_threshold"),
            ("escalation_confidence = -0.1", "escalation_confidence"),
        ] {
            std::fs::write(&path, format!("[executor]\n{}\n", body)).unwrap();
            let err = Config::load(&path).unwrap_err();
            let message = format!("{:#}", err);
            assert!(message.contains("Invalid config file"), "{}", message);
            assert!(message.contains(field), "{}", message);
        }

        std::fs::write(&path, "[executor]\ntimeout_seconds = 1\ncontainment_threshold = 1.0\n").unwrap();
        assert!(Config::load(&path).is_ok());
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn test_default_toml_generation() {
        let toml_str = Config::default_toml();
        assert!(!toml_str.is_empty());
        assert!(toml_str.contains("[server]"));
        assert!(toml_str.contains("[executor]"));
        assert!(toml_str.contains("[engines]"));

        let reparsed: Config = toml::from_str(&toml_str).unwrap();
        assert_eq!(reparsed.engines.max_records, 200_000);
    }
}
