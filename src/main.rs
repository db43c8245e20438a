//! ShieldOps - SRE and security operations automation
//!
//! Serves the analytics engines over REST and runs agent workflows through
//! the supervisor from the command line.
//!
//! Exit codes:
//!   0 - Success (no findings above threshold, or no --fail-on set)
//!   1 - Runtime error (config, bind failure, server error, etc.)
//!   2 - Findings found at or above the --fail-on threshold

use anyhow::{Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;
use serde_json::json;
use shieldops::api::{self, AppState};
use shieldops::cli::{Args, Command, EngineAction, OutputArgs};
use shieldops::config::{Config, DEFAULT_CONFIG_FILE};
use shieldops::engines::EngineRegistry;
use shieldops::models::{AgentEvent, EventType, FindingSummary, Severity};
use shieldops::orchestration::{Supervisor, SupervisorSession};
use shieldops::{report, ShieldOpsClient};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse_args();

    if let Err(e) = args.validate() {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }

    // No logging needed to write a config file
    if matches!(args.command, Command::InitConfig) {
        return handle_init_config();
    }

    init_logging(&args);

    info!("ShieldOps v{}", env!("CARGO_PKG_VERSION"));
    debug!("Arguments: {:?}", args);

    match run(args).await {
        Ok(exit_code) => std::process::exit(exit_code),
        Err(e) => {
            error!("Command failed: {:#}", e);
            eprintln!("\n❌ Error: {:#}", e);
            std::process::exit(1);
        }
    }
}

/// Handle `init-config`: write a default .shieldops.toml.
fn handle_init_config() -> Result<()> {
    let path = Path::new(DEFAULT_CONFIG_FILE);

    if path.exists() {
        eprintln!(
            "⚠️  {} already exists. Remove it first or edit it manually.",
            DEFAULT_CONFIG_FILE
        );
        std::process::exit(1);
    }

    std::fs::write(path, Config::default_toml())
        .with_context(|| format!("Failed to write {}", DEFAULT_CONFIG_FILE))?;

    println!("✅ Created {} with default settings.", DEFAULT_CONFIG_FILE);
    println!("   Edit it to configure API tokens, engines, timeouts and the LLM.");
    Ok(())
}

/// Initialize logging from verbosity flags; `RUST_LOG` wins when set.
fn init_logging(args: &Args) {
    let builder = FmtSubscriber::builder()
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .compact();

    let result = match EnvFilter::try_from_default_env() {
        Ok(filter) => {
            tracing::subscriber::set_global_default(builder.with_env_filter(filter).finish())
        }
        Err(_) => tracing::subscriber::set_global_default(
            builder.with_max_level(args.log_level()).finish(),
        ),
    };

    if let Err(e) = result {
        eprintln!("Failed to set tracing subscriber: {}", e);
    }
}

/// Dispatch a command. Returns the process exit code.
async fn run(args: Args) -> Result<i32> {
    let mut config = load_config(&args)?;
    config.merge_with_args(&args);

    match &args.command {
        Command::Serve { bind } => {
            let bind = bind.clone().unwrap_or_else(|| config.server.bind.clone());
            serve(&config, &bind).await?;
            Ok(0)
        }
        Command::Supervise { event: file, output } => {
            let content = std::fs::read_to_string(file)
                .with_context(|| format!("Failed to read event file: {}", file.display()))?;
            let event: AgentEvent = serde_json::from_str(&content)
                .with_context(|| format!("Failed to parse event file: {}", file.display()))?;
            supervise(&config, event, output, args.quiet).await
        }
        Command::Scan { path, output } => {
            let root = path
                .canonicalize()
                .with_context(|| format!("Failed to resolve {}", path.display()))?;
            let event = AgentEvent::new(
                EventType::Vulnerability,
                format!("Security scan of {}", root.display()),
                Severity::Medium,
            )
            .with_payload(json!({ "path": root.display().to_string() }));
            supervise(&config, event, output, args.quiet).await
        }
        Command::Engine {
            action,
            name,
            server,
            token,
        } => {
            query_engine(*action, name.as_deref(), server, token.clone()).await?;
            Ok(0)
        }
        Command::InitConfig => handle_init_config().map(|_| 0),
    }
}

/// Run the REST API until the process is stopped.
async fn serve(config: &Config, bind: &str) -> Result<()> {
    let state = Arc::new(AppState::from_config(config)?);
    let router = api::create_router(state);

    let listener = tokio::net::TcpListener::bind(bind)
        .await
        .with_context(|| format!("Failed to bind {}", bind))?;

    println!("🛡️  ShieldOps API listening on http://{}", bind);
    info!("REST API listening on {}", bind);

    axum::serve(listener, router)
        .with_graceful_shutdown(async {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("Shutdown signal received");
            }
        })
        .await
        .context("Server error")
}

/// Hand an event to the supervisor, write the report and apply `--fail-on`.
async fn supervise(config: &Config, event: AgentEvent, output: &OutputArgs, quiet: bool) -> Result<i32> {
    let supervisor = Supervisor::from_config(config, EngineRegistry::from_config(&config.engines))?;

    if !quiet {
        println!("🔔 Event: {} ({})", event.title, event.event_type);
        println!("   Runners: {}", supervisor.route(event.event_type).join(", "));
    }

    let spinner = if quiet { None } else { Some(spinner("Running agents...")) };
    let session = supervisor.handle(event).await;
    if let Some(pb) = spinner {
        pb.finish_and_clear();
    }

    let rendered = report::render(&session, output.format)?;
    let path = output
        .output
        .clone()
        .or_else(|| config.general.output.as_ref().map(PathBuf::from));
    match &path {
        Some(path) => {
            std::fs::write(path, &rendered)
                .with_context(|| format!("Failed to write report to {}", path.display()))?;
            if !quiet {
                print_summary(&session);
                println!("\n✅ Report saved to: {}", path.display());
            }
        }
        None => println!("{}", rendered),
    }

    if let Some(level) = output.fail_on {
        let threshold = Severity::from(level);
        if session
            .execution
            .findings
            .iter()
            .any(|f| f.severity >= threshold)
        {
            eprintln!(
                "\n⛔ Findings at or above {} severity. Failing (exit code 2).",
                threshold
            );
            return Ok(2);
        }
    }

    Ok(0)
}

fn spinner(message: &'static str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    match ProgressStyle::default_spinner().template("{spinner:.green} [{elapsed_precise}] {msg}") {
        Ok(style) => pb.set_style(style),
        Err(e) => warn!("Invalid progress template: {}", e),
    }
    pb.set_message(message);
    pb.enable_steady_tick(Duration::from_millis(120));
    pb
}

fn print_summary(session: &SupervisorSession) {
    let summary = FindingSummary::from_findings(&session.execution.findings);
    println!("\n📊 Summary:");
    println!("   Status: {:?}", session.execution.status);
    println!("   Findings: {}", summary.total);
    println!(
        "   - 🔴 Critical: {} | 🟠 High: {} | 🟡 Medium: {} | 🟢 Low: {}",
        summary.critical, summary.high, summary.medium, summary.low
    );
    println!("   Confidence: {:.2}", session.execution.confidence);
    if session.escalated {
        println!("   ⚠️  Escalated: {}", session.escalation_reasons.join("; "));
    }
    println!("   Duration: {}ms", session.execution.duration_ms);
}

/// Fetch engine data from a running server and print it as JSON.
async fn query_engine(
    action: EngineAction,
    name: Option<&str>,
    server: &str,
    token: Option<String>,
) -> Result<()> {
    let client = ShieldOpsClient::new(server, token)?;
    // validate() guarantees a name for everything but `list`
    let name = name.unwrap_or_default();

    match action {
        EngineAction::List => print_json(&client.engines().await?),
        EngineAction::Report => print_json(&client.report(name).await?),
        EngineAction::Rankings => print_json(&client.rankings(name).await?),
        EngineAction::Stats => print_json(&client.stats(name).await?),
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let text = serde_json::to_string_pretty(value).context("Failed to serialize response")?;
    println!("{}", text);
    Ok(())
}

/// Load configuration from file or use defaults.
fn load_config(args: &Args) -> Result<Config> {
    Config::resolve(args.config.as_deref())
}
