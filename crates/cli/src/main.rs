//! Deskpilot CLI
//!
//! Runs the desktop automation agent against the current session.

mod config;

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use chrono::Local;
use clap::{Parser, Subcommand};
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use deskpilot_claude::ClaudeClient;
use deskpilot_core::stream::DEFAULT_CAPACITY;
use deskpilot_core::{
    AgentController, CallbackSink, CancellationToken, Event, EventPayload, EventStream,
    Executor, InputDevice, Observer, Run, RunState,
};
use deskpilot_desktop::{CommandObserver, DryRunInput, FileObserver, XdotoolInput};

use crate::config::Config;

#[derive(Parser)]
#[command(name = "deskpilot")]
#[command(version)]
#[command(about = "Desktop automation agent driven by Claude")]
struct Cli {
    /// Config file (defaults to ~/.config/deskpilot/config.toml)
    #[arg(long, global = true, env = "DESKPILOT_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the agent until the goal is done, failed or interrupted
    Run {
        /// What the agent should accomplish
        #[arg(long, short)]
        goal: String,

        /// Maximum number of iterations
        #[arg(long)]
        max_iterations: Option<u32>,

        /// Model to ask for decisions
        #[arg(long)]
        model: Option<String>,

        /// Log actions instead of performing input
        #[arg(long)]
        dry_run: bool,

        /// Use a fixed image instead of capturing the screen
        #[arg(long)]
        screenshot: Option<PathBuf>,

        /// Emit events and logs as JSON lines
        #[arg(long)]
        json: bool,
    },

    /// Inspect or create the config file
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Print the effective configuration
    Show,

    /// Write a config file with default values
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    let json = matches!(cli.command, Commands::Run { json: true, .. });
    init_logging(json)?;

    match cli.command {
        Commands::Run {
            goal,
            max_iterations,
            model,
            dry_run,
            screenshot,
            json,
        } => {
            let mut config = Config::load(cli.config.as_deref())?;
            if let Some(max_iterations) = max_iterations {
                config.max_iterations = max_iterations;
            }
            if let Some(model) = model {
                config.model = model;
            }
            run_agent(&config, goal, dry_run, screenshot.as_deref(), json).await
        }
        Commands::Config { action } => {
            config_command(action, cli.config.as_deref())?;
            Ok(ExitCode::SUCCESS)
        }
    }
}

/// Logs go to stderr so stdout carries only the action log.
fn init_logging(json: bool) -> Result<()> {
    let filter =
        EnvFilter::try_from_env("DESKPILOT_LOG").unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr);

    if json {
        tracing::subscriber::set_global_default(builder.json().finish())?;
    } else {
        tracing::subscriber::set_global_default(builder.finish())?;
    }
    Ok(())
}

async fn run_agent(
    config: &Config,
    goal: String,
    dry_run: bool,
    screenshot: Option<&Path>,
    json: bool,
) -> Result<ExitCode> {
    let oracle = ClaudeClient::new(config.claude_config()?)?;

    let observer: Arc<dyn Observer> = match screenshot {
        Some(path) => Arc::new(FileObserver::new(path)?),
        None => Arc::new(
            CommandObserver::from_command_line(&config.capture_command)?
                .media_type(&config.capture_media_type)
                .max_bytes(config.max_observation_bytes),
        ),
    };

    let input: Box<dyn InputDevice> = if dry_run {
        warn!("Dry run: input actions are logged, not performed");
        Box::new(DryRunInput)
    } else {
        Box::new(XdotoolInput::new())
    };
    let executor = Executor::new(input).with_config(config.executor_config());

    let controller =
        AgentController::new(observer, oracle, executor).with_config(config.run_config());

    let cancel = CancellationToken::new();
    let token = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Interrupt received, stopping after the current step");
            token.cancel();
        }
    });

    info!(model = %config.model, goal = %goal, "Starting deskpilot");

    let (run, result) = if json {
        let (stream, mut events) = EventStream::channel(DEFAULT_CAPACITY);
        let controller = controller.with_sink(stream);
        let run = controller.run_handle();
        let handle = controller.spawn(goal, cancel);

        while let Some(event) = events.recv().await {
            println!("{}", serde_json::to_string(&event)?);
        }
        let result = handle.await.context("Agent task panicked")?;
        (run, result)
    } else {
        let controller = controller.with_sink(CallbackSink::new(print_event));
        let run = controller.run_handle();
        let result = controller.run(goal, cancel).await;
        (run, result)
    };

    if !json {
        print_summary(&run);
    }

    Ok(match run.state() {
        RunState::Completed | RunState::Stopped if result.is_ok() => ExitCode::SUCCESS,
        _ => ExitCode::FAILURE,
    })
}

fn print_event(event: Event) {
    let time = event.timestamp.with_timezone(&Local).format("%H:%M:%S");
    match &event.payload {
        EventPayload::ActionExecuted { action, outcome } => {
            println!("[{time}] {action} [{}]", outcome.status());
        }
        EventPayload::Finished { state, result } => {
            println!("[{time}] {state}: {result}");
        }
        EventPayload::Errored { message } => {
            println!("[{time}] error: {message}");
        }
    }
}

fn print_summary(run: &Run) {
    let status = run.status();
    println!();
    println!("Run {}", run.id());
    println!("  State:       {}", status.state);
    if let Some(result) = &status.result {
        println!("  Result:      {result}");
    }
    println!("  Iterations:  {}", status.iteration);
    println!(
        "  Actions:     {} ({} failed)",
        status.metrics.actions, status.metrics.failed_actions
    );
    if let Some(secs) = status.metrics.duration_secs() {
        println!("  Duration:    {secs:.1}s");
    }
}

fn config_command(action: ConfigAction, path: Option<&Path>) -> Result<()> {
    match action {
        ConfigAction::Show => show_config(path, &Config::load(path)?),
        // Init never reads the existing file.
        ConfigAction::Init { force } => init_config(path, force),
    }
}

fn show_config(path: Option<&Path>, config: &Config) -> Result<()> {
    let path = path.map(Path::to_path_buf).or_else(Config::default_path);
    if let Some(path) = &path {
        println!("# {}", path.display());
    }
    print!("{}", toml::to_string_pretty(&config.masked())?);
    Ok(())
}

fn init_config(path: Option<&Path>, force: bool) -> Result<()> {
    let path = match path {
        Some(path) => path.to_path_buf(),
        None => Config::default_path().context("Could not determine config directory")?,
    };
    if path.exists() && !force {
        bail!(
            "{} already exists (use --force to overwrite)",
            path.display()
        );
    }
    Config::default().save(&path)?;
    println!("Wrote {}", path.display());
    Ok(())
}
