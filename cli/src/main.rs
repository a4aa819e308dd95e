//! Hypra CLI - terminal host for the Hypra verifier.
//!
//! ```text
//! hypra verify <FILE> [--arg <ARG>]...   one run, exit 0 on success
//! hypra watch                            verify each path read from stdin
//! hypra check                            report missing prerequisites
//! ```
//!
//! Log lines go to stderr, notifications and annotations to stdout, and
//! `tracing` output to `~/.hypra/logs/hypra.log`.

mod console;

use std::{
    env,
    fs::{self, OpenOptions},
    path::PathBuf,
    process::ExitCode,
    sync::Mutex,
};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use hypra_verifier::{
    ConfigFile, HostSurface, LogLevel, SessionManager, VerificationStatus, VerifierConfig,
    is_verifier_source,
};

use crate::console::ConsoleHost;

/// Overrides the directory holding the bundled `hhl.jar`.
const HOME_ENV: &str = "HYPRA_HOME";

#[derive(Parser)]
#[command(name = "hypra")]
#[command(about = "Verify Hyper Hoare Logic programs with the Hypra verifier")]
struct Cli {
    /// Configuration file (default: ~/.hypra/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Verify one file
    Verify {
        /// Program to verify
        file: PathBuf,
        /// Verifier flag replacing the configured ones (repeatable)
        #[arg(long = "arg", value_name = "ARG", allow_hyphen_values = true)]
        args: Vec<String>,
    },
    /// Verify every path read from stdin, cancelling the previous run
    Watch,
    /// Check that java, z3 and boogie can be found
    Check,
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("info"))
        .unwrap_or_else(|_| EnvFilter::new("warn"));

    let (log_file, init_warnings) = open_log_file();

    if let Some((log_path, file)) = log_file {
        tracing_subscriber::registry()
            .with(fmt::layer().with_ansi(false).with_writer(Mutex::new(file)))
            .with(env_filter)
            .init();

        tracing::info!(path = %log_path.display(), "Logging initialized");
        for warning in init_warnings {
            tracing::warn!("{warning}");
        }
        return;
    }

    // stdout and stderr belong to the host surface.
    tracing_subscriber::registry().with(env_filter).init();
}

fn open_log_file() -> (Option<(PathBuf, fs::File)>, Vec<String>) {
    let mut warnings = Vec::new();

    for candidate in log_file_candidates() {
        if let Some(parent) = candidate.parent()
            && let Err(e) = fs::create_dir_all(parent)
        {
            warnings.push(format!(
                "Failed to create log dir {}: {e}",
                parent.display()
            ));
            continue;
        }

        match OpenOptions::new().create(true).append(true).open(&candidate) {
            Ok(file) => return (Some((candidate, file)), warnings),
            Err(e) => {
                warnings.push(format!(
                    "Failed to open log file {}: {e}",
                    candidate.display()
                ));
            }
        }
    }

    (None, warnings)
}

fn log_file_candidates() -> Vec<PathBuf> {
    let mut candidates = Vec::new();

    // Primary: ~/.hypra/logs/hypra.log
    if let Some(config_path) = VerifierConfig::path()
        && let Some(config_dir) = config_path.parent()
    {
        candidates.push(config_dir.join("logs").join("hypra.log"));
    }

    // Fallback: ./.hypra/logs/hypra.log
    candidates.push(PathBuf::from(".hypra").join("logs").join("hypra.log"));

    candidates
}

/// `$HYPRA_HOME`, else `<data dir>/hypra`, else the working directory.
fn bundle_dir() -> PathBuf {
    if let Some(home) = env::var_os(HOME_ENV).filter(|value| !value.is_empty()) {
        return PathBuf::from(home);
    }
    dirs::data_dir().map_or_else(|| PathBuf::from("."), |dir| dir.join("hypra"))
}

fn config_file(explicit: Option<PathBuf>) -> ConfigFile {
    explicit
        .map(ConfigFile::new)
        .or_else(ConfigFile::default_location)
        .unwrap_or_else(|| ConfigFile::new(PathBuf::from(".hypra").join("config.toml")))
}

fn exit_code(status: VerificationStatus) -> ExitCode {
    if status == VerificationStatus::Success {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}

async fn run_verify(
    manager: &mut SessionManager<ConsoleHost>,
    file: PathBuf,
    args: Vec<String>,
) -> ExitCode {
    let started = if args.is_empty() {
        manager.verify(&file)
    } else {
        manager.verify_with_args(&file, &args)
    };
    if started.is_err() {
        // Already reported through the host.
        return ExitCode::FAILURE;
    }

    let outcome = tokio::select! {
        status = manager.run_to_completion() => Some(status),
        _ = tokio::signal::ctrl_c() => None,
    };
    match outcome {
        Some(status) => {
            let summary = manager.snapshot().status_string();
            if !summary.is_empty() {
                println!("{}: {summary}", file.display());
            }
            exit_code(status)
        }
        None => {
            tracing::info!("Interrupted, stopping verifier");
            ExitCode::FAILURE
        }
    }
}

async fn run_watch(manager: &mut SessionManager<ConsoleHost>) -> Result<ExitCode> {
    manager.welcome();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line.context("Failed to read paths from stdin")? else {
                    break;
                };
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                let path = PathBuf::from(line);
                if !is_verifier_source(&path) {
                    manager.host_mut().notify(
                        LogLevel::Warn,
                        &format!("Skipping \"{}\": not a Hypra source file.", path.display()),
                    );
                    continue;
                }
                // Failures are reported through the host.
                let _ = manager.verify(&path);
            }
            () = manager.process_next_event() => {}
            _ = tokio::signal::ctrl_c() => return Ok(ExitCode::FAILURE),
        }
    }

    // Input is exhausted; let the last run finish.
    Ok(exit_code(manager.run_to_completion().await))
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    init_tracing();
    let cli = Cli::parse();

    let mut manager = SessionManager::new(ConsoleHost::new(), config_file(cli.config), bundle_dir());
    let status_printer = console::spawn_status_printer(manager.subscribe_status());

    let code = match cli.command {
        Commands::Verify { file, args } => run_verify(&mut manager, file, args).await,
        Commands::Watch => run_watch(&mut manager).await?,
        Commands::Check => {
            if manager.check_prerequisites() {
                println!("All prerequisites found.");
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            }
        }
    };

    manager.shutdown();
    status_printer.abort();
    Ok(code)
}
