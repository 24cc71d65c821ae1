//! Cadence - calendar and meeting-note insights
//!
//! A CLI tool that exports Google Calendar meetings, downloads their
//! meeting notes, and summarizes recurring themes with Gemini.
//!
//! Exit codes:
//!   0   - Success
//!   1   - Runtime error (API failure, unreadable notes, write failure, etc.)
//!   2   - Invalid arguments or configuration
//!   3   - Authentication failure (delete the cached token and retry)
//!   130 - Interrupted

mod analysis;
mod cli;
mod commands;
mod config;
mod dates;
mod error;
mod google;
mod models;
mod notes;
mod ports;
mod report;

use anyhow::Result;
use cli::{Args, Command};
use config::Config;
use error::{AppError, ConfigError};
use tracing::{debug, error, info, warn};
use tracing_subscriber::FmtSubscriber;

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command-line arguments
    let args = Args::parse_args();

    // Validate arguments
    if let Err(e) = args.validate() {
        eprintln!("Error: {}", e);
        std::process::exit(2);
    }

    // Handle init-config early (no logging needed)
    if let Command::InitConfig = args.command {
        if let Err(e) = commands::init_config() {
            eprintln!("⚠️  {}", e);
            std::process::exit(exit_code(&e));
        }
        return Ok(());
    }

    // Initialize logging
    init_logging(&args);

    info!("Cadence v{}", env!("CARGO_PKG_VERSION"));
    debug!("Arguments: {:?}", args);

    let config = match load_config(&args) {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to load configuration: {:#}", e);
            eprintln!("\n❌ Error: {:#}", e);
            std::process::exit(2);
        }
    };

    let code = tokio::select! {
        result = run(&args, &config) => match result {
            Ok(()) => 0,
            Err(e) => {
                error!("Command failed: {:#}", e);
                eprintln!("\n❌ Error: {:#}", e);
                exit_code(&e)
            }
        },
        _ = tokio::signal::ctrl_c() => {
            eprintln!("\nInterrupted.");
            130
        }
    };

    std::process::exit(code);
}

async fn run(args: &Args, config: &Config) -> Result<()> {
    match args.command {
        Command::ListCalendars => commands::list_calendars(config).await,
        Command::ListEvents(ref list) => commands::list_events(config, list).await,
        Command::DownloadNotes(ref download) => commands::download_notes(config, download).await,
        Command::AnalyzeThemes(ref analyze) => {
            commands::analyze_themes(config, analyze, !args.quiet).await
        }
        Command::Ask(ref ask) => commands::ask(config, ask).await,
        Command::InitConfig => commands::init_config(),
    }
}

/// Map an error to the process exit code.
fn exit_code(e: &anyhow::Error) -> i32 {
    if let Some(app) = e.downcast_ref::<AppError>() {
        return app.exit_code();
    }
    if e.downcast_ref::<ConfigError>().is_some() {
        return 2;
    }
    1
}

/// Initialize logging based on verbosity settings.
fn init_logging(args: &Args) {
    let level = args.log_level();

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .compact()
        .finish();

    tracing::subscriber::set_global_default(subscriber).expect("Failed to set tracing subscriber");
}

/// Layer configuration: file (or defaults), environment, then flags.
fn load_config(args: &Args) -> Result<Config> {
    let mut config = match args.config {
        // An explicit path must load.
        Some(ref config_path) => Config::load(config_path)?,
        None => match Config::load_default() {
            Ok(Some(config)) => config,
            Ok(None) => Config::default(),
            Err(e) => {
                warn!("Failed to load {}: {:#}", config::CONFIG_FILE_NAME, e);
                Config::default()
            }
        },
    };

    config.apply_env();
    config.merge_with_args(args);
    Ok(config)
}
