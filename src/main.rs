//! Survivor bot - main entry point
//!
//! This binary provides three subcommands:
//! - run: Poll the account balance and alert when it cannot be fetched
//! - check: Print one balance and ticker snapshot
//! - credentials: Report which credentials are configured

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use survivor_bot::VenueKind;

mod commands;

#[derive(Parser, Debug)]
#[command(name = "survivor-bot")]
#[command(about = "Exchange account watchdog with Telegram alerts", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the balance monitor until Ctrl+C
    Run {
        /// Path to configuration file
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Exchange venue (overrides config file)
        #[arg(long, value_enum)]
        venue: Option<VenueKind>,
    },

    /// Fetch balance and tickers once
    Check {
        /// Path to configuration file
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Symbols to quote (defaults to the configured pairs)
        #[arg(short, long = "symbol")]
        symbols: Vec<String>,
    },

    /// Show which credentials are present
    Credentials {
        /// Path to configuration file
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Exchange venue (overrides config file)
        #[arg(long, value_enum)]
        venue: Option<VenueKind>,
    },
}

fn setup_logging(verbose: bool, command_name: &str) -> Result<()> {
    std::fs::create_dir_all("logs")?;

    // {command}_{date}.log
    let log_filename = format!(
        "{}_{}.log",
        command_name,
        chrono::Local::now().format("%Y-%m-%d_%H-%M-%S")
    );
    let log_path = PathBuf::from("logs").join(&log_filename);

    // Keep HTTP internals quiet
    let level = if verbose { "debug" } else { "info" };
    let filter_str = format!(
        "{},hyper=warn,hyper_util=warn,reqwest=warn,rustls=warn,h2=warn",
        level
    );
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&filter_str));

    let file_appender = tracing_appender::rolling::never("logs", &log_filename);

    let console_layer = tracing_subscriber::fmt::layer()
        .with_target(true)
        .with_line_number(true)
        .with_file(true)
        .with_ansi(true);

    let file_layer = tracing_subscriber::fmt::layer()
        .with_writer(file_appender)
        .with_target(true)
        .with_line_number(true)
        .with_file(true)
        .with_ansi(false);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(console_layer)
        .with(file_layer)
        .init();

    info!("Log file: {}", log_path.display());
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // .env is optional
    dotenv::dotenv().ok();

    let command_name = match &cli.command {
        Commands::Run { .. } => "run",
        Commands::Check { .. } => "check",
        Commands::Credentials { .. } => "credentials",
    };
    setup_logging(cli.verbose, command_name)?;

    match cli.command {
        Commands::Run { config, venue } => commands::run::run(config, venue),
        Commands::Check { config, symbols } => commands::check::run(config, symbols),
        Commands::Credentials { config, venue } => commands::credentials::run(config, venue),
    }
}
