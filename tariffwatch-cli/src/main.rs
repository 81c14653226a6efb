// Lint configuration for this crate
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]

//! Tariffwatch CLI - ENGIE Belgium energy prices from the command line.
//!
//! # Examples
//!
//! ```bash
//! # Log in; a 2FA code is sent by SMS
//! tariffwatch login --email me@example.com --customer-number 1500000001
//!
//! # Complete the login with the received code
//! tariffwatch verify 123456
//!
//! # Current prices
//! tariffwatch prices
//!
//! # Keep the session alive and print prices on every update
//! tariffwatch run
//!
//! # JSON output
//! tariffwatch prices --format json --pretty
//! ```

mod commands;
mod output;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};
use tariffwatch_engie::EngieError;
use tariffwatch_runtime::RuntimeError;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use commands::{config, login, prices, run, status, verify};

// ============================================================================
// CLI Definition
// ============================================================================

/// Tariffwatch CLI - ENGIE Belgium energy price monitoring.
#[derive(Parser)]
#[command(name = "tariffwatch")]
#[command(about = "ENGIE Belgium energy price monitoring CLI")]
#[command(long_about = r#"
Tariffwatch logs in to an ENGIE Belgium account once (password plus a
2FA code), keeps the session alive by rotating its refresh token, and
reports the current offtake and injection prices of every contract.

Examples:
  tariffwatch login --email me@example.com --customer-number 1500000001
  tariffwatch verify 123456         # Complete login with the 2FA code
  tariffwatch prices                # Current prices
  tariffwatch run                   # Poll until Ctrl-C
  tariffwatch config interval 6     # Poll every 6 hours
"#)]
#[command(version)]
pub struct Cli {
    /// Subcommand to run.
    #[command(subcommand)]
    pub command: Commands,

    /// Output format (text or json).
    #[arg(long, short = 'f', default_value = "text", global = true)]
    pub format: OutputFormat,

    /// Pretty-print JSON output.
    #[arg(long, global = true)]
    pub pretty: bool,

    /// Configuration directory (defaults to the platform config dir).
    #[arg(long, global = true)]
    pub config_dir: Option<PathBuf>,

    /// Verbose output (show debug info).
    #[arg(long, short, global = true)]
    pub verbose: bool,

    /// Disable colored output.
    #[arg(long, global = true)]
    pub no_color: bool,

    /// Quiet mode (minimal output).
    #[arg(long, short, global = true)]
    pub quiet: bool,
}

/// CLI commands.
#[derive(Subcommand)]
pub enum Commands {
    /// Start a login and request a 2FA code.
    Login(login::LoginArgs),

    /// Complete a pending login with the 2FA code.
    Verify(verify::VerifyArgs),

    /// Fetch and print the current prices once.
    #[command(visible_alias = "p")]
    Prices,

    /// Keep the session alive and print prices after every update.
    Run(run::RunArgs),

    /// Manage configuration.
    Config(config::ConfigArgs),

    /// Show session and polling status.
    #[command(visible_alias = "s")]
    Status(status::StatusArgs),
}

/// Output format options.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Default)]
pub enum OutputFormat {
    /// Human-readable text with colors.
    #[default]
    Text,
    /// JSON output for scripting.
    Json,
}

/// CLI exit codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum ExitCode {
    /// Success.
    Success = 0,
    /// General error.
    Error = 1,
    /// The stored session is dead; run `login` again.
    ReauthRequired = 2,
    /// The 2FA code was rejected; the challenge is kept for another try.
    InvalidCode = 3,
}

impl ExitCode {
    /// Picks the exit code for a failed command.
    pub fn for_error(err: &anyhow::Error) -> Self {
        for cause in err.chain() {
            if let Some(e) = cause.downcast_ref::<EngieError>() {
                return Self::for_engie(e);
            }
            if let Some(RuntimeError::Engie(e)) = cause.downcast_ref::<RuntimeError>() {
                return Self::for_engie(e);
            }
        }
        ExitCode::Error
    }

    fn for_engie(err: &EngieError) -> Self {
        if err.is_reauth_required() {
            ExitCode::ReauthRequired
        } else if err.is_user_correctable() {
            ExitCode::InvalidCode
        } else {
            ExitCode::Error
        }
    }
}

// ============================================================================
// Logging Setup
// ============================================================================

fn setup_logging(verbose: bool, quiet: bool) {
    if quiet {
        return;
    }

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if verbose {
            EnvFilter::new("tariffwatch=debug,info")
        } else {
            EnvFilter::new("tariffwatch=warn")
        }
    });

    tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_target(false)
                .without_time()
                .with_writer(std::io::stderr),
        )
        .with(filter)
        .init();
}

// ============================================================================
// Main Entry Point
// ============================================================================

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    setup_logging(cli.verbose, cli.quiet);

    let result: Result<()> = match &cli.command {
        Commands::Login(args) => login::run(args, &cli).await,
        Commands::Verify(args) => verify::run(args, &cli).await,
        Commands::Prices => prices::run(&cli).await,
        Commands::Run(args) => run::run(args, &cli).await,
        Commands::Config(args) => config::run(args, &cli).await,
        Commands::Status(args) => status::run(args, &cli).await,
    };

    if let Err(e) = result {
        if !cli.quiet {
            eprintln!("Error: {e:#}");
        }
        std::process::exit(ExitCode::for_error(&e) as i32);
    }
}
