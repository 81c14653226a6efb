//! Config command - manage configuration.

use anyhow::{Context, Result};
use clap::{Args, Subcommand};
use tariffwatch_core::UpdateInterval;
use tracing::info;

use super::Paths;
use crate::output::JsonFormatter;
use crate::{Cli, OutputFormat};

/// Arguments for the config command.
#[derive(Args)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub action: ConfigAction,
}

/// Config subcommands.
#[derive(Subcommand)]
pub enum ConfigAction {
    /// Show current configuration.
    Show,

    /// Show configuration paths.
    Path,

    /// Set the price polling interval.
    Interval {
        /// Hours between updates (1-24).
        hours: u8,
    },
}

/// Runs the config command.
pub async fn run(args: &ConfigArgs, cli: &Cli) -> Result<()> {
    match &args.action {
        ConfigAction::Show => show_config(cli).await,
        ConfigAction::Path => show_paths(cli),
        ConfigAction::Interval { hours } => set_interval(*hours, cli).await,
    }
}

async fn show_config(cli: &Cli) -> Result<()> {
    let paths = Paths::from_cli(cli);
    let entry = paths.open_entry().await?.entry().await;

    match cli.format {
        OutputFormat::Text => {
            println!("Tariffwatch Configuration");
            println!("{}", "─".repeat(40));
            println!();
            println!("Email:           {}", entry.email);
            println!("Customer number: {}", entry.customer_number);
            println!("Client id:       {}", entry.client_id);
            println!("2FA channel:     {}", entry.mfa_channel);
            println!("Token storage:   {:?}", entry.token_storage);
            println!("Update interval: {}", entry.options.update_interval_hours);
        }
        OutputFormat::Json => {
            let output = serde_json::json!({
                "email": entry.email,
                "customer_number": entry.customer_number,
                "client_id": entry.client_id,
                "mfa_channel": entry.mfa_channel,
                "token_storage": entry.token_storage,
                "options": entry.options,
            });
            println!("{}", JsonFormatter::new(cli.pretty).format(&output)?);
        }
    }

    Ok(())
}

fn show_paths(cli: &Cli) -> Result<()> {
    let paths = Paths::from_cli(cli);
    let challenge = paths.challenge();

    match cli.format {
        OutputFormat::Text => {
            println!("Configuration Paths");
            println!("{}", "─".repeat(40));
            println!();
            println!("Config dir:     {}", paths.dir().display());
            println!("Entry file:     {}", paths.entry().display());
            println!("Challenge file: {}", challenge.path().display());
        }
        OutputFormat::Json => {
            let output = serde_json::json!({
                "config_dir": paths.dir().display().to_string(),
                "entry_file": paths.entry().display().to_string(),
                "challenge_file": challenge.path().display().to_string(),
            });
            println!("{}", JsonFormatter::new(cli.pretty).format(&output)?);
        }
    }

    Ok(())
}

async fn set_interval(hours: u8, cli: &Cli) -> Result<()> {
    let interval = UpdateInterval::from_hours(hours)?;

    let paths = Paths::from_cli(cli);
    let entry = paths.open_entry().await?;
    entry
        .set_update_interval(interval)
        .await
        .context("Failed to save config entry")?;

    info!(interval = %interval, "Update interval saved");
    if !cli.quiet {
        println!("Update interval set to: {interval}");
    }

    Ok(())
}
