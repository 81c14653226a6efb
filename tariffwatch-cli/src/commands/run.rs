//! Run command - long-running integration until Ctrl-C.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use clap::Args;
use tariffwatch_core::UpdateInterval;
use tariffwatch_runtime::Integration;
use tariffwatch_store::UpdateState;
use tracing::{info, warn};

use super::{Paths, persistence, runtime_config};
use crate::output::{JsonFormatter, PricesOutput, TextFormatter};
use crate::{Cli, OutputFormat};

/// Arguments for the run command.
#[derive(Args)]
pub struct RunArgs {
    /// Polling interval in hours (1-24) for this run, overriding the
    /// configured one.
    #[arg(long, short)]
    pub interval: Option<u8>,
}

/// Runs the run command.
pub async fn run(args: &RunArgs, cli: &Cli) -> Result<()> {
    let paths = Paths::from_cli(cli);
    let entry = paths.open_entry().await?;
    let mut config = runtime_config(&entry).await;
    if let Some(hours) = args.interval {
        config = config.with_update_interval(UpdateInterval::from_hours(hours)?);
    }

    let identity = entry.entry().await;
    let integration = Integration::setup(
        config,
        &identity.customer_number,
        &identity.client_id,
        persistence(&entry).await,
    )
    .await
    .context("Failed to start")?;
    if !integration.auth_healthy() {
        warn!("Session is not active, run `tariffwatch login` to restore it");
    }

    let mut prices_rx = integration.subscribe_prices();
    let mut health_rx = integration.subscribe_health();
    let mut printed: Option<DateTime<Utc>> = None;

    loop {
        let status = integration.status().await;
        let finished = matches!(status.state, UpdateState::Success | UpdateState::Failed);
        if finished && status.last_attempt != printed {
            printed = status.last_attempt;
            let output = PricesOutput::new(&integration.readings().await, &status);
            print_update(&output, cli)?;
            if integration.has_unsaved_tokens() {
                warn!("Rotated session tokens could not be saved, a restart will need a new login");
            }
        }

        tokio::select! {
            signal = tokio::signal::ctrl_c() => {
                signal.context("Failed to listen for Ctrl-C")?;
                info!("Interrupted");
                break;
            }
            changed = prices_rx.changed() => {
                if changed.is_err() {
                    break;
                }
            }
            changed = health_rx.changed() => {
                if changed.is_err() {
                    break;
                }
                if *health_rx.borrow_and_update() {
                    info!("Session active");
                } else {
                    warn!("Session expired, run `tariffwatch login` to restore it");
                }
            }
        }
    }

    integration.shutdown().await;
    Ok(())
}

fn print_update(output: &PricesOutput, cli: &Cli) -> Result<()> {
    match cli.format {
        OutputFormat::Text => {
            println!("{}", TextFormatter::new(!cli.no_color).format_prices(output));
            println!();
        }
        OutputFormat::Json => {
            println!("{}", JsonFormatter::new(cli.pretty).format(output)?);
        }
    }
    Ok(())
}
