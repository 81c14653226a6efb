//! Status command - session health and polling settings.

use anyhow::{Context, Result};
use clap::Args;
use tracing::warn;

use super::{Paths, persistence, resume_session, runtime_config};
use crate::output::{JsonFormatter, StatusOutput, TextFormatter};
use crate::{Cli, OutputFormat};

/// Arguments for the status command.
#[derive(Args)]
pub struct StatusArgs {
    /// Refresh the session to confirm it is still accepted.
    #[arg(long)]
    pub check: bool,
}

/// Runs the status command.
pub async fn run(args: &StatusArgs, cli: &Cli) -> Result<()> {
    let paths = Paths::from_cli(cli);
    let pending_login = paths
        .challenge()
        .load()
        .await
        .context("Failed to read pending login")?
        .is_some();

    let entry = paths.open_entry().await?;
    let has_session = persistence(&entry)
        .await
        .load_tokens()
        .await
        .context("Failed to read stored tokens")?
        .is_some();
    let healthy = if args.check && has_session {
        check_session(&paths).await?
    } else {
        has_session
    };

    // Reloaded: a check rotates the stored tokens.
    let entry = paths.open_entry().await?;
    let stored = persistence(&entry).await.load_tokens().await?;
    let output = StatusOutput::new(&entry.entry().await, stored.as_ref(), healthy, pending_login);

    match cli.format {
        OutputFormat::Text => {
            println!("{}", TextFormatter::new(!cli.no_color).format_status(&output));
        }
        OutputFormat::Json => {
            println!("{}", JsonFormatter::new(cli.pretty).format(&output)?);
        }
    }

    Ok(())
}

async fn check_session(paths: &Paths) -> Result<bool> {
    let entry = paths.open_entry().await?;
    let config = runtime_config(&entry).await;
    let session = resume_session(&entry, &config).await?;

    match session.refresh().await {
        Ok(_) => Ok(true),
        Err(e) if e.is_reauth_required() => Ok(false),
        Err(e) => {
            warn!(error = %e, "Session check inconclusive");
            Ok(session.store().is_healthy())
        }
    }
}
