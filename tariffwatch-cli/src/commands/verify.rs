//! Verify command - completes a pending login with the 2FA code.

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Args;
use tariffwatch_engie::AuthSession;
use tariffwatch_fetch::MemoryTokenPersistence;
use tariffwatch_runtime::RuntimeConfig;
use tariffwatch_store::EntryStore;
use tracing::{info, warn};

use super::{Paths, persistence};
use crate::output::JsonFormatter;
use crate::{Cli, OutputFormat};

/// Arguments for the verify command.
#[derive(Args)]
pub struct VerifyArgs {
    /// The 6-digit code that was sent.
    pub code: String,
}

/// Runs the verify command.
pub async fn run(args: &VerifyArgs, cli: &Cli) -> Result<()> {
    let paths = Paths::from_cli(cli);
    let file = paths.challenge();
    let pending = file
        .load()
        .await
        .context("Failed to load pending login")?
        .ok_or_else(|| anyhow::anyhow!("No pending login, run `tariffwatch login` first"))?;

    // The entry is only written once the code is accepted, so a wrong code
    // never disturbs a working session.
    let config = RuntimeConfig::default();
    let session = AuthSession::new(
        config.session_config(&pending.challenge.client_id),
        Arc::new(MemoryTokenPersistence::new()),
    )?;
    let tokens = match session.submit_2fa(&pending.challenge, &args.code).await {
        Ok(tokens) => tokens,
        Err(e) if e.is_user_correctable() => {
            warn!("Code rejected, the pending login is kept");
            return Err::<(), _>(e).context("Try again with `tariffwatch verify <code>`");
        }
        Err(e) => return Err(e.into()),
    };

    let store = Arc::new(
        EntryStore::upsert(paths.entry(), pending.to_entry())
            .await
            .context("Failed to write config entry")?,
    );
    persistence(&store)
        .await
        .persist_tokens(&tokens)
        .await
        .context("Failed to store session tokens")?;
    file.clear().await.context("Failed to remove pending login")?;
    info!(path = %store.path().display(), "Login complete");

    match cli.format {
        OutputFormat::Text => {
            println!("Logged in as {}.", pending.email);
            println!("Config entry: {}", store.path().display());
        }
        OutputFormat::Json => {
            let output = serde_json::json!({
                "status": "logged_in",
                "email": pending.email,
                "customer_number": pending.customer_number,
                "entry_file": store.path().display().to_string(),
            });
            println!("{}", JsonFormatter::new(cli.pretty).format(&output)?);
        }
    }

    Ok(())
}
