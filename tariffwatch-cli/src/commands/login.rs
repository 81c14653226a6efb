//! Login command - phase one of the two-step login.

use std::io::{BufRead, Write};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Args, ValueEnum};
use tariffwatch_core::{Credentials, MfaChannel};
use tariffwatch_engie::{AuthSession, DEFAULT_CLIENT_ID};
use tariffwatch_fetch::MemoryTokenPersistence;
use tariffwatch_runtime::RuntimeConfig;
use tariffwatch_store::{PendingLogin, TokenStorage};
use tracing::info;

use super::Paths;
use crate::output::JsonFormatter;
use crate::{Cli, OutputFormat};

/// 2FA delivery channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Default)]
pub enum Channel {
    /// Text message.
    #[default]
    Sms,
    /// Email.
    Email,
}

impl From<Channel> for MfaChannel {
    fn from(channel: Channel) -> Self {
        match channel {
            Channel::Sms => MfaChannel::Sms,
            Channel::Email => MfaChannel::Email,
        }
    }
}

/// Arguments for the login command.
#[derive(Args)]
pub struct LoginArgs {
    /// Account email.
    #[arg(long)]
    pub email: String,

    /// Customer (business agreement) number.
    #[arg(long)]
    pub customer_number: String,

    /// OAuth client id of the app.
    #[arg(long, default_value = DEFAULT_CLIENT_ID)]
    pub client_id: String,

    /// Where the 2FA code is sent.
    #[arg(long, value_enum, default_value = "sms")]
    pub channel: Channel,

    /// Account password. Read from stdin when omitted.
    #[arg(long)]
    pub password: Option<String>,

    /// Keep the refresh token in the system keychain instead of the
    /// config entry.
    #[arg(long)]
    pub keychain: bool,
}

/// Runs the login command.
pub async fn run(args: &LoginArgs, cli: &Cli) -> Result<()> {
    let password = match &args.password {
        Some(password) => password.clone(),
        None => prompt("Password: ").context("Failed to read password")?,
    };
    let credentials = Credentials::new(
        args.email.trim(),
        password,
        args.customer_number.trim(),
        args.client_id.trim(),
    )
    .with_mfa_channel(args.channel.into());

    // Tokens only exist after `verify`; nothing is persisted here.
    let config = RuntimeConfig::default();
    let session = AuthSession::new(
        config.session_config(&credentials.client_id),
        Arc::new(MemoryTokenPersistence::new()),
    )?;
    let challenge = session.begin_login(&credentials).await?;

    let paths = Paths::from_cli(cli);
    let file = paths.challenge();
    let pending = PendingLogin {
        email: credentials.email.clone(),
        customer_number: credentials.customer_number.clone(),
        challenge,
        token_storage: if args.keychain {
            TokenStorage::Keychain
        } else {
            TokenStorage::Entry
        },
    };
    file.save(&pending)
        .await
        .context("Failed to save pending login")?;
    info!(path = %file.path().display(), "Pending login saved");

    match cli.format {
        OutputFormat::Text => {
            println!(
                "A verification code was sent by {}.",
                pending.challenge.channel
            );
            println!("Complete the login with: tariffwatch verify <code>");
        }
        OutputFormat::Json => {
            let output = serde_json::json!({
                "status": "code_sent",
                "channel": pending.challenge.channel.key(),
                "challenge_file": file.path().display().to_string(),
            });
            println!("{}", JsonFormatter::new(cli.pretty).format(&output)?);
        }
    }

    Ok(())
}

fn prompt(label: &str) -> std::io::Result<String> {
    let mut stderr = std::io::stderr();
    stderr.write_all(label.as_bytes())?;
    stderr.flush()?;

    let mut line = String::new();
    std::io::stdin().lock().read_line(&mut line)?;
    Ok(line.trim_end_matches(['\r', '\n']).to_string())
}
