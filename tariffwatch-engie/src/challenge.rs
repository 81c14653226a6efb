//! Serializable handle between the two login phases.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use reqwest::cookie::{CookieStore, Jar};
use serde::{Deserialize, Serialize};
use tariffwatch_core::MfaChannel;
use url::Url;

use crate::error::EngieError;

/// State carried from `begin_login` to `submit_2fa`.
///
/// Holds everything the second phase needs, including the login cookies,
/// so the two phases may be separated by a process restart. A rejected
/// code leaves the state valid for another attempt.
#[derive(Clone, Serialize, Deserialize)]
pub struct ChallengeState {
    /// State returned by the authorize request.
    pub authorize_state: String,
    /// State returned after the password was accepted.
    pub login_state: String,
    /// State of the 2FA challenge page.
    pub challenge_state: String,
    code_verifier: String,
    /// Channel the code was sent through.
    pub channel: MfaChannel,
    /// OAuth client id used for the attempt.
    pub client_id: String,
    /// When the challenge was requested.
    pub created_at: DateTime<Utc>,
    /// Login cookies as `name=value` pairs.
    #[serde(default)]
    cookies: Vec<String>,
}

impl ChallengeState {
    pub(crate) fn new(
        states: [String; 3],
        code_verifier: String,
        channel: MfaChannel,
        client_id: String,
        cookies: Vec<String>,
    ) -> Self {
        let [authorize_state, login_state, challenge_state] = states;
        Self {
            authorize_state,
            login_state,
            challenge_state,
            code_verifier,
            channel,
            client_id,
            created_at: Utc::now(),
            cookies,
        }
    }

    pub(crate) fn code_verifier(&self) -> &str {
        &self.code_verifier
    }

    /// Age of the challenge at `now`.
    pub fn age(&self, now: DateTime<Utc>) -> Duration {
        now - self.created_at
    }

    /// Number of stored login cookies.
    pub fn cookie_count(&self) -> usize {
        self.cookies.len()
    }

    /// Rebuilds a cookie jar for `auth_base` from the stored cookies.
    pub(crate) fn cookie_jar(&self, auth_base: &str) -> Result<Arc<Jar>, EngieError> {
        let url = parse_base(auth_base)?;
        let jar = Jar::default();
        for cookie in &self.cookies {
            jar.add_cookie_str(&format!("{cookie}; Path=/"), &url);
        }
        Ok(Arc::new(jar))
    }
}

/// Reads the cookies the jar would send to `auth_base`.
pub(crate) fn export_cookies(jar: &Jar, auth_base: &str) -> Result<Vec<String>, EngieError> {
    let url = parse_base(auth_base)?;
    let Some(header) = jar.cookies(&url) else {
        return Ok(Vec::new());
    };
    let header = header
        .to_str()
        .map_err(|e| EngieError::Auth(format!("unreadable login cookie: {e}")))?;
    Ok(header
        .split(';')
        .map(str::trim)
        .filter(|pair| !pair.is_empty())
        .map(str::to_string)
        .collect())
}

fn parse_base(auth_base: &str) -> Result<Url, EngieError> {
    Url::parse(&format!("{}/", auth_base.trim_end_matches('/')))
        .map_err(|e| EngieError::Config(format!("invalid auth base URL: {e}")))
}

impl std::fmt::Debug for ChallengeState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChallengeState")
            .field("channel", &self.channel)
            .field("client_id", &self.client_id)
            .field("created_at", &self.created_at)
            .field("cookies", &self.cookies.len())
            .finish_non_exhaustive()
    }
}
