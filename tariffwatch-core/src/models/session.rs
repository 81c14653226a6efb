//! Session types: login credentials and OAuth tokens.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::error::CoreError;

// ============================================================================
// 2FA Channel
// ============================================================================

/// Channel the provider uses to deliver the 2FA code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum MfaChannel {
    /// Text message to the registered phone number.
    #[default]
    Sms,
    /// Email to the account address.
    Email,
}

impl MfaChannel {
    /// Lowercase key, as stored in the config entry.
    pub fn key(&self) -> &'static str {
        match self {
            MfaChannel::Sms => "sms",
            MfaChannel::Email => "email",
        }
    }
}

impl std::fmt::Display for MfaChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MfaChannel::Sms => write!(f, "SMS"),
            MfaChannel::Email => write!(f, "Email"),
        }
    }
}

impl std::str::FromStr for MfaChannel {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "sms" => Ok(MfaChannel::Sms),
            "email" | "e-mail" => Ok(MfaChannel::Email),
            other => Err(CoreError::InvalidConfig(format!(
                "unknown 2FA channel '{other}' (expected sms or email)"
            ))),
        }
    }
}

// ============================================================================
// Credentials
// ============================================================================

/// Returns true if `value` is a customer number: ASCII digits only.
///
/// The number becomes a path segment of the price endpoint.
pub fn is_valid_customer_number(value: &str) -> bool {
    !value.is_empty() && value.bytes().all(|b| b.is_ascii_digit())
}

/// Login input supplied once by the configuration flow.
///
/// The password is only held in memory for the duration of the login and is
/// redacted from `Debug` output.
#[derive(Clone)]
pub struct Credentials {
    /// Account email address.
    pub email: String,
    password: String,
    /// Customer (business agreement) number.
    pub customer_number: String,
    /// OAuth client identifier of the public app client.
    pub client_id: String,
    /// Where the 2FA code is sent.
    pub mfa_channel: MfaChannel,
}

impl Credentials {
    /// Creates credentials using SMS as the 2FA channel.
    pub fn new(
        email: impl Into<String>,
        password: impl Into<String>,
        customer_number: impl Into<String>,
        client_id: impl Into<String>,
    ) -> Self {
        Self {
            email: email.into(),
            password: password.into(),
            customer_number: customer_number.into(),
            client_id: client_id.into(),
            mfa_channel: MfaChannel::default(),
        }
    }

    /// Sets the 2FA channel.
    #[must_use]
    pub fn with_mfa_channel(mut self, channel: MfaChannel) -> Self {
        self.mfa_channel = channel;
        self
    }

    /// The account password.
    pub fn password(&self) -> &str {
        &self.password
    }

    /// Checks that no field is blank and the customer number is numeric.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidConfig`] naming the first bad field.
    pub fn validate(&self) -> Result<(), CoreError> {
        let fields = [
            ("email", &self.email),
            ("password", &self.password),
            ("customer number", &self.customer_number),
            ("client id", &self.client_id),
        ];
        for (name, value) in fields {
            if value.trim().is_empty() {
                return Err(CoreError::InvalidConfig(format!("{name} must not be empty")));
            }
        }
        if !is_valid_customer_number(&self.customer_number) {
            return Err(CoreError::InvalidConfig(
                "customer number must contain only digits".to_string(),
            ));
        }
        Ok(())
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("email", &self.email)
            .field("password", &"<redacted>")
            .field("customer_number", &self.customer_number)
            .field("client_id", &self.client_id)
            .field("mfa_channel", &self.mfa_channel)
            .finish()
    }
}

// ============================================================================
// Session Tokens
// ============================================================================

/// Validity assumed when the token endpoint omits `expires_in`.
const DEFAULT_ACCESS_TOKEN_LIFETIME_SECS: i64 = 120;

/// Upper bound on a reported `expires_in`.
const MAX_ACCESS_TOKEN_LIFETIME_SECS: i64 = 86_400;

/// Access token, its expiry, and the single-use refresh token.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionTokens {
    /// Bearer token for API calls.
    pub access_token: String,
    /// When the access token stops being accepted.
    pub expires_at: DateTime<Utc>,
    /// Refresh token; consumed by the next refresh exchange.
    pub refresh_token: String,
}

impl SessionTokens {
    /// Builds tokens from a token endpoint response received at `issued_at`.
    pub fn issued(
        access_token: impl Into<String>,
        refresh_token: impl Into<String>,
        expires_in_secs: Option<i64>,
        issued_at: DateTime<Utc>,
    ) -> Self {
        let lifetime = expires_in_secs
            .filter(|s| *s > 0)
            .map_or(DEFAULT_ACCESS_TOKEN_LIFETIME_SECS, |s| {
                s.min(MAX_ACCESS_TOKEN_LIFETIME_SECS)
            });
        let expires_at = issued_at
            .checked_add_signed(Duration::seconds(lifetime))
            .unwrap_or(issued_at);
        Self {
            access_token: access_token.into(),
            expires_at,
            refresh_token: refresh_token.into(),
        }
    }

    /// Tokens resumed from storage with only a refresh token known.
    ///
    /// The access token is empty and already expired, so the first use
    /// triggers a refresh.
    pub fn from_refresh_token(refresh_token: impl Into<String>) -> Self {
        Self {
            access_token: String::new(),
            expires_at: DateTime::<Utc>::UNIX_EPOCH,
            refresh_token: refresh_token.into(),
        }
    }

    /// Remaining validity of the access token at `now` (negative once expired).
    pub fn remaining(&self, now: DateTime<Utc>) -> Duration {
        self.expires_at - now
    }

    /// Returns true if the access token is unusable at `now`.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.access_token.is_empty() || self.expires_at <= now
    }

    /// Returns true if the access token expires within `margin` of `now`.
    pub fn expires_within(&self, margin: Duration, now: DateTime<Utc>) -> bool {
        self.access_token.is_empty() || self.remaining(now) < margin
    }
}

impl std::fmt::Debug for SessionTokens {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionTokens")
            .field("access_token", &"<redacted>")
            .field("expires_at", &self.expires_at)
            .field("refresh_token", &"<redacted>")
            .finish()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mfa_channel_parse() {
        assert_eq!("sms".parse::<MfaChannel>().unwrap(), MfaChannel::Sms);
        assert_eq!("Email".parse::<MfaChannel>().unwrap(), MfaChannel::Email);
        assert!("pigeon".parse::<MfaChannel>().is_err());
    }

    #[test]
    fn test_mfa_channel_serde() {
        let json = serde_json::to_string(&MfaChannel::Email).unwrap();
        assert_eq!(json, "\"email\"");
    }

    #[test]
    fn test_credentials_debug_redacts_password() {
        let creds = Credentials::new("a@b.be", "hunter2", "1500000001", "client");
        let debug = format!("{creds:?}");
        assert!(!debug.contains("hunter2"));
        assert!(debug.contains("a@b.be"));
    }

    #[test]
    fn test_credentials_validate() {
        let creds = Credentials::new("a@b.be", "pw", "1500000001", "client");
        assert!(creds.validate().is_ok());

        let blank = Credentials::new("a@b.be", "pw", "  ", "client");
        assert!(blank.validate().is_err());

        for bad in ["15000/../1", "1500?x=1", "15 00", "１５"] {
            let creds = Credentials::new("a@b.be", "pw", bad, "client");
            assert!(creds.validate().is_err(), "{bad} accepted");
        }
    }

    #[test]
    fn test_tokens_issued_expiry() {
        let now = Utc::now();
        let tokens = SessionTokens::issued("at", "rt", Some(120), now);
        assert_eq!(tokens.remaining(now), Duration::seconds(120));
        assert!(!tokens.is_expired_at(now));
        assert!(tokens.is_expired_at(now + Duration::seconds(120)));
    }

    #[test]
    fn test_tokens_default_lifetime() {
        let now = Utc::now();
        let tokens = SessionTokens::issued("at", "rt", None, now);
        assert_eq!(tokens.remaining(now), Duration::seconds(120));
    }

    #[test]
    fn test_tokens_lifetime_is_capped() {
        let now = Utc::now();
        let tokens = SessionTokens::issued("at", "rt", Some(i64::MAX), now);
        assert_eq!(tokens.remaining(now), Duration::days(1));

        let tokens = SessionTokens::issued("at", "rt", Some(-5), now);
        assert_eq!(tokens.remaining(now), Duration::seconds(120));
    }

    #[test]
    fn test_tokens_expires_within_margin() {
        let now = Utc::now();
        let tokens = SessionTokens::issued("at", "rt", Some(120), now);
        assert!(!tokens.expires_within(Duration::seconds(75), now));
        assert!(tokens.expires_within(Duration::seconds(75), now + Duration::seconds(60)));
    }

    #[test]
    fn test_resumed_tokens_are_expired() {
        let tokens = SessionTokens::from_refresh_token("rt");
        assert!(tokens.is_expired_at(Utc::now()));
        assert_eq!(tokens.refresh_token, "rt");
    }

    #[test]
    fn test_tokens_debug_redacts() {
        let tokens = SessionTokens::issued("secret-access", "secret-refresh", None, Utc::now());
        let debug = format!("{tokens:?}");
        assert!(!debug.contains("secret-access"));
        assert!(!debug.contains("secret-refresh"));
    }
}
