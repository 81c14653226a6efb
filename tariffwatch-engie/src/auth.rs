//! Auth session: OAuth2/PKCE login with 2FA and refresh-token rotation.
//!
//! # Login
//!
//! The identity service has no API for native apps; the login replays the
//! page sequence of the app's embedded browser. Redirects are never
//! followed (the last one targets the app scheme), and each state value is
//! read from the response body, falling back to the `Location` header.
//!
//! Phase one ([`AuthSession::begin_login`]):
//!
//! 1. `GET /authorize` with the PKCE challenge -> authorize state
//! 2. `GET /u/login/identifier`
//! 3. `POST /u/login/identifier` with the username
//! 4. `GET /u/login/password`
//! 5. `POST /u/login/password` -> login state (missing means bad credentials)
//! 6. `GET /authorize/resume` -> challenge state
//! 7. `GET /u/mfa-sms-challenge` (or `/u/mfa-email-challenge`), which sends the code
//!
//! Phase two ([`AuthSession::submit_2fa`]):
//!
//! 8. `POST` the challenge page with the code (a 400 means a wrong code)
//! 9. `GET /authorize/resume` -> passkey enrollment state
//! 10. `GET /u/passkey-enrollment`
//! 11. `POST /u/passkey-enrollment` aborting the enrollment
//! 12. `GET /authorize/resume` -> authorization code
//! 13. `POST /oauth/token` exchanging code and verifier for tokens
//!
//! # Refresh
//!
//! Refresh tokens are single-use. Every exchange runs with the token store
//! locked, and the rotated pair is persisted before the call returns.

use std::sync::{Arc, LazyLock};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use regex::Regex;
use reqwest::StatusCode;
use reqwest::cookie::Jar;
use serde::Deserialize;
use tariffwatch_core::{Credentials, MfaChannel, SessionTokens};
use tariffwatch_fetch::{HttpClient, HttpError, ResponseExt, TokenPersistence};
use tokio::sync::watch;
use tracing::{debug, info, instrument, warn};

use crate::challenge::{ChallengeState, export_cookies};
use crate::constants::{
    APP_SCHEME, CANCEL_REDIRECT, DEFAULT_CLIENT_ID, EngieEndpoints, OAUTH_AUDIENCE, OAUTH_SCOPES,
    REDIRECT_URI, UI_LOCALE, USER_AGENT_BROWSER, USER_AGENT_NATIVE, browser_headers,
    token_headers,
};
use crate::error::EngieError;
use crate::pkce::{CHALLENGE_METHOD, PkceChallenge, random_hex};
use crate::token_store::{TokenState, TokenStore};

// ============================================================================
// Constants
// ============================================================================

/// Default HTTP timeout.
const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Length of a verification code.
const CODE_LENGTH: usize = 6;

static STATE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"state=([a-zA-Z0-9_-]+)").expect("Invalid regex"));

static CODE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"code=([a-zA-Z0-9_-]+)").expect("Invalid regex"));

// ============================================================================
// Token Provider
// ============================================================================

/// Source of valid access tokens for the coordinator and refresh loop.
#[async_trait]
pub trait TokenProvider: Send + Sync {
    /// Returns a usable access token, refreshing first if it has expired.
    async fn access_token(&self) -> Result<String, EngieError>;

    /// Returns a fresh token after the API rejected `rejected`.
    ///
    /// If another task already rotated the token, the newer one is
    /// returned without a second exchange.
    async fn renew_after_rejection(&self, rejected: &str) -> Result<String, EngieError>;

    /// Refreshes if the access token expires within `margin`.
    ///
    /// Returns true if an exchange took place.
    async fn refresh_if_expiring(&self, margin: Duration) -> Result<bool, EngieError>;

    /// Whether only a new login can restore the session.
    fn needs_reauth(&self) -> bool;

    /// Subscribes to the authentication health indicator.
    fn subscribe_health(&self) -> watch::Receiver<bool>;
}

// ============================================================================
// Configuration
// ============================================================================

/// Settings for an [`AuthSession`].
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Service base URLs.
    pub endpoints: EngieEndpoints,
    /// OAuth client id used for refresh exchanges.
    pub client_id: String,
    /// Per-request timeout.
    pub timeout: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            endpoints: EngieEndpoints::default(),
            client_id: DEFAULT_CLIENT_ID.to_string(),
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        }
    }
}

// ============================================================================
// Token Endpoint Response
// ============================================================================

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    expires_in: Option<i64>,
}

// ============================================================================
// Auth Session
// ============================================================================

/// Owns the session tokens and performs login and refresh exchanges.
#[derive(Debug)]
pub struct AuthSession {
    config: SessionConfig,
    http: HttpClient,
    store: TokenStore,
}

impl AuthSession {
    /// Creates a session writing tokens through `persistence`.
    ///
    /// The session starts without tokens; call [`AuthSession::restore`] to
    /// resume a stored one.
    ///
    /// # Errors
    ///
    /// Returns [`EngieError::Config`] if the HTTP client cannot be built.
    pub fn new(
        config: SessionConfig,
        persistence: Arc<dyn TokenPersistence>,
    ) -> Result<Self, EngieError> {
        let http = HttpClient::builder()
            .timeout(config.timeout)
            .user_agent(USER_AGENT_NATIVE)
            .no_redirects()
            .allowed_domains(config.endpoints.allowed_domains())
            .build()
            .map_err(|e| EngieError::Config(e.to_string()))?;

        Ok(Self {
            config,
            http,
            store: TokenStore::new(persistence),
        })
    }

    /// The token store.
    pub fn store(&self) -> &TokenStore {
        &self.store
    }

    /// Resumes the stored session, if any.
    ///
    /// # Errors
    ///
    /// Returns [`EngieError::Persist`] if storage cannot be read.
    pub async fn restore(&self) -> Result<bool, EngieError> {
        Ok(self.store.restore().await?)
    }

    fn login_client(&self, jar: Arc<Jar>) -> Result<LoginFlow<'_>, EngieError> {
        let http = HttpClient::builder()
            .timeout(self.config.timeout)
            .user_agent(USER_AGENT_BROWSER)
            .cookie_jar(jar)
            .no_redirects()
            .allowed_domains(self.config.endpoints.allowed_domains())
            .build()
            .map_err(|e| EngieError::Config(e.to_string()))?;
        Ok(LoginFlow {
            http,
            endpoints: &self.config.endpoints,
        })
    }

    // ========================================================================
    // Phase 1
    // ========================================================================

    /// Submits the credentials and requests a 2FA code.
    ///
    /// # Errors
    ///
    /// Returns [`EngieError::Config`] for blank credentials and
    /// [`EngieError::Auth`] for rejected credentials, unexpected pages, or
    /// transport failures.
    #[instrument(skip(self, credentials), fields(channel = %credentials.mfa_channel))]
    pub async fn begin_login(&self, credentials: &Credentials) -> Result<ChallengeState, EngieError> {
        credentials.validate()?;

        let pkce = PkceChallenge::generate()?;
        let state = random_hex()?;
        let nonce = random_hex()?;
        let jar = Arc::new(Jar::default());
        let flow = self.login_client(Arc::clone(&jar))?;

        let page = flow
            .get(
                1,
                "/authorize",
                &[
                    ("redirect_uri", REDIRECT_URI),
                    ("client_id", credentials.client_id.as_str()),
                    ("response_type", "code"),
                    ("ui_locales", UI_LOCALE),
                    ("state", state.as_str()),
                    ("nonce", nonce.as_str()),
                    ("scope", OAUTH_SCOPES),
                    ("code_challenge", pkce.challenge()),
                    ("code_challenge_method", CHALLENGE_METHOD),
                    ("audience", OAUTH_AUDIENCE),
                    ("app_scheme", APP_SCHEME),
                    ("cancel_redirect", CANCEL_REDIRECT),
                ],
            )
            .await?;
        let authorize_state = page.require(&STATE_RE, "authorize state")?;

        let page_query = [("state", authorize_state.as_str()), ("ui_locales", UI_LOCALE)];

        flow.get(2, "/u/login/identifier", &page_query).await?;

        flow.post(
            3,
            "/u/login/identifier",
            &page_query,
            &[
                ("state", authorize_state.as_str()),
                ("allow-passkeys", "true"),
                ("username", credentials.email.as_str()),
                ("js-available", "true"),
                ("webauthn-available", "true"),
                ("is-brave", "false"),
                ("webauthn-platform-available", "true"),
                ("ulp-remember-me-present", "true"),
                ("ulp-remember-me", "on"),
            ],
            true,
        )
        .await?;

        flow.get(4, "/u/login/password", &page_query).await?;

        let page = flow
            .post(
                5,
                "/u/login/password",
                &page_query,
                &[
                    ("state", authorize_state.as_str()),
                    ("username", credentials.email.as_str()),
                    ("password", credentials.password()),
                    ("js-available", "true"),
                    ("webauthn-available", "true"),
                    ("is-brave", "false"),
                    ("webauthn-platform-available", "true"),
                ],
                true,
            )
            .await?;
        let login_state = page.capture(&STATE_RE).ok_or_else(|| {
            EngieError::Auth("login rejected, no login state returned (bad credentials?)".into())
        })?;

        let page = flow
            .get(6, "/authorize/resume", &[("state", login_state.as_str())])
            .await?;
        let challenge_state = page.require(&STATE_RE, "2FA challenge state")?;

        flow.get(
            7,
            challenge_path(credentials.mfa_channel),
            &[("state", challenge_state.as_str()), ("ui_locales", UI_LOCALE)],
        )
        .await?;
        info!(channel = %credentials.mfa_channel, "Verification code requested");

        let cookies = export_cookies(&jar, &self.config.endpoints.auth_base)?;
        Ok(ChallengeState::new(
            [authorize_state, login_state, challenge_state],
            pkce.verifier().to_string(),
            credentials.mfa_channel,
            credentials.client_id.clone(),
            cookies,
        ))
    }

    // ========================================================================
    // Phase 2
    // ========================================================================

    /// Submits the 2FA code and exchanges the authorization code for tokens.
    ///
    /// On success the tokens are stored, persisted, and the reauth flag is
    /// cleared.
    ///
    /// # Errors
    ///
    /// Returns [`EngieError::InvalidCode`] for a malformed or rejected code
    /// (the same `challenge` may be resubmitted), [`EngieError::Auth`] for
    /// later failures, and [`EngieError::Persist`] if the tokens could not
    /// be written to storage.
    #[instrument(skip(self, challenge, code), fields(channel = %challenge.channel))]
    pub async fn submit_2fa(
        &self,
        challenge: &ChallengeState,
        code: &str,
    ) -> Result<SessionTokens, EngieError> {
        let code = code.trim();
        if !is_valid_code(code) {
            return Err(EngieError::InvalidCode(format!(
                "the code must be exactly {CODE_LENGTH} digits"
            )));
        }

        let jar = challenge.cookie_jar(&self.config.endpoints.auth_base)?;
        let flow = self.login_client(jar)?;
        let challenge_page = challenge_path(challenge.channel);

        let page = flow
            .post(
                8,
                challenge_page,
                &[
                    ("state", challenge.challenge_state.as_str()),
                    ("ui_locales", UI_LOCALE),
                ],
                &[("state", challenge.challenge_state.as_str()), ("code", code)],
                false,
            )
            .await?;
        if page.capture(&STATE_RE).is_none() {
            warn!(status = %page.status, "Verification code rejected");
            return Err(EngieError::InvalidCode(
                "the code was not accepted, it may be wrong or expired".into(),
            ));
        }

        let resume_query = [("state", challenge.login_state.as_str())];

        let page = flow.get(9, "/authorize/resume", &resume_query).await?;
        let passkey_state = page.require(&STATE_RE, "passkey enrollment state")?;

        let passkey_query = [("state", passkey_state.as_str()), ("ui_locales", UI_LOCALE)];
        flow.get(10, "/u/passkey-enrollment", &passkey_query).await?;
        flow.post(
            11,
            "/u/passkey-enrollment",
            &passkey_query,
            &[
                ("state", passkey_state.as_str()),
                ("action", "abort-passkey-enrollment"),
            ],
            true,
        )
        .await?;

        let page = flow.get(12, "/authorize/resume", &resume_query).await?;
        let auth_code = page.require(&CODE_RE, "authorization code")?;

        let tokens = self
            .exchange_code(&flow.http, &auth_code, challenge)
            .await?;

        let mut state = self.store.lock().await;
        self.store.commit(&mut state, tokens.clone()).await?;
        info!(expires_at = %tokens.expires_at, "Session established");
        Ok(tokens)
    }

    async fn exchange_code(
        &self,
        http: &HttpClient,
        auth_code: &str,
        challenge: &ChallengeState,
    ) -> Result<SessionTokens, EngieError> {
        let url = self.config.endpoints.auth_url("/oauth/token", &[])?;
        let response = http
            .post_form(
                &url,
                token_headers(),
                &[
                    ("code", auth_code),
                    ("grant_type", "authorization_code"),
                    ("redirect_uri", REDIRECT_URI),
                    ("code_verifier", challenge.code_verifier()),
                    ("client_id", challenge.client_id.as_str()),
                ],
            )
            .await
            .map_err(|e| EngieError::Auth(format!("step 13: {e}")))?;

        let status = response.status();
        debug!(step = 13, status = %status, "Login step completed");
        if !status.is_success() {
            return Err(EngieError::Auth(format!(
                "token exchange failed (HTTP {status})"
            )));
        }

        let body: TokenResponse = response
            .json()
            .await
            .map_err(|e| EngieError::Auth(format!("invalid token response: {e}")))?;
        let refresh_token = body
            .refresh_token
            .filter(|t| !t.is_empty())
            .ok_or_else(|| EngieError::Auth("token response carried no refresh token".into()))?;

        Ok(SessionTokens::issued(
            body.access_token,
            refresh_token,
            body.expires_in,
            Utc::now(),
        ))
    }

    // ========================================================================
    // Refresh
    // ========================================================================

    /// Exchanges the current refresh token for a new token pair.
    ///
    /// # Errors
    ///
    /// Returns [`EngieError::ReauthRequired`] when the refresh token is
    /// missing or rejected, [`EngieError::RateLimited`] on HTTP 429, and
    /// [`EngieError::Upstream`] for transport or server failures.
    #[instrument(skip(self))]
    pub async fn refresh(&self) -> Result<SessionTokens, EngieError> {
        let mut state = self.store.lock().await;
        self.refresh_locked(&mut state).await
    }

    async fn refresh_locked(&self, state: &mut TokenState) -> Result<SessionTokens, EngieError> {
        if state.needs_reauth {
            return Err(EngieError::ReauthRequired(
                "session is waiting for a new login".into(),
            ));
        }
        let Some(current) = state.tokens.as_ref().map(|t| t.refresh_token.clone()) else {
            self.store.mark_reauth(state);
            return Err(EngieError::ReauthRequired(
                "no refresh token available".into(),
            ));
        };

        match self.exchange_refresh_token(&current).await {
            Ok(tokens) => {
                // The old refresh token is spent upstream, so the session
                // continues in memory and the next refresh-loop tick retries
                // the write.
                if let Err(e) = self.store.commit(state, tokens.clone()).await {
                    warn!(error = %e, "Rotated tokens are held in memory only");
                }
                info!(expires_at = %tokens.expires_at, "Access token refreshed");
                Ok(tokens)
            }
            Err(e) if e.is_reauth_required() => {
                self.store.mark_reauth(state);
                Err(e)
            }
            Err(e) => {
                warn!(error = %e, "Token refresh failed");
                Err(e)
            }
        }
    }

    async fn exchange_refresh_token(&self, refresh_token: &str) -> Result<SessionTokens, EngieError> {
        let url = self.config.endpoints.auth_url("/oauth/token", &[])?;
        let response = self
            .http
            .post_form(
                &url,
                token_headers(),
                &[
                    ("refresh_token", refresh_token),
                    ("audience", OAUTH_AUDIENCE),
                    ("grant_type", "refresh_token"),
                    ("scope", OAUTH_SCOPES),
                    ("redirect_uri", REDIRECT_URI),
                    ("client_id", self.config.client_id.as_str()),
                ],
            )
            .await
            .map_err(upstream)?;

        let status = response.status();
        debug!(status = %status, "Token endpoint responded");

        if matches!(
            status,
            StatusCode::BAD_REQUEST | StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN
        ) {
            return Err(EngieError::ReauthRequired(format!(
                "refresh token rejected (HTTP {status})"
            )));
        }
        if response.is_rate_limited() {
            return Err(EngieError::RateLimited {
                retry_after: response.retry_after_secs(),
            });
        }
        if !status.is_success() {
            return Err(EngieError::Upstream(format!(
                "token endpoint returned HTTP {status}"
            )));
        }

        let body: TokenResponse = response
            .json()
            .await
            .map_err(|e| EngieError::Upstream(format!("invalid token response: {e}")))?;

        let rotated = match body.refresh_token.filter(|t| !t.is_empty()) {
            Some(token) => token,
            None => {
                warn!("Token endpoint did not rotate the refresh token");
                refresh_token.to_string()
            }
        };

        Ok(SessionTokens::issued(
            body.access_token,
            rotated,
            body.expires_in,
            Utc::now(),
        ))
    }
}

#[async_trait]
impl TokenProvider for AuthSession {
    async fn access_token(&self) -> Result<String, EngieError> {
        let mut state = self.store.lock().await;
        if !state.needs_reauth {
            if let Some(tokens) = state.tokens.as_ref() {
                if !tokens.is_expired_at(Utc::now()) {
                    return Ok(tokens.access_token.clone());
                }
            }
        }
        let tokens = self.refresh_locked(&mut state).await?;
        Ok(tokens.access_token)
    }

    async fn renew_after_rejection(&self, rejected: &str) -> Result<String, EngieError> {
        let mut state = self.store.lock().await;
        if let Some(tokens) = state.tokens.as_ref() {
            if tokens.access_token != rejected
                && !state.needs_reauth
                && !tokens.is_expired_at(Utc::now())
            {
                debug!("Token already rotated by another task");
                return Ok(tokens.access_token.clone());
            }
        }
        let tokens = self.refresh_locked(&mut state).await?;
        Ok(tokens.access_token)
    }

    async fn refresh_if_expiring(&self, margin: Duration) -> Result<bool, EngieError> {
        let margin = chrono::Duration::from_std(margin).unwrap_or(chrono::Duration::MAX);
        let mut state = self.store.lock().await;
        if let Err(e) = self.store.retry_unsaved(&state).await {
            warn!(error = %e, "Tokens still not persisted");
        }
        let due = state
            .tokens
            .as_ref()
            .is_none_or(|t| t.expires_within(margin, Utc::now()));
        if !due {
            return Ok(false);
        }
        self.refresh_locked(&mut state).await?;
        Ok(true)
    }

    fn needs_reauth(&self) -> bool {
        self.store.needs_reauth()
    }

    fn subscribe_health(&self) -> watch::Receiver<bool> {
        self.store.subscribe_health()
    }
}

// ============================================================================
// Login Flow Helpers
// ============================================================================

struct LoginFlow<'a> {
    http: HttpClient,
    endpoints: &'a EngieEndpoints,
}

struct Page {
    status: StatusCode,
    body: String,
    location: Option<String>,
}

impl Page {
    fn capture(&self, re: &Regex) -> Option<String> {
        capture(re, &self.body).or_else(|| self.location.as_deref().and_then(|l| capture(re, l)))
    }

    fn require(&self, re: &Regex, what: &str) -> Result<String, EngieError> {
        self.capture(re)
            .ok_or_else(|| EngieError::Auth(format!("could not extract {what}")))
    }
}

impl LoginFlow<'_> {
    async fn get(&self, step: u8, path: &str, query: &[(&str, &str)]) -> Result<Page, EngieError> {
        let url = self.endpoints.auth_url(path, query)?;
        let response = self
            .http
            .get(&url, browser_headers())
            .await
            .map_err(|e| EngieError::Auth(format!("step {step}: {e}")))?;
        Self::read(step, response, true).await
    }

    async fn post(
        &self,
        step: u8,
        path: &str,
        query: &[(&str, &str)],
        form: &[(&str, &str)],
        check_status: bool,
    ) -> Result<Page, EngieError> {
        let url = self.endpoints.auth_url(path, query)?;
        let response = self
            .http
            .post_form(&url, browser_headers(), form)
            .await
            .map_err(|e| EngieError::Auth(format!("step {step}: {e}")))?;
        Self::read(step, response, check_status).await
    }

    async fn read(
        step: u8,
        response: reqwest::Response,
        check_status: bool,
    ) -> Result<Page, EngieError> {
        let status = response.status();
        let location = response.location();
        debug!(step, status = %status, "Login step completed");

        if check_status {
            if matches!(status, StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN) {
                return Err(EngieError::Auth(format!(
                    "step {step}: authentication failed (HTTP {status})"
                )));
            }
            if status.is_client_error() || status.is_server_error() {
                return Err(EngieError::Auth(format!("step {step}: HTTP {status}")));
            }
        }

        let body = response
            .text()
            .await
            .map_err(|e| EngieError::Auth(format!("step {step}: {e}")))?;
        Ok(Page {
            status,
            body,
            location,
        })
    }
}

fn capture(re: &Regex, haystack: &str) -> Option<String> {
    re.captures(haystack)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
}

fn challenge_path(channel: MfaChannel) -> &'static str {
    match channel {
        MfaChannel::Sms => "/u/mfa-sms-challenge",
        MfaChannel::Email => "/u/mfa-email-challenge",
    }
}

fn is_valid_code(code: &str) -> bool {
    code.len() == CODE_LENGTH && code.bytes().all(|b| b.is_ascii_digit())
}

fn upstream(err: HttpError) -> EngieError {
    EngieError::Upstream(err.to_string())
}

// ============================================================================
// Tests
// ============================================================================
