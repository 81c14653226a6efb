//! HTTP client for the identity service and the billing API.
//!
//! Wraps `reqwest` with:
//! - a host allowlist checked before anything is sent
//! - an optional shared cookie jar for the multi-step login
//! - a switchable redirect policy (the login reads `Location` itself)
//! - request tracing with query strings stripped, since they carry login state

use std::sync::Arc;
use std::time::Duration;

use reqwest::{Client, RequestBuilder, Response, cookie::Jar, header, header::HeaderMap, redirect};
use tracing::{debug, instrument};
use url::Url;

use crate::error::HttpError;

/// Default request timeout.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Fallback user agent; callers normally set the app's own.
const USER_AGENT: &str = concat!("Tariffwatch/", env!("CARGO_PKG_VERSION"));

// ============================================================================
// Builder
// ============================================================================

/// Builder for [`HttpClient`].
#[derive(Debug, Clone)]
pub struct HttpClientBuilder {
    timeout: Duration,
    user_agent: String,
    jar: Option<Arc<Jar>>,
    follow_redirects: bool,
    hosts: Option<Vec<String>>,
}

impl Default for HttpClientBuilder {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_TIMEOUT,
            user_agent: USER_AGENT.to_string(),
            jar: None,
            follow_redirects: true,
            hosts: None,
        }
    }
}

impl HttpClientBuilder {
    /// Sets the per-request timeout.
    #[must_use]
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Sets the default user agent.
    #[must_use]
    pub fn user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    /// Stores and sends cookies through `jar`.
    #[must_use]
    pub fn cookie_jar(mut self, jar: Arc<Jar>) -> Self {
        self.jar = Some(jar);
        self
    }

    /// Returns 3xx responses to the caller instead of following them.
    #[must_use]
    pub fn no_redirects(mut self) -> Self {
        self.follow_redirects = false;
        self
    }

    /// Restricts requests to these hosts and their subdomains.
    #[must_use]
    pub fn allowed_domains(mut self, hosts: Vec<String>) -> Self {
        self.hosts = Some(hosts);
        self
    }

    /// Builds the client.
    ///
    /// # Errors
    ///
    /// Returns [`HttpError::Build`] if the TLS backend cannot be initialised.
    pub fn build(self) -> Result<HttpClient, HttpError> {
        let mut builder = Client::builder()
            .timeout(self.timeout)
            .user_agent(self.user_agent);
        if let Some(jar) = self.jar {
            builder = builder.cookie_provider(jar);
        }
        if !self.follow_redirects {
            builder = builder.redirect(redirect::Policy::none());
        }

        let inner = builder
            .build()
            .map_err(|e| HttpError::Build(e.to_string()))?;
        Ok(HttpClient {
            inner,
            hosts: self.hosts,
        })
    }
}

// ============================================================================
// HTTP Client
// ============================================================================

/// `reqwest` client with a host allowlist and tracing.
#[derive(Debug, Clone)]
pub struct HttpClient {
    inner: Client,
    hosts: Option<Vec<String>>,
}

impl HttpClient {
    /// Starts building a client.
    pub fn builder() -> HttpClientBuilder {
        HttpClientBuilder::default()
    }

    /// A client with default settings and no host restriction.
    ///
    /// # Errors
    ///
    /// Returns [`HttpError::Build`] if the TLS backend cannot be initialised.
    pub fn new() -> Result<Self, HttpError> {
        Self::builder().build()
    }

    fn check_host(&self, url: &str) -> Result<(), HttpError> {
        let parsed = Url::parse(url).map_err(|e| HttpError::InvalidUrl(e.to_string()))?;
        let Some(hosts) = &self.hosts else {
            return Ok(());
        };
        let host = parsed
            .host_str()
            .ok_or_else(|| HttpError::InvalidUrl(format!("no host in {}", redacted(url))))?;

        if hosts
            .iter()
            .any(|allowed| host == allowed || host.ends_with(&format!(".{allowed}")))
        {
            Ok(())
        } else {
            Err(HttpError::HostNotAllowed(host.to_string()))
        }
    }

    async fn send(request: RequestBuilder) -> Result<Response, HttpError> {
        let response = request.send().await?;
        debug!(status = %response.status(), "Response received");
        Ok(response)
    }

    /// `GET` with extra headers.
    #[instrument(skip(self, headers), fields(url = %redacted(url)))]
    pub async fn get(&self, url: &str, headers: HeaderMap) -> Result<Response, HttpError> {
        self.check_host(url)?;
        Self::send(self.inner.get(url).headers(headers)).await
    }

    /// `GET` with a bearer token.
    #[instrument(skip(self, token, headers), fields(url = %redacted(url)))]
    pub async fn get_with_bearer(
        &self,
        url: &str,
        token: &str,
        headers: HeaderMap,
    ) -> Result<Response, HttpError> {
        self.check_host(url)?;
        Self::send(self.inner.get(url).headers(headers).bearer_auth(token)).await
    }

    /// `POST` with a URL-encoded form body.
    #[instrument(skip(self, headers, form), fields(url = %redacted(url)))]
    pub async fn post_form<T: serde::Serialize + ?Sized>(
        &self,
        url: &str,
        headers: HeaderMap,
        form: &T,
    ) -> Result<Response, HttpError> {
        self.check_host(url)?;
        Self::send(self.inner.post(url).headers(headers).form(form)).await
    }
}

fn redacted(url: &str) -> &str {
    url.split('?').next().unwrap_or(url)
}

// ============================================================================
// Response Extensions
// ============================================================================

/// Header helpers for provider responses.
pub trait ResponseExt {
    /// Whether the status is 429.
    fn is_rate_limited(&self) -> bool;

    /// `Retry-After` in seconds, when given as a number.
    fn retry_after_secs(&self) -> Option<u64>;

    /// The `Location` header, if present and valid UTF-8.
    fn location(&self) -> Option<String>;
}

impl ResponseExt for Response {
    fn is_rate_limited(&self) -> bool {
        self.status() == reqwest::StatusCode::TOO_MANY_REQUESTS
    }

    fn retry_after_secs(&self) -> Option<u64> {
        self.headers()
            .get(header::RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse().ok())
    }

    fn location(&self) -> Option<String> {
        self.headers()
            .get(header::LOCATION)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
    }
}

// ============================================================================
// Tests
// ============================================================================
