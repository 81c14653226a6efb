//! Provider constants and endpoint configuration.
//!
//! The client id, redirect URI and user agents are those of the ENGIE
//! Smart mobile app; the identity service only accepts this public client.

use reqwest::header::{ACCEPT, HeaderMap, HeaderName, HeaderValue, USER_AGENT};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::EngieError;

// ============================================================================
// Constants
// ============================================================================

/// Identity service base URL.
pub const AUTH_BASE_URL: &str = "https://account.engie.be";

/// Billing API base URL.
pub const API_BASE_URL: &str = "https://www.engie.be/api/engie/be/ms/billing/customer/v1";

/// Public OAuth client id of the mobile app.
pub const DEFAULT_CLIENT_ID: &str = "R0PQyUdjO5B2tBaRnltgitVnnUmjGyld";

/// Redirect URI registered for the mobile app.
pub const REDIRECT_URI: &str = "be.engie.smart://login-callback/nl";

/// Requested OAuth scopes.
pub const OAUTH_SCOPES: &str = "openid profile roles offline_access";

/// OAuth audience.
pub const OAUTH_AUDIENCE: &str = "customer";

/// UI locale sent with every login page.
pub const UI_LOCALE: &str = "nl";

/// App scheme parameter of the authorize request.
pub const APP_SCHEME: &str = "be-engie-smart";

/// Cancel redirect parameter of the authorize request.
pub const CANCEL_REDIRECT: &str = "be-engie-smart://cancel-registration-redirect";

/// Browser user agent used on login pages and the price API.
pub const USER_AGENT_BROWSER: &str = "Mozilla/5.0 (Linux; Android 10; K) AppleWebKit/537.36 \
     (KHTML, like Gecko) Chrome/142.0.0.0 Mobile Safari/537.36";

/// Native user agent used on the token endpoint.
pub const USER_AGENT_NATIVE: &str =
    "Dalvik/2.1.0 (Linux; U; Android 16; Pixel 6 Build/BP4A.251205.006)";

const BROWSER_ACCEPT: &str = "text/html,application/xhtml+xml,application/xml;q=0.9,\
     image/avif,image/webp,image/apng,*/*;q=0.8,application/signed-exchange;v=b3;q=0.7";

const SEC_CH_UA: &str = r#""Chromium";v="142", "Google Chrome";v="142", "Not_A Brand";v="99""#;

/// Accept header of the price API.
pub const API_ACCEPT: &str = "application/json, application/problem+json";

// ============================================================================
// Headers
// ============================================================================

/// Headers mimicking the app's embedded browser on login pages.
pub fn browser_headers() -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(ACCEPT, HeaderValue::from_static(BROWSER_ACCEPT));
    headers.insert(USER_AGENT, HeaderValue::from_static(USER_AGENT_BROWSER));
    headers.insert(
        HeaderName::from_static("sec-ch-ua"),
        HeaderValue::from_static(SEC_CH_UA),
    );
    headers.insert(
        HeaderName::from_static("sec-ch-ua-mobile"),
        HeaderValue::from_static("?1"),
    );
    headers.insert(
        HeaderName::from_static("sec-ch-ua-platform"),
        HeaderValue::from_static("\"Android\""),
    );
    headers
}

/// Headers for the token endpoint.
pub fn token_headers() -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
    headers.insert(USER_AGENT, HeaderValue::from_static(USER_AGENT_NATIVE));
    headers
}

/// Headers for the price API (the bearer token is added per request).
pub fn api_headers() -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(ACCEPT, HeaderValue::from_static(API_ACCEPT));
    headers.insert(USER_AGENT, HeaderValue::from_static(USER_AGENT_BROWSER));
    headers
}

// ============================================================================
// Endpoints
// ============================================================================

/// Base URLs of the identity service and the billing API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngieEndpoints {
    /// Identity service base URL.
    pub auth_base: String,
    /// Billing API base URL.
    pub api_base: String,
}

impl Default for EngieEndpoints {
    fn default() -> Self {
        Self {
            auth_base: AUTH_BASE_URL.to_string(),
            api_base: API_BASE_URL.to_string(),
        }
    }
}

impl EngieEndpoints {
    /// Points both services at one base URL (used against mock servers).
    pub fn single(base: impl Into<String>) -> Self {
        let base = base.into();
        Self {
            auth_base: base.clone(),
            api_base: base,
        }
    }

    /// Builds an identity service URL with query parameters.
    pub(crate) fn auth_url(&self, path: &str, query: &[(&str, &str)]) -> Result<String, EngieError> {
        join(&self.auth_base, path, query)
    }

    /// Builds a billing API URL with query parameters.
    pub(crate) fn api_url(&self, path: &str, query: &[(&str, &str)]) -> Result<String, EngieError> {
        join(&self.api_base, path, query)
    }

    /// Host names the HTTP client may contact.
    pub fn allowed_domains(&self) -> Vec<String> {
        let mut hosts: Vec<String> = [&self.auth_base, &self.api_base]
            .iter()
            .filter_map(|base| Url::parse(base).ok())
            .filter_map(|url| url.host_str().map(str::to_string))
            .collect();
        hosts.dedup();
        hosts
    }
}

fn join(base: &str, path: &str, query: &[(&str, &str)]) -> Result<String, EngieError> {
    let raw = format!("{}{}", base.trim_end_matches('/'), path);
    let url = if query.is_empty() {
        Url::parse(&raw)
    } else {
        Url::parse_with_params(&raw, query)
    }
    .map_err(|e| EngieError::Config(format!("invalid URL {raw}: {e}")))?;
    Ok(url.into())
}
