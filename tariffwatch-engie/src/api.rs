//! Price API client.
//!
//! # API Endpoint
//!
//! ```text
//! GET {api_base}/business-agreements/{customer_number}/supplier-energy-prices?maxGranularity=MONTHLY
//! Authorization: Bearer <access_token>
//! ```
//!
//! The response format is documented in [`crate::parser`].

use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use tariffwatch_core::is_valid_customer_number;
use tariffwatch_fetch::{HttpClient, ResponseExt};
use tracing::{debug, instrument, warn};

use crate::constants::{EngieEndpoints, USER_AGENT_BROWSER, api_headers};
use crate::error::EngieError;
use crate::parser::{RawPriceResponse, parse_price_response};

/// Granularity requested from the price endpoint.
pub const MAX_GRANULARITY: &str = "MONTHLY";

// ============================================================================
// Price Source
// ============================================================================

/// Fetches raw price data for a customer.
#[async_trait]
pub trait PriceSource: Send + Sync {
    /// Fetches the price response using `access_token`.
    ///
    /// # Errors
    ///
    /// [`EngieError::Unauthorized`] when the token is rejected,
    /// [`EngieError::RateLimited`] on HTTP 429, and
    /// [`EngieError::Upstream`] for anything else that went wrong.
    async fn fetch_prices(
        &self,
        access_token: &str,
        customer_number: &str,
    ) -> Result<RawPriceResponse, EngieError>;
}

// ============================================================================
// API Client
// ============================================================================

/// HTTP implementation of [`PriceSource`].
#[derive(Debug)]
pub struct EngieApiClient {
    http: HttpClient,
    endpoints: EngieEndpoints,
}

impl EngieApiClient {
    /// Creates a client for `endpoints`.
    ///
    /// # Errors
    ///
    /// Returns [`EngieError::Config`] if the HTTP client cannot be built.
    pub fn new(endpoints: EngieEndpoints, timeout: Duration) -> Result<Self, EngieError> {
        let http = HttpClient::builder()
            .timeout(timeout)
            .user_agent(USER_AGENT_BROWSER)
            .allowed_domains(endpoints.allowed_domains())
            .build()
            .map_err(|e| EngieError::Config(e.to_string()))?;
        Ok(Self { http, endpoints })
    }

    fn prices_url(&self, customer_number: &str) -> Result<String, EngieError> {
        if !is_valid_customer_number(customer_number) {
            return Err(EngieError::Config(format!(
                "invalid customer number {customer_number:?}"
            )));
        }
        self.endpoints.api_url(
            &format!("/business-agreements/{customer_number}/supplier-energy-prices"),
            &[("maxGranularity", MAX_GRANULARITY)],
        )
    }
}

#[async_trait]
impl PriceSource for EngieApiClient {
    #[instrument(skip(self, access_token))]
    async fn fetch_prices(
        &self,
        access_token: &str,
        customer_number: &str,
    ) -> Result<RawPriceResponse, EngieError> {
        let url = self.prices_url(customer_number)?;
        let response = self
            .http
            .get_with_bearer(&url, access_token, api_headers())
            .await
            .map_err(|e| EngieError::Upstream(e.to_string()))?;

        let status = response.status();
        if matches!(status, StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN) {
            warn!(status = %status, "Price API rejected the access token");
            return Err(EngieError::Unauthorized {
                status: status.as_u16(),
            });
        }
        if response.is_rate_limited() {
            return Err(EngieError::RateLimited {
                retry_after: response.retry_after_secs(),
            });
        }
        if !status.is_success() {
            return Err(EngieError::Upstream(format!(
                "price API returned HTTP {status}"
            )));
        }

        let body = response
            .text()
            .await
            .map_err(|e| EngieError::Upstream(format!("failed to read price response: {e}")))?;
        let raw = parse_price_response(&body)?;
        debug!(items = raw.items.len(), "Price response received");
        Ok(raw)
    }
}
