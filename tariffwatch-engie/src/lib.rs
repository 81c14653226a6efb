// Lint configuration for this crate
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::missing_errors_doc)]

//! # Tariffwatch ENGIE
//!
//! ENGIE Belgium integration: authentication, price fetching, and contract
//! classification.
//!
//! ## Authentication
//!
//! [`AuthSession`] replays the mobile app's login (OAuth2 authorization
//! code with PKCE plus SMS or email 2FA) in two phases:
//!
//! 1. [`AuthSession::begin_login`] submits the credentials and returns a
//!    [`ChallengeState`] once the code has been sent.
//! 2. [`AuthSession::submit_2fa`] submits the code and stores the tokens.
//!
//! Refresh tokens rotate on every exchange. The [`TokenStore`] serializes
//! exchanges and writes each rotated token through a
//! [`tariffwatch_fetch::TokenPersistence`].
//!
//! ## Prices
//!
//! [`EngieApiClient`] implements [`PriceSource`]; [`classify`] turns the raw
//! response into [`tariffwatch_core::Contract`]s.

pub mod api;
pub mod auth;
pub mod challenge;
pub mod constants;
pub mod error;
pub mod parser;
pub mod pkce;
pub mod token_store;

pub use api::{EngieApiClient, MAX_GRANULARITY, PriceSource};
pub use auth::{AuthSession, SessionConfig, TokenProvider};
pub use challenge::ChallengeState;
pub use constants::{API_BASE_URL, AUTH_BASE_URL, DEFAULT_CLIENT_ID, EngieEndpoints};
pub use error::EngieError;
pub use parser::{
    Classification, RawPriceConfiguration, RawPriceConfigurations, RawPriceItem, RawPricePeriod,
    RawPriceResponse, classify, classify_at, parse_price_response,
};
pub use pkce::PkceChallenge;
pub use token_store::{TokenState, TokenStore};
