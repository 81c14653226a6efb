// Lint configuration for this crate
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]

//! # `Tariffwatch` Core
//!
//! Core types and models for the `Tariffwatch` workspace.
//!
//! This crate provides the foundational abstractions used across all other
//! `Tariffwatch` crates, including:
//!
//! - Domain models (credentials, session tokens, contracts, price entries)
//! - The EAN prefix rule that tells gas and electricity contracts apart
//! - Sensor-facing readings derived from a price snapshot
//! - Error types
//!
//! ## Key Types
//!
//! ### Session Types
//! - [`Credentials`] - Login input supplied once by the configuration flow
//! - [`MfaChannel`] - Where the provider sends the 2FA code
//! - [`SessionTokens`] - Access token, its expiry, and the rotating refresh token
//!
//! ### Contract Types
//! - [`Contract`] - One supply point (EAN) with its classified price entries
//! - [`PriceEntry`] - One (direction, VAT inclusion) price for a time window
//! - [`EnergyType`], [`Direction`], [`VatInclusion`]
//!
//! ### Readings
//! - [`PriceSnapshot`] - Result of one successful fetch cycle
//! - [`ReadingKey`] / [`Reading`] - Flattened values for sensor consumers
//! - [`UpdateInterval`] - Validated polling interval (1-24 hours)

pub mod error;
pub mod models;

// Re-export error types
pub use error::CoreError;

// Re-export all model types
pub use models::{
    // Contract types
    Contract,
    Direction,
    EnergyType,
    PriceEntry,
    VatInclusion,
    ELECTRICITY_EAN_PREFIX,
    GAS_EAN_PREFIX,
    short_ean,
    // Session types
    Credentials,
    MfaChannel,
    SessionTokens,
    is_valid_customer_number,
    // Readings
    PriceSnapshot,
    Reading,
    ReadingAttributes,
    ReadingKey,
    PRICE_UNIT,
    // Options
    UpdateInterval,
};
