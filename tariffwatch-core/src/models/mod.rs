//! Domain models for Tariffwatch.
//!
//! ## Submodules
//!
//! - [`contract`] - Contracts, price entries, and the EAN prefix rule
//! - [`session`] - Credentials, 2FA channel, and session tokens
//! - [`reading`] - Price snapshots and the readings handed to sensors
//! - [`interval`] - Validated update interval

mod contract;
mod interval;
mod reading;
mod session;

// Re-export everything at the models level
pub use contract::{
    Contract, Direction, ELECTRICITY_EAN_PREFIX, EnergyType, GAS_EAN_PREFIX, PriceEntry,
    VatInclusion, short_ean,
};
pub use interval::UpdateInterval;
pub use reading::{PRICE_UNIT, PriceSnapshot, Reading, ReadingAttributes, ReadingKey};
pub use session::{Credentials, MfaChannel, SessionTokens, is_valid_customer_number};
