//! Contract and price entry types.
//!
//! A contract is one energy supply point identified by its EAN. The energy
//! type is not reported by the provider; it is derived from the EAN prefix.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::error::CoreError;

// ============================================================================
// EAN Prefixes
// ============================================================================

/// EAN prefix of gas supply points.
pub const GAS_EAN_PREFIX: &str = "5414488600";

/// EAN prefix of electricity supply points.
pub const ELECTRICITY_EAN_PREFIX: &str = "5414488200";

/// Strips the provider's `_ID<n>` suffix from an EAN.
///
/// `"541448820012345678_ID1"` becomes `"541448820012345678"`.
pub fn short_ean(ean: &str) -> &str {
    ean.split('_').next().unwrap_or(ean)
}

// ============================================================================
// Energy Type
// ============================================================================

/// Kind of energy supplied under a contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnergyType {
    /// Natural gas.
    Gas,
    /// Electricity.
    Electricity,
}

impl EnergyType {
    /// Derives the energy type from an EAN.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::UnknownContract`] when the EAN carries neither
    /// the gas nor the electricity prefix.
    pub fn from_ean(ean: &str) -> Result<Self, CoreError> {
        if ean.starts_with(GAS_EAN_PREFIX) {
            Ok(EnergyType::Gas)
        } else if ean.starts_with(ELECTRICITY_EAN_PREFIX) {
            Ok(EnergyType::Electricity)
        } else {
            Err(CoreError::UnknownContract {
                ean: ean.to_string(),
            })
        }
    }

    /// Lowercase key used in reading identifiers.
    pub fn key(&self) -> &'static str {
        match self {
            EnergyType::Gas => "gas",
            EnergyType::Electricity => "electricity",
        }
    }

    /// Whether this energy type can ever carry injection prices.
    pub fn supports_injection(&self) -> bool {
        matches!(self, EnergyType::Electricity)
    }
}

impl std::fmt::Display for EnergyType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EnergyType::Gas => write!(f, "Gas"),
            EnergyType::Electricity => write!(f, "Electricity"),
        }
    }
}

// ============================================================================
// Direction & VAT
// ============================================================================

/// Direction of the energy flow a price applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    /// Energy drawn from the grid.
    Offtake,
    /// Energy fed into the grid.
    Injection,
}

impl Direction {
    /// All directions, offtake first.
    pub fn all() -> &'static [Direction] {
        &[Direction::Offtake, Direction::Injection]
    }

    /// Lowercase key, matching the provider's field names.
    pub fn key(&self) -> &'static str {
        match self {
            Direction::Offtake => "offtake",
            Direction::Injection => "injection",
        }
    }
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.key())
    }
}

/// Whether a price value includes VAT.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VatInclusion {
    /// Price including VAT.
    Included,
    /// Price excluding VAT.
    Excluded,
}

impl VatInclusion {
    /// Both variants, VAT-inclusive first.
    pub fn all() -> &'static [VatInclusion] {
        &[VatInclusion::Included, VatInclusion::Excluded]
    }
}

// ============================================================================
// Price Entry
// ============================================================================

/// One price for a (direction, VAT inclusion) pair over a time window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceEntry {
    /// Offtake or injection.
    pub direction: Direction,
    /// Whether `price` includes VAT.
    pub vat: VatInclusion,
    /// Price in EUR/kWh.
    pub price: f64,
    /// VAT tariff applied to this period, if reported.
    pub vat_tariff: Option<f64>,
    /// First day the price applies (inclusive).
    pub from: NaiveDate,
    /// Day the price stops applying (exclusive).
    pub to: NaiveDate,
    /// Time-of-use slot code (e.g. `TOTAL_HOURS`, `PEAK`).
    pub time_of_use_slot_code: Option<String>,
}

impl PriceEntry {
    /// Returns true if `date` falls inside `[from, to)`.
    pub fn covers(&self, date: NaiveDate) -> bool {
        self.from <= date && date < self.to
    }
}

// ============================================================================
// Contract
// ============================================================================

/// A classified energy contract.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Contract {
    /// EAN as reported by the provider (may carry an `_ID<n>` suffix).
    pub ean: String,
    /// Energy type derived from the EAN prefix.
    pub energy_type: EnergyType,
    /// Price entries, one per (direction, VAT inclusion) present upstream.
    pub prices: Vec<PriceEntry>,
}

impl Contract {
    /// The EAN without the provider's `_ID<n>` suffix.
    pub fn short_ean(&self) -> &str {
        short_ean(&self.ean)
    }

    /// Looks up the entry for a direction and VAT inclusion.
    pub fn entry(&self, direction: Direction, vat: VatInclusion) -> Option<&PriceEntry> {
        self.prices
            .iter()
            .find(|p| p.direction == direction && p.vat == vat)
    }

    /// Returns true if any injection entry is present.
    pub fn has_injection(&self) -> bool {
        self.prices
            .iter()
            .any(|p| p.direction == Direction::Injection)
    }
}

// ============================================================================
// Tests
// ============================================================================
