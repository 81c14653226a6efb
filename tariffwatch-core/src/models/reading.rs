//! Price snapshots and the flat readings derived from them.

use std::collections::BTreeMap;

use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use super::contract::{Contract, Direction, EnergyType, VatInclusion};

/// Unit of every price reading.
pub const PRICE_UNIT: &str = "EUR/kWh";

// ============================================================================
// Reading Key
// ============================================================================

/// Identifies one reading: (short EAN, direction, VAT inclusion).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ReadingKey {
    /// EAN without the `_ID<n>` suffix.
    pub ean: String,
    /// Offtake or injection.
    pub direction: Direction,
    /// VAT inclusion.
    pub vat: VatInclusion,
}

impl ReadingKey {
    /// Stable identifier, e.g. `541448820012345678_offtake_excl_vat`.
    pub fn slug(&self) -> String {
        match self.vat {
            VatInclusion::Included => format!("{}_{}", self.ean, self.direction.key()),
            VatInclusion::Excluded => format!("{}_{}_excl_vat", self.ean, self.direction.key()),
        }
    }
}

impl std::fmt::Display for ReadingKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.slug())
    }
}

// ============================================================================
// Reading
// ============================================================================

/// Attributes attached to a reading.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReadingAttributes {
    /// Full EAN, as reported upstream.
    pub ean: String,
    /// Start of the price window.
    pub from: NaiveDate,
    /// End of the price window (exclusive).
    pub to: NaiveDate,
    /// VAT tariff of the period.
    pub vat_tariff: Option<f64>,
    /// Time-of-use slot code.
    pub time_of_use_slot_code: Option<String>,
}

/// A single price value handed to the sensor layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reading {
    /// Energy type of the contract the price belongs to.
    pub energy_type: EnergyType,
    /// Price value.
    pub value: f64,
    /// Always [`PRICE_UNIT`].
    pub unit: String,
    /// Reading attributes.
    pub attributes: ReadingAttributes,
}

// ============================================================================
// Price Snapshot
// ============================================================================

/// Result of one successful fetch-classify cycle.
///
/// Replaced wholesale on every successful cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceSnapshot {
    /// Classified contracts.
    pub contracts: Vec<Contract>,
    /// When the data was fetched.
    pub fetched_at: DateTime<Utc>,
}

impl PriceSnapshot {
    /// Creates a snapshot stamped with the current time.
    pub fn new(contracts: Vec<Contract>) -> Self {
        Self {
            contracts,
            fetched_at: Utc::now(),
        }
    }

    /// Flattens the contracts into keyed readings.
    pub fn readings(&self) -> BTreeMap<ReadingKey, Reading> {
        let mut out = BTreeMap::new();
        for contract in &self.contracts {
            let short = contract.short_ean();
            for entry in &contract.prices {
                let key = ReadingKey {
                    ean: short.to_string(),
                    direction: entry.direction,
                    vat: entry.vat,
                };
                let reading = Reading {
                    energy_type: contract.energy_type,
                    value: entry.price,
                    unit: PRICE_UNIT.to_string(),
                    attributes: ReadingAttributes {
                        ean: contract.ean.clone(),
                        from: entry.from,
                        to: entry.to,
                        vat_tariff: entry.vat_tariff,
                        time_of_use_slot_code: entry.time_of_use_slot_code.clone(),
                    },
                };
                out.insert(key, reading);
            }
        }
        out
    }

    /// Age of the snapshot at `now`.
    pub fn age(&self, now: DateTime<Utc>) -> Duration {
        now - self.fetched_at
    }

    /// Returns true if the snapshot is older than `max_age` at `now`.
    pub fn is_older_than(&self, max_age: Duration, now: DateTime<Utc>) -> bool {
        self.age(now) > max_age
    }

    /// Looks up a contract by full or short EAN.
    pub fn contract(&self, ean: &str) -> Option<&Contract> {
        self.contracts
            .iter()
            .find(|c| c.ean == ean || c.short_ean() == ean)
    }
}
