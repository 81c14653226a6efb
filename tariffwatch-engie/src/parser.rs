//! Price response types and the contract classifier.
//!
//! # Response Format
//!
//! ```json
//! {
//!   "items": [{
//!     "ean": "541448820012345678_ID1",
//!     "prices": [{
//!       "from": "2025-01-01",
//!       "to": "2025-02-01",
//!       "vatTariff": 0.06,
//!       "proportionalPriceConfigurations": {
//!         "offtake": [{ "priceValue": 0.30, "priceValueExclVAT": 0.28, "timeOfUseSlotCode": "TOTAL_HOURS" }],
//!         "injection": [{ "priceValue": 0.05, "priceValueExclVAT": 0.04, "timeOfUseSlotCode": "TOTAL_HOURS" }]
//!       }
//!     }]
//!   }]
//! }
//! ```

use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use tariffwatch_core::{Contract, Direction, EnergyType, PriceEntry, VatInclusion};
use tracing::{debug, warn};

use crate::error::EngieError;

// ============================================================================
// Raw Response Types
// ============================================================================

/// Body of the supplier energy prices endpoint.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawPriceResponse {
    /// One item per supply point.
    #[serde(default)]
    pub items: Vec<RawPriceItem>,
}

/// Prices of one supply point.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawPriceItem {
    /// EAN, possibly with an `_ID<n>` suffix.
    pub ean: String,
    /// Price periods, oldest first.
    #[serde(default)]
    pub prices: Vec<RawPricePeriod>,
}

/// One price period.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawPricePeriod {
    /// First day of the period.
    #[serde(deserialize_with = "date_prefix")]
    pub from: NaiveDate,
    /// Day after the last day of the period.
    #[serde(deserialize_with = "date_prefix")]
    pub to: NaiveDate,
    /// VAT tariff (number or numeric string).
    #[serde(default, deserialize_with = "lenient_f64")]
    pub vat_tariff: Option<f64>,
    /// Per-direction price configurations.
    #[serde(default)]
    pub proportional_price_configurations: RawPriceConfigurations,
}

/// Price configurations by direction.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawPriceConfigurations {
    /// Offtake prices.
    #[serde(default)]
    pub offtake: Vec<RawPriceConfiguration>,
    /// Injection prices (electricity with production only).
    #[serde(default)]
    pub injection: Vec<RawPriceConfiguration>,
}

impl RawPriceConfigurations {
    fn direction(&self, direction: Direction) -> &[RawPriceConfiguration] {
        match direction {
            Direction::Offtake => &self.offtake,
            Direction::Injection => &self.injection,
        }
    }
}

/// One price configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawPriceConfiguration {
    /// Price including VAT.
    #[serde(default, deserialize_with = "lenient_f64")]
    pub price_value: Option<f64>,
    /// Price excluding VAT.
    #[serde(default, rename = "priceValueExclVAT", deserialize_with = "lenient_f64")]
    pub price_value_excl_vat: Option<f64>,
    /// Time-of-use slot code.
    #[serde(default)]
    pub time_of_use_slot_code: Option<String>,
}

fn date_prefix<'de, D: Deserializer<'de>>(deserializer: D) -> Result<NaiveDate, D::Error> {
    let raw = String::deserialize(deserializer)?;
    let day = raw.get(..10).unwrap_or(&raw);
    NaiveDate::parse_from_str(day, "%Y-%m-%d").map_err(serde::de::Error::custom)
}

fn lenient_f64<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<f64>, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum NumberOrString {
        Number(f64),
        String(String),
    }

    match Option::<NumberOrString>::deserialize(deserializer)? {
        None => Ok(None),
        Some(NumberOrString::Number(n)) => Ok(Some(n)),
        Some(NumberOrString::String(s)) => s
            .trim()
            .parse()
            .map(Some)
            .map_err(serde::de::Error::custom),
    }
}

/// Parses a price response body.
///
/// # Errors
///
/// Returns [`EngieError::Upstream`] if the body does not have the expected
/// shape.
pub fn parse_price_response(body: &str) -> Result<RawPriceResponse, EngieError> {
    serde_json::from_str(body).map_err(|e| {
        warn!(error = %e, "Failed to parse price response");
        EngieError::Upstream(format!("malformed price response: {e}"))
    })
}

// ============================================================================
// Classification
// ============================================================================

/// Output of one classifier run.
#[derive(Debug, Default)]
pub struct Classification {
    /// Contracts classified successfully.
    pub contracts: Vec<Contract>,
    /// Contracts that could not be classified, with the reason.
    pub skipped: Vec<EngieError>,
}

/// Classifies a price response against today's date (UTC).
pub fn classify(raw: &RawPriceResponse) -> Classification {
    classify_at(raw, Utc::now().date_naive())
}

/// Classifies a price response against `today`.
///
/// One contract per item. An item with an unknown EAN prefix is skipped and
/// reported without affecting the others.
pub fn classify_at(raw: &RawPriceResponse, today: NaiveDate) -> Classification {
    let mut result = Classification::default();

    for item in &raw.items {
        match classify_item(item, today) {
            Ok(contract) => {
                debug!(
                    ean = %contract.ean,
                    energy = %contract.energy_type,
                    entries = contract.prices.len(),
                    "Classified contract"
                );
                result.contracts.push(contract);
            }
            Err(e) => {
                warn!(ean = %item.ean, error = %e, "Skipping contract");
                result.skipped.push(e);
            }
        }
    }

    result
}

fn classify_item(item: &RawPriceItem, today: NaiveDate) -> Result<Contract, EngieError> {
    let energy_type = EnergyType::from_ean(&item.ean)?;
    let mut prices = Vec::new();

    if let Some(period) = current_period(&item.prices, today) {
        for &direction in Direction::all() {
            if direction == Direction::Injection && !energy_type.supports_injection() {
                if !period.proportional_price_configurations.injection.is_empty() {
                    debug!(ean = %item.ean, "Ignoring injection prices on a gas contract");
                }
                continue;
            }
            let Some(config) = period
                .proportional_price_configurations
                .direction(direction)
                .first()
            else {
                continue;
            };
            for &vat in VatInclusion::all() {
                let value = match vat {
                    VatInclusion::Included => config.price_value,
                    VatInclusion::Excluded => config.price_value_excl_vat,
                };
                if let Some(price) = value {
                    prices.push(PriceEntry {
                        direction,
                        vat,
                        price,
                        vat_tariff: period.vat_tariff,
                        from: period.from,
                        to: period.to,
                        time_of_use_slot_code: config.time_of_use_slot_code.clone(),
                    });
                }
            }
        }
    }

    Ok(Contract {
        ean: item.ean.clone(),
        energy_type,
        prices,
    })
}

/// The period covering `today`, else the last one.
fn current_period(periods: &[RawPricePeriod], today: NaiveDate) -> Option<&RawPricePeriod> {
    periods
        .iter()
        .find(|p| p.from <= today && today < p.to)
        .or_else(|| periods.last())
}

// ============================================================================
// Tests
// ============================================================================
