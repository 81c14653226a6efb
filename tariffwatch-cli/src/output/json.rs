//! JSON output formatting.

use std::collections::BTreeMap;

use anyhow::Result;
use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use tariffwatch_core::{
    Direction, EnergyType, Reading, ReadingKey, SessionTokens, VatInclusion,
};
use tariffwatch_store::{ConfigEntry, PriceStatus, TokenStorage, UpdateState};

// ============================================================================
// Output Types
// ============================================================================

/// One price reading.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReadingOutput {
    pub key: String,
    pub ean: String,
    pub energy_type: EnergyType,
    pub direction: Direction,
    pub vat_included: bool,
    pub value: f64,
    pub unit: String,
    pub from: NaiveDate,
    pub to: NaiveDate,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vat_tariff: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time_of_use_slot_code: Option<String>,
}

impl ReadingOutput {
    fn new(key: &ReadingKey, reading: &Reading) -> Self {
        Self {
            key: key.slug(),
            ean: reading.attributes.ean.clone(),
            energy_type: reading.energy_type,
            direction: key.direction,
            vat_included: key.vat == VatInclusion::Included,
            value: reading.value,
            unit: reading.unit.clone(),
            from: reading.attributes.from,
            to: reading.attributes.to,
            vat_tariff: reading.attributes.vat_tariff,
            time_of_use_slot_code: reading.attributes.time_of_use_slot_code.clone(),
        }
    }
}

/// Readings plus the state of the cycle that produced them.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PricesOutput {
    pub state: UpdateState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fetched_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub withheld: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    pub readings: Vec<ReadingOutput>,
}

impl PricesOutput {
    pub fn new(readings: &BTreeMap<ReadingKey, Reading>, status: &PriceStatus) -> Self {
        Self {
            state: status.state,
            fetched_at: status.fetched_at,
            withheld: status.withheld,
            last_error: status.last_error.clone(),
            readings: readings
                .iter()
                .map(|(key, reading)| ReadingOutput::new(key, reading))
                .collect(),
        }
    }
}

/// Account and session summary. Never carries token values.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusOutput {
    pub email: String,
    pub customer_number: String,
    pub mfa_channel: String,
    pub token_storage: TokenStorage,
    pub auth_healthy: bool,
    pub has_refresh_token: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token_expires_at: Option<DateTime<Utc>>,
    pub update_interval_hours: u8,
    pub pending_login: bool,
}

impl StatusOutput {
    pub fn new(
        entry: &ConfigEntry,
        stored: Option<&SessionTokens>,
        auth_healthy: bool,
        pending_login: bool,
    ) -> Self {
        Self {
            email: entry.email.clone(),
            customer_number: entry.customer_number.clone(),
            mfa_channel: entry.mfa_channel.key().to_string(),
            token_storage: entry.token_storage,
            auth_healthy,
            has_refresh_token: stored.is_some(),
            token_expires_at: stored
                .filter(|t| !t.access_token.is_empty())
                .map(|t| t.expires_at),
            update_interval_hours: entry.options.update_interval_hours.hours(),
            pending_login,
        }
    }
}

// ============================================================================
// JSON Formatter
// ============================================================================

/// JSON formatter.
pub struct JsonFormatter {
    pretty: bool,
}

impl JsonFormatter {
    /// Creates a new JSON formatter.
    pub fn new(pretty: bool) -> Self {
        Self { pretty }
    }

    /// Formats any serializable value.
    pub fn format<T: Serialize>(&self, data: &T) -> Result<String> {
        let json = if self.pretty {
            serde_json::to_string_pretty(data)?
        } else {
            serde_json::to_string(data)?
        };
        Ok(json)
    }
}
