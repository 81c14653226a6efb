//! Text output formatting with colors.

use chrono::{DateTime, Local, Utc};
use tariffwatch_store::TokenStorage;

use super::json::{PricesOutput, ReadingOutput, StatusOutput};

// ============================================================================
// ANSI Colors
// ============================================================================

const RESET: &str = "\x1b[0m";
const BOLD: &str = "\x1b[1m";
const DIM: &str = "\x1b[2m";
const GREEN: &str = "\x1b[32m";
const YELLOW: &str = "\x1b[33m";
const RED: &str = "\x1b[31m";
const CYAN: &str = "\x1b[36m";

/// Text formatter with optional colors.
pub struct TextFormatter {
    use_colors: bool,
}

impl TextFormatter {
    /// Creates a new text formatter.
    pub fn new(use_colors: bool) -> Self {
        Self { use_colors }
    }

    /// Formats readings grouped by contract.
    pub fn format_prices(&self, prices: &PricesOutput) -> String {
        let mut lines = Vec::new();

        if prices.readings.is_empty() {
            lines.push(self.dim("No prices available"));
        }

        let mut current_ean: Option<&str> = None;
        for reading in &prices.readings {
            if current_ean != Some(reading.ean.as_str()) {
                if current_ean.is_some() {
                    lines.push(String::new());
                }
                lines.push(format!(
                    "{} {}",
                    self.bold(&reading.energy_type.to_string()),
                    self.dim(&reading.ean)
                ));
                lines.push(format!("  Valid {} to {}", reading.from, reading.to));
                current_ean = Some(reading.ean.as_str());
            }
            lines.push(self.format_reading(reading));
        }

        lines.push(String::new());
        if prices.withheld {
            lines.push(self.yellow("Last update is too old, prices withheld"));
        }
        if let Some(fetched_at) = prices.fetched_at {
            lines.push(self.dim(&format!("Updated {}", format_time(fetched_at))));
        }
        if let Some(error) = &prices.last_error {
            lines.push(self.red(&format!("Last update failed: {error}")));
        }

        lines.join("\n")
    }

    /// Formats one reading line.
    pub fn format_reading(&self, reading: &ReadingOutput) -> String {
        let mut label = capitalize(reading.direction.key());
        if !reading.vat_included {
            label.push_str(" excl. VAT");
        }
        format!(
            "  {:<20} {} {}",
            label,
            self.cyan(&format!("{:.4}", reading.value)),
            reading.unit
        )
    }

    /// Formats the account and session summary.
    pub fn format_status(&self, status: &StatusOutput) -> String {
        let mut lines = Vec::new();

        lines.push(self.bold("Tariffwatch Status"));
        lines.push("─".repeat(40));
        lines.push(format!("Account:         {}", status.email));
        lines.push(format!("Customer number: {}", status.customer_number));
        lines.push(format!("2FA channel:     {}", status.mfa_channel));

        let storage = match status.token_storage {
            TokenStorage::Entry => "config entry",
            TokenStorage::Keychain => "system keychain",
        };
        lines.push(format!("Token storage:   {storage}"));

        let session = if status.auth_healthy {
            self.green("✓ active")
        } else {
            self.red("✗ login required")
        };
        lines.push(format!("Session:         {session}"));

        if let Some(expires_at) = status.token_expires_at {
            lines.push(format!(
                "Access token:    expires {}",
                self.dim(&format_time(expires_at))
            ));
        }

        let hours = status.update_interval_hours;
        lines.push(format!(
            "Update interval: {} hour{}",
            hours,
            if hours == 1 { "" } else { "s" }
        ));

        if status.pending_login {
            lines.push(self.yellow(
                "Pending login: complete it with `tariffwatch verify <code>`",
            ));
        }

        lines.join("\n")
    }

    // ========================================================================
    // Color Helpers
    // ========================================================================

    fn paint(&self, color: &str, s: &str) -> String {
        if self.use_colors {
            format!("{color}{s}{RESET}")
        } else {
            s.to_string()
        }
    }

    fn bold(&self, s: &str) -> String {
        self.paint(BOLD, s)
    }

    fn dim(&self, s: &str) -> String {
        self.paint(DIM, s)
    }

    fn green(&self, s: &str) -> String {
        self.paint(GREEN, s)
    }

    fn yellow(&self, s: &str) -> String {
        self.paint(YELLOW, s)
    }

    fn red(&self, s: &str) -> String {
        self.paint(RED, s)
    }

    fn cyan(&self, s: &str) -> String {
        self.paint(CYAN, s)
    }
}

fn format_time(at: DateTime<Utc>) -> String {
    at.with_timezone(&Local).format("%Y-%m-%d %H:%M").to_string()
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
