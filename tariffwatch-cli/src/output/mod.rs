//! Output formatting for CLI.

mod json;
mod text;

pub use json::{JsonFormatter, PricesOutput, StatusOutput};
pub use text::TextFormatter;
