// Lint configuration for this crate
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::missing_errors_doc)]

//! # Tariffwatch Store
//!
//! Durable configuration and in-memory price state.
//!
//! This crate provides:
//!
//! - **EntryStore**: `entry.json` with identity, tokens and options; the
//!   durable [`tariffwatch_fetch::TokenPersistence`] for rotated tokens
//! - **ChallengeFile**: the pending login (identity plus 2FA challenge) between phases
//! - **PriceStore**: latest price snapshot with watch-channel notifications
//! - **Persistence**: atomic, owner-only JSON file helpers
//!
//! ## Usage
//!
//! ```ignore
//! use tariffwatch_store::{EntryStore, PriceStore, default_entry_path};
//!
//! let entry = EntryStore::open(default_entry_path()).await?;
//! let prices = PriceStore::default();
//!
//! let mut rx = prices.subscribe();
//! while rx.changed().await.is_ok() {
//!     println!("{} readings", prices.readings().await.len());
//! }
//! ```

pub mod challenge_file;
pub mod entry;
pub mod error;
pub mod persistence;
pub mod price_store;

pub use challenge_file::{ChallengeFile, PendingLogin};
pub use entry::{ConfigEntry, EntryOptions, EntryStore, TokenStorage, token_persistence};
pub use error::StoreError;
pub use persistence::{
    CHALLENGE_FILE, ENTRY_FILE, default_challenge_path, default_config_dir, default_entry_path,
    ensure_dir, load_json, load_json_if_exists, remove_if_exists, save_json,
};
pub use price_store::{DEFAULT_MAX_STALENESS, PriceStatus, PriceStore, UpdateState};
