// Lint configuration for this crate
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::missing_errors_doc)]

//! # Tariffwatch Runtime
//!
//! The two recurring tasks of a running integration and their lifecycle.
//!
//! - [`TokenRefreshLoop`] - 60 s timer keeping the access token valid
//! - [`UpdateCoordinator`] - price polling state machine (1-24 h interval)
//! - [`Integration`] - setup with an initial refresh, readings for the
//!   sensor layer, reauthentication, cancellation on shutdown
//!
//! Both tasks share the session's token store; its mutex is the only
//! coordination point between them.

pub mod config;
pub mod coordinator;
pub mod error;
pub mod integration;
pub mod refresh;

#[cfg(test)]
mod testing;

pub use config::{
    DEFAULT_HTTP_TIMEOUT, DEFAULT_REFRESH_MARGIN, DEFAULT_REFRESH_PERIOD, RuntimeConfig,
};
pub use coordinator::{CycleOutcome, UpdateCoordinator};
pub use error::RuntimeError;
pub use integration::Integration;
pub use refresh::{TickOutcome, TokenRefreshLoop};
