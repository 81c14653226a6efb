// Lint configuration for this crate
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]

//! # Tariffwatch Fetch
//!
//! Host APIs shared by the provider and store crates.
//!
//! ## Host APIs
//!
//! The [`host`] module provides abstractions for system interactions:
//!
//! - [`host::http`] - HTTP client with tracing, cookie jar, redirect policy
//!   and domain allowlist
//! - [`host::keychain`] - Platform secret store for the refresh token
//!
//! ## Token Persistence
//!
//! [`persist::TokenPersistence`] is the seam through which rotated session
//! tokens reach durable storage. The in-memory and keychain implementations
//! live here; the config-entry implementation lives in `tariffwatch-store`.

pub mod error;
pub mod host;
pub mod persist;

// Errors
pub use error::{HttpError, KeychainError, PersistError};

// Host APIs
pub use host::{
    http::{HttpClient, HttpClientBuilder, ResponseExt},
    keychain::{
        ENGIE_SERVICE, KeychainApi, MemoryKeychain, REFRESH_TOKEN_ACCOUNT, SystemKeychain,
    },
};

// Persistence
pub use persist::{KeychainTokenPersistence, MemoryTokenPersistence, TokenPersistence};
