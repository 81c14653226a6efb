//! Host APIs for Tariffwatch.
//!
//! - [`http`] - HTTP client with tracing, cookie jar, and domain allowlist
//! - [`keychain`] - Platform secret store for the refresh token

pub mod http;
pub mod keychain;

// Re-export key types
pub use http::{HttpClient, HttpClientBuilder, ResponseExt};
pub use keychain::{KeychainApi, MemoryKeychain, SystemKeychain};
