//! PKCE (RFC 7636) verifier/challenge generation.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use ring::digest::{SHA256, digest};
use ring::rand::{SecureRandom, SystemRandom};

use crate::error::EngieError;

/// Challenge method sent to the authorize endpoint.
pub const CHALLENGE_METHOD: &str = "S256";

/// A fresh code verifier and its S256 challenge.
#[derive(Clone)]
pub struct PkceChallenge {
    verifier: String,
    challenge: String,
}

impl PkceChallenge {
    /// Generates a verifier from 32 random bytes.
    ///
    /// # Errors
    ///
    /// Returns [`EngieError::Auth`] if the system RNG fails.
    pub fn generate() -> Result<Self, EngieError> {
        let bytes = random_bytes::<32>()?;
        let verifier = URL_SAFE_NO_PAD.encode(bytes);
        Ok(Self::from_verifier(verifier))
    }

    /// Derives the challenge for a known verifier.
    pub fn from_verifier(verifier: impl Into<String>) -> Self {
        let verifier = verifier.into();
        let challenge = URL_SAFE_NO_PAD.encode(digest(&SHA256, verifier.as_bytes()));
        Self {
            verifier,
            challenge,
        }
    }

    /// The secret verifier, sent only with the code exchange.
    pub fn verifier(&self) -> &str {
        &self.verifier
    }

    /// `base64url(SHA-256(verifier))`.
    pub fn challenge(&self) -> &str {
        &self.challenge
    }
}

impl std::fmt::Debug for PkceChallenge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PkceChallenge")
            .field("verifier", &"<redacted>")
            .field("challenge", &self.challenge)
            .finish()
    }
}

/// 16 random bytes, hex encoded (used for `state` and `nonce`).
///
/// # Errors
///
/// Returns [`EngieError::Auth`] if the system RNG fails.
pub fn random_hex() -> Result<String, EngieError> {
    let bytes = random_bytes::<16>()?;
    Ok(bytes.iter().map(|b| format!("{b:02x}")).collect())
}

fn random_bytes<const N: usize>() -> Result<[u8; N], EngieError> {
    let mut bytes = [0u8; N];
    SystemRandom::new()
        .fill(&mut bytes)
        .map_err(|_| EngieError::Auth("system random number generator failed".to_string()))?;
    Ok(bytes)
}
