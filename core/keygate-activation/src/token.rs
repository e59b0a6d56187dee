//! Activation token generation.
//!
//! Tokens are 128 bits from the OS CSPRNG, encoded as unpadded URL-safe
//! base64 so they can travel in a link without escaping.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use rand::RngCore;
use subtle::ConstantTimeEq;
use std::fmt;

/// Random bytes per token.
pub const TOKEN_BYTES: usize = 16;

/// Encoded token length in characters.
pub const TOKEN_LEN: usize = 22;

/// A freshly generated activation token.
#[derive(Clone, PartialEq, Eq)]
pub struct ActivationToken(String);

impl ActivationToken {
    /// Generates a new random token.
    #[must_use]
    pub fn generate() -> Self {
        let mut bytes = [0u8; TOKEN_BYTES];
        rand::rngs::OsRng.fill_bytes(&mut bytes);
        Self(URL_SAFE_NO_PAD.encode(bytes))
    }

    /// Returns the encoded token.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    #[must_use]
    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Debug for ActivationToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ActivationToken").field(&"[REDACTED]").finish()
    }
}

/// Constant-time string equality. Different lengths never match.
pub(crate) fn tokens_equal(stored: &str, presented: &str) -> bool {
    stored.as_bytes().ct_eq(presented.as_bytes()).into()
}
