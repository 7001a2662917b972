//! Content fingerprints: deterministic identity for stored documents.

use serde_json::Value;
use sha2::{Digest, Sha256};
use std::fmt;

use crate::canonical::canonical_bytes;

/// SHA-256 digest of a document's canonical form. The wire representation
/// is a fixed-width lowercase hex string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Fingerprint([u8; 32]);

impl Fingerprint {
    /// Fingerprint a parsed document. Canonicalizes first so that
    /// structurally equal documents always hash identically.
    pub fn of_value(value: &Value) -> Self {
        Self::of_canonical(&canonical_bytes(value))
    }

    /// Hash pre-canonicalized bytes. Callers must only pass output of
    /// [`canonical_bytes`].
    pub fn of_canonical(bytes: &[u8]) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(bytes);
        Self(hasher.finalize().into())
    }

    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    pub fn from_hex(hex_str: &str) -> Result<Self, String> {
        if hex_str.len() != 64 {
            return Err(format!(
                "fingerprint hex must be 64 characters, got {}",
                hex_str.len()
            ));
        }
        let bytes = hex::decode(hex_str).map_err(|e| format!("invalid hex: {e}"))?;
        let mut arr = [0u8; 32];
        arr.copy_from_slice(&bytes);
        Ok(Self(arr))
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}
