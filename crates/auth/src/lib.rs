//! Capability token codec.
//!
//! Tokens are bearer credentials: a claims payload signed with the
//! process-wide secret. Wire form is `base64url(claims_json).base64url(sig)`
//! with an ed25519 signature over the payload segment. Verification is
//! stateless; the server keeps no per-token records.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use sha2::{Digest, Sha256};
use std::time::{SystemTime, UNIX_EPOCH};

use ofactory_types::Claims;

/// Token verification failures. Any failure means the presented token is
/// absent-with-error: callers must deny, never fall back to anonymous.
#[derive(thiserror::Error, Debug)]
pub enum AuthError {
    #[error("malformed token: {0}")]
    Malformed(String),
    #[error("token signature verification failed")]
    BadSignature,
    #[error("token expired")]
    Expired,
    #[error("token does not authorize this request")]
    Unauthorized,
}

/// Mints and verifies signed capability tokens.
pub struct TokenCodec {
    signing: SigningKey,
    verifying: VerifyingKey,
    ttl_secs: u64,
}

impl TokenCodec {
    /// Build a codec from the configured secret string. The signing key is
    /// the SHA-256 of the secret, so any secret length is accepted and the
    /// same secret always yields the same key across restarts.
    pub fn from_secret(secret: &str, ttl_secs: u64) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(secret.as_bytes());
        let seed: [u8; 32] = hasher.finalize().into();
        let signing = SigningKey::from_bytes(&seed);
        let verifying = signing.verifying_key();
        Self {
            signing,
            verifying,
            ttl_secs,
        }
    }

    /// Validity window applied to freshly minted claims, in seconds.
    pub fn ttl_secs(&self) -> u64 {
        self.ttl_secs
    }

    /// Current unix time in seconds, the clock used for iat/exp.
    pub fn now_secs() -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or_default()
    }

    /// Serialize and sign claims into a token string.
    pub fn mint(&self, claims: &Claims) -> String {
        // Claims serialization cannot fail: the struct contains only
        // strings, bools, and integers.
        let payload = serde_json::to_vec(claims).unwrap_or_default();
        let signature = self.signing.sign(&payload);
        format!(
            "{}.{}",
            URL_SAFE_NO_PAD.encode(&payload),
            URL_SAFE_NO_PAD.encode(signature.to_bytes())
        )
    }

    /// Decode a token, check its signature, and enforce the validity
    /// window.
    pub fn verify(&self, token: &str) -> Result<Claims, AuthError> {
        self.verify_at(token, Self::now_secs())
    }

    fn verify_at(&self, token: &str, now_secs: u64) -> Result<Claims, AuthError> {
        let (payload_b64, sig_b64) = token
            .split_once('.')
            .ok_or_else(|| AuthError::Malformed("missing signature segment".to_string()))?;

        let payload = URL_SAFE_NO_PAD
            .decode(payload_b64)
            .map_err(|e| AuthError::Malformed(format!("payload is not base64url: {e}")))?;
        let sig_bytes = URL_SAFE_NO_PAD
            .decode(sig_b64)
            .map_err(|e| AuthError::Malformed(format!("signature is not base64url: {e}")))?;
        let signature = Signature::from_slice(&sig_bytes).map_err(|_| AuthError::BadSignature)?;

        self.verifying
            .verify(&payload, &signature)
            .map_err(|_| AuthError::BadSignature)?;

        let claims: Claims = serde_json::from_slice(&payload)
            .map_err(|e| AuthError::Malformed(format!("claims payload: {e}")))?;

        if now_secs > claims.exp {
            return Err(AuthError::Expired);
        }

        Ok(claims)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ofactory_types::{Endpoint, Fingerprint, PermissionFlags};
    use serde_json::json;

    fn codec() -> TokenCodec {
        TokenCodec::from_secret("test-secret", 3600)
    }

    fn sample_claims() -> Claims {
        let endpoint = Endpoint::parse("people").unwrap();
        let fingerprint = Fingerprint::of_value(&json!({"firstName": "Ada"}));
        Claims::owner_of(&endpoint, &fingerprint, TokenCodec::now_secs(), 3600)
    }

    #[test]
    fn mint_verify_roundtrip() {
        let codec = codec();
        let claims = sample_claims();
        let token = codec.mint(&claims);
        let verified = codec.verify(&token).unwrap();
        assert_eq!(verified, claims);
    }

    #[test]
    fn tampered_payload_fails_signature_check() {
        let codec = codec();
        let token = codec.mint(&sample_claims());
        let (payload, sig) = token.split_once('.').unwrap();

        let mut claims: serde_json::Value = serde_json::from_slice(
            &base64::engine::general_purpose::URL_SAFE_NO_PAD
                .decode(payload)
                .unwrap(),
        )
        .unwrap();
        claims["owner"] = json!(true);
        claims["DELETE"] = json!(true);
        let forged = format!(
            "{}.{sig}",
            base64::engine::general_purpose::URL_SAFE_NO_PAD
                .encode(serde_json::to_vec(&claims).unwrap())
        );

        assert!(matches!(
            codec.verify(&forged),
            Err(AuthError::BadSignature)
        ));
    }

    #[test]
    fn garbage_is_malformed_not_a_panic() {
        let codec = codec();
        for junk in ["", "not-a-token", "a.b.c", "!!!.???", "onlypayload"] {
            match codec.verify(junk) {
                Err(AuthError::Malformed(_)) | Err(AuthError::BadSignature) => {}
                other => panic!("expected malformed/bad-signature for {junk:?}, got {other:?}"),
            }
        }
    }

    #[test]
    fn expired_token_is_rejected() {
        let codec = codec();
        let mut claims = sample_claims();
        claims.iat = 1000;
        claims.exp = 2000;
        let token = codec.mint(&claims);
        assert!(matches!(
            codec.verify_at(&token, 2001),
            Err(AuthError::Expired)
        ));
        assert!(codec.verify_at(&token, 1999).is_ok());
    }

    #[test]
    fn token_from_another_secret_is_rejected() {
        let other = TokenCodec::from_secret("different-secret", 3600);
        let token = other.mint(&sample_claims());
        assert!(matches!(
            codec().verify(&token),
            Err(AuthError::BadSignature)
        ));
    }

    #[test]
    fn derived_token_roundtrips_with_clamped_rights() {
        let codec = codec();
        let parent = sample_claims();
        let child = parent.derive(PermissionFlags::all(), TokenCodec::now_secs(), 60);
        let verified = codec.verify(&codec.mint(&child)).unwrap();
        assert!(!verified.owner);
        assert!(!verified.permissions.post);
        assert!(verified.permissions.get);
    }
}
