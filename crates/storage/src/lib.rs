//! Object store and endpoint index backends.
//!
//! The primary mapping is `(endpoint, fingerprint) -> document bytes`; the
//! index keeps a per-endpoint set of known fingerprints. Both live in the
//! same backend but are separate operations with no cross-operation
//! transaction, so callers follow the record-then-index protocol and treat
//! divergence as a reported failure (see the rpc crate).

use ofactory_types::{Endpoint, Fingerprint};

mod memory;
mod retry;
mod sled_backend;

pub use memory::MemoryBackend;
pub use retry::RetryPolicy;
pub use sled_backend::SledBackend;

/// Backend failure taxonomy.
#[derive(thiserror::Error, Debug)]
pub enum StoreError {
    #[error("backend unavailable: {0}")]
    Unavailable(String),
    #[error("backend timed out: {0}")]
    Timeout(String),
    #[error("record not found")]
    NotFound,
}

impl StoreError {
    /// Transient failures are safe to retry for idempotent operations.
    pub fn is_transient(&self) -> bool {
        matches!(self, StoreError::Unavailable(_) | StoreError::Timeout(_))
    }
}

/// Primary document storage keyed by `endpoint:fingerprint`.
pub trait ObjectStore: Send + Sync {
    /// Store document bytes. Idempotent: content addressing guarantees the
    /// same key always carries the same bytes.
    fn put(&self, endpoint: &Endpoint, fingerprint: &Fingerprint, bytes: &[u8])
        -> Result<(), StoreError>;

    fn get(&self, endpoint: &Endpoint, fingerprint: &Fingerprint) -> Result<Vec<u8>, StoreError>;

    fn delete(&self, endpoint: &Endpoint, fingerprint: &Fingerprint) -> Result<(), StoreError>;
}

/// Per-endpoint set of known fingerprints.
pub trait EndpointIndex: Send + Sync {
    fn add_member(&self, endpoint: &Endpoint, fingerprint: &Fingerprint) -> Result<(), StoreError>;

    fn remove_member(
        &self,
        endpoint: &Endpoint,
        fingerprint: &Fingerprint,
    ) -> Result<(), StoreError>;

    fn list_members(&self, endpoint: &Endpoint) -> Result<Vec<Fingerprint>, StoreError>;

    fn is_member(&self, endpoint: &Endpoint, fingerprint: &Fingerprint) -> Result<bool, StoreError>;
}

/// Composite backend key. Endpoint validation rejects the separator, so the
/// mapping is unambiguous.
fn object_key(endpoint: &Endpoint, fingerprint: &Fingerprint) -> Vec<u8> {
    format!("{}:{}", endpoint.as_str(), fingerprint.to_hex()).into_bytes()
}

/// Prefix covering every member key of an endpoint.
fn endpoint_prefix(endpoint: &Endpoint) -> Vec<u8> {
    format!("{}:", endpoint.as_str()).into_bytes()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn key_scheme_is_endpoint_colon_hex() {
        let endpoint = Endpoint::parse("people").unwrap();
        let fp = Fingerprint::of_value(&json!({"id": 1}));
        let key = object_key(&endpoint, &fp);
        let key_str = String::from_utf8(key).unwrap();
        assert_eq!(key_str, format!("people:{}", fp.to_hex()));
        assert_eq!(key_str.matches(':').count(), 1);
    }

    #[test]
    fn prefix_covers_only_the_endpoint() {
        let a = Endpoint::parse("orders").unwrap();
        let b = Endpoint::parse("orders2").unwrap();
        let fp = Fingerprint::of_value(&json!({}));
        assert!(object_key(&a, &fp).starts_with(&endpoint_prefix(&a)));
        assert!(!object_key(&b, &fp).starts_with(&endpoint_prefix(&a)));
    }
}
