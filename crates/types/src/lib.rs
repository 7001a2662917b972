//! Shared data model for the ofactory object store.
//!
//! Defines endpoint names, canonical JSON serialization, content
//! fingerprints, and the capability claims carried by signed tokens.

pub mod canonical;
pub mod claims;
pub mod endpoint;
pub mod fingerprint;

pub use canonical::canonical_bytes;
pub use claims::{Claims, Operation, PermissionFlags};
pub use endpoint::Endpoint;
pub use fingerprint::Fingerprint;

/// Request-shape errors surfaced before any store or auth work happens.
#[derive(thiserror::Error, Debug)]
pub enum ProtocolError {
    #[error("unknown method: {0}")]
    UnknownMethod(String),
    #[error("malformed path: {0}")]
    MalformedPath(String),
}
