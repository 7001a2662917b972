//! Endpoint names: the logical collection a document belongs to.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::ProtocolError;

/// Separator between endpoint and fingerprint in backend keys. Endpoint
/// names must never contain it.
pub const KEY_SEPARATOR: char = ':';

/// Reserved name used internally for index bookkeeping; never a valid
/// client-facing endpoint.
pub const RESERVED_INDEX_MARKER: &str = "_index";

/// A validated collection name, derived from the first path segment of a
/// request. Identifies both a schema and a storage namespace.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Endpoint(String);

impl Endpoint {
    /// Parse and validate an endpoint name. Accepts non-empty path-safe
    /// tokens (`[A-Za-z0-9_-]+`) that are not the reserved index marker.
    pub fn parse(raw: &str) -> Result<Self, ProtocolError> {
        if raw.is_empty() {
            return Err(ProtocolError::MalformedPath(
                "empty endpoint name".to_string(),
            ));
        }
        if raw == RESERVED_INDEX_MARKER {
            return Err(ProtocolError::MalformedPath(format!(
                "endpoint name '{raw}' is reserved"
            )));
        }
        if !raw
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
        {
            return Err(ProtocolError::MalformedPath(format!(
                "endpoint name '{raw}' contains invalid characters"
            )));
        }
        Ok(Self(raw.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
