//! Capability claims: the payload carried by signed bearer tokens.

use serde::{Deserialize, Serialize};

use crate::{Endpoint, Fingerprint};

/// Store operations a token can authorize.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Post,
    Get,
    Put,
    Delete,
}

/// Per-method permission flags, fixed shape so that missing fields can
/// never be coerced into an authorization decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PermissionFlags {
    #[serde(rename = "POST", default)]
    pub post: bool,
    #[serde(rename = "GET", default)]
    pub get: bool,
    #[serde(rename = "PUT", default)]
    pub put: bool,
    #[serde(rename = "DELETE", default)]
    pub delete: bool,
}

impl PermissionFlags {
    pub fn all() -> Self {
        Self {
            post: true,
            get: true,
            put: true,
            delete: true,
        }
    }

    /// Intersection with another flag set. Used when deriving narrower
    /// tokens: a child can never hold a right its parent lacked.
    pub fn clamp_to(self, parent: Self) -> Self {
        Self {
            post: self.post && parent.post,
            get: self.get && parent.get,
            put: self.put && parent.put,
            delete: self.delete && parent.delete,
        }
    }
}

/// Signed token payload: which methods the bearer may invoke, against
/// which endpoint, and optionally against which single object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    pub endpoint: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub object_id: Option<String>,
    pub owner: bool,
    #[serde(flatten)]
    pub permissions: PermissionFlags,
    /// Issued-at, unix seconds.
    pub iat: u64,
    /// Expiry, unix seconds.
    pub exp: u64,
}

impl Claims {
    /// Owner claims minted after a successful POST: full rights over the
    /// created object, except POST which never needs a token.
    pub fn owner_of(endpoint: &Endpoint, fingerprint: &Fingerprint, iat: u64, ttl_secs: u64) -> Self {
        Self {
            endpoint: endpoint.as_str().to_string(),
            object_id: Some(fingerprint.to_hex()),
            owner: true,
            permissions: PermissionFlags {
                post: false,
                get: true,
                put: true,
                delete: true,
            },
            iat,
            exp: iat.saturating_add(ttl_secs),
        }
    }

    /// Derive a narrower token from these claims: requested flags are
    /// clamped to the parent's, scope is inherited, and ownership is
    /// never derivable.
    pub fn derive(&self, requested: PermissionFlags, iat: u64, ttl_secs: u64) -> Self {
        Self {
            endpoint: self.endpoint.clone(),
            object_id: self.object_id.clone(),
            owner: false,
            permissions: requested.clamp_to(self.permissions),
            iat,
            exp: iat.saturating_add(ttl_secs),
        }
    }

    pub fn allows(&self, op: Operation) -> bool {
        match op {
            Operation::Post => self.permissions.post,
            Operation::Get => self.permissions.get,
            Operation::Put => self.permissions.put,
            Operation::Delete => self.permissions.delete,
        }
    }

    pub fn scopes_endpoint(&self, endpoint: &Endpoint) -> bool {
        self.endpoint == endpoint.as_str()
    }

    /// Whether these claims are scoped to exactly the given object.
    pub fn scopes_object(&self, fingerprint: &Fingerprint) -> bool {
        self.object_id.as_deref() == Some(fingerprint.to_hex().as_str())
    }
}
