//! In-memory backend for tests and small deployments.

use parking_lot::RwLock;
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use ofactory_types::{Endpoint, Fingerprint};

use crate::{EndpointIndex, ObjectStore, StoreError};

/// HashMap-backed implementation of both storage traits.
#[derive(Clone, Default)]
pub struct MemoryBackend {
    inner: Arc<MemoryBackendInner>,
}

#[derive(Default)]
struct MemoryBackendInner {
    /// Primary mapping: `endpoint:fingerprint` -> document bytes.
    objects: RwLock<HashMap<Vec<u8>, Vec<u8>>>,
    /// Membership: endpoint -> fingerprint set.
    index: RwLock<HashMap<String, BTreeSet<Fingerprint>>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ObjectStore for MemoryBackend {
    fn put(
        &self,
        endpoint: &Endpoint,
        fingerprint: &Fingerprint,
        bytes: &[u8],
    ) -> Result<(), StoreError> {
        self.inner
            .objects
            .write()
            .insert(crate::object_key(endpoint, fingerprint), bytes.to_vec());
        Ok(())
    }

    fn get(&self, endpoint: &Endpoint, fingerprint: &Fingerprint) -> Result<Vec<u8>, StoreError> {
        self.inner
            .objects
            .read()
            .get(&crate::object_key(endpoint, fingerprint))
            .cloned()
            .ok_or(StoreError::NotFound)
    }

    fn delete(&self, endpoint: &Endpoint, fingerprint: &Fingerprint) -> Result<(), StoreError> {
        self.inner
            .objects
            .write()
            .remove(&crate::object_key(endpoint, fingerprint))
            .map(|_| ())
            .ok_or(StoreError::NotFound)
    }
}

impl EndpointIndex for MemoryBackend {
    fn add_member(&self, endpoint: &Endpoint, fingerprint: &Fingerprint) -> Result<(), StoreError> {
        self.inner
            .index
            .write()
            .entry(endpoint.as_str().to_string())
            .or_default()
            .insert(*fingerprint);
        Ok(())
    }

    fn remove_member(
        &self,
        endpoint: &Endpoint,
        fingerprint: &Fingerprint,
    ) -> Result<(), StoreError> {
        if let Some(members) = self.inner.index.write().get_mut(endpoint.as_str()) {
            members.remove(fingerprint);
        }
        Ok(())
    }

    fn list_members(&self, endpoint: &Endpoint) -> Result<Vec<Fingerprint>, StoreError> {
        Ok(self
            .inner
            .index
            .read()
            .get(endpoint.as_str())
            .map(|members| members.iter().copied().collect())
            .unwrap_or_default())
    }

    fn is_member(
        &self,
        endpoint: &Endpoint,
        fingerprint: &Fingerprint,
    ) -> Result<bool, StoreError> {
        Ok(self
            .inner
            .index
            .read()
            .get(endpoint.as_str())
            .map(|members| members.contains(fingerprint))
            .unwrap_or(false))
    }
}
