//! Sled-backed object store and endpoint index.

use sled::{Db, Tree};
use std::path::Path;

use ofactory_types::{Endpoint, Fingerprint};

use crate::{endpoint_prefix, object_key, EndpointIndex, ObjectStore, RetryPolicy, StoreError};

/// Production backend: one sled tree for document bytes, one for index
/// membership. Key scheme is `endpoint:fingerprint` in both.
pub struct SledBackend {
    db: Db,
    objects: Tree,
    index: Tree,
    retry: RetryPolicy,
}

impl SledBackend {
    pub fn open<P: AsRef<Path>>(path: P, retry: RetryPolicy) -> Result<Self, StoreError> {
        let db = sled::open(path).map_err(backend_error)?;
        let objects = db.open_tree("objects").map_err(backend_error)?;
        let index = db.open_tree("endpoint_index").map_err(backend_error)?;
        Ok(Self {
            db,
            objects,
            index,
            retry,
        })
    }

    pub fn flush(&self) -> Result<(), StoreError> {
        self.db.flush().map_err(backend_error)?;
        Ok(())
    }
}

fn backend_error(err: sled::Error) -> StoreError {
    StoreError::Unavailable(err.to_string())
}

impl ObjectStore for SledBackend {
    fn put(
        &self,
        endpoint: &Endpoint,
        fingerprint: &Fingerprint,
        bytes: &[u8],
    ) -> Result<(), StoreError> {
        let key = object_key(endpoint, fingerprint);
        self.retry.run("object put", || {
            self.objects
                .insert(key.as_slice(), bytes)
                .map_err(backend_error)?;
            Ok(())
        })
    }

    fn get(&self, endpoint: &Endpoint, fingerprint: &Fingerprint) -> Result<Vec<u8>, StoreError> {
        let key = object_key(endpoint, fingerprint);
        self.retry.run("object get", || {
            self.objects
                .get(key.as_slice())
                .map_err(backend_error)?
                .map(|ivec| ivec.to_vec())
                .ok_or(StoreError::NotFound)
        })
    }

    fn delete(&self, endpoint: &Endpoint, fingerprint: &Fingerprint) -> Result<(), StoreError> {
        let key = object_key(endpoint, fingerprint);
        self.retry.run("object delete", || {
            self.objects
                .remove(key.as_slice())
                .map_err(backend_error)?
                .map(|_| ())
                .ok_or(StoreError::NotFound)
        })
    }
}

impl EndpointIndex for SledBackend {
    fn add_member(&self, endpoint: &Endpoint, fingerprint: &Fingerprint) -> Result<(), StoreError> {
        let key = object_key(endpoint, fingerprint);
        self.retry.run("index add", || {
            self.index
                .insert(key.as_slice(), vec![])
                .map_err(backend_error)?;
            Ok(())
        })
    }

    fn remove_member(
        &self,
        endpoint: &Endpoint,
        fingerprint: &Fingerprint,
    ) -> Result<(), StoreError> {
        let key = object_key(endpoint, fingerprint);
        // Removal of an absent member is a no-op so retries converge.
        self.retry.run("index remove", || {
            self.index.remove(key.as_slice()).map_err(backend_error)?;
            Ok(())
        })
    }

    fn list_members(&self, endpoint: &Endpoint) -> Result<Vec<Fingerprint>, StoreError> {
        let prefix = endpoint_prefix(endpoint);
        self.retry.run("index list", || {
            let mut members = Vec::new();
            for entry in self.index.scan_prefix(&prefix) {
                let (key, _) = entry.map_err(backend_error)?;
                let hex = &key[prefix.len()..];
                let hex = std::str::from_utf8(hex)
                    .map_err(|e| StoreError::Unavailable(format!("corrupt index key: {e}")))?;
                let fingerprint = Fingerprint::from_hex(hex)
                    .map_err(|e| StoreError::Unavailable(format!("corrupt index key: {e}")))?;
                members.push(fingerprint);
            }
            Ok(members)
        })
    }

    fn is_member(
        &self,
        endpoint: &Endpoint,
        fingerprint: &Fingerprint,
    ) -> Result<bool, StoreError> {
        let key = object_key(endpoint, fingerprint);
        self.retry.run("index contains", || {
            self.index
                .contains_key(key.as_slice())
                .map_err(backend_error)
        })
    }
}
