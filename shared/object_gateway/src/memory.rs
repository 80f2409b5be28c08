//! In-memory gateway used in tests and local development

use std::collections::{BTreeMap, HashSet};
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::StreamExt;
use sha2::{Digest, Sha256};

use crate::{
    GatewayError, GatewayResult, ObjectGateway, ObjectKeyStream, ObjectMetadata, StorageObjectRef,
};

#[derive(Debug, Clone)]
struct StoredObject {
    bytes: Vec<u8>,
    content_type: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    version: u64,
}

/// Gateway keeping objects in a process-local map
///
/// Locks are never held across an await point.
#[derive(Default)]
pub struct InMemoryObjectGateway {
    bucket_name: String,
    objects: RwLock<BTreeMap<String, StoredObject>>,
    denied: RwLock<HashSet<String>>,
}

impl InMemoryObjectGateway {
    /// Creates an empty in-memory bucket
    #[must_use]
    pub fn new(bucket_name: impl Into<String>) -> Self {
        Self {
            bucket_name: bucket_name.into(),
            ..Self::default()
        }
    }

    /// Makes every subsequent operation on `key` fail with `PermissionDenied`
    pub fn deny_access(&self, key: &str) {
        self.denied
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.to_string());
    }

    fn check_access(&self, key: &str) -> GatewayResult<()> {
        let denied = self.denied.read().unwrap_or_else(PoisonError::into_inner);
        if denied.contains(key) {
            return Err(GatewayError::PermissionDenied(key.to_string()));
        }
        Ok(())
    }

    fn objects(&self) -> RwLockReadGuard<'_, BTreeMap<String, StoredObject>> {
        self.objects.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn objects_mut(&self) -> RwLockWriteGuard<'_, BTreeMap<String, StoredObject>> {
        self.objects.write().unwrap_or_else(PoisonError::into_inner)
    }
}

fn content_hash(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

#[async_trait]
impl ObjectGateway for InMemoryObjectGateway {
    fn bucket(&self) -> &str {
        &self.bucket_name
    }

    async fn read(&self, key: &str) -> GatewayResult<Vec<u8>> {
        self.check_access(key)?;
        self.objects()
            .get(key)
            .map(|object| object.bytes.clone())
            .ok_or_else(|| GatewayError::NotFound(key.to_string()))
    }

    async fn write(
        &self,
        key: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> GatewayResult<StorageObjectRef> {
        self.check_access(key)?;
        let now = Utc::now();
        let mut objects = self.objects_mut();

        let (created_at, version) = objects
            .get(key)
            .map_or((now, 1), |previous| (previous.created_at, previous.version + 1));

        objects.insert(
            key.to_string(),
            StoredObject {
                bytes,
                content_type: content_type.to_string(),
                created_at,
                updated_at: now,
                version,
            },
        );

        Ok(StorageObjectRef::new(self.bucket_name.clone(), key))
    }

    fn list(&self, prefix: &str, max_results: usize) -> ObjectKeyStream {
        let keys: Vec<GatewayResult<String>> = self
            .objects()
            .range(prefix.to_string()..)
            .take_while(|(key, _)| key.starts_with(prefix))
            .take(max_results)
            .map(|(key, _)| Ok(key.clone()))
            .collect();

        futures::stream::iter(keys).boxed()
    }

    async fn delete(&self, key: &str) -> GatewayResult<bool> {
        self.check_access(key)?;
        Ok(self.objects_mut().remove(key).is_some())
    }

    async fn exists(&self, key: &str) -> GatewayResult<bool> {
        self.check_access(key)?;
        Ok(self.objects().contains_key(key))
    }

    async fn stat(&self, key: &str) -> GatewayResult<ObjectMetadata> {
        self.check_access(key)?;
        let objects = self.objects();
        let object = objects
            .get(key)
            .ok_or_else(|| GatewayError::NotFound(key.to_string()))?;
        let hash = content_hash(&object.bytes);

        Ok(ObjectMetadata {
            name: key.to_string(),
            size: object.bytes.len() as u64,
            content_type: Some(object.content_type.clone()),
            created_at: Some(object.created_at),
            updated_at: Some(object.updated_at),
            etag: Some(format!("\"{}-{}\"", &hash[..16], object.version)),
            content_hash: Some(hash),
        })
    }
}
