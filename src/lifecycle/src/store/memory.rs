use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use super::{StoreError, TierStore};
use crate::model::{ObjectId, StorageClass, StoredObject};

#[derive(Debug, Clone)]
struct Entry {
    data: Bytes,
    class: StorageClass,
    last_modified: DateTime<Utc>,
}

/// Process-local store. Listings come back ordered by object name.
#[derive(Debug, Clone, Default)]
pub struct InMemoryTierStore {
    objects: Arc<RwLock<BTreeMap<ObjectId, Entry>>>,
}

impl InMemoryTierStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed an object with explicit metadata.
    pub async fn insert(
        &self,
        id: ObjectId,
        data: impl Into<Bytes>,
        class: StorageClass,
        last_modified: DateTime<Utc>,
    ) {
        let entry = Entry {
            data: data.into(),
            class,
            last_modified,
        };
        self.objects.write().await.insert(id, entry);
    }

    /// Current storage class of an object, if it exists.
    pub async fn class_of(&self, id: &ObjectId) -> Option<StorageClass> {
        self.objects.read().await.get(id).map(|entry| entry.class)
    }

    pub async fn len(&self) -> usize {
        self.objects.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.objects.read().await.is_empty()
    }
}

#[async_trait]
impl TierStore for InMemoryTierStore {
    async fn list(&self, container: &str) -> Result<Vec<StoredObject>, StoreError> {
        let objects = self.objects.read().await;
        Ok(objects
            .iter()
            .filter(|(id, _)| id.container == container)
            .map(|(id, entry)| StoredObject {
                id: id.clone(),
                last_modified: entry.last_modified,
                class: entry.class,
                size: Some(entry.data.len() as u64),
            })
            .collect())
    }

    async fn set_tier(&self, id: &ObjectId, class: StorageClass) -> Result<(), StoreError> {
        let mut objects = self.objects.write().await;
        let entry = objects
            .get_mut(id)
            .ok_or_else(|| StoreError::NotFound(id.clone()))?;
        entry.class = class;
        Ok(())
    }

    async fn upload(&self, id: &ObjectId, data: Bytes) -> Result<(), StoreError> {
        self.insert(id.clone(), data, StorageClass::Hot, Utc::now())
            .await;
        Ok(())
    }

    async fn download(&self, id: &ObjectId) -> Result<Bytes, StoreError> {
        self.objects
            .read()
            .await
            .get(id)
            .map(|entry| entry.data.clone())
            .ok_or_else(|| StoreError::NotFound(id.clone()))
    }
}
