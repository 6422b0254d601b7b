//! [`TierStore`] over any `object_store` backend.
//!
//! Objects live under `<container>/<name>`. The storage class travels with
//! the object as the `storage-class` metadata attribute; objects without it
//! are treated as `hot`, the service default. On Azure and S3 the provider
//! access tier is written as well (see [`ProviderTiers`]).
//!
//! Changing the class rewrites the object: the whole body is read into
//! memory and put back, conditional on the object not having changed in
//! between. With large uploads and several changes in flight, peak memory is
//! roughly `max_concurrency` times the largest object. The original
//! modification time is kept in the `content-modified` attribute and
//! preferred over the backend timestamp when listing.

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use futures::{StreamExt, TryStreamExt};
use object_store::path::Path as ObjectPath;
use object_store::{
    Attribute, AttributeValue, Attributes, GetOptions, ObjectMeta, ObjectStore, PutMode,
    PutOptions, PutPayload, UpdateVersion,
};
use percent_encoding::percent_decode_str;
use std::borrow::Cow;
use std::sync::Arc;

use super::{StoreError, TierStore};
use crate::model::{ObjectId, StorageClass, StoredObject};

pub const STORAGE_CLASS_ATTRIBUTE: &str = "storage-class";
pub const CONTENT_MODIFIED_ATTRIBUTE: &str = "content-modified";

/// Number of metadata lookups issued concurrently while listing.
const LIST_METADATA_CONCURRENCY: usize = 16;

fn metadata_key(key: &'static str) -> Attribute {
    Attribute::Metadata(Cow::Borrowed(key))
}

/// Provider access tier names sent with [`Attribute::StorageClass`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ProviderTiers {
    /// Only the `storage-class` metadata attribute is written.
    #[default]
    Unmanaged,
    /// Azure Blob Storage access tiers (`x-ms-access-tier`).
    Azure,
    /// S3 storage classes (`x-amz-storage-class`).
    S3,
}

impl ProviderTiers {
    /// Pick the tier names matching a storage DSN scheme.
    pub fn for_dsn(dsn: &str) -> Self {
        match dsn.split_once("://").map(|(scheme, _)| scheme) {
            Some("az" | "azure") => ProviderTiers::Azure,
            Some("s3") => ProviderTiers::S3,
            _ => ProviderTiers::Unmanaged,
        }
    }

    pub fn tier_name(&self, class: StorageClass) -> Option<&'static str> {
        match self {
            ProviderTiers::Unmanaged => None,
            ProviderTiers::Azure => Some(match class {
                StorageClass::Hot => "Hot",
                StorageClass::Cool => "Cool",
                StorageClass::Cold => "Cold",
                StorageClass::Archive => "Archive",
            }),
            ProviderTiers::S3 => Some(match class {
                StorageClass::Hot => "STANDARD",
                StorageClass::Cool => "STANDARD_IA",
                StorageClass::Cold => "GLACIER_IR",
                StorageClass::Archive => "GLACIER",
            }),
        }
    }
}

/// Map an `object_store` failure onto the lifecycle error taxonomy.
fn classify(err: object_store::Error, id: &ObjectId) -> StoreError {
    match err {
        object_store::Error::NotFound { .. } => StoreError::NotFound(id.clone()),
        object_store::Error::PermissionDenied { .. }
        | object_store::Error::Unauthenticated { .. } => {
            StoreError::PermissionDenied(err.to_string())
        }
        // Changed since it was read; the next cycle sees the new version.
        object_store::Error::Precondition { .. } => {
            StoreError::Unavailable(format!("{id} changed during tier update: {err}"))
        }
        other => StoreError::Unavailable(other.to_string()),
    }
}

fn container_path(container: &str) -> ObjectPath {
    ObjectPath::from(container)
}

/// Decode the object name from the parts of `location` below `prefix`.
fn object_name(prefix: &ObjectPath, location: &ObjectPath) -> Option<String> {
    let parts = location
        .prefix_match(prefix)?
        .map(|part| {
            percent_decode_str(part.as_ref())
                .decode_utf8()
                .map(Cow::into_owned)
        })
        .collect::<Result<Vec<_>, _>>()
        .ok()?;
    (!parts.is_empty()).then(|| parts.join("/"))
}

pub struct ObjectStoreTierStore {
    inner: Arc<dyn ObjectStore>,
    tiers: ProviderTiers,
}

impl ObjectStoreTierStore {
    pub fn new(inner: Arc<dyn ObjectStore>) -> Self {
        Self {
            inner,
            tiers: ProviderTiers::Unmanaged,
        }
    }

    pub fn with_provider_tiers(mut self, tiers: ProviderTiers) -> Self {
        self.tiers = tiers;
        self
    }

    fn path(id: &ObjectId) -> ObjectPath {
        ObjectPath::from_iter(id.container.split('/').chain(id.name.split('/')))
    }

    /// Read the class and modification time recorded on an object.
    ///
    /// Returns `Ok(None)` when the object vanished or carries a class this
    /// engine does not know; such objects are left out of the snapshot.
    async fn describe(
        &self,
        id: ObjectId,
        location: ObjectPath,
    ) -> Result<Option<StoredObject>, StoreError> {
        let options = GetOptions {
            head: true,
            ..Default::default()
        };
        let result = match self.inner.get_opts(&location, options).await {
            Ok(result) => result,
            Err(object_store::Error::NotFound { .. }) => {
                tracing::debug!(object = %id, "Object disappeared while listing");
                return Ok(None);
            }
            Err(e) => return Err(classify(e, &id)),
        };

        let class = match result.attributes.get(&metadata_key(STORAGE_CLASS_ATTRIBUTE)) {
            Some(value) => match StorageClass::parse(value.as_ref()) {
                Ok(class) => class,
                Err(e) => {
                    tracing::warn!(object = %id, error = %e, "Skipping object with unrecognized storage class");
                    return Ok(None);
                }
            },
            None => StorageClass::Hot,
        };

        let last_modified = result
            .attributes
            .get(&metadata_key(CONTENT_MODIFIED_ATTRIBUTE))
            .and_then(|value| DateTime::parse_from_rfc3339(value.as_ref()).ok())
            .map(|ts| ts.with_timezone(&Utc))
            .unwrap_or(result.meta.last_modified);

        Ok(Some(StoredObject {
            id,
            last_modified,
            class,
            size: Some(result.meta.size),
        }))
    }
}

#[async_trait]
impl TierStore for ObjectStoreTierStore {
    async fn list(&self, container: &str) -> Result<Vec<StoredObject>, StoreError> {
        let prefix = container_path(container);
        let container_id = ObjectId::new(container, "");

        let metas: Vec<ObjectMeta> = self
            .inner
            .list(Some(&prefix))
            .try_collect()
            .await
            .map_err(|e| classify(e, &container_id))?;

        let mut located = Vec::with_capacity(metas.len());
        for meta in metas {
            match object_name(&prefix, &meta.location) {
                Some(name) => located.push((ObjectId::new(container, name), meta.location)),
                None => tracing::warn!(location = %meta.location, "Skipping object with undecodable name"),
            }
        }

        let described: Vec<Option<StoredObject>> = futures::stream::iter(located)
            .map(|(id, location)| self.describe(id, location))
            .buffered(LIST_METADATA_CONCURRENCY)
            .try_collect()
            .await?;

        Ok(described.into_iter().flatten().collect())
    }

    async fn set_tier(&self, id: &ObjectId, class: StorageClass) -> Result<(), StoreError> {
        let path = Self::path(id);
        let current = self
            .inner
            .get_opts(&path, GetOptions::default())
            .await
            .map_err(|e| classify(e, id))?;

        let mut attributes: Attributes = current.attributes.clone();
        let modified = current.meta.last_modified;
        let mode = match (&current.meta.e_tag, &current.meta.version) {
            (None, None) => PutMode::Overwrite,
            (e_tag, version) => PutMode::Update(UpdateVersion {
                e_tag: e_tag.clone(),
                version: version.clone(),
            }),
        };
        let data = current.bytes().await.map_err(|e| classify(e, id))?;

        attributes.insert(
            metadata_key(STORAGE_CLASS_ATTRIBUTE),
            AttributeValue::from(class.as_str()),
        );
        if let Some(tier) = self.tiers.tier_name(class) {
            attributes.insert(Attribute::StorageClass, AttributeValue::from(tier));
        }
        let content_modified = metadata_key(CONTENT_MODIFIED_ATTRIBUTE);
        if attributes.get(&content_modified).is_none() {
            attributes.insert(content_modified, AttributeValue::from(modified.to_rfc3339()));
        }

        let options = PutOptions {
            mode,
            attributes,
            ..Default::default()
        };
        self.inner
            .put_opts(&path, PutPayload::from(data), options)
            .await
            .map_err(|e| classify(e, id))?;

        Ok(())
    }

    async fn upload(&self, id: &ObjectId, data: Bytes) -> Result<(), StoreError> {
        self.inner
            .put(&Self::path(id), PutPayload::from(data))
            .await
            .map_err(|e| classify(e, id))?;
        Ok(())
    }

    async fn download(&self, id: &ObjectId) -> Result<Bytes, StoreError> {
        let result = self
            .inner
            .get(&Self::path(id))
            .await
            .map_err(|e| classify(e, id))?;
        result.bytes().await.map_err(|e| classify(e, id))
    }
}
