//! Object-storage capability consumed by the lifecycle engine.
//!
//! The engine only needs to list a container, change an object's storage
//! class, and move bytes in and out. [`memory::InMemoryTierStore`] backs tests
//! and local runs; [`object::ObjectStoreTierStore`] adapts any
//! `object_store` backend (local disk, S3, Azure Blob Storage).

pub mod memory;
pub mod object;

use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use crate::model::{ObjectId, StorageClass, StoredObject};

pub use memory::InMemoryTierStore;
pub use object::{ObjectStoreTierStore, ProviderTiers};

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TierStore: Send + Sync {
    /// Snapshot of every object in `container`.
    async fn list(&self, container: &str) -> Result<Vec<StoredObject>, StoreError>;

    /// Move an object to another storage class.
    async fn set_tier(&self, id: &ObjectId, class: StorageClass) -> Result<(), StoreError>;

    /// Store `data` under `id`, replacing any existing object.
    async fn upload(&self, id: &ObjectId, data: Bytes) -> Result<(), StoreError>;

    async fn download(&self, id: &ObjectId) -> Result<Bytes, StoreError>;
}

/// Classification of a failed store call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FailureKind {
    /// Transient network or service error; retried on the next cycle.
    StoreUnavailable,
    /// The object disappeared between listing and the call.
    ObjectNotFound,
    /// Not retried automatically.
    PermissionDenied,
}

impl FailureKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureKind::StoreUnavailable => "store_unavailable",
            FailureKind::ObjectNotFound => "object_not_found",
            FailureKind::PermissionDenied => "permission_denied",
        }
    }

    /// Whether re-running the same transition next cycle may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, FailureKind::StoreUnavailable)
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("Object store unavailable: {0}")]
    Unavailable(String),

    #[error("Object not found: {0}")]
    NotFound(ObjectId),

    #[error("Permission denied: {0}")]
    PermissionDenied(String),
}

impl StoreError {
    pub fn kind(&self) -> FailureKind {
        match self {
            StoreError::Unavailable(_) => FailureKind::StoreUnavailable,
            StoreError::NotFound(_) => FailureKind::ObjectNotFound,
            StoreError::PermissionDenied(_) => FailureKind::PermissionDenied,
        }
    }
}
