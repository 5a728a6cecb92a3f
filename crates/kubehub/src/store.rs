//! Object store seam used by the reconcilers.

use std::fmt::Debug;

use k8s_openapi::NamespaceResourceScope;
use kube::Resource;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tether_core::ObjectKey;

/// Namespaced resource that can round-trip through the store.
pub trait StoredObject:
    Resource<DynamicType = (), Scope = NamespaceResourceScope> + Clone + Debug + Serialize + DeserializeOwned + Send + Sync + 'static
{
}

impl<K> StoredObject for K where
    K: Resource<DynamicType = (), Scope = NamespaceResourceScope> + Clone + Debug + Serialize + DeserializeOwned + Send + Sync + 'static
{
}

pub fn kind_of<K: StoredObject>() -> String { K::kind(&()).into_owned() }

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("{kind} {key} not found")]
    NotFound { kind: String, key: ObjectKey },
    #[error("{kind} {key} already exists")]
    AlreadyExists { kind: String, key: ObjectKey },
    #[error("conflict writing {kind} {key}")]
    Conflict { kind: String, key: ObjectKey },
    #[error("invalid {kind}: {reason}")]
    Invalid { kind: String, reason: String },
    #[error("codec: {0}")]
    Codec(#[from] serde_json::Error),
    #[error("kube api: {0}")]
    Api(#[from] kube::Error),
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

impl StoreError {
    pub fn is_not_found(&self) -> bool { matches!(self, StoreError::NotFound { .. }) }
    pub fn is_already_exists(&self) -> bool { matches!(self, StoreError::AlreadyExists { .. }) }
    pub fn is_conflict(&self) -> bool { matches!(self, StoreError::Conflict { .. }) }
}

/// Strongly consistent single-object reads and writes. Patches are JSON
/// merge patches; a `metadata.resourceVersion` inside the patch acts as an
/// optimistic concurrency precondition.
#[async_trait::async_trait]
pub trait ObjectStore: Send + Sync + 'static {
    async fn get<K: StoredObject>(&self, key: &ObjectKey) -> Result<Option<K>, StoreError>;

    /// Creates `obj`; when it has no name, `metadata.generateName` is used as
    /// prefix. Returns the stored object.
    async fn create<K: StoredObject>(&self, obj: &K) -> Result<K, StoreError>;

    /// Merge-patches the main resource (status changes are ignored).
    async fn patch<K: StoredObject>(&self, key: &ObjectKey, patch: &serde_json::Value) -> Result<K, StoreError>;

    /// Merge-patches the status subresource (only `status` is applied).
    async fn patch_status<K: StoredObject>(&self, key: &ObjectKey, patch: &serde_json::Value) -> Result<K, StoreError>;
}
