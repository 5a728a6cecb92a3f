//! `ObjectStore` backed by the Kubernetes API server.

use kube::api::{Api, Patch, PatchParams, PostParams};
use kube::{Client, ResourceExt};
use metrics::counter;
use serde_json::Value;
use tether_core::ObjectKey;
use tracing::debug;

use crate::store::{kind_of, ObjectStore, StoreError, StoredObject};

#[derive(Clone)]
pub struct KubeStore {
    client: Client,
}

impl KubeStore {
    pub fn new(client: Client) -> Self { Self { client } }

    fn api<K: StoredObject>(&self, namespace: &str) -> Api<K> { Api::namespaced(self.client.clone(), namespace) }
}

fn map_err<K: StoredObject>(key: &ObjectKey, err: kube::Error) -> StoreError {
    let status = match &err {
        kube::Error::Api(resp) => Some((resp.code, resp.reason.clone())),
        _ => None,
    };
    let kind = kind_of::<K>();
    match status {
        Some((404, _)) => StoreError::NotFound { kind, key: key.clone() },
        Some((409, reason)) if reason == "AlreadyExists" => StoreError::AlreadyExists { kind, key: key.clone() },
        Some((409, _)) => StoreError::Conflict { kind, key: key.clone() },
        _ => StoreError::Api(err),
    }
}

fn record(verb: &'static str, kind: String, result: &Result<impl Sized, StoreError>) {
    let outcome = if result.is_ok() { "ok" } else { "error" };
    counter!("store_requests_total", 1u64, "verb" => verb, "kind" => kind, "outcome" => outcome);
}

#[async_trait::async_trait]
impl ObjectStore for KubeStore {
    async fn get<K: StoredObject>(&self, key: &ObjectKey) -> Result<Option<K>, StoreError> {
        let res = self.api::<K>(&key.namespace).get_opt(&key.name).await.map_err(|e| map_err::<K>(key, e));
        record("get", kind_of::<K>(), &res);
        res
    }

    async fn create<K: StoredObject>(&self, obj: &K) -> Result<K, StoreError> {
        let namespace = obj
            .namespace()
            .ok_or_else(|| StoreError::Invalid { kind: kind_of::<K>(), reason: "missing metadata.namespace".into() })?;
        let name = obj.meta().name.clone().or_else(|| obj.meta().generate_name.clone()).unwrap_or_default();
        let key = ObjectKey::new(namespace.clone(), name);
        let res = self.api::<K>(&namespace).create(&PostParams::default(), obj).await.map_err(|e| map_err::<K>(&key, e));
        record("create", kind_of::<K>(), &res);
        if let Ok(created) = &res {
            debug!(kind = %kind_of::<K>(), ns = %namespace, name = %created.name_any(), "store: created");
        }
        res
    }

    async fn patch<K: StoredObject>(&self, key: &ObjectKey, patch: &Value) -> Result<K, StoreError> {
        let res = self
            .api::<K>(&key.namespace)
            .patch(&key.name, &PatchParams::default(), &Patch::Merge(patch))
            .await
            .map_err(|e| map_err::<K>(key, e));
        record("patch", kind_of::<K>(), &res);
        res
    }

    async fn patch_status<K: StoredObject>(&self, key: &ObjectKey, patch: &Value) -> Result<K, StoreError> {
        let res = self
            .api::<K>(&key.namespace)
            .patch_status(&key.name, &PatchParams::default(), &Patch::Merge(patch))
            .await
            .map_err(|e| map_err::<K>(key, e));
        record("patch_status", kind_of::<K>(), &res);
        res
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kube::error::ErrorResponse;
    use tether_core::BuildRun;

    fn api_error(code: u16, reason: &str) -> kube::Error {
        kube::Error::Api(ErrorResponse { status: "Failure".into(), message: String::new(), reason: reason.into(), code })
    }

    #[test]
    fn maps_api_status_codes() {
        let key = ObjectKey::new("default", "br");
        assert!(map_err::<BuildRun>(&key, api_error(404, "NotFound")).is_not_found());
        assert!(map_err::<BuildRun>(&key, api_error(409, "AlreadyExists")).is_already_exists());
        assert!(map_err::<BuildRun>(&key, api_error(409, "Conflict")).is_conflict());
        assert!(matches!(map_err::<BuildRun>(&key, api_error(500, "InternalError")), StoreError::Api(_)));
    }
}
