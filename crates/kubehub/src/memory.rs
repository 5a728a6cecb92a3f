//! In-memory `ObjectStore` with API-server-like semantics: generated names,
//! uids, resource versions, merge patches with a resourceVersion
//! precondition, and injectable failures.

use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use chrono::{SecondsFormat, Utc};
use serde_json::{json, Value};
use tether_core::{generate_name, ObjectKey};
use tracing::debug;

use crate::store::{kind_of, ObjectStore, StoreError, StoredObject};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verb {
    Get,
    Create,
    Patch,
    PatchStatus,
}

#[derive(Default)]
struct Inner {
    objects: BTreeMap<(String, ObjectKey), Value>,
    revision: u64,
    failures: Vec<(Verb, String)>,
}

impl Inner {
    fn take_failure(&mut self, verb: Verb, kind: &str) -> Result<(), StoreError> {
        match self.failures.iter().position(|(v, k)| *v == verb && k == kind) {
            Some(i) => {
                self.failures.remove(i);
                Err(StoreError::Unavailable(format!("injected {verb:?} failure for {kind}")))
            }
            None => Ok(()),
        }
    }

    fn next_revision(&mut self) -> String {
        self.revision += 1;
        self.revision.to_string()
    }
}

#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

/// RFC 7386 JSON merge patch.
fn merge(target: &mut Value, patch: &Value) {
    match patch {
        Value::Object(fields) => {
            if !target.is_object() {
                *target = Value::Object(Default::default());
            }
            if let Value::Object(map) = target {
                for (k, v) in fields {
                    if v.is_null() {
                        map.remove(k);
                    } else {
                        merge(map.entry(k.clone()).or_insert(Value::Null), v);
                    }
                }
            }
        }
        other => *target = other.clone(),
    }
}

fn resource_version(v: &Value) -> Option<&str> { v.pointer("/metadata/resourceVersion").and_then(Value::as_str) }

impl MemoryStore {
    pub fn new() -> Self { Self::default() }

    fn lock(&self) -> MutexGuard<'_, Inner> { self.inner.lock().unwrap_or_else(PoisonError::into_inner) }

    /// Seeds or replaces an object as is, assigning a uid and resource
    /// version. The object must carry namespace and name.
    pub fn insert<K: StoredObject>(&self, obj: &K) -> Result<K, StoreError> {
        let kind = kind_of::<K>();
        let key = ObjectKey::from_meta(obj.meta())
            .ok_or_else(|| StoreError::Invalid { kind: kind.clone(), reason: "missing namespace or name".into() })?;
        let mut value = serde_json::to_value(obj)?;
        let mut inner = self.lock();
        let rv = inner.next_revision();
        value["metadata"]["resourceVersion"] = json!(rv);
        if value.pointer("/metadata/uid").is_none() {
            value["metadata"]["uid"] = json!(uuid::Uuid::new_v4().to_string());
        }
        let out = serde_json::from_value(value.clone())?;
        inner.objects.insert((kind, key), value);
        Ok(out)
    }

    /// The next `verb` against `kind` fails with `StoreError::Unavailable`.
    pub fn fail_next(&self, verb: Verb, kind: &str) { self.lock().failures.push((verb, kind.to_string())); }

    /// All stored objects of kind `K`, ordered by key.
    pub fn list<K: StoredObject>(&self) -> Vec<K> {
        let kind = kind_of::<K>();
        self.lock()
            .objects
            .iter()
            .filter(|((k, _), _)| *k == kind)
            .filter_map(|(_, v)| serde_json::from_value(v.clone()).ok())
            .collect()
    }

    pub fn count<K: StoredObject>(&self) -> usize {
        let kind = kind_of::<K>();
        self.lock().objects.keys().filter(|(k, _)| *k == kind).count()
    }

    fn apply<K: StoredObject>(&self, verb: Verb, key: &ObjectKey, patch: Value) -> Result<K, StoreError> {
        let kind = kind_of::<K>();
        let mut inner = self.lock();
        inner.take_failure(verb, &kind)?;
        let rv = inner.next_revision();
        let current = inner
            .objects
            .get_mut(&(kind.clone(), key.clone()))
            .ok_or_else(|| StoreError::NotFound { kind: kind.clone(), key: key.clone() })?;
        if let Some(expected) = resource_version(&patch) {
            if resource_version(current) != Some(expected) {
                debug!(kind = %kind, key = %key, expected, "memory: resourceVersion precondition failed");
                return Err(StoreError::Conflict { kind, key: key.clone() });
            }
        }
        merge(current, &patch);
        current["metadata"]["resourceVersion"] = json!(rv);
        Ok(serde_json::from_value(current.clone())?)
    }
}

#[async_trait::async_trait]
impl ObjectStore for MemoryStore {
    async fn get<K: StoredObject>(&self, key: &ObjectKey) -> Result<Option<K>, StoreError> {
        let kind = kind_of::<K>();
        let mut inner = self.lock();
        inner.take_failure(Verb::Get, &kind)?;
        match inner.objects.get(&(kind, key.clone())) {
            Some(v) => Ok(Some(serde_json::from_value(v.clone())?)),
            None => Ok(None),
        }
    }

    async fn create<K: StoredObject>(&self, obj: &K) -> Result<K, StoreError> {
        let kind = kind_of::<K>();
        let meta = obj.meta();
        let namespace = meta
            .namespace
            .clone()
            .ok_or_else(|| StoreError::Invalid { kind: kind.clone(), reason: "missing metadata.namespace".into() })?;
        let name = match (meta.name.as_deref(), meta.generate_name.as_deref()) {
            (Some(n), _) if !n.is_empty() => n.to_string(),
            (_, Some(prefix)) if !prefix.is_empty() => generate_name(prefix),
            _ => return Err(StoreError::Invalid { kind, reason: "name or generateName is required".into() }),
        };
        let mut value = serde_json::to_value(obj)?;
        let key = ObjectKey::new(namespace, name.clone());
        let mut inner = self.lock();
        inner.take_failure(Verb::Create, &kind)?;
        if inner.objects.contains_key(&(kind.clone(), key.clone())) {
            return Err(StoreError::AlreadyExists { kind, key });
        }
        let rv = inner.next_revision();
        value["metadata"]["name"] = json!(name);
        value["metadata"]["resourceVersion"] = json!(rv);
        value["metadata"]["uid"] = json!(uuid::Uuid::new_v4().to_string());
        value["metadata"]["creationTimestamp"] = json!(Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true));
        let out = serde_json::from_value(value.clone())?;
        debug!(kind = %kind, key = %key, "memory: created");
        inner.objects.insert((kind, key), value);
        Ok(out)
    }

    async fn patch<K: StoredObject>(&self, key: &ObjectKey, patch: &Value) -> Result<K, StoreError> {
        let mut body = patch.clone();
        if let Some(fields) = body.as_object_mut() {
            fields.remove("status");
        }
        self.apply(Verb::Patch, key, body)
    }

    async fn patch_status<K: StoredObject>(&self, key: &ObjectKey, patch: &Value) -> Result<K, StoreError> {
        let mut body = json!({});
        if let Some(status) = patch.get("status") {
            body["status"] = status.clone();
        }
        if let Some(rv) = resource_version(patch) {
            body["metadata"] = json!({ "resourceVersion": rv });
        }
        self.apply(Verb::PatchStatus, key, body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tether_core::BuildRun;

    fn buildrun(name: Option<&str>, generate: Option<&str>) -> BuildRun {
        let mut br = BuildRun::default();
        br.metadata.namespace = Some("default".into());
        br.metadata.name = name.map(str::to_string);
        br.metadata.generate_name = generate.map(str::to_string);
        br
    }

    #[test]
    fn merge_follows_rfc7386() {
        let mut target = json!({ "a": "b", "c": { "d": "e", "f": "g" } });
        merge(&mut target, &json!({ "a": "z", "c": { "f": null } }));
        assert_eq!(target, json!({ "a": "z", "c": { "d": "e" } }));
        merge(&mut target, &json!({ "c": ["x"] }));
        assert_eq!(target["c"], json!(["x"]));
    }

    #[tokio::test]
    async fn create_generates_names_and_rejects_duplicates() {
        let store = MemoryStore::new();
        let created: BuildRun = store.create(&buildrun(None, Some("build-"))).await.unwrap();
        let name = created.metadata.name.clone().unwrap();
        assert!(name.starts_with("build-") && name.len() == "build-".len() + 5);
        assert!(created.metadata.uid.is_some());

        let fixed: BuildRun = store.create(&buildrun(Some("br"), None)).await.unwrap();
        assert_eq!(fixed.metadata.name.as_deref(), Some("br"));
        let dup = store.create(&buildrun(Some("br"), None)).await.unwrap_err();
        assert!(dup.is_already_exists());
        assert_eq!(store.count::<BuildRun>(), 2);

        assert!(matches!(store.create(&buildrun(None, None)).await, Err(StoreError::Invalid { .. })));
    }

    #[tokio::test]
    async fn patch_checks_resource_version_and_skips_status() {
        let store = MemoryStore::new();
        let seeded = store.insert(&buildrun(Some("br"), None)).unwrap();
        let key = ObjectKey::new("default", "br");
        let rv = seeded.metadata.resource_version.clone().unwrap();

        let stale = json!({ "metadata": { "resourceVersion": "stale", "labels": { "a": "b" } } });
        assert!(store.patch::<BuildRun>(&key, &stale).await.unwrap_err().is_conflict());

        let ok = json!({ "metadata": { "resourceVersion": rv, "labels": { "a": "b" } }, "status": { "conditions": [] } });
        let patched: BuildRun = store.patch(&key, &ok).await.unwrap();
        assert_eq!(patched.metadata.labels.unwrap()["a"], "b");
        assert!(patched.status.is_none());
        assert_ne!(patched.metadata.resource_version.as_deref(), Some(rv.as_str()));

        let missing = ObjectKey::new("default", "nope");
        assert!(store.patch::<BuildRun>(&missing, &json!({})).await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn patch_status_only_touches_status() {
        let store = MemoryStore::new();
        store.insert(&buildrun(Some("br"), None)).unwrap();
        let key = ObjectKey::new("default", "br");
        let patch = json!({ "metadata": { "labels": { "a": "b" } }, "spec": { "state": "BuildRunCanceled" }, "status": { "conditions": [] } });
        let patched: BuildRun = store.patch_status(&key, &patch).await.unwrap();
        assert!(patched.status.is_some());
        assert!(patched.metadata.labels.is_none());
        assert!(patched.spec.state.is_none());
    }

    #[tokio::test]
    async fn injected_failures_fire_once() {
        let store = MemoryStore::new();
        store.fail_next(Verb::Create, "BuildRun");
        assert!(matches!(store.create(&buildrun(Some("br"), None)).await, Err(StoreError::Unavailable(_))));
        let created: BuildRun = store.create(&buildrun(Some("br"), None)).await.unwrap();
        assert_eq!(created.metadata.name.as_deref(), Some("br"));
        assert_eq!(store.list::<BuildRun>().len(), 1);
    }
}
