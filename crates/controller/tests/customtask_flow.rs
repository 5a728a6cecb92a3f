use std::sync::Arc;
use std::time::Duration;

use chrono::{TimeZone, Utc};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::Time;
use serde_json::{json, Value};
use tether_controller::gate::ConcurrencyGate;
use tether_controller::{Clock, CustomTask, CustomTaskReconciler, FixedClock, ReconcileError};
use tether_core::condition::{SEVERITY_INFO, SUCCEEDED};
use tether_core::shipwright::BUILDRUN_STATE_CANCEL;
use tether_core::{BuildRun, CustomRun, ObjectKey, Run, OWNED_BY_CUSTOMRUN, OWNED_BY_RUN};
use tether_filter::correlator;
use tether_kubehub::{MemoryStore, ObjectStore, StoredObject, Verb};

fn now() -> chrono::DateTime<Utc> { Utc.with_ymd_and_hms(2023, 5, 1, 12, 0, 0).unwrap() }

fn clock() -> Arc<dyn Clock> { Arc::new(FixedClock(now())) }

fn custom_run_value(name: &str) -> Value {
    json!({
        "metadata": { "name": name, "namespace": "default" },
        "spec": {
            "customRef": { "apiVersion": "shipwright.io/v1alpha1", "kind": "Build", "name": "build" },
            "params": [ { "name": "tag", "value": "latest" }, { "name": "args", "value": ["a", "b"] } ],
            "timeout": "10m"
        }
    })
}

fn seed<K: StoredObject>(store: &MemoryStore, value: Value) -> ObjectKey {
    let obj: K = serde_json::from_value(value).unwrap();
    let stored = store.insert(&obj).unwrap();
    ObjectKey::from_meta(stored.meta()).unwrap()
}

fn reconciler<K: CustomTask>(store: &Arc<MemoryStore>) -> CustomTaskReconciler<K, MemoryStore> {
    CustomTaskReconciler::new(Arc::clone(store), clock(), ConcurrencyGate::new(1))
}

async fn fetch<K: StoredObject>(store: &MemoryStore, key: &ObjectKey) -> K { store.get::<K>(key).await.unwrap().unwrap() }

async fn recorded_buildrun(store: &MemoryStore, key: &ObjectKey) -> ObjectKey {
    let run: CustomRun = fetch(store, key).await;
    correlator::read(run.status.as_ref()).unwrap().key()
}

#[tokio::test]
async fn first_pass_records_coordinates_then_creates() {
    let store = Arc::new(MemoryStore::new());
    let key = seed::<CustomRun>(&store, custom_run_value("custom-run"));
    let r = reconciler::<CustomRun>(&store);

    r.reconcile(&key).await.unwrap();
    let run: CustomRun = fetch(&store, &key).await;
    let status = run.status.clone().unwrap();
    assert_eq!(status.start_time, Some(Time(now())));
    let br_key = correlator::read(Some(&status)).unwrap().key();
    assert_eq!(br_key.namespace, "default");
    assert!(br_key.name.starts_with("custom-run-"));

    let br: BuildRun = fetch(&store, &br_key).await;
    assert_eq!(br.metadata.labels.as_ref().unwrap()[OWNED_BY_CUSTOMRUN], "custom-run");
    let owner = &br.metadata.owner_references.as_ref().unwrap()[0];
    assert_eq!((owner.kind.as_str(), owner.name.as_str(), owner.controller), ("CustomRun", "custom-run", Some(true)));
    assert_eq!(owner.uid, run.metadata.uid.clone().unwrap());
    assert_eq!(br.spec.build_ref.as_ref().unwrap().name, "build");
    assert_eq!(br.spec.param_values.len(), 2);
    assert_eq!(br.spec.timeout.as_deref(), Some("10m"));

    // later passes only mirror; the BuildRun has no conditions yet
    r.reconcile(&key).await.unwrap();
    r.reconcile(&key).await.unwrap();
    assert_eq!(store.count::<BuildRun>(), 1);
    let run: CustomRun = fetch(&store, &key).await;
    let conditions = run.status.unwrap().conditions;
    assert_eq!(conditions.len(), 1);
    assert_eq!(conditions[0].type_, SUCCEEDED);
    assert!(conditions[0].is_unknown());
}

#[tokio::test]
async fn crash_after_status_persist_recreates_under_recorded_name() {
    let store = Arc::new(MemoryStore::new());
    let key = seed::<CustomRun>(&store, custom_run_value("custom-run"));
    let r = reconciler::<CustomRun>(&store);

    store.fail_next(Verb::Create, "BuildRun");
    let err = r.reconcile(&key).await.unwrap_err();
    assert!(matches!(err, ReconcileError::Store(_)));
    assert_eq!(store.count::<BuildRun>(), 0);
    let recorded = recorded_buildrun(&store, &key).await;

    r.reconcile(&key).await.unwrap();
    let issued = store.list::<BuildRun>();
    assert_eq!(issued.len(), 1);
    assert_eq!(issued[0].metadata.name.as_deref(), Some(recorded.name.as_str()));
    // the correlation record never moves
    assert_eq!(recorded_buildrun(&store, &key).await, recorded);
}

#[tokio::test]
async fn buildrun_status_is_mirrored_until_done() {
    let store = Arc::new(MemoryStore::new());
    let key = seed::<CustomRun>(&store, custom_run_value("custom-run"));
    let r = reconciler::<CustomRun>(&store);
    r.reconcile(&key).await.unwrap();
    let br_key = recorded_buildrun(&store, &key).await;

    let done = json!({ "status": {
        "completionTime": "2023-05-01T12:30:00Z",
        "conditions": [ { "type": "Succeeded", "status": "True", "reason": "Succeeded" } ]
    } });
    store.patch_status::<BuildRun>(&br_key, &done).await.unwrap();
    r.reconcile(&key).await.unwrap();

    let run: CustomRun = fetch(&store, &key).await;
    assert!(run.is_done());
    let status = run.status.clone().unwrap();
    assert_eq!(status.completion_time, Some(Time(Utc.with_ymd_and_hms(2023, 5, 1, 12, 30, 0).unwrap())));
    assert!(status.conditions[0].is_true());
    assert_eq!(status.conditions[0].severity.as_deref(), Some(SEVERITY_INFO));

    // done runs are left alone
    let version = run.metadata.resource_version.clone();
    r.reconcile(&key).await.unwrap();
    let again: CustomRun = fetch(&store, &key).await;
    assert_eq!(again.metadata.resource_version, version);
}

#[tokio::test]
async fn cancellation_is_propagated_to_the_buildrun() {
    let store = Arc::new(MemoryStore::new());
    let key = seed::<CustomRun>(&store, custom_run_value("custom-run"));
    let r = reconciler::<CustomRun>(&store);
    r.reconcile(&key).await.unwrap();
    let br_key = recorded_buildrun(&store, &key).await;

    store.patch::<CustomRun>(&key, &json!({ "spec": { "status": "RunCancelled" } })).await.unwrap();
    r.reconcile(&key).await.unwrap();
    let br: BuildRun = fetch(&store, &br_key).await;
    assert_eq!(br.spec.state.as_deref(), Some(BUILDRUN_STATE_CANCEL));
    assert!(br.is_canceled());
}

#[tokio::test]
async fn cancelled_before_issuance_creates_nothing() {
    let store = Arc::new(MemoryStore::new());
    let mut value = custom_run_value("custom-run");
    value["spec"]["status"] = json!("RunCancelled");
    let key = seed::<CustomRun>(&store, value);
    let r = reconciler::<CustomRun>(&store);

    r.reconcile(&key).await.unwrap();
    assert_eq!(store.count::<BuildRun>(), 0);
    let run: CustomRun = fetch(&store, &key).await;
    assert!(run.status.is_none());
}

#[tokio::test]
async fn runs_for_other_kinds_are_ignored() {
    let store = Arc::new(MemoryStore::new());
    let mut value = custom_run_value("custom-run");
    value["spec"]["customRef"]["kind"] = json!("Task");
    let key = seed::<CustomRun>(&store, value);
    let r = reconciler::<CustomRun>(&store);

    r.reconcile(&key).await.unwrap();
    r.reconcile(&ObjectKey::new("default", "missing")).await.unwrap();
    assert_eq!(store.count::<BuildRun>(), 0);
}

#[tokio::test]
async fn undecodable_extra_fields_fail_the_pass() {
    let store = Arc::new(MemoryStore::new());
    let mut value = custom_run_value("custom-run");
    value["status"] = json!({ "extraFields": { "buildRunName": 42 } });
    let key = seed::<CustomRun>(&store, value);
    let r = reconciler::<CustomRun>(&store);

    let err = r.reconcile(&key).await.unwrap_err();
    assert!(matches!(err, ReconcileError::Filter(_)));
    assert_eq!(store.count::<BuildRun>(), 0);
}

#[tokio::test]
async fn legacy_runs_use_the_same_protocol() {
    let store = Arc::new(MemoryStore::new());
    let key = seed::<Run>(
        &store,
        json!({
            "metadata": { "name": "run", "namespace": "default" },
            "spec": { "ref": { "apiVersion": "shipwright.io/v1alpha1", "kind": "Build", "name": "build" } }
        }),
    );
    let r = reconciler::<Run>(&store);
    r.reconcile(&key).await.unwrap();

    let run: Run = fetch(&store, &key).await;
    let br_key = correlator::read(run.status.as_ref()).unwrap().key();
    let br: BuildRun = fetch(&store, &br_key).await;
    assert_eq!(br.metadata.labels.as_ref().unwrap()[OWNED_BY_RUN], "run");
    let owner = &br.metadata.owner_references.as_ref().unwrap()[0];
    assert_eq!((owner.kind.as_str(), owner.api_version.as_str()), ("Run", "tekton.dev/v1alpha1"));
}

#[tokio::test]
async fn gate_serializes_reconciliations() {
    let store = Arc::new(MemoryStore::new());
    let key = seed::<CustomRun>(&store, custom_run_value("custom-run"));
    let gate = ConcurrencyGate::new(1);
    let r = CustomTaskReconciler::<CustomRun, _>::new(Arc::clone(&store), clock(), gate.clone());

    let permit = gate.acquire().await.unwrap();
    assert!(tokio::time::timeout(Duration::from_millis(50), r.reconcile(&key)).await.is_err());
    assert_eq!(store.count::<BuildRun>(), 0);
    drop(permit);

    r.reconcile(&key).await.unwrap();
    assert_eq!(store.count::<BuildRun>(), 1);
}
