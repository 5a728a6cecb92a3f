//! Correlator path: one BuildRun per Run or CustomRun, its coordinates kept
//! in the run's `status.extraFields`.

use std::marker::PhantomData;
use std::sync::Arc;
use std::time::Instant;

use k8s_openapi::apimachinery::pkg::apis::meta::v1::Time;
use kube::runtime::controller::Action;
use metrics::{counter, histogram};
use serde_json::json;
use tether_core::shipwright::BUILDRUN_STATE_CANCEL;
use tether_core::tekton::{EmbeddedRef, Param, RunStatus, RUN_CANCELLED};
use tether_core::{condition, generate_name, BuildRun, CustomRun, Kind, ObjectKey, Run};
use tether_filter::{admits, correlator, mirror, ExtraFields, Watched};
use tether_kubehub::{ObjectStore, StoredObject};
use tracing::{debug, info, warn};

use crate::clock::Clock;
use crate::gate::ConcurrencyGate;
use crate::{buildrun, ReconcileError};

/// Watched task kinds that delegate their work to a single BuildRun.
pub trait CustomTask: StoredObject {
    const KIND: Kind;

    fn build_ref(&self) -> Option<&EmbeddedRef>;
    fn params(&self) -> &[Param];
    fn timeout(&self) -> Option<&str>;
    fn spec_status(&self) -> Option<&str>;
    fn run_status(&self) -> Option<&RunStatus>;
    fn watched(&self) -> Watched<'_>;

    fn is_cancelled(&self) -> bool { self.spec_status() == Some(RUN_CANCELLED) }

    fn is_done(&self) -> bool { self.run_status().map(|s| condition::is_done(&s.conditions)).unwrap_or(false) }
}

impl CustomTask for Run {
    const KIND: Kind = Kind::Run;

    fn build_ref(&self) -> Option<&EmbeddedRef> { self.spec.reference.as_ref() }
    fn params(&self) -> &[Param] { &self.spec.params }
    fn timeout(&self) -> Option<&str> { self.spec.timeout.as_deref() }
    fn spec_status(&self) -> Option<&str> { self.spec.status.as_deref() }
    fn run_status(&self) -> Option<&RunStatus> { self.status.as_ref() }
    fn watched(&self) -> Watched<'_> { Watched::Run(self) }
}

impl CustomTask for CustomRun {
    const KIND: Kind = Kind::CustomRun;

    fn build_ref(&self) -> Option<&EmbeddedRef> { self.spec.custom_ref.as_ref() }
    fn params(&self) -> &[Param] { &self.spec.params }
    fn timeout(&self) -> Option<&str> { self.spec.timeout.as_deref() }
    fn spec_status(&self) -> Option<&str> { self.spec.status.as_deref() }
    fn run_status(&self) -> Option<&RunStatus> { self.status.as_ref() }
    fn watched(&self) -> Watched<'_> { Watched::CustomRun(self) }
}

pub struct CustomTaskReconciler<K, S> {
    store: Arc<S>,
    clock: Arc<dyn Clock>,
    gate: ConcurrencyGate,
    _kind: PhantomData<fn() -> K>,
}

impl<K: CustomTask, S: ObjectStore> CustomTaskReconciler<K, S> {
    pub fn new(store: Arc<S>, clock: Arc<dyn Clock>, gate: ConcurrencyGate) -> Self {
        Self { store, clock, gate, _kind: PhantomData }
    }

    /// Serialized through the gate, so at most the configured number of
    /// correlator read-modify-write cycles run at once for this kind.
    pub async fn reconcile(&self, key: &ObjectKey) -> Result<Action, ReconcileError> {
        let _permit = self.gate.acquire().await?;
        let started = Instant::now();
        let res = self.sync(key).await;
        histogram!("reconcile_ms", started.elapsed().as_secs_f64() * 1000.0, "kind" => K::KIND.as_str());
        res
    }

    async fn sync(&self, key: &ObjectKey) -> Result<Action, ReconcileError> {
        let Some(run) = self.store.get::<K>(key).await? else {
            debug!(kind = %K::KIND, key = %key, "customtask: object gone");
            return Ok(Action::await_change());
        };
        if !admits(K::KIND, &run.watched()) {
            return Ok(Action::await_change());
        }
        if run.is_done() {
            debug!(kind = %K::KIND, key = %key, "customtask: synchronized, all done");
            return Ok(Action::await_change());
        }

        let extra = correlator::read(run.run_status())?;
        if extra.is_empty() {
            return self.issue(key, &run).await;
        }

        let br_key = extra.key();
        match self.store.get::<BuildRun>(&br_key).await? {
            None => {
                warn!(kind = %K::KIND, key = %key, buildrun = %br_key, "customtask: recorded buildrun missing, re-creating");
                self.create(&buildrun::for_custom_task(&run, &br_key.name)).await?;
            }
            Some(br) if run.is_cancelled() && !br.is_canceled() => {
                info!(kind = %K::KIND, key = %key, buildrun = %br_key, "customtask: cancelled, cancelling buildrun");
                let patch = json!({ "spec": { "state": BUILDRUN_STATE_CANCEL } });
                self.store.patch::<BuildRun>(&br_key, &patch).await?;
            }
            Some(br) => {
                let mut status = run.run_status().cloned().unwrap_or_default();
                mirror::reflect_build_run(&mut status, &br, self.clock.now());
                self.store.patch_status::<K>(key, &mirror::status_patch(&status)).await?;
                debug!(kind = %K::KIND, key = %key, buildrun = %br_key, "customtask: status mirrored");
            }
        }
        Ok(Action::await_change())
    }

    /// Records the BuildRun coordinates first, then creates the BuildRun. A
    /// crash in between is repaired by the next pass, which re-creates the
    /// recorded name.
    async fn issue(&self, key: &ObjectKey, run: &K) -> Result<Action, ReconcileError> {
        if run.is_cancelled() {
            info!(kind = %K::KIND, key = %key, "customtask: cancelled before a buildrun was issued");
            return Ok(Action::await_change());
        }
        let br = buildrun::for_custom_task(run, &generate_name(&format!("{}-", key.name)));
        let extra = ExtraFields::for_build_run(&br);
        let patch = json!({ "status": { "extraFields": extra.encode()?, "startTime": Time(self.clock.now()) } });
        self.store.patch_status::<K>(key, &patch).await?;
        info!(kind = %K::KIND, key = %key, buildrun = %extra.key(), "customtask: buildrun coordinates recorded");

        self.create(&br).await?;
        counter!("buildruns_issued_total", 1u64, "owner" => K::KIND.as_str());
        Ok(Action::await_change())
    }

    async fn create(&self, br: &BuildRun) -> Result<(), ReconcileError> {
        match self.store.create(br).await {
            Ok(created) => {
                info!(kind = %K::KIND, buildrun = ?created.metadata.name, "customtask: buildrun created");
                Ok(())
            }
            Err(e) if e.is_already_exists() => {
                debug!(kind = %K::KIND, buildrun = ?br.metadata.name, "customtask: buildrun already exists");
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }
}
