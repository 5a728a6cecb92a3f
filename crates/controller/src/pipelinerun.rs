//! Ledger path: a PipelineRun may trigger many BuildRuns over its lifetime,
//! each recorded in the triggered-builds annotation so repeated
//! reconciliations issue nothing new.

use std::sync::Arc;
use std::time::{Duration, Instant};

use kube::runtime::controller::Action;
use metrics::{counter, histogram};
use tether_core::shipwright::TriggerType;
use tether_core::{Kind, ObjectKey, PipelineRun};
use tether_filter::ledger::{self, LedgerUpdate, TriggeredBuild};
use tether_filter::{admits, labels, pipelinerun, Watched};
use tether_inventory::{extract_build_names, Inventory};
use tether_kubehub::ObjectStore;
use tracing::{debug, info, warn};

use crate::buildrun;
use crate::clock::Clock;
use crate::gate::InFlight;
use crate::ReconcileError;

pub struct PipelineRunReconciler<S> {
    store: Arc<S>,
    inventory: Arc<Inventory>,
    clock: Arc<dyn Clock>,
    in_flight: InFlight,
    default_timeout: Duration,
    busy_requeue: Duration,
}

impl<S: ObjectStore> PipelineRunReconciler<S> {
    pub fn new(store: Arc<S>, inventory: Arc<Inventory>, clock: Arc<dyn Clock>, default_timeout: Duration, busy_requeue: Duration) -> Self {
        Self { store, inventory, clock, in_flight: InFlight::new(), default_timeout, busy_requeue }
    }

    pub fn in_flight(&self) -> &InFlight { &self.in_flight }

    pub async fn reconcile(&self, key: &ObjectKey) -> Result<Action, ReconcileError> {
        let Some(_guard) = self.in_flight.try_acquire(key) else {
            debug!(pipelinerun = %key, "pipelinerun: already in flight, requeueing");
            return Ok(Action::requeue(self.busy_requeue));
        };
        let started = Instant::now();
        let res = self.sync(key).await;
        histogram!("reconcile_ms", started.elapsed().as_secs_f64() * 1000.0, "kind" => Kind::PipelineRun.as_str());
        res
    }

    /// Prior ledger entries, trusted only while the object still carries its
    /// own name in the re-run guard annotation.
    fn prior_entries(key: &ObjectKey, pr: &PipelineRun) -> Vec<TriggeredBuild> {
        if !ledger::name_matches_annotation(&pr.metadata) {
            debug!(pipelinerun = %key, "pipelinerun: annotated name does not match, ignoring prior ledger");
            return Vec::new();
        }
        ledger::extract_entries(&pr.metadata).unwrap_or_else(|err| {
            warn!(pipelinerun = %key, error = %err, "pipelinerun: unreadable triggered-builds ledger, treating as empty");
            counter!("ledger_decode_errors_total", 1u64);
            Vec::new()
        })
    }

    async fn sync(&self, key: &ObjectKey) -> Result<Action, ReconcileError> {
        let Some(pr) = self.store.get::<PipelineRun>(key).await? else {
            debug!(pipelinerun = %key, "pipelinerun: object gone");
            return Ok(Action::await_change());
        };
        if !admits(Kind::PipelineRun, &Watched::PipelineRun(&pr)) {
            return Ok(Action::await_change());
        }

        let query = pipelinerun::to_object_ref(&pr, self.clock.now(), self.default_timeout)?;
        debug!(pipelinerun = %key, name = %query.name, status = ?query.status, selector = ?query.selector, "pipelinerun: searching builds");
        let found = self.inventory.search_by_object_ref(TriggerType::Pipeline, &query);
        if found.is_empty() {
            return Ok(Action::await_change());
        }
        let build_names = extract_build_names(&found);

        let prior = Self::prior_entries(key, &pr);
        if ledger::contains(&prior, &build_names, &query) {
            debug!(pipelinerun = %key, builds = ?build_names, "pipelinerun: buildruns already issued");
            return Ok(Action::await_change());
        }

        let mut issued = Vec::with_capacity(build_names.len());
        for build in &build_names {
            let created = self.store.create(&buildrun::for_pipeline_run(&pr, build)).await?;
            let name = created.metadata.name.unwrap_or_default();
            info!(pipelinerun = %key, build = %build, buildrun = %name, "pipelinerun: buildrun issued");
            counter!("buildruns_issued_total", 1u64, "owner" => Kind::PipelineRun.as_str());
            issued.push(name);
        }

        let update = LedgerUpdate {
            name: key.name.clone(),
            ledger: ledger::append_and_encode(&prior, &build_names, &query)?,
            issued_label: labels::append_issued(&pr.metadata, &issued),
        };
        self.store.patch::<PipelineRun>(key, &update.to_patch()).await?;
        info!(pipelinerun = %key, issued = ?issued, "pipelinerun: ledger updated");
        Ok(Action::await_change())
    }
}
