//! kube-runtime wiring: one watcher feeding the inventory, one controller per
//! watched kind.

use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use kube::runtime::controller::{Action, Controller};
use kube::runtime::reflector::ObjectRef;
use kube::runtime::watcher;
use kube::{Client, Resource};
use tether_core::{BuildRun, CustomRun, ObjectKey, PipelineRun, Run};
use tether_filter::owner_of;
use tether_inventory::Inventory;
use tether_kubehub::{scoped_api, KubeStore, RequiredResource};
use tracing::{debug, info, warn};

use crate::clock::{Clock, SystemClock};
use crate::customtask::{CustomTask, CustomTaskReconciler};
use crate::gate::ConcurrencyGate;
use crate::pipelinerun::PipelineRunReconciler;
use crate::{inventory_sync, Config, ReconcileError};

struct PipelineRunCtx {
    reconciler: PipelineRunReconciler<KubeStore>,
    error_requeue: Duration,
}

struct TaskCtx<K> {
    reconciler: CustomTaskReconciler<K, KubeStore>,
    error_requeue: Duration,
}

fn key_of<K: Resource>(obj: &K, kind: &'static str) -> Result<ObjectKey, ReconcileError> {
    ObjectKey::from_meta(obj.meta()).ok_or(ReconcileError::MissingKey(kind))
}

async fn reconcile_pipeline_run(pr: Arc<PipelineRun>, ctx: Arc<PipelineRunCtx>) -> Result<Action, ReconcileError> {
    let key = key_of(pr.as_ref(), "PipelineRun")?;
    ctx.reconciler.reconcile(&key).await
}

fn pipeline_run_error(pr: Arc<PipelineRun>, err: &ReconcileError, ctx: Arc<PipelineRunCtx>) -> Action {
    warn!(pipelinerun = ?pr.metadata.name, ns = ?pr.metadata.namespace, error = %err, "pipelinerun: reconcile failed");
    metrics::counter!("reconcile_errors_total", 1u64, "kind" => "PipelineRun", "cause" => err.metric_label());
    Action::requeue(ctx.error_requeue)
}

async fn reconcile_task<K: CustomTask>(run: Arc<K>, ctx: Arc<TaskCtx<K>>) -> Result<Action, ReconcileError> {
    let key = key_of(run.as_ref(), K::KIND.as_str())?;
    ctx.reconciler.reconcile(&key).await
}

fn task_error<K: CustomTask>(run: Arc<K>, err: &ReconcileError, ctx: Arc<TaskCtx<K>>) -> Action {
    warn!(kind = %K::KIND, name = ?run.meta().name, ns = ?run.meta().namespace, error = %err, "customtask: reconcile failed");
    metrics::counter!("reconcile_errors_total", 1u64, "kind" => K::KIND.as_str(), "cause" => err.metric_label());
    Action::requeue(ctx.error_requeue)
}

async fn run_pipeline_runs(client: Client, cfg: &Config, inventory: Arc<Inventory>, clock: Arc<dyn Clock>) {
    let store = Arc::new(KubeStore::new(client.clone()));
    let ctx = Arc::new(PipelineRunCtx {
        reconciler: PipelineRunReconciler::new(store, inventory, clock, cfg.default_pipeline_timeout, cfg.busy_requeue),
        error_requeue: cfg.error_requeue,
    });
    let api = scoped_api::<PipelineRun>(client, cfg.namespace.as_deref());
    info!(ns = ?cfg.namespace, "pipelinerun: controller starting");
    Controller::new(api, watcher::Config::default())
        .shutdown_on_signal()
        .run(reconcile_pipeline_run, pipeline_run_error, ctx)
        .for_each(|res| async move {
            match res {
                Ok((obj, _)) => debug!(pipelinerun = %obj, "pipelinerun: reconciled"),
                Err(e) => debug!(error = %e, "pipelinerun: controller event"),
            }
        })
        .await;
}

async fn run_custom_tasks<K: CustomTask>(client: Client, cfg: &Config, clock: Arc<dyn Clock>) {
    let store = Arc::new(KubeStore::new(client.clone()));
    let gate = ConcurrencyGate::new(cfg.custom_task_concurrency);
    let ctx = Arc::new(TaskCtx::<K> { reconciler: CustomTaskReconciler::new(store, clock, gate), error_requeue: cfg.error_requeue });
    let api = scoped_api::<K>(client.clone(), cfg.namespace.as_deref());
    let buildruns = scoped_api::<BuildRun>(client, cfg.namespace.as_deref());
    let owned = match K::KIND.owner_marker() {
        Some(marker) => watcher::Config::default().labels(marker),
        None => watcher::Config::default(),
    };
    info!(kind = %K::KIND, ns = ?cfg.namespace, concurrency = cfg.custom_task_concurrency, "customtask: controller starting");
    Controller::new(api, watcher::Config::default())
        .watches(buildruns, owned, |br: BuildRun| {
            owner_of(&br, K::KIND).map(|owner| ObjectRef::<K>::new(&owner.name).within(&owner.namespace))
        })
        .shutdown_on_signal()
        .run(reconcile_task::<K>, task_error::<K>, ctx)
        .for_each(|res| async move {
            match res {
                Ok((obj, _)) => debug!(kind = %K::KIND, object = %obj, "customtask: reconciled"),
                Err(e) => debug!(kind = %K::KIND, error = %e, "customtask: controller event"),
            }
        })
        .await;
}

/// Resources every controller in this process depends on.
pub fn required_resources(cfg: &Config) -> Vec<RequiredResource> {
    let mut out = vec![
        RequiredResource::of::<tether_core::Build>(),
        RequiredResource::of::<BuildRun>(),
        RequiredResource::of::<PipelineRun>(),
        RequiredResource::of::<CustomRun>(),
    ];
    if cfg.legacy_runs {
        out.push(RequiredResource::of::<Run>());
    }
    out
}

/// Runs the inventory watcher and all controllers until a shutdown signal
/// arrives or the Build watch ends.
pub async fn run(client: Client, cfg: Config) -> anyhow::Result<()> {
    let missing = tether_kubehub::missing_resources(client.clone(), &required_resources(&cfg)).await?;
    if !missing.is_empty() {
        let kinds: Vec<String> = missing.iter().map(RequiredResource::gvk_key).collect();
        warn!(missing = ?kinds, "runtime: some resources are not served, their controllers will idle");
    }

    let inventory = Arc::new(Inventory::new());
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let controllers = async {
        let legacy = async {
            if cfg.legacy_runs {
                run_custom_tasks::<Run>(client.clone(), &cfg, Arc::clone(&clock)).await;
            }
        };
        futures::join!(
            run_pipeline_runs(client.clone(), &cfg, Arc::clone(&inventory), Arc::clone(&clock)),
            run_custom_tasks::<CustomRun>(client.clone(), &cfg, Arc::clone(&clock)),
            legacy,
        );
    };

    tokio::select! {
        res = inventory_sync::run(client.clone(), cfg.namespace.clone(), Arc::clone(&inventory)) => res?,
        _ = controllers => info!("runtime: controllers shut down"),
    }
    Ok(())
}
