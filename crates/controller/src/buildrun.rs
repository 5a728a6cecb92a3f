//! BuildRun objects issued on behalf of watched objects.

use std::collections::BTreeMap;

use k8s_openapi::apimachinery::pkg::apis::meta::v1::{ObjectMeta, OwnerReference};
use kube::Resource;
use tether_core::shipwright::{BuildRef, BuildRunSpec};
use tether_core::{BuildRun, Kind, PipelineRun};
use tether_filter::params;

use crate::customtask::CustomTask;

fn owner_reference(kind: Kind, owner: &ObjectMeta, controller: bool) -> OwnerReference {
    OwnerReference {
        api_version: kind.api_version().to_string(),
        kind: kind.as_str().to_string(),
        name: owner.name.clone().unwrap_or_default(),
        uid: owner.uid.clone().unwrap_or_default(),
        controller: controller.then_some(true),
        block_owner_deletion: controller.then_some(true),
    }
}

/// BuildRun for `build_name`, named by the server from the `<build>-` prefix.
pub fn for_pipeline_run(pr: &PipelineRun, build_name: &str) -> BuildRun {
    let owner = pr.metadata.name.clone().unwrap_or_default();
    let mut annotations = BTreeMap::new();
    if let Some(marker) = Kind::PipelineRun.owner_marker() {
        annotations.insert(marker.to_string(), owner);
    }
    BuildRun {
        metadata: ObjectMeta {
            namespace: pr.metadata.namespace.clone(),
            generate_name: Some(format!("{build_name}-")),
            annotations: Some(annotations),
            owner_references: Some(vec![owner_reference(Kind::PipelineRun, &pr.metadata, false)]),
            ..Default::default()
        },
        spec: BuildRunSpec {
            build_ref: Some(BuildRef { name: build_name.to_string(), api_version: None }),
            ..Default::default()
        },
        status: None,
    }
}

/// BuildRun named `name` for a custom task, controlled by the task object.
pub fn for_custom_task<K: CustomTask>(run: &K, name: &str) -> BuildRun {
    let meta = run.meta();
    let mut labels = BTreeMap::new();
    if let Some(marker) = K::KIND.owner_marker() {
        labels.insert(marker.to_string(), meta.name.clone().unwrap_or_default());
    }
    let build_ref = run.build_ref().map(|r| BuildRef { name: r.name.clone(), api_version: Some(r.api_version.clone()) });
    BuildRun {
        metadata: ObjectMeta {
            namespace: meta.namespace.clone(),
            name: Some(name.to_string()),
            labels: Some(labels),
            owner_references: Some(vec![owner_reference(K::KIND, meta, true)]),
            ..Default::default()
        },
        spec: BuildRunSpec {
            build_ref,
            param_values: params::to_param_values(run.params()),
            timeout: run.timeout().map(str::to_string),
            state: None,
        },
        status: None,
    }
}
