//! Tekton `Run` (tekton.dev/v1alpha1), `CustomRun` and `PipelineRun`
//! (tekton.dev/v1beta1), limited to the fields this subsystem reads or writes.

use std::collections::BTreeMap;

use k8s_openapi::apimachinery::pkg::apis::meta::v1::{ObjectMeta, Time};
use serde::{Deserialize, Serialize};

use crate::condition::{self, Condition};
use crate::{BUILD_KIND, SHIPWRIGHT_API_VERSION};

/// `spec.status` of a cancelled Run or CustomRun.
pub const RUN_CANCELLED: &str = "RunCancelled";
/// `spec.status` values of a cancelled PipelineRun.
pub const PIPELINERUN_CANCELLED: &[&str] = &["Cancelled", "PipelineRunCancelled"];

/// Typed reference to another resource (`taskRef`, `ref`, `customRef`).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmbeddedRef {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub api_version: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub name: String,
}

impl EmbeddedRef {
    /// True when this points at a Shipwright `Build`.
    pub fn is_shipwright_build(&self) -> bool {
        self.api_version == SHIPWRIGHT_API_VERSION && self.kind == BUILD_KIND
    }
}

/// Tekton parameter value: a string, an array or an object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamInput {
    String(String),
    Array(Vec<String>),
    Object(BTreeMap<String, String>),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Param {
    pub name: String,
    pub value: ParamInput,
}

/// Status shared by Run and CustomRun.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunStatus {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<Condition>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_time: Option<Time>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completion_time: Option<Time>,
    /// Opaque extension owned by the custom task controller.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extra_fields: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunSpec {
    #[serde(default, rename = "ref", skip_serializing_if = "Option::is_none")]
    pub reference: Option<EmbeddedRef>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub params: Vec<Param>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Run {
    pub metadata: ObjectMeta,
    #[serde(default)]
    pub spec: RunSpec,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<RunStatus>,
}

namespaced_resource!(Run, "tekton.dev", "v1alpha1", "runs");

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomRunSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom_ref: Option<EmbeddedRef>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub params: Vec<Param>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CustomRun {
    pub metadata: ObjectMeta,
    #[serde(default)]
    pub spec: CustomRunSpec,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<RunStatus>,
}

namespaced_resource!(CustomRun, "tekton.dev", "v1beta1", "customruns");

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineRef {
    #[serde(default)]
    pub name: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeoutFields {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pipeline: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineRunSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pipeline_ref: Option<PipelineRef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeouts: Option<TimeoutFields>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineTask {
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_ref: Option<EmbeddedRef>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineSpec {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tasks: Vec<PipelineTask>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineRunStatus {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<Condition>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_time: Option<Time>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completion_time: Option<Time>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pipeline_spec: Option<PipelineSpec>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PipelineRun {
    pub metadata: ObjectMeta,
    #[serde(default)]
    pub spec: PipelineRunSpec,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<PipelineRunStatus>,
}

namespaced_resource!(PipelineRun, "tekton.dev", "v1beta1", "pipelineruns");

impl PipelineRun {
    pub fn conditions(&self) -> &[Condition] {
        self.status.as_ref().map(|s| s.conditions.as_slice()).unwrap_or_default()
    }

    pub fn is_done(&self) -> bool { condition::is_done(self.conditions()) }

    pub fn is_succeeded(&self) -> bool {
        condition::find(self.conditions(), condition::SUCCEEDED).map(Condition::is_true).unwrap_or(false)
    }

    pub fn is_cancelled(&self) -> bool {
        self.spec.status.as_deref().map(|s| PIPELINERUN_CANCELLED.contains(&s)).unwrap_or(false)
    }

    pub fn start_time(&self) -> Option<&Time> { self.status.as_ref().and_then(|s| s.start_time.as_ref()) }

    /// Pipeline-level timeout as written on the object, if any.
    pub fn timeout_spec(&self) -> Option<&str> {
        self.spec.timeouts.as_ref().and_then(|t| t.pipeline.as_deref()).or(self.spec.timeout.as_deref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn custom_run_params_accept_string_array_and_object() {
        let run: CustomRun = serde_json::from_value(json!({
            "metadata": { "name": "run", "namespace": "default" },
            "spec": {
                "customRef": { "apiVersion": "shipwright.io/v1alpha1", "kind": "Build", "name": "build" },
                "params": [
                    { "name": "s", "value": "one" },
                    { "name": "a", "value": ["one", "two"] },
                    { "name": "o", "value": { "k": "v" } }
                ],
                "timeout": "1h0m0s"
            }
        }))
        .unwrap();
        assert!(run.spec.custom_ref.as_ref().unwrap().is_shipwright_build());
        assert_eq!(run.spec.params[0].value, ParamInput::String("one".into()));
        assert_eq!(run.spec.params[1].value, ParamInput::Array(vec!["one".into(), "two".into()]));
        assert!(matches!(run.spec.params[2].value, ParamInput::Object(_)));
    }

    #[test]
    fn run_reference_uses_ref_key() {
        let run: Run = serde_json::from_value(json!({
            "metadata": { "name": "run" },
            "spec": { "ref": { "apiVersion": "tekton.dev/v1beta1", "kind": "Task", "name": "t" } }
        }))
        .unwrap();
        assert!(!run.spec.reference.unwrap().is_shipwright_build());
    }

    #[test]
    fn pipelinerun_timeout_prefers_timeouts_block() {
        let mut pr = PipelineRun::default();
        assert_eq!(pr.timeout_spec(), None);
        pr.spec.timeout = Some("10m".into());
        assert_eq!(pr.timeout_spec(), Some("10m"));
        pr.spec.timeouts = Some(TimeoutFields { pipeline: Some("1s".into()) });
        assert_eq!(pr.timeout_spec(), Some("1s"));
        pr.spec.status = Some("Cancelled".into());
        assert!(pr.is_cancelled());
    }
}
