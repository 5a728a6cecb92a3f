//! Append-only record of the builds issued for a PipelineRun, carried in the
//! `pipelinerun-triggered-builds` annotation as a JSON array:
//!
//! ```json
//! [{"buildName":"build","objectRef":{"name":"pipeline","status":["Succeeded"]}}]
//! ```
//!
//! Decoding is strict. Entries are only trusted when the PipelineRun still
//! carries its own name in the `pipelinerun-name` annotation, since re-runs
//! copy annotations onto a new object.

use std::collections::BTreeMap;

use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tether_core::shipwright::WhenObjectRef;
use tether_core::{ANNOTATION_PIPELINERUN_NAME, ANNOTATION_TRIGGERED_BUILDS, LABEL_BUILDRUN_NAMES};

use crate::FilterError;

/// Snapshot of the query that caused an issuance.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MatchedCriteria {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub name: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub status: Vec<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub selector: BTreeMap<String, String>,
}

impl From<&WhenObjectRef> for MatchedCriteria {
    fn from(q: &WhenObjectRef) -> Self {
        Self { name: q.name.clone(), status: q.status.clone(), selector: q.selector.clone() }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct TriggeredBuild {
    #[serde(default)]
    pub build_name: String,
    #[serde(default)]
    pub object_ref: Option<MatchedCriteria>,
}

/// Strictly decodes a ledger payload; `null` is an empty ledger.
pub fn decode(payload: &str) -> Result<Vec<TriggeredBuild>, FilterError> {
    serde_json::from_str::<Option<Vec<TriggeredBuild>>>(payload)
        .map(Option::unwrap_or_default)
        .map_err(|source| FilterError::Decode { what: "triggered-builds annotation", source })
}

/// Ledger entries recorded on an object; no annotation means no entries.
pub fn extract_entries(meta: &ObjectMeta) -> Result<Vec<TriggeredBuild>, FilterError> {
    match meta.annotations.as_ref().and_then(|a| a.get(ANNOTATION_TRIGGERED_BUILDS)) {
        Some(payload) => decode(payload),
        None => Ok(Vec::new()),
    }
}

/// True when some entry names one of `candidates` and recorded exactly
/// `query`. Missing selectors compare as empty.
pub fn contains(entries: &[TriggeredBuild], candidates: &[String], query: &WhenObjectRef) -> bool {
    let wanted = MatchedCriteria::from(query);
    entries
        .iter()
        .any(|e| candidates.contains(&e.build_name) && e.object_ref.as_ref() == Some(&wanted))
}

/// Appends one entry per candidate and serializes the full ledger.
pub fn append_and_encode(
    entries: &[TriggeredBuild],
    candidates: &[String],
    query: &WhenObjectRef,
) -> Result<String, FilterError> {
    let criteria = MatchedCriteria::from(query);
    let mut all = entries.to_vec();
    all.extend(candidates.iter().map(|name| TriggeredBuild { build_name: name.clone(), object_ref: Some(criteria.clone()) }));
    serde_json::to_string(&all).map_err(|source| FilterError::Encode { what: "triggered-builds annotation", source })
}

/// The object still carries its own name in the re-run guard annotation.
pub fn name_matches_annotation(meta: &ObjectMeta) -> bool {
    match (meta.name.as_deref(), meta.annotations.as_ref().and_then(|a| a.get(ANNOTATION_PIPELINERUN_NAME))) {
        (Some(name), Some(annotated)) => name == annotated,
        _ => false,
    }
}

/// Records the object's current name in the re-run guard annotation.
pub fn annotate_name(meta: &mut ObjectMeta) {
    let name = meta.name.clone().unwrap_or_default();
    meta.annotations.get_or_insert_with(BTreeMap::new).insert(ANNOTATION_PIPELINERUN_NAME.to_string(), name);
}

/// Metadata written after issuing BuildRuns for a PipelineRun, persisted as
/// one merge patch without a resourceVersion precondition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerUpdate {
    pub name: String,
    pub ledger: String,
    pub issued_label: String,
}

impl LedgerUpdate {
    pub fn to_patch(&self) -> serde_json::Value {
        json!({ "metadata": {
            "annotations": {
                ANNOTATION_TRIGGERED_BUILDS: self.ledger,
                ANNOTATION_PIPELINERUN_NAME: self.name,
            },
            "labels": { LABEL_BUILDRUN_NAMES: self.issued_label },
        } })
    }
}
