//! Label helpers for watched objects.

use std::collections::BTreeMap;

use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use tether_core::{join_capped, LABEL_BUILDRUN_NAMES, PREFIX};

/// New value of the issued BuildRun names label: the existing value (most
/// recent first) extended with `issued`, re-joined most recent first and
/// capped to a valid label value.
pub fn append_issued(meta: &ObjectMeta, issued: &[String]) -> String {
    let existing = meta.labels.as_ref().and_then(|l| l.get(LABEL_BUILDRUN_NAMES)).map(String::as_str).unwrap_or("");
    let mut names: Vec<&str> = existing.split(',').filter(|s| !s.is_empty()).rev().collect();
    names.extend(issued.iter().map(String::as_str));
    join_capped(&names)
}

/// Object labels without the ones this subsystem writes.
pub fn without_owned(meta: &ObjectMeta) -> BTreeMap<String, String> {
    meta.labels
        .iter()
        .flatten()
        .filter(|(k, _)| !k.starts_with(PREFIX))
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect()
}
