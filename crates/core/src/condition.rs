//! Knative-style status conditions shared by Tekton and Shipwright objects.

use chrono::{DateTime, Utc};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::Time;
use serde::{Deserialize, Serialize};

pub const SUCCEEDED: &str = "Succeeded";

pub const STATUS_TRUE: &str = "True";
pub const STATUS_FALSE: &str = "False";
pub const STATUS_UNKNOWN: &str = "Unknown";

pub const SEVERITY_ERROR: &str = "Error";
pub const SEVERITY_INFO: &str = "Info";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Condition {
    #[serde(rename = "type")]
    pub type_: String,
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub severity: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_transition_time: Option<Time>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl Condition {
    pub fn new(type_: &str, status: &str, at: DateTime<Utc>) -> Self {
        Self { type_: type_.to_string(), status: status.to_string(), last_transition_time: Some(Time(at)), ..Default::default() }
    }

    pub fn is_true(&self) -> bool { self.status == STATUS_TRUE }
    pub fn is_false(&self) -> bool { self.status == STATUS_FALSE }
    pub fn is_unknown(&self) -> bool { self.status == STATUS_UNKNOWN }

    /// Equal in everything but the transition time.
    fn same_state(&self, other: &Condition) -> bool {
        self.type_ == other.type_
            && self.status == other.status
            && self.severity == other.severity
            && self.reason == other.reason
            && self.message == other.message
    }
}

pub fn find<'a>(conditions: &'a [Condition], type_: &str) -> Option<&'a Condition> {
    conditions.iter().find(|c| c.type_ == type_)
}

/// Replaces the condition of the same type, keeping the previous transition
/// time when nothing but the time changed. Conditions stay sorted by type.
pub fn set(conditions: &mut Vec<Condition>, cond: Condition) {
    if let Some(existing) = conditions.iter_mut().find(|c| c.type_ == cond.type_) {
        if !existing.same_state(&cond) {
            *existing = cond;
        }
    } else {
        conditions.push(cond);
    }
    conditions.sort_by(|a, b| a.type_.cmp(&b.type_));
}

/// A `Succeeded` condition that is no longer `Unknown` marks the object done.
pub fn is_done(conditions: &[Condition]) -> bool {
    find(conditions, SUCCEEDED).map(|c| !c.is_unknown()).unwrap_or(false)
}
