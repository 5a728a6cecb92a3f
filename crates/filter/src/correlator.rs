//! Coordinates of the BuildRun issued for a Run or CustomRun, kept in the
//! run's `status.extraFields`.

use serde::{Deserialize, Serialize};
use tether_core::tekton::RunStatus;
use tether_core::{BuildRun, ObjectKey};

use crate::FilterError;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtraFields {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub build_run_namespace: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub build_run_name: String,
}

impl ExtraFields {
    pub fn for_build_run(br: &BuildRun) -> Self {
        Self {
            build_run_namespace: br.metadata.namespace.clone().unwrap_or_default(),
            build_run_name: br.metadata.name.clone().unwrap_or_default(),
        }
    }

    /// Nothing has been issued yet.
    pub fn is_empty(&self) -> bool { self.build_run_name.is_empty() }

    pub fn key(&self) -> ObjectKey { ObjectKey::new(self.build_run_namespace.clone(), self.build_run_name.clone()) }

    pub fn encode(&self) -> Result<serde_json::Value, FilterError> {
        serde_json::to_value(self).map_err(|source| FilterError::Encode { what: "extraFields", source })
    }
}

/// Reads the coordinates recorded on a run. A missing or null payload is
/// empty; anything else must decode.
pub fn read(status: Option<&RunStatus>) -> Result<ExtraFields, FilterError> {
    match status.and_then(|s| s.extra_fields.as_ref()) {
        None | Some(serde_json::Value::Null) => Ok(ExtraFields::default()),
        Some(raw) => serde_json::from_value(raw.clone()).map_err(|source| FilterError::Decode { what: "extraFields", source }),
    }
}
