//! Tether core types: object keys, the closed set of watched kinds, and the
//! annotation/label keys shared by the inventory, filter and controller crates.

#![forbid(unsafe_code)]

use std::fmt;

use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use serde::{Deserialize, Serialize};

/// Implements `kube::Resource` for a namespaced custom resource modelled as a
/// plain serde struct with a `metadata` field.
macro_rules! namespaced_resource {
    ($ty:ident, $group:literal, $version:literal, $plural:literal) => {
        impl kube::Resource for $ty {
            type DynamicType = ();
            type Scope = k8s_openapi::NamespaceResourceScope;

            fn kind(_: &()) -> std::borrow::Cow<'_, str> { stringify!($ty).into() }
            fn group(_: &()) -> std::borrow::Cow<'_, str> { $group.into() }
            fn version(_: &()) -> std::borrow::Cow<'_, str> { $version.into() }
            fn plural(_: &()) -> std::borrow::Cow<'_, str> { $plural.into() }
            fn meta(&self) -> &k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta { &self.metadata }
            fn meta_mut(&mut self) -> &mut k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta { &mut self.metadata }
        }
    };
}

pub mod condition;
pub mod duration;
pub mod names;
pub mod shipwright;
pub mod tekton;

pub use condition::Condition;
pub use names::{generate_name, join_capped};
pub use shipwright::{Build, BuildRun};
pub use tekton::{CustomRun, PipelineRun, Run};

/// Prefix of every annotation and label owned by this subsystem.
pub const PREFIX: &str = "triggers.shipwright.io";
/// Ledger of builds already issued for a PipelineRun (JSON array).
pub const ANNOTATION_TRIGGERED_BUILDS: &str = "triggers.shipwright.io/pipelinerun-triggered-builds";
/// Name of the PipelineRun at its last successful reconciliation.
pub const ANNOTATION_PIPELINERUN_NAME: &str = "triggers.shipwright.io/pipelinerun-name";
/// Comma-joined names of issued BuildRuns, most recent first.
pub const LABEL_BUILDRUN_NAMES: &str = "triggers.shipwright.io/buildrun-names";
pub const OWNED_BY_RUN: &str = "triggers.shipwright.io/owned-by-run";
pub const OWNED_BY_CUSTOMRUN: &str = "triggers.shipwright.io/owned-by-customrun";
pub const OWNED_BY_PIPELINERUN: &str = "triggers.shipwright.io/owned-by-pipelinerun";

/// API version custom tasks must reference to be handled here.
pub const SHIPWRIGHT_API_VERSION: &str = "shipwright.io/v1alpha1";
pub const BUILD_KIND: &str = "Build";

/// Namespaced identity of an object.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ObjectKey {
    pub namespace: String,
    pub name: String,
}

impl ObjectKey {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self { namespace: namespace.into(), name: name.into() }
    }

    /// Returns `None` when either namespace or name is unset.
    pub fn from_meta(meta: &ObjectMeta) -> Option<Self> {
        Some(Self::new(meta.namespace.clone()?, meta.name.clone()?))
    }
}

impl fmt::Display for ObjectKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

/// Closed set of object kinds the controllers react to. `BuildRun` is the
/// derived object; the others are watched workflow objects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Kind {
    Run,
    CustomRun,
    PipelineRun,
    BuildRun,
}

impl Kind {
    pub fn as_str(self) -> &'static str {
        match self {
            Kind::Run => "Run",
            Kind::CustomRun => "CustomRun",
            Kind::PipelineRun => "PipelineRun",
            Kind::BuildRun => "BuildRun",
        }
    }

    pub fn api_version(self) -> &'static str {
        match self {
            Kind::Run => "tekton.dev/v1alpha1",
            Kind::CustomRun | Kind::PipelineRun => "tekton.dev/v1beta1",
            Kind::BuildRun => SHIPWRIGHT_API_VERSION,
        }
    }

    /// Marker key stamped on BuildRuns issued on behalf of this kind. Run and
    /// CustomRun markers are labels, the PipelineRun marker is an annotation.
    pub fn owner_marker(self) -> Option<&'static str> {
        match self {
            Kind::Run => Some(OWNED_BY_RUN),
            Kind::CustomRun => Some(OWNED_BY_CUSTOMRUN),
            Kind::PipelineRun => Some(OWNED_BY_PIPELINERUN),
            Kind::BuildRun => None,
        }
    }

    /// Maps an owner reference's `apiVersion`/`kind` pair back to a kind.
    pub fn from_type(api_version: &str, kind: &str) -> Option<Self> {
        [Kind::Run, Kind::CustomRun, Kind::PipelineRun, Kind::BuildRun]
            .into_iter()
            .find(|k| k.as_str() == kind && k.api_version() == api_version)
    }
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
}
