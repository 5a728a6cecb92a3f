//! Event admission per controller.

use tether_core::tekton::EmbeddedRef;
use tether_core::{BuildRun, CustomRun, Kind, ObjectKey, PipelineRun, Run};
use tracing::debug;

use crate::pipelinerun;

/// An observed object of one of the watched kinds.
#[derive(Debug, Clone, Copy)]
pub enum Watched<'a> {
    Run(&'a Run),
    CustomRun(&'a CustomRun),
    PipelineRun(&'a PipelineRun),
    BuildRun(&'a BuildRun),
}

impl Watched<'_> {
    pub fn kind(&self) -> Kind {
        match self {
            Watched::Run(_) => Kind::Run,
            Watched::CustomRun(_) => Kind::CustomRun,
            Watched::PipelineRun(_) => Kind::PipelineRun,
            Watched::BuildRun(_) => Kind::BuildRun,
        }
    }
}

fn references_build(reference: Option<&EmbeddedRef>) -> bool { reference.map(EmbeddedRef::is_shipwright_build).unwrap_or(false) }

/// Whether the controller for `controller` should reconcile `event`.
pub fn admits(controller: Kind, event: &Watched<'_>) -> bool {
    let admitted = match (controller, event) {
        (Kind::Run, Watched::Run(run)) => references_build(run.spec.reference.as_ref()),
        (Kind::CustomRun, Watched::CustomRun(run)) => references_build(run.spec.custom_ref.as_ref()),
        (Kind::Run | Kind::CustomRun, Watched::BuildRun(br)) => owner_of(br, controller).is_some(),
        (Kind::PipelineRun, Watched::PipelineRun(pr)) => {
            pr.spec.pipeline_ref.is_some()
                && pr.status.as_ref().and_then(|s| s.pipeline_spec.as_ref()).is_some()
                && !pipelinerun::references_shipwright(pr)
        }
        (Kind::Run | Kind::CustomRun | Kind::PipelineRun | Kind::BuildRun, _) => false,
    };
    debug!(controller = %controller, kind = %event.kind(), admitted, "filter: event inspected");
    admitted
}

/// Identity of the `owner` kind object a BuildRun was issued for: owner
/// references first, then the ownership marker.
pub fn owner_of(br: &BuildRun, owner: Kind) -> Option<ObjectKey> {
    let namespace = br.metadata.namespace.clone()?;
    let by_ref = br
        .metadata
        .owner_references
        .iter()
        .flatten()
        .find(|r| Kind::from_type(&r.api_version, &r.kind) == Some(owner))
        .map(|r| r.name.clone());
    let by_marker = || {
        let marker = owner.owner_marker()?;
        let from_labels = br.metadata.labels.as_ref().and_then(|l| l.get(marker));
        let from_annotations = br.metadata.annotations.as_ref().and_then(|a| a.get(marker));
        from_labels.or(from_annotations).cloned()
    };
    by_ref.or_else(by_marker).filter(|n| !n.is_empty()).map(|name| ObjectKey::new(namespace, name))
}
