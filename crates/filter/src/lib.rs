//! Tether filters: which events matter, and the bookkeeping written onto
//! watched objects so reconciliation stays idempotent.
//!
//! - [`event`]: admission of Run, CustomRun, PipelineRun and BuildRun events
//! - [`correlator`]: 1:1 BuildRun coordinates kept in `status.extraFields`
//! - [`ledger`]: 1:N record of builds already issued for a PipelineRun
//! - [`labels`]: issued BuildRun names label
//! - [`pipelinerun`]: PipelineRun status and inventory query derivation
//! - [`params`], [`mirror`]: BuildRun inputs and status reflection

#![forbid(unsafe_code)]

pub mod correlator;
pub mod event;
pub mod labels;
pub mod ledger;
pub mod mirror;
pub mod params;
pub mod pipelinerun;

pub use correlator::ExtraFields;
pub use event::{admits, owner_of, Watched};
pub use ledger::TriggeredBuild;

#[derive(Debug, thiserror::Error)]
pub enum FilterError {
    #[error("decoding {what}: {source}")]
    Decode {
        what: &'static str,
        #[source]
        source: serde_json::Error,
    },
    #[error("encoding {what}: {source}")]
    Encode {
        what: &'static str,
        #[source]
        source: serde_json::Error,
    },
    #[error("unable to determine current status of pipelinerun {0}")]
    UnknownStatus(String),
}
