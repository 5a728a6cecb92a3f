//! Tether controllers.
//!
//! - [`inventory_sync`]: Build watch feeding the trigger inventory
//! - [`pipelinerun`]: PipelineRun reconciler, issuing BuildRuns for matching
//!   Builds and recording them in the ledger annotation
//! - [`customtask`]: Run/CustomRun reconciler, one BuildRun per task tracked
//!   through `status.extraFields`
//! - [`runtime`]: kube-runtime controllers around the reconcilers

#![forbid(unsafe_code)]

pub mod buildrun;
pub mod clock;
mod config;
pub mod customtask;
mod error;
pub mod gate;
pub mod inventory_sync;
pub mod pipelinerun;
pub mod runtime;

pub use clock::{Clock, FixedClock, SystemClock};
pub use config::Config;
pub use customtask::{CustomTask, CustomTaskReconciler};
pub use error::ReconcileError;
pub use pipelinerun::PipelineRunReconciler;
