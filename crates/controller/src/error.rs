use tether_filter::FilterError;
use tether_kubehub::StoreError;

#[derive(Debug, thiserror::Error)]
pub enum ReconcileError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Filter(#[from] FilterError),
    #[error("{0} has no namespace or name")]
    MissingKey(&'static str),
    #[error("concurrency gate closed")]
    GateClosed,
}

impl ReconcileError {
    pub fn metric_label(&self) -> &'static str {
        match self {
            ReconcileError::Store(_) => "store",
            ReconcileError::Filter(_) => "filter",
            ReconcileError::MissingKey(_) => "missing_key",
            ReconcileError::GateClosed => "gate_closed",
        }
    }
}
