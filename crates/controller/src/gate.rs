//! Concurrency limits for reconcilers.

use std::sync::{Arc, Mutex, PoisonError};

use rustc_hash::FxHashSet;
use tether_core::ObjectKey;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use crate::ReconcileError;

/// Caps the reconciliations in flight across a whole kind.
#[derive(Debug, Clone)]
pub struct ConcurrencyGate {
    permits: Arc<Semaphore>,
}

impl ConcurrencyGate {
    pub fn new(limit: usize) -> Self { Self { permits: Arc::new(Semaphore::new(limit.max(1))) } }

    pub async fn acquire(&self) -> Result<OwnedSemaphorePermit, ReconcileError> {
        Arc::clone(&self.permits).acquire_owned().await.map_err(|_| ReconcileError::GateClosed)
    }

    pub fn available(&self) -> usize { self.permits.available_permits() }
}

/// Set of object identities currently being reconciled.
#[derive(Debug, Clone, Default)]
pub struct InFlight {
    keys: Arc<Mutex<FxHashSet<ObjectKey>>>,
}

/// Releases its identity on drop.
#[derive(Debug)]
pub struct InFlightGuard {
    keys: Arc<Mutex<FxHashSet<ObjectKey>>>,
    key: ObjectKey,
}

impl InFlight {
    pub fn new() -> Self { Self::default() }

    /// `None` when `key` is already held.
    pub fn try_acquire(&self, key: &ObjectKey) -> Option<InFlightGuard> {
        let mut keys = self.keys.lock().unwrap_or_else(PoisonError::into_inner);
        if !keys.insert(key.clone()) {
            return None;
        }
        Some(InFlightGuard { keys: Arc::clone(&self.keys), key: key.clone() })
    }

    pub fn is_held(&self, key: &ObjectKey) -> bool { self.keys.lock().unwrap_or_else(PoisonError::into_inner).contains(key) }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.keys.lock().unwrap_or_else(PoisonError::into_inner).remove(&self.key);
    }
}
