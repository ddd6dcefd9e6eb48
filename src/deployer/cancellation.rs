//! Cooperative cancellation of a deployment run.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::core::DeployError;

/// Shared flag checked between steps of a run.
///
/// Clones observe the same flag. Cancelling does not interrupt a remote call that is
/// already in flight; the run stops before starting the next step.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// `Err(DeployError::Cancelled)` once [`cancel`](Self::cancel) has been called.
    pub fn check(&self) -> Result<(), DeployError> {
        if self.is_cancelled() {
            return Err(DeployError::Cancelled);
        }
        Ok(())
    }
}
