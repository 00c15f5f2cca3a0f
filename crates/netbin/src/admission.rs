//! Semaphore-based admission control for accepted connections.
//!
//! [`Admission`] hands out at most `limit` tokens at a time. Each served
//! connection holds one [`AdmissionToken`] for its whole lifetime; dropping
//! the token returns the slot to the pool. A limit of zero disables gating
//! entirely.

use std::sync::Arc;

use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// A permit granting the right to serve one connection.
///
/// When dropped, the permit is automatically returned to the pool.
#[derive(Debug)]
pub struct AdmissionToken {
    _permit: Option<OwnedSemaphorePermit>,
}

/// Bounded permit pool gating concurrent sessions.
#[derive(Debug, Clone)]
pub struct Admission {
    semaphore: Option<Arc<Semaphore>>,
    limit: usize,
}

impl Admission {
    /// Create a pool admitting `limit` concurrent sessions; 0 means unlimited.
    pub fn new(limit: usize) -> Self {
        if limit == 0 {
            info!("Admission control disabled");
            return Self::unlimited();
        }

        let limit = limit.min(Semaphore::MAX_PERMITS);
        info!(max_concurrent = limit, "Admission pool created");

        Self {
            semaphore: Some(Arc::new(Semaphore::new(limit))),
            limit,
        }
    }

    /// A pool that never blocks.
    pub const fn unlimited() -> Self {
        Self {
            semaphore: None,
            limit: 0,
        }
    }

    /// Acquire a token, waiting until a slot frees up.
    ///
    /// Returns `None` once `cancel` fires; no token is held in that case.
    pub async fn acquire(&self, cancel: &CancellationToken) -> Option<AdmissionToken> {
        let Some(semaphore) = &self.semaphore else {
            return (!cancel.is_cancelled()).then_some(AdmissionToken { _permit: None });
        };

        tokio::select! {
            biased;
            () = cancel.cancelled() => {
                debug!("Admission wait cancelled");
                None
            }
            permit = Arc::clone(semaphore).acquire_owned() => {
                // The semaphore is never closed, but treat closure like shutdown.
                permit.ok().map(|permit| AdmissionToken { _permit: Some(permit) })
            }
        }
    }

    /// Configured maximum, 0 when unlimited.
    pub const fn limit(&self) -> usize {
        self.limit
    }

    /// Number of free slots, `None` when unlimited.
    pub fn available(&self) -> Option<usize> {
        self.semaphore.as_ref().map(|s| s.available_permits())
    }
}
