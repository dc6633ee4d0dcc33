//! Exactly-once pod teardown.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::error::{Error, Result};
use crate::pool::Pool;

/// A one-shot claim on the right to destroy a pod.
#[derive(Debug, Default)]
pub struct DestroyGuard {
    claimed: AtomicBool,
}

impl DestroyGuard {
    /// Create an unclaimed guard.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            claimed: AtomicBool::new(false),
        }
    }

    /// Claim the guard. Returns true for exactly one caller.
    pub fn claim(&self) -> bool {
        self.claimed
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Check if some caller has claimed the guard.
    #[must_use]
    pub fn is_claimed(&self) -> bool {
        self.claimed.load(Ordering::Acquire)
    }
}

/// What a call to [`Teardown::destroy`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DestroyOutcome {
    /// This call destroyed the pod.
    Destroyed,
    /// Another call already claimed the teardown.
    AlreadyClaimed,
}

/// Destroys one pod at most once, however many paths ask for it.
///
/// Clones share the guard.
pub struct Teardown<P: Pool> {
    pool: Arc<P>,
    pod_id: String,
    guard: Arc<DestroyGuard>,
}

impl<P: Pool> Clone for Teardown<P> {
    fn clone(&self) -> Self {
        Self {
            pool: Arc::clone(&self.pool),
            pod_id: self.pod_id.clone(),
            guard: Arc::clone(&self.guard),
        }
    }
}

impl<P: Pool> std::fmt::Debug for Teardown<P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Teardown")
            .field("pool", &self.pool.id())
            .field("pod_id", &self.pod_id)
            .field("claimed", &self.guard.is_claimed())
            .finish()
    }
}

impl<P: Pool> Teardown<P> {
    /// Teardown for `pod_id` in `pool`.
    #[must_use]
    pub fn new(pool: Arc<P>, pod_id: impl Into<String>) -> Self {
        Self {
            pool,
            pod_id: pod_id.into(),
            guard: Arc::new(DestroyGuard::new()),
        }
    }

    /// The pod this teardown destroys.
    #[must_use]
    pub fn pod_id(&self) -> &str {
        &self.pod_id
    }

    /// Check if a destroy has been claimed.
    #[must_use]
    pub fn is_claimed(&self) -> bool {
        self.guard.is_claimed()
    }

    /// Destroy the pod if no other caller has.
    ///
    /// # Errors
    ///
    /// A failed destroy is logged at error level and returned as
    /// [`Error::Cleanup`]: the pod may still be running and billed. The claim
    /// is not released, so it is never retried automatically.
    pub async fn destroy(&self) -> Result<DestroyOutcome> {
        if !self.guard.claim() {
            tracing::debug!(pod_id = %self.pod_id, "Destroy already claimed");
            return Ok(DestroyOutcome::AlreadyClaimed);
        }

        tracing::info!(pool = %self.pool.id(), pod_id = %self.pod_id, "Destroying pod");
        match self.pool.destroy_pod(&self.pod_id).await {
            Ok(()) => {
                tracing::info!(pod_id = %self.pod_id, "Pod destroyed");
                Ok(DestroyOutcome::Destroyed)
            }
            Err(e) => {
                let err = Error::cleanup(&self.pod_id, e);
                tracing::error!(pod_id = %self.pod_id, error = %err, "Failed to destroy pod");
                Err(err)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::ScriptedPool;

    #[test]
    fn guard_claims_once() {
        let guard = DestroyGuard::new();
        assert!(!guard.is_claimed());
        assert!(guard.claim());
        assert!(!guard.claim());
        assert!(guard.is_claimed());
    }

    #[test]
    fn guard_claims_once_across_threads() {
        let guard = Arc::new(DestroyGuard::new());
        let winners: usize = std::thread::scope(|scope| {
            let handles: Vec<_> = (0..16)
                .map(|_| {
                    let guard = Arc::clone(&guard);
                    scope.spawn(move || usize::from(guard.claim()))
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).sum()
        });
        assert_eq!(winners, 1);
    }

    #[tokio::test]
    async fn second_destroy_is_a_no_op() {
        let pool = Arc::new(ScriptedPool::new());
        let teardown = Teardown::new(Arc::clone(&pool), "pod-1");

        assert_eq!(teardown.destroy().await.unwrap(), DestroyOutcome::Destroyed);
        assert_eq!(
            teardown.clone().destroy().await.unwrap(),
            DestroyOutcome::AlreadyClaimed
        );
        assert_eq!(pool.destroyed(), ["pod-1"]);
    }

    #[tokio::test]
    async fn failure_is_a_billing_risk() {
        let pool = Arc::new(ScriptedPool::new().fail_destroy("quota service down"));
        let teardown = Teardown::new(Arc::clone(&pool), "pod-9");

        let err = teardown.destroy().await.unwrap_err();
        assert!(err.is_billing_risk());
        assert!(err.to_string().contains("pod-9"));
        assert!(teardown.is_claimed());
        assert_eq!(pool.destroy_calls(), 1);
    }
}
