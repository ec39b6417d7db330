//! Module `admission`
//!
//! Bounded concurrency admission control. Two independent counting gates
//! cap how many operations of each class run at once: bulk data transfers
//! (upload/download) are capped tightly to bound file-descriptor and disk
//! pressure, while cheap metadata listings get a much wider gate.

use std::future::Future;
use std::sync::Arc;

use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use crate::error::AdmissionError;

/// Operation class an admission slot is requested for.
///
/// The class is selected once, when an operation begins, and is never
/// re-evaluated mid-stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpClass {
    /// Upload or download: I/O- and bandwidth-heavy
    Transfer,
    /// Directory listing: metadata only
    List,
}

/// Permission to run one concurrent operation of a given class.
///
/// The slot returns to its pool when the permit is dropped, which makes
/// release idempotent: a permit can only be dropped once, and a session
/// that never acquired one has nothing to release.
#[derive(Debug)]
pub struct SlotPermit {
    _permit: OwnedSemaphorePermit,
}

/// Two fixed-capacity slot pools, keyed by [`OpClass`].
#[derive(Debug)]
pub struct AdmissionController {
    transfer: Arc<Semaphore>,
    list: Arc<Semaphore>,
}

impl AdmissionController {
    pub fn new(transfer_slots: usize, list_slots: usize) -> Self {
        Self {
            transfer: Arc::new(Semaphore::new(transfer_slots)),
            list: Arc::new(Semaphore::new(list_slots)),
        }
    }

    /// Waits until a slot of the requested class is free, or until
    /// `cancelled` completes, whichever happens first.
    ///
    /// The `cancelled` future is whatever signal the caller's transport
    /// ties to the request (client disconnect, deadline); this method adds
    /// no timeout policy of its own. Returns [`AdmissionError::Cancelled`]
    /// if cancellation wins the race.
    pub async fn acquire(
        &self,
        class: OpClass,
        cancelled: impl Future<Output = ()>,
    ) -> Result<SlotPermit, AdmissionError> {
        let semaphore = match class {
            OpClass::Transfer => Arc::clone(&self.transfer),
            OpClass::List => Arc::clone(&self.list),
        };

        tokio::select! {
            permit = semaphore.acquire_owned() => {
                // The semaphores are never closed, but a closed pool and a
                // cancelled wait are the same thing to the caller.
                permit
                    .map(|p| SlotPermit { _permit: p })
                    .map_err(|_| AdmissionError::Cancelled)
            }
            _ = cancelled => Err(AdmissionError::Cancelled),
        }
    }

    /// Number of free slots in the given class's pool
    pub fn available(&self, class: OpClass) -> usize {
        match class {
            OpClass::Transfer => self.transfer.available_permits(),
            OpClass::List => self.list.available_permits(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::future::pending;
    use std::time::Duration;

    #[tokio::test]
    async fn acquire_and_release_returns_slot_to_pool() {
        let controller = AdmissionController::new(2, 1);

        let permit = controller
            .acquire(OpClass::Transfer, pending())
            .await
            .unwrap();
        assert_eq!(controller.available(OpClass::Transfer), 1);
        assert_eq!(controller.available(OpClass::List), 1);

        drop(permit);
        assert_eq!(controller.available(OpClass::Transfer), 2);
    }

    #[tokio::test]
    async fn pools_are_independent() {
        let controller = AdmissionController::new(1, 1);

        let _transfer = controller
            .acquire(OpClass::Transfer, pending())
            .await
            .unwrap();

        // Exhausting the transfer pool must not block a listing.
        let list = controller.acquire(OpClass::List, pending()).await;
        assert!(list.is_ok());
    }

    #[tokio::test]
    async fn full_pool_blocks_until_a_slot_frees() {
        let controller = Arc::new(AdmissionController::new(1, 1));

        let held = controller
            .acquire(OpClass::Transfer, pending())
            .await
            .unwrap();

        let waiter = {
            let controller = Arc::clone(&controller);
            tokio::spawn(async move { controller.acquire(OpClass::Transfer, pending()).await })
        };

        // Give the waiter time to park on the gate.
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!waiter.is_finished());

        drop(held);
        let acquired = waiter.await.unwrap();
        assert!(acquired.is_ok());
    }

    #[tokio::test]
    async fn cancellation_aborts_the_wait() {
        let controller = AdmissionController::new(1, 1);
        let _held = controller
            .acquire(OpClass::Transfer, pending())
            .await
            .unwrap();

        let (cancel_tx, cancel_rx) = tokio::sync::oneshot::channel::<()>();
        cancel_tx.send(()).unwrap();

        let result = controller
            .acquire(OpClass::Transfer, async {
                let _ = cancel_rx.await;
            })
            .await;

        assert!(matches!(result, Err(AdmissionError::Cancelled)));
        // The aborted wait must not have consumed the held slot.
        assert_eq!(controller.available(OpClass::Transfer), 0);
    }
}
