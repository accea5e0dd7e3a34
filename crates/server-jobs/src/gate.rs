// crates/server-jobs/src/gate.rs
//! Counting admission control for compute-heavy generation steps.

use std::sync::Arc;

use tokio::sync::{OwnedSemaphorePermit, Semaphore, TryAcquireError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("concurrency gate is closed")]
pub struct GateClosed;

/// Bounds how many generations run against the backend at once.
///
/// Job creation is never throttled here; only the backend call waits.
#[derive(Debug, Clone)]
pub struct ConcurrencyGate {
    semaphore: Arc<Semaphore>,
    capacity: usize,
}

/// A held permit. Released when dropped, on every exit path.
#[derive(Debug)]
#[must_use = "the permit is released as soon as it is dropped"]
pub struct GatePermit {
    _permit: OwnedSemaphorePermit,
}

impl GatePermit {
    /// Return the permit explicitly. Equivalent to dropping it.
    pub fn release(self) {}
}

impl ConcurrencyGate {
    /// Create a gate with `permits` slots (at least one).
    pub fn new(permits: usize) -> Self {
        let capacity = permits.max(1);
        Self {
            semaphore: Arc::new(Semaphore::new(capacity)),
            capacity,
        }
    }

    /// Wait for a free permit. Fails only once the gate is closed.
    pub async fn acquire(&self) -> Result<GatePermit, GateClosed> {
        Arc::clone(&self.semaphore)
            .acquire_owned()
            .await
            .map(|p| GatePermit { _permit: p })
            .map_err(|_| GateClosed)
    }

    pub fn try_acquire(&self) -> Result<Option<GatePermit>, GateClosed> {
        match Arc::clone(&self.semaphore).try_acquire_owned() {
            Ok(p) => Ok(Some(GatePermit { _permit: p })),
            Err(TryAcquireError::NoPermits) => Ok(None),
            Err(TryAcquireError::Closed) => Err(GateClosed),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn available(&self) -> usize {
        self.semaphore.available_permits()
    }

    pub fn in_use(&self) -> usize {
        self.capacity.saturating_sub(self.available())
    }

    /// Wake all waiters with `GateClosed`. Held permits stay valid until dropped.
    pub fn close(&self) {
        self.semaphore.close();
    }

    pub fn is_closed(&self) -> bool {
        self.semaphore.is_closed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[test]
    fn test_capacity_is_at_least_one() {
        assert_eq!(ConcurrencyGate::new(0).capacity(), 1);
        assert_eq!(ConcurrencyGate::new(4).available(), 4);
    }

    #[tokio::test]
    async fn test_permit_released_on_drop() {
        let gate = ConcurrencyGate::new(1);
        let permit = gate.acquire().await.unwrap();
        assert_eq!(gate.in_use(), 1);
        assert!(gate.try_acquire().unwrap().is_none());

        permit.release();
        assert_eq!(gate.in_use(), 0);

        {
            let _held = gate.try_acquire().unwrap().unwrap();
            assert_eq!(gate.available(), 0);
        }
        assert_eq!(gate.available(), 1);
    }

    #[tokio::test]
    async fn test_bounds_concurrent_holders() {
        let gate = ConcurrencyGate::new(2);
        let running = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let tasks: Vec<_> = (0..8)
            .map(|_| {
                let gate = gate.clone();
                let running = Arc::clone(&running);
                let peak = Arc::clone(&peak);
                tokio::spawn(async move {
                    let _permit = gate.acquire().await.unwrap();
                    let now = running.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(10)).await;
                    running.fetch_sub(1, Ordering::SeqCst);
                })
            })
            .collect();
        for task in tasks {
            task.await.unwrap();
        }

        assert_eq!(peak.load(Ordering::SeqCst), 2);
        assert_eq!(gate.available(), 2);
    }

    #[tokio::test]
    async fn test_close_wakes_waiters() {
        let gate = ConcurrencyGate::new(1);
        let held = gate.acquire().await.unwrap();

        let waiter = {
            let gate = gate.clone();
            tokio::spawn(async move { gate.acquire().await.map(|_| ()) })
        };
        tokio::task::yield_now().await;
        gate.close();

        assert_eq!(waiter.await.unwrap(), Err(GateClosed));
        assert!(gate.is_closed());
        assert!(gate.try_acquire().is_err());
        drop(held);
    }
}
