/*!
 * Run-Queue Lock Model
 * Per-CPU lock with pin bookkeeping and an explicit unlocked-region wrapper
 */

use crate::core::types::CpuId;
use parking_lot::{Mutex, MutexGuard};

#[derive(Debug, Default)]
struct RqState {
    // Pinning records that the holder expects the lock uninterrupted; an
    // unlocked region unpins before dropping the lock and re-pins after.
    pinned: bool,
    // Bumped on every acquire. A caller that sees the generation change
    // across a call knows the lock was dropped and its state is stale.
    generation: u64,
}

/// The per-CPU run-queue lock as seen by the hook invocation paths.
///
/// Only the lock and its pin bookkeeping are modelled here; the ready set
/// itself belongs to the scheduler proper.
pub struct RunQueue {
    cpu: CpuId,
    state: Mutex<RqState>,
}

impl RunQueue {
    /// Create the run queue for `cpu`
    pub fn new(cpu: CpuId) -> Self {
        Self {
            cpu,
            state: Mutex::new(RqState::default()),
        }
    }

    /// CPU this run queue belongs to
    pub fn cpu(&self) -> CpuId {
        self.cpu
    }

    /// Acquire and pin the run-queue lock
    pub fn lock(&self) -> RqGuard<'_> {
        let mut state = self.state.lock();
        state.pinned = true;
        state.generation += 1;
        RqGuard {
            rq: self,
            state: Some(state),
        }
    }

    /// Acquire the lock only if it is uncontended
    pub fn try_lock(&self) -> Option<RqGuard<'_>> {
        let mut state = self.state.try_lock()?;
        state.pinned = true;
        state.generation += 1;
        Some(RqGuard {
            rq: self,
            state: Some(state),
        })
    }
}

/// Guard over a held, pinned run-queue lock.
pub struct RqGuard<'a> {
    rq: &'a RunQueue,
    state: Option<MutexGuard<'a, RqState>>,
}

impl<'a> RqGuard<'a> {
    /// CPU of the underlying run queue
    pub fn cpu(&self) -> CpuId {
        self.rq.cpu
    }

    /// Whether the guard currently holds the lock
    pub fn is_held(&self) -> bool {
        self.state.is_some()
    }

    /// Whether the current hold is pinned
    pub fn is_pinned(&self) -> bool {
        self.state.as_ref().is_some_and(|s| s.pinned)
    }

    /// Acquisition generation of the current hold, 0 if not held.
    ///
    /// Comparing generations across a call detects an intervening
    /// unlocked region.
    pub fn generation(&self) -> u64 {
        self.state.as_ref().map_or(0, |s| s.generation)
    }

    /// Run `f` with the run-queue lock fully released: unpin, unlock, call,
    /// re-lock, re-pin.
    ///
    /// This is the only sanctioned way to call code that may itself take
    /// locks while a run-queue lock is nominally held. Scheduler state read
    /// before this call must be revalidated afterwards; the generation
    /// counter makes the drop observable.
    pub fn unlocked<R>(&mut self, f: impl FnOnce() -> R) -> R {
        if let Some(mut state) = self.state.take() {
            state.pinned = false;
            drop(state);
        }
        let out = f();
        let mut state = self.rq.state.lock();
        state.pinned = true;
        state.generation += 1;
        self.state = Some(state);
        out
    }
}

impl Drop for RqGuard<'_> {
    fn drop(&mut self) {
        if let Some(mut state) = self.state.take() {
            state.pinned = false;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lock_excludes_try_lock() {
        let rq = RunQueue::new(0);
        let guard = rq.lock();
        assert!(guard.is_held());
        assert!(rq.try_lock().is_none());
        drop(guard);
        assert!(rq.try_lock().is_some());
    }

    #[test]
    fn test_unlocked_region_releases_and_reacquires() {
        let rq = RunQueue::new(3);
        let mut guard = rq.lock();
        let before = guard.generation();

        assert!(guard.is_pinned());
        let value = guard.unlocked(|| {
            // Lock is free inside the region.
            let probe = rq.try_lock();
            assert!(probe.is_some());
            drop(probe);
            42
        });

        assert_eq!(value, 42);
        assert!(guard.is_held());
        assert!(guard.is_pinned());
        assert!(guard.generation() > before);
        assert!(rq.try_lock().is_none());
    }

    #[test]
    fn test_generation_counts_acquires() {
        let rq = RunQueue::new(0);
        let g1 = rq.lock().generation();
        let g2 = rq.lock().generation();
        assert!(g2 > g1);
    }
}
