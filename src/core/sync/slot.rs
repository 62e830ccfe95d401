/*!
 * RCU Slot
 * Publish/clear pointer slot with deferred reclamation for read-heavy hooks
 */

use arc_swap::{ArcSwapOption, Guard};
use std::sync::Arc;

/// An optional shared value with zero-contention reads and deferred
/// reclamation of replaced values.
///
/// # Protocol
///
/// - **Readers** call [`read`](Self::read) and hold the returned guard for
///   the duration of the access. A value observed through a guard stays
///   alive until that guard is dropped, even if a writer clears the slot
///   in the meantime.
/// - **Writers** must serialize externally (the enclave's slot lock);
///   [`publish`](Self::publish) uses a release-ordered store so a reader
///   that observes a non-empty slot always observes a fully constructed
///   value.
///
/// The slot never drops a value synchronously on [`clear_if`](Self::clear_if):
/// the last reference is released when the final outstanding guard (or
/// external `Arc`) goes away.
pub struct RcuSlot<T> {
    inner: ArcSwapOption<T>,
}

impl<T> RcuSlot<T> {
    /// Create an empty slot
    pub fn empty() -> Self {
        Self {
            inner: ArcSwapOption::empty(),
        }
    }

    /// Publish a fully constructed value into the slot.
    ///
    /// Caller must hold the slot's write lock and must have verified the
    /// slot is empty; publishing over an occupied slot would silently
    /// replace it.
    pub fn publish(&self, value: Arc<T>) {
        self.inner.store(Some(value));
    }

    /// Clear the slot only if it currently holds `expected`.
    ///
    /// Compare-and-clear by pointer identity. Returns whether the slot was
    /// cleared; a mismatch or an already-empty slot leaves the slot
    /// unchanged. Caller must hold the slot's write lock.
    pub fn clear_if(&self, expected: &Arc<T>) -> bool {
        let current = self.inner.load();
        match &*current {
            Some(cur) if Arc::ptr_eq(cur, expected) => {
                self.inner.store(None);
                true
            }
            _ => false,
        }
    }

    /// Whether the slot currently holds a value
    #[inline]
    pub fn is_occupied(&self) -> bool {
        self.inner.load().is_some()
    }

    /// Open a read section over the slot.
    ///
    /// The value (if any) is pinned for the lifetime of the guard.
    #[inline]
    pub fn read(&self) -> SlotReadGuard<T> {
        SlotReadGuard {
            guard: self.inner.load(),
        }
    }
}

impl<T> Default for RcuSlot<T> {
    fn default() -> Self {
        Self::empty()
    }
}

/// Scoped read section over an [`RcuSlot`].
///
/// Keeping the guard alive brackets the read: a concurrently cleared value
/// is not reclaimed until the guard drops.
pub struct SlotReadGuard<T> {
    guard: Guard<Option<Arc<T>>>,
}

impl<T> SlotReadGuard<T> {
    /// Borrow the pinned value, if the slot was occupied at read time
    #[inline]
    pub fn get(&self) -> Option<&T> {
        self.guard.as_deref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::thread;

    struct Canary {
        alive: Arc<AtomicBool>,
    }

    impl Canary {
        fn new() -> (Self, Arc<AtomicBool>) {
            let alive = Arc::new(AtomicBool::new(true));
            (
                Self {
                    alive: Arc::clone(&alive),
                },
                alive,
            )
        }
    }

    impl Drop for Canary {
        fn drop(&mut self) {
            self.alive.store(false, Ordering::SeqCst);
        }
    }

    #[test]
    fn test_publish_and_read() {
        let slot = RcuSlot::empty();
        slot.publish(Arc::new(42u32));
        assert!(slot.is_occupied());
        let section = slot.read();
        assert_eq!(section.get().copied(), Some(42));
    }

    #[test]
    fn test_empty_read() {
        let slot: RcuSlot<u32> = RcuSlot::empty();
        assert!(!slot.is_occupied());
        assert!(slot.read().get().is_none());
    }

    #[test]
    fn test_clear_if_mismatch_is_noop() {
        let slot = RcuSlot::empty();
        let installed = Arc::new(7u32);
        let other = Arc::new(7u32);
        slot.publish(Arc::clone(&installed));

        // Same value, different identity: must not clear.
        assert!(!slot.clear_if(&other));
        assert!(slot.is_occupied());

        assert!(slot.clear_if(&installed));
        assert!(!slot.is_occupied());

        // Clearing an empty slot is a silent no-op.
        assert!(!slot.clear_if(&installed));
    }

    #[test]
    fn test_cleared_value_outlives_open_read_section() {
        let slot = RcuSlot::empty();
        let (canary, alive) = Canary::new();
        let installed = Arc::new(canary);
        slot.publish(Arc::clone(&installed));

        let section = slot.read();
        assert!(section.get().is_some());

        assert!(slot.clear_if(&installed));
        drop(installed);

        // The read section still pins the removed value.
        assert!(alive.load(Ordering::SeqCst));
        assert!(section.get().is_some());

        drop(section);
        assert!(!alive.load(Ordering::SeqCst));
    }

    #[test]
    fn test_concurrent_readers_and_writer() {
        let slot = Arc::new(RcuSlot::<(u64, u64)>::empty());
        let reads = Arc::new(AtomicUsize::new(0));
        let mut handles = vec![];

        for _ in 0..8 {
            let slot = Arc::clone(&slot);
            let reads = Arc::clone(&reads);
            handles.push(thread::spawn(move || {
                for _ in 0..20_000 {
                    let section = slot.read();
                    if let Some(value) = section.get() {
                        // A visible value is always fully constructed.
                        assert_eq!(value.0, value.1);
                        reads.fetch_add(1, Ordering::Relaxed);
                    }
                }
            }));
        }

        let writer_slot = Arc::clone(&slot);
        handles.push(thread::spawn(move || {
            for i in 0..2_000u64 {
                let value = Arc::new((i, i));
                writer_slot.publish(Arc::clone(&value));
                assert!(writer_slot.clear_if(&value));
            }
        }));

        for handle in handles {
            handle.join().unwrap();
        }
        assert!(!slot.is_occupied());
    }
}
