/*!
 * Scheduling Enclaves
 * Shared containers owning the per-hook program slots and their write lock
 */

pub mod link;

use crate::core::errors::{HookError, HookResult};
use crate::core::sync::{RcuSlot, SlotReadGuard};
use crate::core::types::{EnclaveId, HookKind, RawEnclaveHandle};
use crate::program::Program;
use dashmap::DashMap;
use log::{debug, info};
use parking_lot::Mutex;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Default capacity of an [`EnclaveRegistry`]
pub const DEFAULT_REGISTRY_CAPACITY: usize = 1024;

/// Finalizer run when the last strong reference to an enclave drops
pub type EnclaveFinalizer = Box<dyn FnOnce(EnclaveId) + Send>;

/// A scheduling domain with one exclusive slot per hook.
///
/// Enclaves are shared through `Arc`; the embedder creates them, registers
/// them in a registry, and supplies an optional finalizer that runs when
/// the last strong reference (typically a link's) goes away.
///
/// # Locking
///
/// Attach and detach serialize through `slot_lock`. Hook invocation never
/// takes the lock; it reads the slots through their RCU read guards, so
/// readers and writers never block each other at the slot granularity.
pub struct Enclave {
    id: EnclaveId,
    slot_lock: Mutex<()>,
    slots: [RcuSlot<Program>; HookKind::COUNT],
    finalizer: Mutex<Option<EnclaveFinalizer>>,
}

impl Enclave {
    /// Create an enclave with empty hook slots
    pub fn new(id: EnclaveId) -> Arc<Self> {
        Arc::new(Self {
            id,
            slot_lock: Mutex::new(()),
            slots: std::array::from_fn(|_| RcuSlot::empty()),
            finalizer: Mutex::new(None),
        })
    }

    /// Create an enclave whose finalizer runs on last strong-reference drop
    pub fn with_finalizer(id: EnclaveId, finalizer: EnclaveFinalizer) -> Arc<Self> {
        Arc::new(Self {
            id,
            slot_lock: Mutex::new(()),
            slots: std::array::from_fn(|_| RcuSlot::empty()),
            finalizer: Mutex::new(Some(finalizer)),
        })
    }

    /// Enclave identifier
    pub fn id(&self) -> EnclaveId {
        self.id
    }

    fn slot(&self, hook: HookKind) -> &RcuSlot<Program> {
        &self.slots[hook.index()]
    }

    /// Whether a program currently occupies `hook`
    pub fn is_attached(&self, hook: HookKind) -> bool {
        self.slot(hook).is_occupied()
    }

    /// Open a read section over the slot for `hook`.
    ///
    /// Used by the invocation paths; the returned guard pins the program
    /// (if any) until dropped.
    pub(crate) fn read_slot(&self, hook: HookKind) -> SlotReadGuard<Program> {
        self.slot(hook).read()
    }

    /// Install `program` into the slot for `hook`.
    ///
    /// Returns [`HookError::Busy`] if the slot is occupied. The publish is
    /// release-ordered: a concurrent reader that observes the slot as
    /// non-empty observes the fully constructed program.
    pub fn attach(&self, hook: HookKind, program: Arc<Program>) -> HookResult<()> {
        let _write = self.slot_lock.lock();
        let slot = self.slot(hook);
        if slot.is_occupied() {
            debug!("enclave {}: {:?} slot busy", self.id, hook);
            return Err(HookError::Busy);
        }
        let program_id = program.id();
        slot.publish(program);
        info!(
            "enclave {}: program {} attached at {:?}",
            self.id, program_id, hook
        );
        Ok(())
    }

    /// Clear the slot for `hook` if it still holds `expected`.
    ///
    /// Compare-and-clear: a mismatch or an already-empty slot is a silent
    /// no-op. Under the single-writer protocol the comparison always
    /// matches, but the contract holds even if a future caller races.
    /// The removed program is reclaimed only after every read section that
    /// could have observed it has closed.
    pub fn detach(&self, hook: HookKind, expected: &Arc<Program>) {
        let _write = self.slot_lock.lock();
        if self.slot(hook).clear_if(expected) {
            info!(
                "enclave {}: program {} detached from {:?}",
                self.id,
                expected.id(),
                hook
            );
        } else {
            debug!(
                "enclave {}: detach of program {} from {:?} was a no-op",
                self.id,
                expected.id(),
                hook
            );
        }
    }
}

impl Drop for Enclave {
    fn drop(&mut self) {
        if let Some(finalizer) = self.finalizer.get_mut().take() {
            debug!("enclave {}: running finalizer", self.id);
            finalizer(self.id);
        }
    }
}

impl fmt::Debug for Enclave {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Enclave")
            .field("id", &self.id)
            .field("tick_attached", &self.is_attached(HookKind::Tick))
            .field(
                "pick_next_task_attached",
                &self.is_attached(HookKind::PickNextTask),
            )
            .finish()
    }
}

/// Handle table mapping raw handles to live enclaves.
///
/// The registry is the resolution collaborator for link creation; it holds
/// one strong reference per registered enclave and is bounded so a runaway
/// control plane cannot grow it without limit.
pub struct EnclaveRegistry {
    table: DashMap<RawEnclaveHandle, Arc<Enclave>>,
    // Reservation count, maintained ahead of the map so racing inserts
    // cannot pass the capacity check together.
    occupancy: AtomicUsize,
    capacity: usize,
}

impl EnclaveRegistry {
    /// Create a registry with the default capacity
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_REGISTRY_CAPACITY)
    }

    /// Create a registry bounded at `capacity` enclaves
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            table: DashMap::new(),
            occupancy: AtomicUsize::new(0),
            capacity,
        }
    }

    /// Register an enclave under `handle`.
    ///
    /// Returns [`HookError::OutOfMemory`] at capacity and
    /// [`HookError::InvalidArgument`] if the handle is already taken.
    pub fn insert(&self, handle: RawEnclaveHandle, enclave: Arc<Enclave>) -> HookResult<()> {
        // Reserve a seat atomically before touching the map; the
        // reservation is rolled back if the handle turns out to be taken.
        let reserved = self
            .occupancy
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| {
                (n < self.capacity).then_some(n + 1)
            });
        if reserved.is_err() {
            return Err(HookError::OutOfMemory(format!(
                "enclave registry at capacity ({})",
                self.capacity
            )));
        }
        match self.table.entry(handle) {
            dashmap::mapref::entry::Entry::Occupied(_) => {
                self.occupancy.fetch_sub(1, Ordering::AcqRel);
                Err(HookError::InvalidArgument(format!(
                    "enclave handle {handle} already registered"
                )))
            }
            dashmap::mapref::entry::Entry::Vacant(slot) => {
                slot.insert(enclave);
                Ok(())
            }
        }
    }

    /// Drop the registry's reference for `handle`, returning the enclave
    pub fn remove(&self, handle: RawEnclaveHandle) -> Option<Arc<Enclave>> {
        let removed = self.table.remove(&handle).map(|(_, enclave)| enclave);
        if removed.is_some() {
            self.occupancy.fetch_sub(1, Ordering::AcqRel);
        }
        removed
    }

    /// Translate a handle into a strong enclave reference
    pub fn resolve(&self, handle: RawEnclaveHandle) -> HookResult<Arc<Enclave>> {
        self.table
            .get(&handle)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or(HookError::BadHandle(handle))
    }

    /// Number of registered enclaves
    pub fn len(&self) -> usize {
        self.table.len()
    }

    /// Whether the registry is empty
    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }
}

impl Default for EnclaveRegistry {
    fn default() -> Self {
        Self::new()
    }
}
