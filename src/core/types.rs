/*!
 * Core Types
 * Identifiers and request shapes shared across the crate
 */

use serde::{Deserialize, Serialize};

/// CPU identifier
pub type CpuId = u32;

/// Enclave identifier, assigned by the embedder at enclave creation
pub type EnclaveId = u64;

/// Program identifier, assigned by the external program manager
pub type ProgramId = u64;

/// Task identifier as carried by the dispatch capability
pub type TaskId = i64;

/// Opaque handle value resolved against the enclave registry
pub type RawEnclaveHandle = u64;

/// Raw attach-type identifier for the tick hook
pub const ATTACH_TYPE_TICK: u32 = 0;

/// Raw attach-type identifier for the pick-next-task hook
pub const ATTACH_TYPE_PICK_NEXT_TASK: u32 = 1;

/// The two extension points an enclave exposes to policy programs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HookKind {
    /// Per-tick "skip this tick" decision, invoked with the run-queue lock held
    Tick,
    /// "Retry the pick" decision, invoked from the pick-next-task path
    PickNextTask,
}

impl HookKind {
    /// Number of hook slots an enclave carries; sizes the per-enclave
    /// slot array
    pub const COUNT: usize = 2;

    /// Index of this hook's slot in a per-enclave slot array
    pub(crate) fn index(self) -> usize {
        match self {
            HookKind::Tick => 0,
            HookKind::PickNextTask => 1,
        }
    }

    /// Map a raw attach-type identifier onto a supported hook kind
    pub fn from_attach_type(raw: u32) -> Option<Self> {
        match raw {
            ATTACH_TYPE_TICK => Some(HookKind::Tick),
            ATTACH_TYPE_PICK_NEXT_TASK => Some(HookKind::PickNextTask),
            _ => None,
        }
    }

    /// Raw identifier carried in attach requests for this hook
    pub fn attach_type(self) -> u32 {
        match self {
            HookKind::Tick => ATTACH_TYPE_TICK,
            HookKind::PickNextTask => ATTACH_TYPE_PICK_NEXT_TASK,
        }
    }
}

/// Link-creation request as supplied by the control interface.
///
/// The program itself is resolved by the external loader and passed
/// alongside the request; only the enclave travels by handle here.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct LinkRequest {
    /// Raw attach-type identifier; must name a supported hook
    pub attach_type: u32,
    /// Creation flags; must be zero
    pub flags: u32,
    /// Handle of the enclave to attach to
    pub enclave: RawEnclaveHandle,
}
