/*!
 * Enclave Hook Core
 * Attachment, lifecycle, and invocation protocol for policy programs that
 * plug into the tick and pick-next-task extension points of a scheduling
 * enclave
 */

pub mod core;
pub mod enclave;
pub mod program;
pub mod sched;

// Re-exports
pub use crate::core::errors::{HookError, HookResult};
pub use crate::core::sync::{RcuSlot, SlotReadGuard};
pub use crate::core::types::{
    CpuId, EnclaveId, HookKind, LinkRequest, ProgramId, RawEnclaveHandle, TaskId,
    ATTACH_TYPE_PICK_NEXT_TASK, ATTACH_TYPE_TICK,
};
pub use crate::enclave::link::{create_link, LinkHandle};
pub use crate::enclave::{Enclave, EnclaveRegistry};
pub use crate::program::access::{
    hook_capabilities, is_valid_access, resolve_capability, Capability, HookEnv, ProgramEnv,
};
pub use crate::program::{Program, ProgramRoutine, SchedContext, PROGRAM_AFFIRMATIVE};
pub use crate::sched::invoke::{retry_pick, skip_tick};
pub use crate::sched::{RqGuard, RunQueue};
