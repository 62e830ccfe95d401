/*!
 * Context Access and Capability Gating
 * Data-driven validation consulted when a program is resolved by the loader
 */

use super::{Program, SCHED_CONTEXT_SIZE};
use crate::core::errors::{HookError, HookResult};
use crate::core::types::{CpuId, HookKind, TaskId};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// One readable field of [`super::SchedContext`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldSpec {
    /// Byte offset of the field within the context structure
    pub offset: usize,
    /// Field width in bytes
    pub size: usize,
}

/// Fields currently exposed to programs.
///
/// Intentionally empty: every offset is rejected until a field is listed
/// here. Extending the table does not change the attach/detach/invoke
/// protocol.
pub const CONTEXT_FIELDS: &[FieldSpec] = &[];

/// Validate a program's attempted access into the context structure.
///
/// Rejects negative offsets, accesses extending past the structure bound,
/// misaligned accesses (offset not a multiple of the access size), and any
/// offset not listed in [`CONTEXT_FIELDS`].
pub fn is_valid_access(offset: i64, size: usize) -> bool {
    if offset < 0 || size == 0 {
        return false;
    }
    let offset = offset as usize;
    let end = match offset.checked_add(size) {
        Some(end) => end,
        None => return false,
    };
    if end > SCHED_CONTEXT_SIZE || offset % size != 0 {
        return false;
    }
    CONTEXT_FIELDS
        .iter()
        .any(|field| field.offset == offset && size <= field.size)
}

/// Invocation capabilities a program may bind, scoped by its target hook
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    /// Wake the agent execution context on a CPU
    WakeAgent,
    /// Dispatch a specific task onto the invoking CPU
    RunTask,
}

/// Capabilities available to programs attached at `hook`.
///
/// Dispatching a task is restricted to the pick-next-task hook, where the
/// invoker releases the run-queue lock around the program call.
pub fn hook_capabilities(hook: HookKind) -> &'static [Capability] {
    match hook {
        HookKind::Tick => &[Capability::WakeAgent],
        HookKind::PickNextTask => &[Capability::WakeAgent, Capability::RunTask],
    }
}

fn check_capability(target: HookKind, capability: Capability) -> HookResult<()> {
    if hook_capabilities(target).contains(&capability) {
        Ok(())
    } else {
        Err(HookError::InvalidArgument(format!(
            "capability {capability:?} not available to programs targeting {target:?}"
        )))
    }
}

/// Resolution-time check: may `program` bind `capability`?
///
/// Consulted by the external loader while resolving a program's callable
/// operations, before the program is ever attached.
pub fn resolve_capability(program: &Program, capability: Capability) -> HookResult<()> {
    check_capability(program.target(), capability)
}

/// Embedder-supplied operations behind the invocation capabilities.
///
/// Implementations live outside this crate; the shim only decides which of
/// them a given program may reach.
pub trait HookEnv: Send + Sync {
    /// Wake the agent execution context on `cpu`
    fn wake_agent(&self, cpu: CpuId) -> i32;

    /// Dispatch `task` onto the invoking CPU
    fn run_task(&self, task: TaskId, barrier: u32, flags: i32) -> i32;
}

/// Capability calls scoped to one program's target hook.
///
/// Built by the loader when it resolves a program's callable operations.
/// Every forwarding method consults the hook-scoped capability table, so a
/// program never reaches an operation outside its declared target's set.
pub struct ProgramEnv {
    target: HookKind,
    env: Arc<dyn HookEnv>,
}

impl ProgramEnv {
    /// Scope `env` to `program`'s declared target hook
    pub fn new(program: &Program, env: Arc<dyn HookEnv>) -> Self {
        Self {
            target: program.target(),
            env,
        }
    }

    /// Hook whose capability set gates this surface
    pub fn target(&self) -> HookKind {
        self.target
    }

    /// Forward a wake-agent call; available to both hook kinds
    pub fn wake_agent(&self, cpu: CpuId) -> HookResult<i32> {
        check_capability(self.target, Capability::WakeAgent)?;
        Ok(self.env.wake_agent(cpu))
    }

    /// Forward a run-task call; pick-next-task programs only
    pub fn run_task(&self, task: TaskId, barrier: u32, flags: i32) -> HookResult<i32> {
        check_capability(self.target, Capability::RunTask)?;
        Ok(self.env.run_task(task, barrier, flags))
    }
}
