/*!
 * Policy Programs
 * Opaque, externally managed routines invoked at enclave hook points
 */

pub mod access;

use crate::core::types::{HookKind, ProgramId};
use std::fmt;

/// Byte size of the context structure exposed to programs
pub const SCHED_CONTEXT_SIZE: usize = 32;

/// Return value meaning "affirmative" for both hooks: skip the tick, or
/// retry the pick. Any other value means "negative".
pub const PROGRAM_AFFIRMATIVE: i32 = 1;

/// Fixed-size context handed to a program for one invocation.
///
/// No fields are exposed yet; access validation is driven by
/// [`access::CONTEXT_FIELDS`], so fields can be added there without
/// touching the attach/detach/invoke protocol.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct SchedContext {
    _reserved: [u8; SCHED_CONTEXT_SIZE],
}

impl Default for SchedContext {
    fn default() -> Self {
        Self {
            _reserved: [0; SCHED_CONTEXT_SIZE],
        }
    }
}

/// The executable body of a program.
///
/// Implementations are produced by the external loader; this crate only
/// invokes them. A routine attached at the tick hook runs under a held
/// run-queue lock and must not block.
pub trait ProgramRoutine: Send + Sync {
    /// Run the routine against a per-invocation context
    fn run(&self, ctx: &mut SchedContext) -> i32;
}

impl<F> ProgramRoutine for F
where
    F: Fn(&mut SchedContext) -> i32 + Send + Sync,
{
    fn run(&self, ctx: &mut SchedContext) -> i32 {
        (self)(ctx)
    }
}

/// A loaded policy program with its statically declared target hook.
///
/// Programs are owned and destroyed by the external program manager; this
/// crate only stores and clears references to them.
pub struct Program {
    id: ProgramId,
    target: HookKind,
    routine: Box<dyn ProgramRoutine>,
}

impl Program {
    /// Wrap a loaded routine declared for `target`
    pub fn new(id: ProgramId, target: HookKind, routine: impl ProgramRoutine + 'static) -> Self {
        Self {
            id,
            target,
            routine: Box::new(routine),
        }
    }

    /// Program identifier
    pub fn id(&self) -> ProgramId {
        self.id
    }

    /// The hook this program was compiled and verified for
    pub fn target(&self) -> HookKind {
        self.target
    }

    /// Invoke the routine synchronously on the calling context
    #[inline]
    pub fn run(&self, ctx: &mut SchedContext) -> i32 {
        self.routine.run(ctx)
    }
}

impl fmt::Debug for Program {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Program")
            .field("id", &self.id)
            .field("target", &self.target)
            .finish_non_exhaustive()
    }
}
