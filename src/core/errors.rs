/*!
 * Error Types
 * Centralized error handling with thiserror, miette, and serde support
 */

use crate::core::types::RawEnclaveHandle;
use miette::Diagnostic;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Hook attachment and lifecycle errors with serialization support
#[derive(Error, Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Diagnostic)]
#[serde(tag = "error_type", content = "details", rename_all = "snake_case")]
pub enum HookError {
    #[error("Invalid argument: {0}")]
    #[diagnostic(
        code(hook::invalid_argument),
        help("Creation flags must be zero and the hook must match the program's declared target.")
    )]
    InvalidArgument(String),

    #[error("Hook slot busy")]
    #[diagnostic(
        code(hook::busy),
        help("At most one program may occupy a hook slot. Detach the current program first.")
    )]
    Busy,

    #[error("Bad enclave handle: {0}")]
    #[diagnostic(
        code(hook::bad_handle),
        help("The enclave may have been destroyed or the handle was never registered.")
    )]
    BadHandle(RawEnclaveHandle),

    #[error("Unsupported hook kind: {0}")]
    #[diagnostic(
        code(hook::unsupported),
        help("Only the tick and pick-next-task hooks are attachable.")
    )]
    Unsupported(u32),

    #[error("Out of memory: {0}")]
    #[diagnostic(
        code(hook::out_of_memory),
        help("A registration table is at capacity. Remove unused entries.")
    )]
    OutOfMemory(String),
}

/// Common result type for hook operations
pub type HookResult<T> = Result<T, HookError>;
