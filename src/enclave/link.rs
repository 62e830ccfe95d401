/*!
 * Attachment Links
 * One link binds one successful attachment to a closable handle
 */

use super::{Enclave, EnclaveRegistry};
use crate::core::errors::{HookError, HookResult};
use crate::core::types::{EnclaveId, HookKind, LinkRequest, ProgramId};
use crate::program::Program;
use log::{error, info, warn};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

// Link states. "Created" is the pre-allocation validation stage and has no
// runtime representation; a Link object starts out primed.
const STATE_PRIMED: u8 = 0;
const STATE_SETTLED: u8 = 1;
const STATE_RELEASED: u8 = 2;

/// One attachment of a program to an enclave hook.
///
/// A settled link owns exactly one strong reference to its enclave, held
/// from bind until release. Release detaches the program and drops that
/// reference (possibly running the enclave finalizer); it runs at most
/// once per link, enforced by an atomic one-shot state transition.
/// Deallocation is the link's `Drop`, which runs regardless of whether the
/// link ever settled.
struct Link {
    hook: HookKind,
    program: Arc<Program>,
    enclave: Mutex<Option<Arc<Enclave>>>,
    state: AtomicU8,
}

impl Link {
    fn new(hook: HookKind, program: Arc<Program>) -> Self {
        Self {
            hook,
            program,
            enclave: Mutex::new(None),
            state: AtomicU8::new(STATE_PRIMED),
        }
    }

    /// Take ownership of the strong enclave reference the link will hold
    /// until release
    fn bind(&self, enclave: Arc<Enclave>) {
        *self.enclave.lock() = Some(enclave);
    }

    fn settle(&self) {
        self.state.store(STATE_SETTLED, Ordering::Release);
    }

    /// Detach the program and drop the enclave reference.
    ///
    /// One-shot: the handle framework closes a link once, and the state
    /// swap keeps a second call from double-detaching anyway.
    fn release(&self) {
        if self.state.swap(STATE_RELEASED, Ordering::AcqRel) == STATE_RELEASED {
            return;
        }
        let enclave = match self.enclave.lock().take() {
            Some(enclave) => enclave,
            None => {
                // Unreachable in correct operation: a link settles only
                // after binding an enclave.
                error!(
                    "link for program {} released with no bound enclave",
                    self.program.id()
                );
                return;
            }
        };
        enclave.detach(self.hook, &self.program);
        info!(
            "link closed: program {} detached from enclave {} {:?}",
            self.program.id(),
            enclave.id(),
            self.hook
        );
        // Dropping `enclave` releases the link's strong reference and may
        // run the enclave finalizer.
    }
}

impl Drop for Link {
    fn drop(&mut self) {
        // A primed link that never settled deallocates without releasing;
        // its bound reference (if any) is rolled back by the field drop.
        if self.state.load(Ordering::Acquire) == STATE_SETTLED {
            self.release();
        }
    }
}

/// Owning handle for a settled link.
///
/// Closing or dropping the handle releases the attachment exactly once.
pub struct LinkHandle {
    link: Link,
}

impl LinkHandle {
    /// Hook the link occupies
    pub fn hook(&self) -> HookKind {
        self.link.hook
    }

    /// Identifier of the installed program
    pub fn program_id(&self) -> ProgramId {
        self.link.program.id()
    }

    /// Identifier of the bound enclave, if not yet released
    pub fn enclave_id(&self) -> Option<EnclaveId> {
        self.link.enclave.lock().as_ref().map(|e| e.id())
    }

    /// Release the attachment and deallocate the link
    pub fn close(self) {
        self.link.release();
    }
}

/// Create a link attaching `program` to the enclave named by `request`.
///
/// The full lifecycle runs synchronously: validate the request, prime the
/// link, resolve the enclave handle, bind a strong enclave reference, and
/// attach. Every failure path rolls back completely; in particular the
/// enclave's strong count is restored and the slot is left untouched, and
/// the link is deallocated without running its release path.
pub fn create_link(
    registry: &EnclaveRegistry,
    request: LinkRequest,
    program: Arc<Program>,
) -> HookResult<LinkHandle> {
    if request.flags != 0 {
        return Err(HookError::InvalidArgument(format!(
            "link creation flags must be zero, got {:#x}",
            request.flags
        )));
    }
    let hook = HookKind::from_attach_type(request.attach_type)
        .ok_or(HookError::Unsupported(request.attach_type))?;
    if program.target() != hook {
        return Err(HookError::InvalidArgument(format!(
            "program {} targets {:?}, request names {:?}",
            program.id(),
            program.target(),
            hook
        )));
    }

    // Prime: the link exists but is not externally observable yet.
    let link = Link::new(hook, Arc::clone(&program));

    // Resolve: a bad handle deallocates the primed link, release never runs.
    let enclave = registry.resolve(request.enclave)?;

    // Bind: the link is the long-term owner of this strong reference.
    link.bind(Arc::clone(&enclave));

    // Attach: on failure the bound reference drops with the link.
    if let Err(err) = enclave.attach(hook, Arc::clone(&program)) {
        warn!(
            "link creation failed for program {} on enclave {}: {}",
            program.id(),
            enclave.id(),
            err
        );
        return Err(err);
    }

    link.settle();
    info!(
        "link settled: program {} attached to enclave {} {:?}",
        program.id(),
        enclave.id(),
        hook
    );
    Ok(LinkHandle { link })
}
