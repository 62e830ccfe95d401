/*!
 * Hook Invocation
 * The two call sites that read a hook slot and run its program
 */

use super::RqGuard;
use crate::core::types::HookKind;
use crate::enclave::Enclave;
use crate::program::{SchedContext, PROGRAM_AFFIRMATIVE};

/// Per-tick decision: should this tick be skipped?
///
/// Called with the run-queue lock held; the program runs under that lock
/// and must not block or sleep. With no program attached the tick is
/// always taken. The program's result is read inside the slot read
/// section, which closes on return.
pub fn skip_tick(enclave: &Enclave, rq: &RqGuard<'_>) -> bool {
    debug_assert!(rq.is_held() && rq.is_pinned());

    let section = enclave.read_slot(HookKind::Tick);
    let program = match section.get() {
        Some(program) => program,
        None => return false,
    };

    let mut ctx = SchedContext::default();
    program.run(&mut ctx) == PROGRAM_AFFIRMATIVE
}

/// Pick-next-task decision: should the picker retry its search?
///
/// With no program attached, no retry. Otherwise the run-queue lock is
/// fully released (unpin, then unlock) around the program call: the
/// program is allowed to take locks of its own, for example to wake the
/// agent, which would deadlock under a held run-queue lock. The lock is
/// held and pinned again when this returns, and the slot read section
/// closes only after the re-acquire, so the program stays alive for the
/// whole call even if it is detached concurrently.
///
/// Because the lock was dropped mid-call, the caller must treat all
/// previously read scheduler state as stale and revalidate it.
pub fn retry_pick(enclave: &Enclave, rq: &mut RqGuard<'_>) -> bool {
    debug_assert!(rq.is_held() && rq.is_pinned());

    let section = enclave.read_slot(HookKind::PickNextTask);
    let program = match section.get() {
        Some(program) => program,
        None => return false,
    };

    let mut ctx = SchedContext::default();
    let ret = rq.unlocked(|| program.run(&mut ctx));

    // Close the read section after the lock is held again.
    drop(section);
    ret == PROGRAM_AFFIRMATIVE
}
