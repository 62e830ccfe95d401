/*!
 * Attachment Integration Tests
 * Slot occupancy, compare-and-clear detach, and reader/writer safety
 */

use enclave_hooks::{
    skip_tick, Enclave, HookError, HookKind, Program, ProgramRoutine, RunQueue, SchedContext,
};
use proptest::prelude::*;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;

fn program(id: u64, target: HookKind, ret: i32) -> Arc<Program> {
    Arc::new(Program::new(id, target, move |_: &mut SchedContext| ret))
}

/// Routine whose liveness is observable: `run` on a reclaimed instance
/// would trip the flag assertion.
struct CanaryRoutine {
    alive: Arc<AtomicBool>,
}

impl CanaryRoutine {
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

impl ProgramRoutine for CanaryRoutine {
    fn run(&self, _ctx: &mut SchedContext) -> i32 {
        assert!(
            self.alive.load(Ordering::SeqCst),
            "program invoked after reclamation"
        );
        1
    }
}

impl Drop for CanaryRoutine {
    fn drop(&mut self) {
        self.alive.store(false, Ordering::SeqCst);
    }
}

#[test]
fn attach_succeeds_only_on_empty_slot() {
    let enclave = Enclave::new(1);
    let first = program(1, HookKind::Tick, 1);
    let second = program(2, HookKind::Tick, 1);

    assert!(enclave.attach(HookKind::Tick, Arc::clone(&first)).is_ok());
    assert_eq!(
        enclave.attach(HookKind::Tick, Arc::clone(&second)),
        Err(HookError::Busy)
    );

    enclave.detach(HookKind::Tick, &first);
    assert!(enclave.attach(HookKind::Tick, second).is_ok());
}

#[test]
fn detach_with_mismatched_program_is_a_noop() {
    let enclave = Enclave::new(1);
    let installed = program(1, HookKind::Tick, 1);
    let expected_by_racer = program(2, HookKind::Tick, 1);

    enclave
        .attach(HookKind::Tick, Arc::clone(&installed))
        .unwrap();
    enclave.detach(HookKind::Tick, &expected_by_racer);

    // Slot still holds the originally installed program.
    let rq = RunQueue::new(0);
    let guard = rq.lock();
    assert!(skip_tick(&enclave, &guard));
}

#[test]
fn hooks_occupy_independent_slots() {
    let enclave = Enclave::new(1);
    enclave
        .attach(HookKind::Tick, program(1, HookKind::Tick, 1))
        .unwrap();
    assert!(enclave
        .attach(
            HookKind::PickNextTask,
            program(2, HookKind::PickNextTask, 1)
        )
        .is_ok());
}

#[test]
fn concurrent_invocations_never_observe_reclaimed_program() {
    let _ = env_logger::builder().is_test(true).try_init();

    let enclave = Enclave::new(1);
    let stop = Arc::new(AtomicBool::new(false));
    let invocations = Arc::new(AtomicUsize::new(0));
    let mut handles = vec![];

    for cpu in 0..4 {
        let enclave = Arc::clone(&enclave);
        let stop = Arc::clone(&stop);
        let invocations = Arc::clone(&invocations);
        handles.push(thread::spawn(move || {
            let rq = RunQueue::new(cpu);
            while !stop.load(Ordering::Relaxed) {
                let guard = rq.lock();
                if skip_tick(&enclave, &guard) {
                    invocations.fetch_add(1, Ordering::Relaxed);
                }
            }
        }));
    }

    let mut canaries = vec![];
    for id in 0..500 {
        let (routine, alive) = CanaryRoutine::new();
        canaries.push(alive);
        let prog = Arc::new(Program::new(id, HookKind::Tick, routine));
        enclave.attach(HookKind::Tick, Arc::clone(&prog)).unwrap();
        // Jitter the occupancy window so readers hit both slot states.
        if rand::random::<u8>() & 3 == 0 {
            thread::yield_now();
        }
        enclave.detach(HookKind::Tick, &prog);
    }

    stop.store(true, Ordering::Relaxed);
    for handle in handles {
        handle.join().unwrap();
    }

    // Every detached program has been reclaimed now that all read
    // sections are closed.
    for alive in canaries {
        assert!(!alive.load(Ordering::SeqCst));
    }
}

#[derive(Debug, Clone, Copy)]
enum SlotOp {
    Attach(bool),
    Detach(bool),
}

fn slot_op() -> impl Strategy<Value = SlotOp> {
    prop_oneof![
        any::<bool>().prop_map(SlotOp::Attach),
        any::<bool>().prop_map(SlotOp::Detach),
    ]
}

proptest! {
    /// Attach succeeds iff the slot was empty immediately prior, for any
    /// interleaving of attach/detach with two program identities.
    #[test]
    fn attach_detach_interleavings_match_model(ops in proptest::collection::vec(slot_op(), 1..64)) {
        let enclave = Enclave::new(1);
        let programs = [
            program(0, HookKind::Tick, 1),
            program(1, HookKind::Tick, 1),
        ];
        let mut model: Option<usize> = None;

        for op in ops {
            match op {
                SlotOp::Attach(which) => {
                    let idx = which as usize;
                    let result = enclave.attach(HookKind::Tick, Arc::clone(&programs[idx]));
                    if model.is_none() {
                        prop_assert!(result.is_ok());
                        model = Some(idx);
                    } else {
                        prop_assert_eq!(result, Err(HookError::Busy));
                    }
                }
                SlotOp::Detach(which) => {
                    let idx = which as usize;
                    enclave.detach(HookKind::Tick, &programs[idx]);
                    if model == Some(idx) {
                        model = None;
                    }
                }
            }
            prop_assert_eq!(enclave.is_attached(HookKind::Tick), model.is_some());
        }
    }
}
