/*!
 * Scheduler Interface
 * Run-queue lock modelling and the hook invocation call sites
 */

pub mod invoke;
mod rq;

pub use rq::{RqGuard, RunQueue};
