/*!
 * Synchronization Primitives
 * RCU-style slot for publishing policy programs to lock-free readers
 */

mod slot;

pub use slot::{RcuSlot, SlotReadGuard};
