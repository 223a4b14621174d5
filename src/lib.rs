//! Syscall trap layer for a teaching kernel
//!
//! The code in this crate runs on a user process's thread right after it
//! traps into the kernel. It pulls the call number and arguments off a user
//! stack it cannot trust, runs the requested operation and puts the result
//! back in the trap frame, or terminates the process if it handed the
//! kernel a bad pointer.
//!
//! # Layout
//! - [`trap`]: the saved register frame and the syscall gate
//! - [`mm`]: user addresses and the virtual-memory collaborator
//! - [`fs`]: filesystem and console collaborators, the open-file registry
//! - [`process`]: the process collaborator
//! - [`syscall`]: validator, dispatcher and operations
//!
//! Scheduling, paging policy, executable loading and the on-disk
//! filesystem are not implemented here; they are reached through the
//! collaborator traits.

#![no_std]
#![deny(unsafe_op_in_unsafe_fn)]

extern crate alloc;

#[cfg(test)]
extern crate std;

pub mod fs;
pub mod mm;
pub mod process;
pub mod syscall;
pub mod trap;

#[cfg(test)]
mod testing;

pub use syscall::{Disposition, Fault, Syscalls};
pub use trap::TrapFrame;
