//! System Call Interface
//!
//! The boundary where user processes request kernel services through the
//! `int $0x30` gate.
//!
//! # Security Model
//! - Whitelist approach: only the calls in [`numbers`] exist; anything else
//!   kills the caller
//! - Every user pointer, including the stack slots holding the arguments,
//!   is validated before use
//! - Invalid pointers are protection violations: the caller exits with
//!   status -1, the kernel never faults on its behalf
//! - All filesystem state is serialized by one lock
//!
//! # Current Syscalls
//! - 0: halt()
//! - 1: exit(status)
//! - 2: exec(cmdline)
//! - 3: wait(pid)
//! - 4: create(path, size)
//! - 5: remove(path)
//! - 6: open(path)
//! - 7: filesize(fd)
//! - 8: read(fd, buf, len)
//! - 9: write(fd, buf, len)
//! - 10: seek(fd, pos)
//! - 11: tell(fd)
//! - 12: close(fd)

mod handler;
mod ops;
pub mod validate;

pub use handler::{numbers, Disposition, Fault, Syscalls, Sysno, EXIT_FAULT};
pub use validate::{Access, Resolution, UserSlice, UserSliceMut};
