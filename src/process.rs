//! Process Collaborator Interface
//!
//! The syscall layer runs on the calling process's own thread and only
//! queries the process subsystem; it never owns a thread control block.
//! Scheduling, child bookkeeping and executable loading live behind the
//! [`Process`] trait.

use core::fmt;

use crate::mm::AddressSpace;

/// A process identifier.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
pub struct Pid(i32);

impl Pid {
    /// Value returned to user space when a process could not be started.
    pub const ERROR: Self = Self(-1);

    /// Create a pid from its raw value.
    #[inline]
    pub const fn from_raw(raw: i32) -> Self {
        Self(raw)
    }

    /// Get the raw value.
    #[inline]
    pub const fn as_raw(self) -> i32 {
        self.0
    }
}

impl fmt::Debug for Pid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Pid({})", self.0)
    }
}

impl fmt::Display for Pid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The process that trapped into the kernel.
pub trait Process {
    /// The process's address space.
    type Space: AddressSpace;

    /// Identifier of this process.
    fn pid(&self) -> Pid;

    /// Name printed in the termination notice.
    fn name(&self) -> &str;

    /// The process's address space.
    fn address_space(&mut self) -> &mut Self::Space;

    /// Start a new process from `cmdline`.
    ///
    /// Blocks until the child's executable has either loaded or failed to
    /// load. Returns `None` on load failure.
    fn exec(&mut self, cmdline: &str) -> Option<Pid>;

    /// Wait for `child` to terminate and return its exit status.
    ///
    /// Returns -1 without blocking if `child` is not an unreaped child of
    /// this process.
    fn wait(&mut self, child: Pid) -> i32;

    /// Record `status` for the parent and tear the process down.
    ///
    /// The thread never returns to user mode after this.
    fn exit(&mut self, status: i32);

    /// Power the machine off.
    fn power_off(&mut self);
}
