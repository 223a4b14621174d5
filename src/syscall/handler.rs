//! System Call Handler
//!
//! Decodes a trapped syscall from the user stack, runs it and writes the
//! result back into the trap frame.
//!
//! # Security Considerations
//! - The call number and every argument slot are read through the
//!   validator; the stack pointer itself is user-controlled
//! - Unknown call numbers and bad pointers terminate the caller with
//!   status -1
//! - Faults are plain `Err` values, so any lock taken while handling the
//!   call has been released before the process is torn down

use alloc::format;
use core::fmt;

use log::{info, trace, warn};
use spin::Mutex;

use super::validate;
use crate::fs::{Console, Fd, FileSystem, FileTable};
use crate::mm::VirtAddr;
use crate::process::{Pid, Process};
use crate::trap::{TrapFrame, WORD_SIZE};

/// System call numbers
pub mod numbers {
    pub const SYS_HALT: u32 = 0;
    pub const SYS_EXIT: u32 = 1;
    pub const SYS_EXEC: u32 = 2;
    pub const SYS_WAIT: u32 = 3;
    pub const SYS_CREATE: u32 = 4;
    pub const SYS_REMOVE: u32 = 5;
    pub const SYS_OPEN: u32 = 6;
    pub const SYS_FILESIZE: u32 = 7;
    pub const SYS_READ: u32 = 8;
    pub const SYS_WRITE: u32 = 9;
    pub const SYS_SEEK: u32 = 10;
    pub const SYS_TELL: u32 = 11;
    pub const SYS_CLOSE: u32 = 12;
}

/// Exit status given to a process killed for a protection violation.
pub const EXIT_FAULT: i32 = -1;

/// A decoded system call number.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum Sysno {
    Halt = numbers::SYS_HALT,
    Exit = numbers::SYS_EXIT,
    Exec = numbers::SYS_EXEC,
    Wait = numbers::SYS_WAIT,
    Create = numbers::SYS_CREATE,
    Remove = numbers::SYS_REMOVE,
    Open = numbers::SYS_OPEN,
    Filesize = numbers::SYS_FILESIZE,
    Read = numbers::SYS_READ,
    Write = numbers::SYS_WRITE,
    Seek = numbers::SYS_SEEK,
    Tell = numbers::SYS_TELL,
    Close = numbers::SYS_CLOSE,
}

impl TryFrom<u32> for Sysno {
    type Error = Fault;

    fn try_from(nr: u32) -> Result<Self, Fault> {
        Ok(match nr {
            numbers::SYS_HALT => Self::Halt,
            numbers::SYS_EXIT => Self::Exit,
            numbers::SYS_EXEC => Self::Exec,
            numbers::SYS_WAIT => Self::Wait,
            numbers::SYS_CREATE => Self::Create,
            numbers::SYS_REMOVE => Self::Remove,
            numbers::SYS_OPEN => Self::Open,
            numbers::SYS_FILESIZE => Self::Filesize,
            numbers::SYS_READ => Self::Read,
            numbers::SYS_WRITE => Self::Write,
            numbers::SYS_SEEK => Self::Seek,
            numbers::SYS_TELL => Self::Tell,
            numbers::SYS_CLOSE => Self::Close,
            _ => return Err(Fault::UnknownSyscall(nr)),
        })
    }
}

/// A protection violation by the calling process.
///
/// Never returned to user space: the process is terminated instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fault {
    /// A user address that is null, outside user space, or unresolvable.
    BadAddress(VirtAddr),
    /// A call number outside the syscall table.
    UnknownSyscall(u32),
}

impl fmt::Display for Fault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::BadAddress(addr) => write!(f, "bad user address {}", addr),
            Self::UnknownSyscall(nr) => write!(f, "unknown syscall {}", nr),
        }
    }
}

/// What the trap glue should do after a syscall.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Return to the calling process.
    Resume,
    /// The calling process has exited with this status; do not resume it.
    Exited(i32),
    /// The machine is powering off.
    Halted,
}

/// State guarded by the filesystem lock.
pub(super) struct FsState<F: FileSystem> {
    pub(super) fs: F,
    pub(super) files: FileTable<F::File>,
}

/// The syscall layer: filesystem lock, open-file registry and console.
pub struct Syscalls<F: FileSystem, C> {
    pub(super) fs: Mutex<FsState<F>>,
    pub(super) console: Mutex<C>,
}

impl<F: FileSystem, C: Console> Syscalls<F, C> {
    /// Create the syscall layer over a filesystem and a console.
    pub const fn new(fs: F, console: C) -> Self {
        Self {
            fs: Mutex::new(FsState {
                fs,
                files: FileTable::new(),
            }),
            console: Mutex::new(console),
        }
    }

    /// Handle a syscall trap from `proc`.
    ///
    /// The result, if the call has one, is stored in `frame.eax`. Only the
    /// saved user stack pointer is consulted; the vector number is not.
    pub fn dispatch<P: Process>(&self, proc: &mut P, frame: &mut TrapFrame) -> Disposition {
        match self.try_dispatch(proc, frame) {
            Ok(disposition) => disposition,
            Err(fault) => {
                warn!("[SYSCALL] pid {}: {}, terminating", proc.pid(), fault);
                self.terminate(proc, EXIT_FAULT)
            }
        }
    }

    fn try_dispatch<P: Process>(
        &self,
        proc: &mut P,
        frame: &mut TrapFrame,
    ) -> Result<Disposition, Fault> {
        let esp = frame.user_stack();
        let sysno = Sysno::try_from(arg(proc, esp, 0)?)?;
        trace!("[SYSCALL] pid {}: {:?}", proc.pid(), sysno);

        let ret = match sysno {
            Sysno::Halt => return Ok(self.halt(proc)),
            Sysno::Exit => {
                let status = arg(proc, esp, 1)? as i32;
                return Ok(self.exit(proc, status));
            }
            Sysno::Exec => {
                let cmdline = VirtAddr::from(arg(proc, esp, 1)?);
                Some(self.exec(proc, esp, cmdline)?)
            }
            Sysno::Wait => {
                let child = Pid::from_raw(arg(proc, esp, 1)? as i32);
                Some(self.wait(proc, child))
            }
            Sysno::Create => {
                let path = VirtAddr::from(arg(proc, esp, 1)?);
                let size = arg(proc, esp, 2)?;
                Some(i32::from(self.create(proc, esp, path, size)?))
            }
            Sysno::Remove => {
                let path = VirtAddr::from(arg(proc, esp, 1)?);
                Some(i32::from(self.remove(proc, esp, path)?))
            }
            Sysno::Open => {
                let path = VirtAddr::from(arg(proc, esp, 1)?);
                Some(self.open(proc, esp, path)?)
            }
            Sysno::Filesize => {
                let fd = Fd::from_raw(arg(proc, esp, 1)? as i32);
                Some(self.filesize(proc, fd))
            }
            Sysno::Read => {
                let fd = Fd::from_raw(arg(proc, esp, 1)? as i32);
                let buffer = VirtAddr::from(arg(proc, esp, 2)?);
                let size = arg(proc, esp, 3)?;
                Some(self.read(proc, esp, fd, buffer, size)?)
            }
            Sysno::Write => {
                let fd = Fd::from_raw(arg(proc, esp, 1)? as i32);
                let buffer = VirtAddr::from(arg(proc, esp, 2)?);
                let size = arg(proc, esp, 3)?;
                Some(self.write(proc, esp, fd, buffer, size)?)
            }
            Sysno::Seek => {
                let fd = Fd::from_raw(arg(proc, esp, 1)? as i32);
                let position = arg(proc, esp, 2)?;
                self.seek(proc, fd, position);
                None
            }
            Sysno::Tell => {
                let fd = Fd::from_raw(arg(proc, esp, 1)? as i32);
                Some(self.tell(proc, fd) as i32)
            }
            Sysno::Close => {
                let fd = Fd::from_raw(arg(proc, esp, 1)? as i32);
                self.close(proc, fd);
                None
            }
        };

        #[cfg(feature = "syscall_trace")]
        log::debug!("[SYSCALL] pid {}: {:?} -> {:?}", proc.pid(), sysno, ret);

        if let Some(value) = ret {
            frame.set_return(value);
        }
        Ok(Disposition::Resume)
    }

    /// Terminate `proc` with `status`.
    ///
    /// Prints the termination notice, releases every descriptor the process
    /// owns and hands the status to the process subsystem.
    pub(super) fn terminate<P: Process>(&self, proc: &mut P, status: i32) -> Disposition {
        let notice = format!("{}: exit({})\n", proc.name(), status);
        self.console.lock().putbuf(notice.as_bytes());
        info!("[PROCESS] {} (pid {}) exited with status {}", proc.name(), proc.pid(), status);

        self.release_process(proc.pid());
        proc.exit(status);
        Disposition::Exited(status)
    }

    /// Close every descriptor owned by `pid`.
    ///
    /// Called on every exit path, including processes killed outside a
    /// syscall. Safe to call more than once.
    pub fn release_process(&self, pid: Pid) {
        let mut state = self.fs.lock();
        let FsState { fs, files } = &mut *state;
        for handle in files.close_all(pid) {
            fs.close(handle);
        }
    }

    /// Owner of a live descriptor, if any.
    pub fn lookup(&self, fd: Fd) -> Option<Pid> {
        self.fs.lock().files.lookup(fd).map(|desc| desc.owner())
    }

    /// Number of descriptors `pid` currently holds.
    pub fn open_count(&self, pid: Pid) -> usize {
        self.fs.lock().files.count_owned(pid)
    }
}

/// Read argument slot `slot` from the user stack at `esp`.
fn arg<P: Process>(proc: &mut P, esp: VirtAddr, slot: usize) -> Result<u32, Fault> {
    let addr = esp
        .checked_add(slot * WORD_SIZE)
        .ok_or(Fault::BadAddress(esp))?;
    validate::read_user_word(proc.address_space(), esp, addr)
}

#[cfg(test)]
impl<F: FileSystem, C> Syscalls<F, C> {
    pub(crate) fn with_fs<R>(&self, f: impl FnOnce(&mut F) -> R) -> R {
        f(&mut self.fs.lock().fs)
    }

    pub(crate) fn with_console<R>(&self, f: impl FnOnce(&mut C) -> R) -> R {
        f(&mut *self.console.lock())
    }
}
