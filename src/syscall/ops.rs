//! System call implementations
//!
//! Each operation receives raw argument words. Pointer arguments are
//! validated here, before the filesystem lock is taken, so a bad pointer
//! never faults with the lock held.
//!
//! Operation-level failures (unknown descriptor, missing file, short
//! transfer) are ordinary return values; only [`Fault`] kills the caller.

use alloc::vec::Vec;

use log::debug;

use super::handler::{Disposition, Fault, FsState, Syscalls};
use super::validate::{self, UserSlice, UserSliceMut};
use crate::fs::{Console, Fd, FileSystem};
use crate::mm::{AddressSpace, VirtAddr, PAGE_SIZE};
use crate::process::{Pid, Process};

/// Clamp a byte count into the return register.
#[inline]
fn count(n: usize) -> i32 {
    i32::try_from(n).unwrap_or(i32::MAX)
}

/// Kernel staging buffer for a transfer of `len` bytes, at most a page.
///
/// Kept on the heap; a thread's kernel stack is smaller than a page.
fn bounce_buffer(len: usize) -> Vec<u8> {
    alloc::vec![0u8; len.min(PAGE_SIZE)]
}

impl<F: FileSystem, C: Console> Syscalls<F, C> {
    /// halt: power the machine off.
    pub(super) fn halt<P: Process>(&self, proc: &mut P) -> Disposition {
        debug!("[SYSCALL] pid {}: halt", proc.pid());
        proc.power_off();
        Disposition::Halted
    }

    /// exit(status): terminate the caller, reporting `status` to its parent.
    pub(super) fn exit<P: Process>(&self, proc: &mut P, status: i32) -> Disposition {
        self.terminate(proc, status)
    }

    /// exec(cmdline): start a child and return its pid, or -1.
    pub(super) fn exec<P: Process>(
        &self,
        proc: &mut P,
        esp: VirtAddr,
        cmdline: VirtAddr,
    ) -> Result<i32, Fault> {
        let Some(cmdline) = validate::validate_user_str(proc.address_space(), esp, cmdline)? else {
            return Ok(Pid::ERROR.as_raw());
        };
        let pid = proc.exec(&cmdline).unwrap_or(Pid::ERROR);
        debug!("[SYSCALL] pid {}: exec {:?} -> {}", proc.pid(), cmdline, pid);
        Ok(pid.as_raw())
    }

    /// wait(pid): block until `child` exits and return its status.
    pub(super) fn wait<P: Process>(&self, proc: &mut P, child: Pid) -> i32 {
        proc.wait(child)
    }

    /// create(path, size): create a file without opening it.
    pub(super) fn create<P: Process>(
        &self,
        proc: &mut P,
        esp: VirtAddr,
        path: VirtAddr,
        size: u32,
    ) -> Result<bool, Fault> {
        let Some(path) = validate::validate_user_str(proc.address_space(), esp, path)? else {
            return Ok(false);
        };
        Ok(self.fs.lock().fs.create(&path, size))
    }

    /// remove(path): delete a file, open or not.
    pub(super) fn remove<P: Process>(
        &self,
        proc: &mut P,
        esp: VirtAddr,
        path: VirtAddr,
    ) -> Result<bool, Fault> {
        let Some(path) = validate::validate_user_str(proc.address_space(), esp, path)? else {
            return Ok(false);
        };
        Ok(self.fs.lock().fs.remove(&path))
    }

    /// open(path): open a file and return a new descriptor, or -1.
    pub(super) fn open<P: Process>(
        &self,
        proc: &mut P,
        esp: VirtAddr,
        path: VirtAddr,
    ) -> Result<i32, Fault> {
        let Some(path) = validate::validate_user_str(proc.address_space(), esp, path)? else {
            return Ok(-1);
        };

        let mut state = self.fs.lock();
        let FsState { fs, files } = &mut *state;
        let Some(file) = fs.open(&path) else {
            debug!("[SYSCALL] pid {}: open {:?}: no such file", proc.pid(), path);
            return Ok(-1);
        };
        match files.register(file, proc.pid()) {
            Ok(fd) => Ok(fd.as_raw()),
            Err(file) => {
                debug!("[SYSCALL] pid {}: open {:?}: descriptors exhausted", proc.pid(), path);
                fs.close(file);
                Ok(-1)
            }
        }
    }

    /// filesize(fd): length of the open file, or -1.
    pub(super) fn filesize<P: Process>(&self, proc: &mut P, fd: Fd) -> i32 {
        let state = self.fs.lock();
        match state.files.lookup_owned(fd, proc.pid()) {
            Some(desc) => i32::try_from(state.fs.length(desc.handle())).unwrap_or(i32::MAX),
            None => -1,
        }
    }

    /// read(fd, buffer, size): fill a user buffer from a file or the
    /// keyboard.
    pub(super) fn read<P: Process>(
        &self,
        proc: &mut P,
        esp: VirtAddr,
        fd: Fd,
        buffer: VirtAddr,
        size: u32,
    ) -> Result<i32, Fault> {
        let dst = validate::validate_user_write(proc.address_space(), esp, buffer, size as usize)?;
        let pid = proc.pid();
        let space = proc.address_space();

        if fd == Fd::STDOUT {
            return Ok(-1);
        }
        if fd == Fd::STDIN {
            return Ok(count(self.read_console(space, &dst)));
        }

        let mut state = self.fs.lock();
        let FsState { fs, files } = &mut *state;
        let Some(desc) = files.lookup_owned_mut(fd, pid) else {
            debug!("[SYSCALL] pid {}: read on unknown {:?}", pid, fd);
            return Ok(-1);
        };

        let mut bounce = bounce_buffer(dst.len());
        let mut done = 0;
        while done < dst.len() {
            let want = (dst.len() - done).min(bounce.len());
            let got = fs.read(desc.handle_mut(), &mut bounce[..want]).min(want);
            dst.write_at(space, done, &bounce[..got]);
            done += got;
            if got < want {
                break;
            }
        }
        Ok(count(done))
    }

    /// Fill `dst` from the keyboard, stopping early if input runs out.
    fn read_console<S: AddressSpace>(&self, space: &mut S, dst: &UserSliceMut) -> usize {
        let mut console = self.console.lock();
        let mut bounce = bounce_buffer(dst.len());
        let mut done = 0;
        while done < dst.len() {
            let want = (dst.len() - done).min(bounce.len());
            let mut got = 0;
            while got < want {
                match console.getc() {
                    Some(byte) => {
                        bounce[got] = byte;
                        got += 1;
                    }
                    None => break,
                }
            }
            dst.write_at(space, done, &bounce[..got]);
            done += got;
            if got < want {
                break;
            }
        }
        done
    }

    /// write(fd, buffer, size): send a user buffer to a file or the console.
    pub(super) fn write<P: Process>(
        &self,
        proc: &mut P,
        esp: VirtAddr,
        fd: Fd,
        buffer: VirtAddr,
        size: u32,
    ) -> Result<i32, Fault> {
        let src = validate::validate_user_read(proc.address_space(), esp, buffer, size as usize)?;
        let pid = proc.pid();
        let space = proc.address_space();

        if fd == Fd::STDIN {
            return Ok(-1);
        }
        if fd == Fd::STDOUT {
            self.write_console(&*space, &src);
            return Ok(count(src.len()));
        }

        let mut state = self.fs.lock();
        let FsState { fs, files } = &mut *state;
        let Some(desc) = files.lookup_owned_mut(fd, pid) else {
            debug!("[SYSCALL] pid {}: write on unknown {:?}", pid, fd);
            return Ok(-1);
        };
        Ok(count(write_file(fs, desc.handle_mut(), &*space, &src)))
    }

    /// Send `src` to the console a page at a time.
    ///
    /// The console lock is held across the whole buffer, so output from
    /// one call is never interleaved with another's.
    fn write_console<S: AddressSpace>(&self, space: &S, src: &UserSlice) {
        let mut console = self.console.lock();
        let mut bounce = bounce_buffer(src.len());
        let mut done = 0;
        while done < src.len() {
            let want = (src.len() - done).min(bounce.len());
            src.read_at(space, done, &mut bounce[..want]);
            console.putbuf(&bounce[..want]);
            done += want;
        }
    }

    /// seek(fd, position): move the file position; ignores unknown fds.
    pub(super) fn seek<P: Process>(&self, proc: &mut P, fd: Fd, position: u32) {
        let mut state = self.fs.lock();
        let FsState { fs, files } = &mut *state;
        if let Some(desc) = files.lookup_owned_mut(fd, proc.pid()) {
            fs.seek(desc.handle_mut(), position);
        }
    }

    /// tell(fd): current file position, 0 for unknown fds.
    pub(super) fn tell<P: Process>(&self, proc: &mut P, fd: Fd) -> u32 {
        let state = self.fs.lock();
        state
            .files
            .lookup_owned(fd, proc.pid())
            .map_or(0, |desc| state.fs.tell(desc.handle()))
    }

    /// close(fd): close a descriptor the caller owns; otherwise nothing.
    pub(super) fn close<P: Process>(&self, proc: &mut P, fd: Fd) {
        let mut state = self.fs.lock();
        let FsState { fs, files } = &mut *state;
        match files.close(fd, proc.pid()) {
            Some(file) => fs.close(file),
            None => debug!("[SYSCALL] pid {}: close on unowned {:?} ignored", proc.pid(), fd),
        }
    }
}

/// Copy a validated user buffer into a file a page at a time.
///
/// Stops at the first short write.
fn write_file<F: FileSystem, S: AddressSpace>(
    fs: &mut F,
    file: &mut F::File,
    space: &S,
    src: &UserSlice,
) -> usize {
    let mut bounce = bounce_buffer(src.len());
    let mut done = 0;
    while done < src.len() {
        let want = (src.len() - done).min(bounce.len());
        src.read_at(space, done, &mut bounce[..want]);
        let put = fs.write(file, &bounce[..want]).min(want);
        done += put;
        if put < want {
            break;
        }
    }
    done
}
