//! Filesystem and console collaborators, and the open-file registry
//!
//! The filesystem implementation is not reentrant. Every call into it, and
//! every access to the [`FileTable`], happens with the single filesystem lock
//! held (see [`crate::syscall::Syscalls`]).

pub mod fd;

pub use fd::{Fd, FileDescriptor, FileTable};

/// The filesystem collaborator.
pub trait FileSystem {
    /// An open file.
    type File;

    /// Create a file named `path` of `size` bytes. Does not open it.
    fn create(&mut self, path: &str, size: u32) -> bool;

    /// Remove the file named `path`, open or not.
    fn remove(&mut self, path: &str) -> bool;

    /// Open the file named `path`.
    fn open(&mut self, path: &str) -> Option<Self::File>;

    /// Read into `buf` from the file's current position.
    ///
    /// Returns the number of bytes read, 0 at end of file.
    fn read(&mut self, file: &mut Self::File, buf: &mut [u8]) -> usize;

    /// Write `buf` at the file's current position.
    ///
    /// Returns the number of bytes written, which may be short.
    fn write(&mut self, file: &mut Self::File, buf: &[u8]) -> usize;

    /// Move the file's position to `pos`.
    fn seek(&mut self, file: &mut Self::File, pos: u32);

    /// Current position of the file.
    fn tell(&self, file: &Self::File) -> u32;

    /// Length of the file in bytes.
    fn length(&self, file: &Self::File) -> u32;

    /// Release an open file.
    fn close(&mut self, file: Self::File);
}

/// The console device.
pub trait Console {
    /// Emit the whole buffer as one unit.
    fn putbuf(&mut self, buf: &[u8]);

    /// Next keyboard byte, or `None` once input is exhausted.
    fn getc(&mut self) -> Option<u8>;
}
