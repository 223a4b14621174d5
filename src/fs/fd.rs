//! Open-File Registry
//!
//! Maps descriptor numbers to open file handles for every process in the
//! system.
//!
//! # Design
//! - One table shared by all processes, keyed by descriptor number
//! - A per-owner index so a dying process's descriptors are found without
//!   scanning the whole table
//! - Numbers 0 and 1 are reserved for the console; allocation starts at 2
//!   and is monotonic, so a number is never handed out twice
//!
//! The table itself is not synchronized. It lives inside the filesystem
//! lock together with the filesystem state it indexes.

use alloc::collections::{BTreeMap, BTreeSet};
use alloc::vec::Vec;
use core::fmt;

use crate::process::Pid;

/// A file descriptor number as seen by user space.
///
/// This is a newtype to prevent mixing descriptor numbers with other
/// syscall arguments.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
pub struct Fd(i32);

impl Fd {
    /// Console input.
    pub const STDIN: Self = Self(0);

    /// Console output.
    pub const STDOUT: Self = Self(1);

    /// First descriptor number available for files.
    pub const FIRST_FILE: Self = Self(2);

    /// Create a descriptor from its raw value.
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

impl fmt::Debug for Fd {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Fd({})", self.0)
    }
}

/// A live entry in the registry.
pub struct FileDescriptor<H> {
    fd: Fd,
    owner: Pid,
    handle: H,
}

impl<H> FileDescriptor<H> {
    /// Descriptor number.
    #[inline]
    pub fn fd(&self) -> Fd {
        self.fd
    }

    /// Process that opened the file.
    #[inline]
    pub fn owner(&self) -> Pid {
        self.owner
    }

    /// The underlying open file.
    #[inline]
    pub fn handle(&self) -> &H {
        &self.handle
    }

    /// The underlying open file, mutably.
    #[inline]
    pub fn handle_mut(&mut self) -> &mut H {
        &mut self.handle
    }
}

impl<H> fmt::Debug for FileDescriptor<H> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "FileDescriptor({:?}, owner={})", self.fd, self.owner)
    }
}

/// Registry of every open file in the system.
pub struct FileTable<H> {
    /// Next number to hand out.
    next: i32,
    entries: BTreeMap<Fd, FileDescriptor<H>>,
    by_owner: BTreeMap<Pid, BTreeSet<Fd>>,
}

impl<H> FileTable<H> {
    /// Create an empty table.
    pub const fn new() -> Self {
        Self {
            next: Fd::FIRST_FILE.0,
            entries: BTreeMap::new(),
            by_owner: BTreeMap::new(),
        }
    }

    /// Reserve a fresh descriptor number.
    ///
    /// Returns `None` once the number space is exhausted.
    pub fn allocate_fd(&mut self) -> Option<Fd> {
        let fd = Fd(self.next);
        self.next = self.next.checked_add(1)?;
        Some(fd)
    }

    /// Insert `handle` under a fresh number owned by `owner`.
    ///
    /// Hands the handle back if no number is available.
    pub fn register(&mut self, handle: H, owner: Pid) -> Result<Fd, H> {
        let Some(fd) = self.allocate_fd() else {
            return Err(handle);
        };
        self.entries.insert(fd, FileDescriptor { fd, owner, handle });
        self.by_owner.entry(owner).or_default().insert(fd);
        Ok(fd)
    }

    /// Look up a live descriptor regardless of owner.
    #[inline]
    pub fn lookup(&self, fd: Fd) -> Option<&FileDescriptor<H>> {
        self.entries.get(&fd)
    }

    /// Look up a live descriptor owned by `owner`.
    pub fn lookup_owned(&self, fd: Fd, owner: Pid) -> Option<&FileDescriptor<H>> {
        self.entries.get(&fd).filter(|desc| desc.owner == owner)
    }

    /// Look up a live descriptor owned by `owner`, mutably.
    pub fn lookup_owned_mut(&mut self, fd: Fd, owner: Pid) -> Option<&mut FileDescriptor<H>> {
        self.entries.get_mut(&fd).filter(|desc| desc.owner == owner)
    }

    /// Remove `fd` if `requester` owns it, returning the handle.
    ///
    /// A request from any other process leaves the entry in place.
    pub fn close(&mut self, fd: Fd, requester: Pid) -> Option<H> {
        if self.lookup_owned(fd, requester).is_none() {
            return None;
        }
        let desc = self.entries.remove(&fd)?;
        if let Some(owned) = self.by_owner.get_mut(&requester) {
            owned.remove(&fd);
            if owned.is_empty() {
                self.by_owner.remove(&requester);
            }
        }
        Some(desc.handle)
    }

    /// Remove every descriptor owned by `owner`, returning their handles.
    pub fn close_all(&mut self, owner: Pid) -> Vec<H> {
        let Some(owned) = self.by_owner.remove(&owner) else {
            return Vec::new();
        };
        owned
            .into_iter()
            .filter_map(|fd| self.entries.remove(&fd))
            .map(|desc| desc.handle)
            .collect()
    }

    /// Number of descriptors owned by `owner`.
    pub fn count_owned(&self, owner: Pid) -> usize {
        self.by_owner.get(&owner).map_or(0, BTreeSet::len)
    }

    /// Number of live descriptors.
    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if no descriptors are live.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<H> Default for FileTable<H> {
    fn default() -> Self {
        Self::new()
    }
}
