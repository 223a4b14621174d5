//! User-Memory Validation
//!
//! Every address a user process hands the kernel is checked here before the
//! kernel reads or writes through it.
//!
//! # Security Principles
//! - Deny by default: anything not provably backed by user memory faults
//! - Null and kernel addresses fault immediately
//! - Buffers are checked page by page, including the last byte
//! - Strings are checked page by page up to and including the terminator
//! - A failed check is a protection violation, never a recoverable error
//!
//! # Demand Paging
//! An address that is in range but not resident is not necessarily bad. If
//! the supplemental page table has a descriptor for it, the page is loaded
//! now. If it is just below the user stack pointer, the stack grows to
//! cover it. Only then is it a fault.

use alloc::string::String;
use alloc::vec::Vec;

use bitflags::bitflags;

use super::handler::Fault;
use crate::mm::address::{PAGE_SIZE, PHYS_BASE};
use crate::mm::{AddressSpace, PageFlags, VirtAddr};
use crate::trap::WORD_SIZE;

/// Validation limits
pub mod limits {
    use crate::mm::PAGE_SIZE;

    /// How far below the stack pointer an access may land and still count
    /// as stack growth (`pusha` writes 32 bytes below `esp`).
    pub const STACK_SLACK: usize = 32;

    /// Maximum size of a user stack (8 MiB).
    pub const MAX_STACK: usize = 8 * 1024 * 1024;

    /// Longest string argument accepted, terminator included.
    pub const MAX_STR_LEN: usize = PAGE_SIZE;
}

bitflags! {
    /// How the kernel is about to touch a user range.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Access: u8 {
        /// Kernel reads user memory (copy in).
        const READ = 1 << 0;
        /// Kernel writes user memory (copy out).
        const WRITE = 1 << 1;
    }
}

/// How a user address was found to be usable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    /// The page was already mapped.
    Resident,
    /// The page was loaded from its supplemental descriptor.
    Loaded,
    /// A new stack page was mapped.
    StackGrown,
}

/// A user range validated for reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UserSlice {
    addr: VirtAddr,
    len: usize,
}

impl UserSlice {
    /// Start of the range.
    #[inline]
    pub fn addr(&self) -> VirtAddr {
        self.addr
    }

    /// Length in bytes.
    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    /// Check if the range is empty.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Copy `dst.len()` bytes starting `offset` bytes into the range.
    pub fn read_at<S: AddressSpace + ?Sized>(&self, space: &S, offset: usize, dst: &mut [u8]) {
        debug_assert!(offset + dst.len() <= self.len);
        if dst.is_empty() {
            return;
        }
        space.copy_in(VirtAddr::new(self.addr.as_usize() + offset), dst);
    }
}

/// A user range validated for writing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UserSliceMut {
    addr: VirtAddr,
    len: usize,
}

impl UserSliceMut {
    /// Start of the range.
    #[inline]
    pub fn addr(&self) -> VirtAddr {
        self.addr
    }

    /// Length in bytes.
    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    /// Check if the range is empty.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Copy `src` into the range starting `offset` bytes in.
    pub fn write_at<S: AddressSpace + ?Sized>(&self, space: &mut S, offset: usize, src: &[u8]) {
        debug_assert!(offset + src.len() <= self.len);
        if src.is_empty() {
            return;
        }
        space.copy_out(VirtAddr::new(self.addr.as_usize() + offset), src);
    }
}

/// Check whether `addr` is a plausible stack access for a process whose
/// stack pointer is `esp`.
#[inline]
fn is_stack_access(addr: VirtAddr, esp: VirtAddr) -> bool {
    addr >= esp.saturating_sub(limits::STACK_SLACK)
        && addr.as_usize() >= PHYS_BASE - limits::MAX_STACK
}

/// Make a single user address usable for `access`, loading or growing as
/// needed.
///
/// # Returns
/// * `Ok(Resolution)` - The page containing `addr` is now resident
/// * `Err(Fault)` - The address cannot be made valid
pub fn resolve<S: AddressSpace + ?Sized>(
    space: &mut S,
    esp: VirtAddr,
    addr: VirtAddr,
    access: Access,
) -> Result<Resolution, Fault> {
    if addr.is_null() || !space.is_in_user_range(addr) {
        return Err(Fault::BadAddress(addr));
    }

    let write = access.contains(Access::WRITE);

    if let Some(flags) = space.page_flags(addr) {
        if flags.contains(PageFlags::PRESENT) {
            let kernel_only = !flags.contains(PageFlags::USER);
            if kernel_only || (write && !flags.contains(PageFlags::WRITABLE)) {
                return Err(Fault::BadAddress(addr));
            }
            return Ok(Resolution::Resident);
        }
    }

    match space.lookup_lazy_descriptor(addr.page_base()) {
        Some(desc) if !desc.loaded => {
            if write && !desc.writable {
                return Err(Fault::BadAddress(addr));
            }
            if space.load(&desc) {
                Ok(Resolution::Loaded)
            } else {
                Err(Fault::BadAddress(addr))
            }
        }
        // Marked loaded but not mapped: the page table and the
        // supplemental table disagree, so refuse it.
        Some(_) => Err(Fault::BadAddress(addr)),
        None if is_stack_access(addr, esp) => {
            if space.grow_stack(addr) {
                Ok(Resolution::StackGrown)
            } else {
                Err(Fault::BadAddress(addr))
            }
        }
        None => Err(Fault::BadAddress(addr)),
    }
}

/// Resolve every page touched by `[ptr, ptr + len)`.
fn validate_range<S: AddressSpace + ?Sized>(
    space: &mut S,
    esp: VirtAddr,
    ptr: VirtAddr,
    len: usize,
    access: Access,
) -> Result<(), Fault> {
    if len == 0 {
        return Ok(());
    }

    let last = ptr.checked_add(len - 1).ok_or(Fault::BadAddress(ptr))?;
    resolve(space, esp, ptr, access)?;

    // Then each later page: its first byte, or the last byte for the
    // final page.
    let mut page = ptr.page_base();
    while page < last.page_base() {
        page = VirtAddr::new(page.as_usize() + PAGE_SIZE);
        let check = if page == last.page_base() { last } else { page };
        resolve(space, esp, check, access)?;
    }
    Ok(())
}

/// Validate a user buffer the kernel will read from.
///
/// A zero-length buffer is always valid, whatever its address.
pub fn validate_user_read<S: AddressSpace + ?Sized>(
    space: &mut S,
    esp: VirtAddr,
    ptr: VirtAddr,
    len: usize,
) -> Result<UserSlice, Fault> {
    validate_range(space, esp, ptr, len, Access::READ)?;
    Ok(UserSlice { addr: ptr, len })
}

/// Validate a user buffer the kernel will write into.
///
/// Every page must end up resident and writable.
pub fn validate_user_write<S: AddressSpace + ?Sized>(
    space: &mut S,
    esp: VirtAddr,
    ptr: VirtAddr,
    len: usize,
) -> Result<UserSliceMut, Fault> {
    validate_range(space, esp, ptr, len, Access::READ | Access::WRITE)?;
    Ok(UserSliceMut { addr: ptr, len })
}

/// Validate and copy in a NUL-terminated user string.
///
/// Each page is validated before any byte on it is read, up to and
/// including the page holding the terminator.
///
/// # Returns
/// * `Ok(Some(String))` - The string, without its terminator
/// * `Ok(None)` - Longer than [`limits::MAX_STR_LEN`] or not UTF-8
/// * `Err(Fault)` - Some byte before the terminator is not valid memory
pub fn validate_user_str<S: AddressSpace + ?Sized>(
    space: &mut S,
    esp: VirtAddr,
    ptr: VirtAddr,
) -> Result<Option<String>, Fault> {
    let mut bytes = Vec::new();
    let mut addr = ptr;

    loop {
        resolve(space, esp, addr, Access::READ)?;

        let start = bytes.len();
        let chunk = addr
            .bytes_to_page_end()
            .min(limits::MAX_STR_LEN - start);
        bytes.resize(start + chunk, 0);
        space.copy_in(addr, &mut bytes[start..]);

        if let Some(nul) = bytes[start..].iter().position(|&b| b == 0) {
            bytes.truncate(start + nul);
            return Ok(String::from_utf8(bytes).ok());
        }

        if bytes.len() >= limits::MAX_STR_LEN {
            return Ok(None);
        }
        addr = addr.checked_add(chunk).ok_or(Fault::BadAddress(addr))?;
    }
}

/// Validate and read one 32-bit little-endian word from user memory.
pub fn read_user_word<S: AddressSpace + ?Sized>(
    space: &mut S,
    esp: VirtAddr,
    addr: VirtAddr,
) -> Result<u32, Fault> {
    let slice = validate_user_read(space, esp, addr, WORD_SIZE)?;
    let mut word = [0u8; WORD_SIZE];
    slice.read_at(&*space, 0, &mut word);
    Ok(u32::from_le_bytes(word))
}
