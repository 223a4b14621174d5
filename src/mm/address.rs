//! User Virtual Address Type
//!
//! Type-safe wrapper for addresses supplied by user processes.
//!
//! # Security Properties
//! - User addresses are never dereferenced directly by this crate
//! - Arithmetic on user addresses is checked, so a buffer that wraps
//!   around the top of the address space is rejected instead of aliasing
//!   low memory
//! - The user/kernel split is a single constant, [`PHYS_BASE`]

use core::fmt;

/// Page size (4 KiB)
pub const PAGE_SIZE: usize = 4096;
/// Page size mask
pub const PAGE_MASK: usize = PAGE_SIZE - 1;
/// Bits to shift for page number
pub const PAGE_SHIFT: usize = 12;

/// Base of the kernel's direct map; every user address is below it.
pub const PHYS_BASE: usize = 0xC000_0000;

/// Lowest address a user process may touch (page 0 is never mapped).
pub const USER_BASE: usize = PAGE_SIZE;

/// A virtual address as seen by a user process.
///
/// Carries no validity guarantee on its own: the syscall validator is the
/// only place that turns one of these into something the kernel reads.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
#[repr(transparent)]
pub struct VirtAddr(usize);

impl VirtAddr {
    /// The null address.
    pub const NULL: Self = Self(0);

    /// Create a new virtual address.
    #[inline]
    pub const fn new(addr: usize) -> Self {
        Self(addr)
    }

    /// Get the raw address value.
    #[inline]
    pub const fn as_usize(self) -> usize {
        self.0
    }

    /// Check if this is the null address.
    #[inline]
    pub const fn is_null(self) -> bool {
        self.0 == 0
    }

    /// Check if the address is page-aligned.
    #[inline]
    pub const fn is_aligned(self) -> bool {
        self.0 & PAGE_MASK == 0
    }

    /// Align the address down to the start of its page.
    #[inline]
    pub const fn page_base(self) -> Self {
        Self(self.0 & !PAGE_MASK)
    }

    /// Get the page number.
    #[inline]
    pub const fn page_number(self) -> usize {
        self.0 >> PAGE_SHIFT
    }

    /// Get the page offset (lowest 12 bits).
    #[inline]
    pub const fn page_offset(self) -> usize {
        self.0 & PAGE_MASK
    }

    /// Bytes from this address to the end of its page.
    #[inline]
    pub const fn bytes_to_page_end(self) -> usize {
        PAGE_SIZE - self.page_offset()
    }

    /// Add an offset, returning `None` on overflow.
    #[inline]
    pub const fn checked_add(self, offset: usize) -> Option<Self> {
        match self.0.checked_add(offset) {
            Some(addr) => Some(Self(addr)),
            None => None,
        }
    }

    /// Subtract an offset, saturating at zero.
    #[inline]
    pub const fn saturating_sub(self, offset: usize) -> Self {
        Self(self.0.saturating_sub(offset))
    }

    /// Check if this address lies in the user half of the address space.
    #[inline]
    pub const fn is_user(self) -> bool {
        self.0 >= USER_BASE && self.0 < PHYS_BASE
    }
}

impl From<u32> for VirtAddr {
    fn from(word: u32) -> Self {
        Self(word as usize)
    }
}

impl fmt::Debug for VirtAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "VirtAddr({:#010x})", self.0)
    }
}

impl fmt::Display for VirtAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#010x}", self.0)
    }
}
