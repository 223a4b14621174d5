//! Virtual-Memory Collaborator Interface
//!
//! The syscall layer never walks page tables itself. It asks the process's
//! address space three questions (is this page resident, is there a lazy
//! descriptor for it, may the stack grow here) and two favours (load that
//! descriptor, grow the stack). User bytes are moved through
//! [`AddressSpace::copy_in`] / [`AddressSpace::copy_out`] only after the
//! validator has vouched for the range.

use bitflags::bitflags;

use super::address::VirtAddr;

bitflags! {
    /// Attributes of a resident user page.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct PageFlags: u8 {
        /// Page is mapped to a physical frame.
        const PRESENT = 1 << 0;
        /// Page may be written by the user process.
        const WRITABLE = 1 << 1;
        /// Page is accessible from user mode.
        const USER = 1 << 2;
    }
}

/// Where the contents of a not-yet-resident page come from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageSource {
    /// File-backed segment of an executable.
    File {
        /// Offset of the page's data within the file.
        offset: u32,
        /// Bytes to read from the file; the rest of the page is zeroed.
        read_bytes: u32,
    },
    /// Anonymous page, zero-filled on first touch.
    Zero,
    /// Page previously evicted to a swap slot.
    Swap(u32),
}

/// Supplemental page-table entry describing how to materialize a page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageDescriptor {
    /// Page-aligned user address the descriptor covers.
    pub upage: VirtAddr,
    /// Backing source.
    pub source: PageSource,
    /// Whether the page will be mapped writable.
    pub writable: bool,
    /// Whether the page is currently loaded.
    pub loaded: bool,
}

/// A user process's address space, as seen from the syscall layer.
pub trait AddressSpace {
    /// Check whether `addr` lies in the user portion of the address space.
    fn is_in_user_range(&self, addr: VirtAddr) -> bool {
        addr.is_user()
    }

    /// Flags of the page containing `addr`, or `None` if it is not mapped.
    fn page_flags(&self, addr: VirtAddr) -> Option<PageFlags>;

    /// Check whether the page containing `addr` is mapped to a frame.
    fn is_resident(&self, addr: VirtAddr) -> bool {
        self.page_flags(addr)
            .is_some_and(|flags| flags.contains(PageFlags::PRESENT))
    }

    /// Look up the supplemental descriptor for the page at `upage`.
    fn lookup_lazy_descriptor(&self, upage: VirtAddr) -> Option<PageDescriptor>;

    /// Bring the described page into memory. May block on storage I/O.
    ///
    /// Returns `false` if no frame could be obtained or the read failed.
    fn load(&mut self, desc: &PageDescriptor) -> bool;

    /// Allocate and map a fresh zeroed stack page covering `addr`.
    fn grow_stack(&mut self, addr: VirtAddr) -> bool;

    /// Copy `dst.len()` bytes starting at user address `src`.
    ///
    /// Only ranges produced by the syscall validator are passed here.
    fn copy_in(&self, src: VirtAddr, dst: &mut [u8]);

    /// Copy `src` into user memory starting at `dst`.
    ///
    /// Only ranges produced by the syscall validator are passed here.
    fn copy_out(&mut self, dst: VirtAddr, src: &[u8]);
}
