//! Memory management interface for the syscall layer
//!
//! Provides:
//! - Type-safe user virtual addresses
//! - The virtual-memory collaborator trait (residency, lazy loading,
//!   stack growth, user copy)
//!
//! # Security Principles
//! - User addresses are opaque until validated
//! - The kernel touches user memory only through [`AddressSpace`]

pub mod address;
pub mod vm;

pub use address::{VirtAddr, PAGE_SIZE, PHYS_BASE};
pub use vm::{AddressSpace, PageDescriptor, PageFlags, PageSource};
