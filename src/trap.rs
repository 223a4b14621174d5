//! System Call Trap Frame
//!
//! User processes enter the kernel with `int $0x30`. The low-level entry
//! stub saves the interrupted register state into a [`TrapFrame`] and hands
//! it to [`crate::syscall::Syscalls::dispatch`].
//!
//! # Calling Convention
//! - `esp`: user stack pointer; the call number is the word at `esp`, and
//!   argument *i* is the word at `esp + 4 * i`
//! - `eax`: return value, written back on return to user mode
//!
//! # Security Considerations
//! - The gate is callable from user privilege; everything in the frame is
//!   user-controlled
//! - The frame itself is kernel memory; only what `esp` points at needs
//!   validating

use crate::mm::VirtAddr;

/// Interrupt vector of the system call gate.
pub const SYSCALL_VECTOR: u8 = 0x30;

/// Descriptor privilege level of the gate (callable from user mode).
pub const SYSCALL_DPL: u8 = 3;

/// Size of one argument slot on the user stack.
pub const WORD_SIZE: usize = 4;

/// Register state saved on entry to the kernel.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TrapFrame {
    /// General purpose registers, in `pushal` order
    pub edi: u32,
    pub esi: u32,
    pub ebp: u32,
    pub esp_dummy: u32,
    pub ebx: u32,
    pub edx: u32,
    pub ecx: u32,
    pub eax: u32,
    /// Saved segment registers
    pub gs: u16,
    pub fs: u16,
    pub es: u16,
    pub ds: u16,
    /// Interrupt vector number
    pub vec_no: u32,
    /// Error code pushed by the CPU or the stub
    pub error_code: u32,
    /// Return address
    pub eip: u32,
    pub cs: u16,
    pub eflags: u32,
    /// Interrupted user stack pointer
    pub esp: u32,
    pub ss: u16,
}

impl TrapFrame {
    /// A frame for a syscall trap with the given user stack pointer.
    pub fn syscall(esp: u32) -> Self {
        Self {
            vec_no: u32::from(SYSCALL_VECTOR),
            esp,
            ..Self::default()
        }
    }

    /// Check if this frame came through the syscall gate.
    #[inline]
    pub fn is_syscall(&self) -> bool {
        self.vec_no == u32::from(SYSCALL_VECTOR)
    }

    /// The interrupted user stack pointer.
    #[inline]
    pub fn user_stack(&self) -> VirtAddr {
        VirtAddr::from(self.esp)
    }

    /// Store a syscall result in the return register.
    #[inline]
    pub fn set_return(&mut self, value: i32) {
        self.eax = value as u32;
    }
}
