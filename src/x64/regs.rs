//! x86-64 general-purpose registers.
//!
//! Numbering follows the hardware encoding, so a register number is also
//! the ModRM/REX register field the emitter writes.

use crate::core::register_file::{Reg, RegSet, RegisterInfo};

pub const RAX: Reg = Reg::new(0);
pub const RCX: Reg = Reg::new(1);
pub const RDX: Reg = Reg::new(2);
pub const RBX: Reg = Reg::new(3);
pub const RSP: Reg = Reg::new(4);
pub const RBP: Reg = Reg::new(5);
pub const RSI: Reg = Reg::new(6);
pub const RDI: Reg = Reg::new(7);
pub const R8: Reg = Reg::new(8);
pub const R9: Reg = Reg::new(9);
pub const R10: Reg = Reg::new(10);
pub const R11: Reg = Reg::new(11);
pub const R12: Reg = Reg::new(12);
pub const R13: Reg = Reg::new(13);
pub const R14: Reg = Reg::new(14);
pub const R15: Reg = Reg::new(15);

/// Number of general-purpose registers.
pub const GP_COUNT: usize = 16;

pub const NAMES: [&str; GP_COUNT] = [
    "rax", "rcx", "rdx", "rbx", "rsp", "rbp", "rsi", "rdi", "r8", "r9", "r10", "r11", "r12",
    "r13", "r14", "r15",
];

/// Stack and frame pointer.
pub const RESERVED: RegSet = RegSet::from_regs(&[RSP, RBP]);

/// Registers a call may clobber.
pub const CALLER_SAVED: RegSet = RegSet::from_regs(&[RAX, RCX, RDX, R8, R9, R10, R11]);

/// Registers a function must preserve for its caller.
pub const CALLEE_SAVED: RegSet =
    RegSet::from_regs(&[RBX, RBP, RSI, RDI, R12, R13, R14, R15]);

/// Register file description handed to the allocator.
pub fn register_info() -> RegisterInfo {
    RegisterInfo {
        count: GP_COUNT,
        reserved: RESERVED,
        callee_saved: CALLEE_SAVED,
        names: &NAMES,
    }
}
