// This module implements the Windows x64 calling convention as far as register allocation
// needs it. It provides the CCAssigner trait and the Win64Assigner implementation that decide
// where each argument and the return value live. Key features: the first four integer
// arguments pass in RCX, RDX, R8 and R9, the remaining ones go on the stack above the 32-byte
// home area the caller reserves, the return value is placed in RAX, and RAX, RCX, RDX and
// R8-R11 are clobbered by every call. Incoming stack arguments are addressed relative to the
// frame pointer: after `push rbp; mov rbp, rsp` the return address sits at rbp+8 and argument
// N's home slot at rbp+16+8*N. Floating-point values share the general-purpose registers in
// this compiler (they are moved as bit patterns), so there is a single register bank.

//! Windows x64 calling convention.

use super::regs::{CALLER_SAVED, R8, R9, RAX, RCX, RDX};
use crate::core::register_file::{Reg, RegSet};

/// Where an argument is passed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArgLocation {
    Reg(Reg),
    /// Offset from the frame pointer of the argument's home slot.
    Stack(i32),
}

/// Information about a calling convention.
#[derive(Debug, Clone)]
pub struct CCInfo {
    /// Registers used for argument passing.
    pub arg_regs: RegSet,
    /// Registers clobbered by a call.
    pub caller_saved_regs: RegSet,
}

/// Trait for calling convention argument assignment.
pub trait CCAssigner {
    /// Get calling convention information.
    fn get_ccinfo(&self) -> &CCInfo;

    /// Location of the argument at `position`, counted from zero.
    fn assign_arg(&self, position: u32) -> ArgLocation;

    /// Register holding an integer return value.
    fn return_reg(&self) -> Reg;
}

/// Windows x64 calling convention assigner.
///
/// - First 4 integer args in RCX, RDX, R8, R9
/// - Caller reserves 32 bytes of home space for them
/// - Remaining args on the stack, 8 bytes each
/// - Return value in RAX
#[derive(Debug, Clone)]
pub struct Win64Assigner {
    cc_info: CCInfo,
}

impl Default for Win64Assigner {
    fn default() -> Self {
        Self {
            cc_info: CCInfo {
                arg_regs: RegSet::from_regs(&Self::GP_ARG_REGS),
                caller_saved_regs: CALLER_SAVED,
            },
        }
    }
}

impl Win64Assigner {
    /// Windows x64 GP argument registers.
    pub const GP_ARG_REGS: [Reg; 4] = [RCX, RDX, R8, R9];

    /// Offset of argument 0's home slot from the frame pointer.
    const HOME_BASE: i32 = 16;

    pub fn new() -> Self {
        Self::default()
    }

    /// Frame-pointer offset of the home slot for `position`.
    pub fn home_slot(position: u32) -> i32 {
        Self::HOME_BASE + 8 * position as i32
    }

    /// Argument register for `position`, if it is passed in one.
    pub fn arg_reg(position: u32) -> Option<Reg> {
        Self::GP_ARG_REGS.get(position as usize).copied()
    }
}

impl CCAssigner for Win64Assigner {
    fn get_ccinfo(&self) -> &CCInfo {
        &self.cc_info
    }

    fn assign_arg(&self, position: u32) -> ArgLocation {
        match Self::arg_reg(position) {
            Some(reg) => ArgLocation::Reg(reg),
            None => ArgLocation::Stack(Self::home_slot(position)),
        }
    }

    fn return_reg(&self) -> Reg {
        RAX
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_win64_register_arguments() {
        let cc = Win64Assigner::new();
        for i in 0..4 {
            assert_eq!(
                cc.assign_arg(i),
                ArgLocation::Reg(Win64Assigner::GP_ARG_REGS[i as usize])
            );
        }
        assert_eq!(cc.assign_arg(4), ArgLocation::Stack(48));
        assert_eq!(cc.assign_arg(5), ArgLocation::Stack(56));
    }

    #[test]
    fn test_return_and_clobbers() {
        let cc = Win64Assigner::new();
        assert_eq!(cc.return_reg(), RAX);
        let info = cc.get_ccinfo();
        assert!(info.caller_saved_regs.contains(RDX));
        assert!(!info.caller_saved_regs.contains(crate::x64::regs::RBX));
        assert_eq!(info.arg_regs.count(), 4);
    }
}
