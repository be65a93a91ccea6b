//! x86-64 architecture-specific components.
//!
//! This module contains all x86-64 specific code:
//! - Register numbering and the register groups of the calling convention
//! - Windows x64 argument assignment
//! - Immediate operand encodability rules
//! - The constraint policy the allocator runs over every quad

pub mod calling_convention;
pub mod immediates;
pub mod policy;
pub mod regs;

pub use calling_convention::{ArgLocation, CCAssigner, CCInfo, Win64Assigner};
pub use policy::X64Policy;
