//! quadc - quad IR register allocation for x86-64.
//!
//! quadc takes functions in a three-address "quad" form and decides, for
//! every variable, whether it lives in a general-purpose register, in a
//! stack slot, or folds away into the instruction that consumes it. The
//! decisions respect what x86-64 can encode (two-address ALU forms, fixed
//! registers for shifts and division, one memory operand per instruction)
//! and the Windows x64 calling convention.
//!
//! # Primary Usage
//!
//! ```
//! use bumpalo::Bump;
//! use quadc::{allocate_function, parse_module, CompilationSession, X64Policy};
//!
//! let arena = Bump::new();
//! let session = CompilationSession::new(&arena);
//! let mut funcs = parse_module(
//!     &session,
//!     "func id\n  param x: i64 @0\n  x = getarg 0\n  ret x\nend\n",
//! )?;
//! let allocation = allocate_function(&session, &mut funcs[0], &X64Policy::new())?;
//! assert!(allocation.spilled.is_empty());
//! # Ok::<(), quadc::CompileError>(())
//! ```
//!
//! # Architecture
//!
//! - [`quad`] - Quads, variables and the textual format
//! - [`flow`] - Basic blocks and liveness
//! - [`core`] - Session, errors, bit sets and the conflict graph
//! - [`regalloc`] - Target-independent graph coloring
//! - [`x64`] - x86-64 registers, calling convention and constraint policy

pub mod core;
pub mod flow;
pub mod quad;
pub mod regalloc;
pub mod x64;

pub use crate::core::{CompilationSession, CompileError, CompileResult, SessionStats};
pub use flow::FlowGraph;
pub use quad::text::{parse_module, print_allocation, print_function};
pub use quad::{Allocation, Function};
pub use regalloc::{
    allocate_function, allocate_module, Allocator, AllocatorConfig, FunctionAllocation,
    TargetPolicy,
};
pub use x64::X64Policy;
