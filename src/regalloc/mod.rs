//! Graph-coloring register allocation.
//!
//! The allocator is target independent. Everything an instruction set
//! imposes (fixed registers, two-address forms, which operands may be
//! memory or immediates) reaches it through a [`TargetPolicy`], which turns
//! each quad into conflict edges and, where needed, extra moves.
//!
//! ```text
//! FlowGraph::build ──► build (policy over every quad) ──► simplify
//!                        ▲                                   │
//!                        └──────── spill ◄── optimistic ◄────┘
//!                                               │
//!                                             assign
//! ```

pub mod coloring;
pub mod context;
pub mod frame;

pub use coloring::{allocate_function, allocate_module, Allocator};
pub use context::{ConstraintContext, PinTable};
pub use frame::StackFrame;

use crate::core::error::CompileResult;
use crate::core::register_file::{RegSet, RegisterInfo};
use crate::core::var_set::VarSet;
use crate::quad::{QuadId, VarId};

/// Architecture-specific constraint generation.
pub trait TargetPolicy {
    /// Register file the allocator colors with.
    fn registers(&self) -> &RegisterInfo;

    /// Frame-pointer offset of an incoming argument passed on the stack.
    fn stack_argument_slot(&self, position: u32) -> Option<i32>;

    /// Per-build decisions that must be known before the backward walk,
    /// such as immediate folding.
    fn prepare(&self, ctx: &mut ConstraintContext<'_, '_>) -> CompileResult<()>;

    /// Add the constraints of quad `q`. `live` holds the variables live just
    /// after `q`; a policy that rewrites the destination updates it.
    fn constrain(
        &self,
        ctx: &mut ConstraintContext<'_, '_>,
        q: QuadId,
        live: &mut VarSet,
    ) -> CompileResult<()>;
}

/// Allocator tuning.
#[derive(Debug, Clone)]
pub struct AllocatorConfig {
    /// Build/spill rounds before giving up on a function.
    pub max_iterations: usize,
    /// Try to color what simplify leaves behind before spilling.
    pub optimistic: bool,
}

impl Default for AllocatorConfig {
    fn default() -> Self {
        Self {
            max_iterations: 1000,
            optimistic: true,
        }
    }
}

/// Summary of one function's allocation, for the emitter.
#[derive(Debug, Clone, PartialEq)]
pub struct FunctionAllocation {
    pub name: String,
    /// Build rounds until coloring succeeded.
    pub iterations: usize,
    /// Variables moved to memory by the allocator, in spill order.
    pub spilled: Vec<VarId>,
    /// Moves and constants inserted by the policy.
    pub moves_inserted: usize,
    /// Bytes of frame below the frame pointer, 16-byte aligned.
    pub frame_size: u32,
    /// Callee-saved registers the function writes.
    pub callee_saved: RegSet,
}
