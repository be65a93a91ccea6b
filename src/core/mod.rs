// This module gathers the target-independent infrastructure the allocator is built on:
// the compilation session (arena, interned strings, per-session statistics), the error type,
// the dense bit set used for liveness and for the adjacency matrix, the conflict graph with
// registers as literal nodes, and the register-set vocabulary targets describe themselves
// with. Nothing here knows about x86-64 or about individual quad kinds.

//! Core allocator infrastructure.

pub mod conflict_graph;
pub mod error;
pub mod register_file;
pub mod session;
pub mod test_utils;
pub mod var_set;

pub use conflict_graph::{ConflictGraph, GraphSnapshot};
pub use error::{CompileError, CompileResult};
pub use register_file::{Reg, RegSet, RegisterInfo};
pub use session::{CompilationSession, SessionStats};
pub use var_set::VarSet;
