// This module defines error types for quadc using the thiserror crate for idiomatic Rust
// error handling. CompileError is the main error enum covering the failure scenarios of the
// allocation core: register allocation that cannot make progress (no spill candidate left,
// iteration limit exceeded), jumps to labels that no block defines, structurally invalid
// quads, malformed textual quad input, and lookups of unknown functions. Each variant
// carries the context (function name, label, line, reason) needed to debug the failure. The
// module also provides CompileResult<T> as a convenience alias for Result<T, CompileError>.

//! Error types for quadc.
//!
//! Using thiserror for more idiomatic error handling.

use thiserror::Error;

/// Main error type for flow analysis and register allocation.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CompileError {
    #[error("Register allocation failed in {function}: {reason}")]
    RegisterAllocation {
        function: String,
        reason: String,
    },

    #[error("Jump to undefined label L{label}")]
    UnresolvedLabel {
        label: u32,
    },

    #[error("Invalid quad: {reason}")]
    InvalidQuad {
        reason: String,
    },

    #[error("Parse error on line {line}: {reason}")]
    Parse {
        line: usize,
        reason: String,
    },

    #[error("Function not found: {name}")]
    FunctionNotFound {
        name: String,
    },
}

/// Result type alias for compile operations.
pub type CompileResult<T> = Result<T, CompileError>;
