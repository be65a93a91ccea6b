// This module provides arena-based compilation session management using the bumpalo crate.
// CompilationSession is the compilation-scoped owner of the bump arena from which every
// function's quad list and variable table are allocated, so quads share one lifetime and are
// never freed individually. The session also interns names (functions, variables, symbols)
// and gathers allocation statistics: functions allocated, quads walked by the constraint
// policy, allocation rounds, registers assigned, spills, helper moves inserted and constants
// folded into immediates. SessionStats is a plain snapshot of those counters with a Display
// implementation for the quadc binary. Nothing in the session is shared across threads; it
// uses RefCell for the interior mutability needed while functions borrow the arena.

//! Arena-based compilation session management.
//!
//! All quads and variable tables are tied to the session lifetime, which keeps
//! lifetime annotations down to a single `'arena`.

use bumpalo::Bump;
use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;

/// Arena-based compilation session.
pub struct CompilationSession<'arena> {
    /// Arena allocator for compilation objects.
    arena: &'arena Bump,

    /// Session statistics for debugging and tuning.
    stats: RefCell<SessionStats>,

    /// String interning for names referenced from quads and variables.
    interned_strings: RefCell<HashMap<String, &'arena str>>,

    /// Current function being allocated.
    current_function: RefCell<Option<String>>,
}

impl<'arena> CompilationSession<'arena> {
    /// Create a new compilation session with the given arena.
    pub fn new(arena: &'arena Bump) -> Self {
        Self {
            arena,
            stats: RefCell::new(SessionStats::default()),
            interned_strings: RefCell::new(HashMap::new()),
            current_function: RefCell::new(None),
        }
    }

    /// Get access to the arena allocator.
    pub fn arena(&self) -> &'arena Bump {
        self.arena
    }

    /// Allocate an object in the session arena.
    pub fn alloc<T>(&self, value: T) -> &'arena mut T {
        self.arena.alloc(value)
    }

    /// Intern a string in the arena.
    pub fn intern_str(&self, s: &str) -> &'arena str {
        let mut strings = self.interned_strings.borrow_mut();
        if let Some(&interned) = strings.get(s) {
            return interned;
        }

        let interned = self.arena.alloc_str(s);
        strings.insert(s.to_string(), interned);
        interned
    }

    /// Set current function being allocated.
    pub fn set_current_function(&self, name: &str) {
        *self.current_function.borrow_mut() = Some(name.to_string());
    }

    pub fn current_function(&self) -> Option<String> {
        self.current_function.borrow().clone()
    }

    /// Clear per-function state once a function is finished.
    pub fn clear_function_state(&self) {
        *self.current_function.borrow_mut() = None;
    }

    /// Record that a function finished allocation.
    pub fn record_function_allocated(&self, name: &str, quad_count: usize, rounds: usize) {
        let mut stats = self.stats.borrow_mut();
        stats.functions_allocated += 1;
        stats.allocation_rounds += rounds;

        if stats.largest_function_quads < quad_count {
            stats.largest_function_quads = quad_count;
            stats.largest_function_name = name.to_string();
        }
    }

    /// Record one quad visited by the constraint policy.
    pub fn record_quad_constrained(&self) {
        self.stats.borrow_mut().quads_constrained += 1;
    }

    /// Record register assignment.
    pub fn record_register_allocated(&self) {
        self.stats.borrow_mut().registers_allocated += 1;
    }

    /// Record a variable moved to memory.
    pub fn record_spill_generated(&self) {
        self.stats.borrow_mut().spills_generated += 1;
    }

    /// Record a helper move spliced into a quad list.
    pub fn record_move_inserted(&self) {
        self.stats.borrow_mut().moves_inserted += 1;
    }

    /// Record a constant folded into its consumer.
    pub fn record_immediate_folded(&self) {
        self.stats.borrow_mut().immediates_folded += 1;
    }

    /// Get compilation statistics.
    pub fn stats(&self) -> SessionStats {
        self.stats.borrow().clone()
    }
}

/// Compilation session statistics.
#[derive(Debug, Default, Clone)]
pub struct SessionStats {
    /// Number of functions allocated.
    pub functions_allocated: usize,

    /// Build/simplify/spill rounds across all functions.
    pub allocation_rounds: usize,

    /// Quads visited by the constraint policy (counted per round).
    pub quads_constrained: usize,

    /// Largest function by quad count.
    pub largest_function_quads: usize,

    /// Name of largest function.
    pub largest_function_name: String,

    /// Registers assigned.
    pub registers_allocated: usize,

    /// Variables spilled to memory.
    pub spills_generated: usize,

    /// Helper moves inserted by the constraint policy.
    pub moves_inserted: usize,

    /// Constants folded into immediates.
    pub immediates_folded: usize,
}

impl fmt::Display for SessionStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Allocation Session Statistics:")?;
        writeln!(f, "  Functions allocated: {}", self.functions_allocated)?;
        writeln!(f, "  Allocation rounds: {}", self.allocation_rounds)?;
        writeln!(f, "  Quads constrained: {}", self.quads_constrained)?;
        writeln!(f, "  Registers allocated: {}", self.registers_allocated)?;
        writeln!(f, "  Spills generated: {}", self.spills_generated)?;
        writeln!(f, "  Moves inserted: {}", self.moves_inserted)?;
        writeln!(f, "  Immediates folded: {}", self.immediates_folded)?;
        if !self.largest_function_name.is_empty() {
            writeln!(
                f,
                "  Largest function: {} ({} quads)",
                self.largest_function_name, self.largest_function_quads
            )?;
        }
        Ok(())
    }
}
