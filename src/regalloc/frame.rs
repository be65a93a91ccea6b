//! Stack frame layout for variables that live in memory.
//!
//! Frame layout, growing down from the frame pointer:
//!
//! ```text
//! rbp + 16 + 8*N  incoming argument N (home slot)
//! rbp + 8         return address
//! rbp             saved rbp
//! rbp - X         spill slots and memory-resident locals
//! ```
//!
//! Callee-saved registers are pushed by the emitter below the frame and are
//! not part of the size computed here.

/// Frame slots handed out during allocation.
#[derive(Debug, Clone, Default)]
pub struct StackFrame {
    /// Lowest offset handed out so far (negative or zero).
    offset: i32,
}

impl StackFrame {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reserve a slot and return its frame-pointer offset.
    pub fn allocate(&mut self, size: u32, align: u32) -> i32 {
        let size = size.max(1) as i32;
        let align = align.clamp(1, 16) as i32;
        let offset = (self.offset - size) & !(align - 1);
        self.offset = offset;
        offset
    }

    /// Bytes below the frame pointer, rounded up to 16.
    pub fn size(&self) -> u32 {
        (-self.offset as u32).div_ceil(16) * 16
    }
}
