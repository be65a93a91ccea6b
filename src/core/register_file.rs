//! Physical register identifiers and register sets.
//!
//! The allocator treats registers as the first `R` nodes of the conflict
//! graph, so a register is just a small index. `RegSet` is the fixed-width
//! bit set used by calling conventions and policies to name groups such as
//! "caller-saved" or "argument registers"; `RegisterInfo` describes one
//! target's register file to the target-independent allocator.

use std::fmt;

/// Maximum number of registers a target may describe.
pub const MAX_REGISTERS: usize = 32;

/// Physical register number, also its conflict graph node index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Reg(pub u8);

impl Reg {
    pub const fn new(id: u8) -> Self {
        Self(id)
    }

    /// Conflict graph node index of this register.
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

/// Bit set for efficiently tracking register sets.
#[derive(Clone, Copy, Default, PartialEq, Eq)]
pub struct RegSet {
    mask: u32,
}

impl RegSet {
    /// Create empty register set.
    pub const fn new() -> Self {
        Self { mask: 0 }
    }

    /// Build a set from a list of registers.
    pub const fn from_regs(regs: &[Reg]) -> Self {
        let mut mask = 0u32;
        let mut i = 0;
        while i < regs.len() {
            mask |= 1u32 << regs[i].0;
            i += 1;
        }
        Self { mask }
    }

    /// All registers below `count`.
    pub const fn all(count: usize) -> Self {
        if count >= MAX_REGISTERS {
            Self { mask: !0 }
        } else {
            Self {
                mask: (1u32 << count) - 1,
            }
        }
    }

    pub const fn contains(&self, reg: Reg) -> bool {
        (reg.0 as usize) < MAX_REGISTERS && self.mask & (1u32 << reg.0) != 0
    }

    pub fn set(&mut self, reg: Reg) {
        if (reg.0 as usize) < MAX_REGISTERS {
            self.mask |= 1u32 << reg.0;
        }
    }

    pub fn clear(&mut self, reg: Reg) {
        if (reg.0 as usize) < MAX_REGISTERS {
            self.mask &= !(1u32 << reg.0);
        }
    }

    pub const fn union(self, other: RegSet) -> RegSet {
        RegSet {
            mask: self.mask | other.mask,
        }
    }

    pub const fn intersection(self, other: RegSet) -> RegSet {
        RegSet {
            mask: self.mask & other.mask,
        }
    }

    pub const fn difference(self, other: RegSet) -> RegSet {
        RegSet {
            mask: self.mask & !other.mask,
        }
    }

    pub const fn count(&self) -> u32 {
        self.mask.count_ones()
    }

    pub const fn is_empty(&self) -> bool {
        self.mask == 0
    }

    /// Registers in ascending order.
    pub fn iter(&self) -> impl Iterator<Item = Reg> {
        let mask = self.mask;
        (0..MAX_REGISTERS as u8).filter(move |&id| mask & (1u32 << id) != 0).map(Reg)
    }
}

impl fmt::Debug for RegSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.iter().map(|r| r.0)).finish()
    }
}

/// A target's register file as seen by the allocator.
#[derive(Debug, Clone)]
pub struct RegisterInfo {
    /// Number of physical registers (`R`).
    pub count: usize,
    /// Registers no variable may ever occupy (stack pointer, frame pointer).
    pub reserved: RegSet,
    /// Registers a callee must preserve; reported back to the emitter.
    pub callee_saved: RegSet,
    /// Assembly names, indexed by register number.
    pub names: &'static [&'static str],
}

impl RegisterInfo {
    pub fn name(&self, reg: Reg) -> &'static str {
        self.names.get(reg.index()).copied().unwrap_or("?")
    }

    /// Register nodes that conflict with every variable.
    pub fn reserved_nodes(&self) -> Vec<usize> {
        self.reserved.iter().map(Reg::index).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_regset_operations() {
        let mut set = RegSet::new();
        let reg = Reg::new(5);

        assert!(!set.contains(reg));
        set.set(reg);
        assert!(set.contains(reg));
        set.clear(reg);
        assert!(!set.contains(reg));
        assert!(set.is_empty());
    }

    #[test]
    fn test_regset_algebra() {
        let a = RegSet::from_regs(&[Reg(0), Reg(1), Reg(2)]);
        let b = RegSet::from_regs(&[Reg(2), Reg(9)]);
        assert_eq!(a.union(b).count(), 4);
        assert_eq!(
            a.difference(b).iter().collect::<Vec<_>>(),
            vec![Reg(0), Reg(1)]
        );
        assert_eq!(RegSet::all(16).count(), 16);
        assert_eq!(RegSet::all(32).count(), 32);
    }
}
