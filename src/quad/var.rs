//! Variables and their allocation state.

use super::{DataSize, DataType};
use crate::core::register_file::Reg;

/// What a variable stands for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VarKind {
    /// Compiler temporary produced by lowering or by the constraint policy.
    Temp,
    /// Named local variable.
    Local,
    /// Module-level variable.
    Global,
    /// Incoming function argument at the given position.
    Argument { index: u32 },
    /// Local array; always lives in the frame.
    Array,
    /// Reference to a function symbol.
    Function,
}

/// Declared type of a variable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VarType {
    Scalar(DataType),
    Struct,
}

/// Payload of an immediate allocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Imm {
    /// Constant encoded directly into the consuming instruction.
    Int(i64),
    /// Comparison result consumed only by the following conditional jump;
    /// the emitter fuses compare and branch and never materialises it.
    Condition,
}

/// Where a variable lives once allocation finishes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Allocation {
    #[default]
    Unassigned,
    Register(Reg),
    /// Frame offset relative to the frame pointer (0 for globals and
    /// function references, which are addressed through their symbol).
    Memory(i32),
    Immediate(Imm),
}

impl Allocation {
    pub fn is_resolved(&self) -> bool {
        !matches!(self, Allocation::Unassigned)
    }

    pub fn is_memory(&self) -> bool {
        matches!(self, Allocation::Memory(_))
    }

    pub fn is_immediate(&self) -> bool {
        matches!(self, Allocation::Immediate(_))
    }

    pub fn register(&self) -> Option<Reg> {
        match *self {
            Allocation::Register(reg) => Some(reg),
            _ => None,
        }
    }
}

/// A symbolic storage location.
#[derive(Debug, Clone, PartialEq)]
pub struct VarData<'a> {
    pub name: Option<&'a str>,
    pub kind: VarKind,
    pub ty: VarType,
    /// Size in bytes.
    pub size: u32,
    pub align: u32,
    /// Number of quads reading the variable.
    pub reads: u32,
    /// Number of quads writing the variable.
    pub writes: u32,
    pub alloc: Allocation,
}

impl<'a> VarData<'a> {
    pub fn new(kind: VarKind, ty: VarType, size: u32) -> Self {
        Self {
            name: None,
            kind,
            ty,
            size,
            align: size.clamp(1, 16),
            reads: 0,
            writes: 0,
            alloc: Allocation::Unassigned,
        }
    }

    /// Scalar temporary of the given type and size.
    pub fn temp(ty: DataType, size: DataSize) -> Self {
        Self::new(VarKind::Temp, VarType::Scalar(ty), size.bytes())
    }

    pub fn with_name(mut self, name: &'a str) -> Self {
        self.name = Some(name);
        self
    }

    pub fn with_align(mut self, align: u32) -> Self {
        self.align = align;
        self
    }

    /// Globals, arrays, function references and aggregates never live in
    /// registers.
    pub fn is_non_local(&self) -> bool {
        matches!(
            self.kind,
            VarKind::Global | VarKind::Array | VarKind::Function
        ) || self.ty == VarType::Struct
            || self.size > 8
    }

    pub fn is_temp(&self) -> bool {
        self.kind == VarKind::Temp
    }

    /// Scalar data type, `Pointer` for aggregates.
    pub fn data_type(&self) -> DataType {
        match self.ty {
            VarType::Scalar(ty) => ty,
            VarType::Struct => DataType::Pointer,
        }
    }

    /// Scalar size tag, clamped to 64 bits.
    pub fn data_size(&self) -> DataSize {
        DataSize::from_bytes(self.size).unwrap_or(DataSize::S64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_non_local_classification() {
        let local = VarData::new(VarKind::Local, VarType::Scalar(DataType::Signed), 8);
        assert!(!local.is_non_local());

        let global = VarData::new(VarKind::Global, VarType::Scalar(DataType::Signed), 8);
        assert!(global.is_non_local());

        let record = VarData::new(VarKind::Local, VarType::Struct, 8);
        assert!(record.is_non_local());

        let array = VarData::new(VarKind::Array, VarType::Scalar(DataType::Signed), 80);
        assert!(array.is_non_local());
    }

    #[test]
    fn test_allocation_states() {
        assert!(!Allocation::Unassigned.is_resolved());
        assert!(Allocation::Memory(-8).is_memory());
        assert!(Allocation::Immediate(Imm::Condition).is_immediate());
        assert_eq!(Allocation::Register(Reg(3)).register(), Some(Reg(3)));
    }
}
