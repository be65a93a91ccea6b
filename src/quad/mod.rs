//! Three-address intermediate representation ("quads").
//!
//! A function is a doubly-linked list of [`Quad`]s stored in an arena-backed
//! [`Function`], plus a table of [`VarData`] describing every variable the
//! quads reference. Each quad carries an [`Opcode`] that packs the operation
//! kind with a data-type and a data-size tag.
//!
//! Operand roles per kind (`d` = dest, `a` = op1, `b` = op2):
//!
//! | kind | form |
//! |------|------|
//! | `Add Sub Mul Div Mod And Or Xor Shl Shr Cmp*` | `d = a op b` |
//! | `Neg Not LNot Cast Move` | `d = op a` |
//! | `Const` | `d = Imm` |
//! | `ArrayAddr` | `d = &a[b]` |
//! | `AddrOf` | `d = &a` |
//! | `Load` / `Store` | `d = *b` / `*b = a` |
//! | `SetArg` | a = `Imm(position)`, b = value |
//! | `Call` | a = `Symbol`, b = optional function pointer |
//! | `GetRetVal` / `GetArg` | `d = result` / `d = argument[Imm]` |
//! | `Return` | b = optional value |
//! | `Label` / `Jump` | a = `Label` |
//! | `JumpIf` / `JumpIfNot` | a = `Label`, b = condition |

pub mod editor;
pub mod function;
pub mod text;
pub mod var;

pub use editor::QuadEditor;
pub use function::Function;
pub use var::{Allocation, Imm, VarData, VarKind, VarType};

use std::fmt;

/// Index of a quad inside its function's arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct QuadId(pub u32);

impl QuadId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Index of a variable in its function's variable table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VarId(pub u32);

impl VarId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Jump target identifier.
pub type LabelId = u32;

/// Index into the function's symbol table (call targets).
pub type SymbolId = u32;

/// Operation kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum OpKind {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Neg,
    And,
    Or,
    Xor,
    Not,
    Shl,
    Shr,
    CmpEq,
    CmpNe,
    CmpLt,
    CmpLe,
    CmpGt,
    CmpGe,
    LNot,
    Cast,
    ArrayAddr,
    SetArg,
    Call,
    GetRetVal,
    GetArg,
    Return,
    Move,
    Const,
    AddrOf,
    Load,
    Store,
    Label,
    Jump,
    JumpIf,
    JumpIfNot,
}

impl OpKind {
    const ALL: [OpKind; 35] = [
        OpKind::Add,
        OpKind::Sub,
        OpKind::Mul,
        OpKind::Div,
        OpKind::Mod,
        OpKind::Neg,
        OpKind::And,
        OpKind::Or,
        OpKind::Xor,
        OpKind::Not,
        OpKind::Shl,
        OpKind::Shr,
        OpKind::CmpEq,
        OpKind::CmpNe,
        OpKind::CmpLt,
        OpKind::CmpLe,
        OpKind::CmpGt,
        OpKind::CmpGe,
        OpKind::LNot,
        OpKind::Cast,
        OpKind::ArrayAddr,
        OpKind::SetArg,
        OpKind::Call,
        OpKind::GetRetVal,
        OpKind::GetArg,
        OpKind::Return,
        OpKind::Move,
        OpKind::Const,
        OpKind::AddrOf,
        OpKind::Load,
        OpKind::Store,
        OpKind::Label,
        OpKind::Jump,
        OpKind::JumpIf,
        OpKind::JumpIfNot,
    ];

    fn from_u8(raw: u8) -> OpKind {
        Self::ALL[raw as usize]
    }

    /// Mnemonic used by the text format.
    pub const fn name(self) -> &'static str {
        use OpKind::*;
        match self {
            Add => "add",
            Sub => "sub",
            Mul => "mul",
            Div => "div",
            Mod => "mod",
            Neg => "neg",
            And => "and",
            Or => "or",
            Xor => "xor",
            Not => "not",
            Shl => "shl",
            Shr => "shr",
            CmpEq => "eq",
            CmpNe => "ne",
            CmpLt => "lt",
            CmpLe => "le",
            CmpGt => "gt",
            CmpGe => "ge",
            LNot => "lnot",
            Cast => "cast",
            ArrayAddr => "elem",
            SetArg => "arg",
            Call => "call",
            GetRetVal => "retval",
            GetArg => "getarg",
            Return => "ret",
            Move => "mov",
            Const => "const",
            AddrOf => "addr",
            Load => "load",
            Store => "store",
            Label => "label",
            Jump => "jmp",
            JumpIf => "jmpif",
            JumpIfNot => "jmpifnot",
        }
    }

    pub fn from_name(name: &str) -> Option<OpKind> {
        Self::ALL.iter().copied().find(|k| k.name() == name)
    }

    /// Ends a basic block.
    pub const fn is_block_end(self) -> bool {
        matches!(
            self,
            OpKind::Jump | OpKind::JumpIf | OpKind::JumpIfNot | OpKind::Return
        )
    }

    pub const fn is_conditional_jump(self) -> bool {
        matches!(self, OpKind::JumpIf | OpKind::JumpIfNot)
    }

    pub const fn is_compare(self) -> bool {
        matches!(
            self,
            OpKind::CmpEq
                | OpKind::CmpNe
                | OpKind::CmpLt
                | OpKind::CmpLe
                | OpKind::CmpGt
                | OpKind::CmpGe
        )
    }

    pub const fn is_shift(self) -> bool {
        matches!(self, OpKind::Shl | OpKind::Shr)
    }

    /// Two-source ALU operation emitted as `mov d, a; op d, b`.
    pub const fn is_binary_alu(self) -> bool {
        matches!(
            self,
            OpKind::Add | OpKind::Sub | OpKind::Mul | OpKind::And | OpKind::Or | OpKind::Xor
        )
    }

    pub const fn is_commutative(self) -> bool {
        matches!(
            self,
            OpKind::Add
                | OpKind::Mul
                | OpKind::And
                | OpKind::Or
                | OpKind::Xor
                | OpKind::CmpEq
                | OpKind::CmpNe
        )
    }
}

/// Data-type tag carried by an opcode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum DataType {
    Unsigned,
    Signed,
    Float,
    Bool,
    Pointer,
}

impl DataType {
    const ALL: [DataType; 5] = [
        DataType::Unsigned,
        DataType::Signed,
        DataType::Float,
        DataType::Bool,
        DataType::Pointer,
    ];
}

/// Data-size tag carried by an opcode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(u8)]
pub enum DataSize {
    S8,
    S16,
    S32,
    S64,
}

impl DataSize {
    const ALL: [DataSize; 4] = [DataSize::S8, DataSize::S16, DataSize::S32, DataSize::S64];

    pub const fn bits(self) -> u32 {
        8 << self as u32
    }

    pub const fn bytes(self) -> u32 {
        1 << self as u32
    }

    pub fn from_bytes(bytes: u32) -> Option<DataSize> {
        Self::ALL.iter().copied().find(|s| s.bytes() == bytes)
    }
}

/// Operation kind packed with its data-type and data-size tags.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Opcode {
    /// Packed representation: [size:2][type:3][kind:8]
    packed: u16,
}

impl Opcode {
    pub fn new(kind: OpKind, ty: DataType, size: DataSize) -> Self {
        Self {
            packed: ((size as u16) << 11) | ((ty as u16) << 8) | kind as u16,
        }
    }

    /// Untyped opcode (labels, jumps, calls): tagged as 64-bit unsigned.
    pub fn plain(kind: OpKind) -> Self {
        Self::new(kind, DataType::Unsigned, DataSize::S64)
    }

    pub fn kind(&self) -> OpKind {
        OpKind::from_u8((self.packed & 0xFF) as u8)
    }

    pub fn data_type(&self) -> DataType {
        DataType::ALL[((self.packed >> 8) & 0x7) as usize]
    }

    pub fn data_size(&self) -> DataSize {
        DataSize::ALL[((self.packed >> 11) & 0x3) as usize]
    }

    pub fn is_float(&self) -> bool {
        self.data_type() == DataType::Float
    }

    pub fn is_signed(&self) -> bool {
        self.data_type() == DataType::Signed
    }
}

impl fmt::Debug for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}.{:?}{}",
            self.kind().name(),
            self.data_type(),
            self.data_size().bits()
        )
    }
}

/// First source operand.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operand {
    None,
    Var(VarId),
    Label(LabelId),
    Imm(i64),
    Symbol(SymbolId),
}

impl Operand {
    pub fn as_var(&self) -> Option<VarId> {
        match *self {
            Operand::Var(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_label(&self) -> Option<LabelId> {
        match *self {
            Operand::Label(l) => Some(l),
            _ => None,
        }
    }

    pub fn as_imm(&self) -> Option<i64> {
        match *self {
            Operand::Imm(i) => Some(i),
            _ => None,
        }
    }
}

/// Source operand position inside a quad.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Slot {
    Op1,
    Op2,
}

/// One three-address instruction.
#[derive(Debug, Clone, PartialEq)]
pub struct Quad {
    pub op: Opcode,
    pub op1: Operand,
    pub op2: Option<VarId>,
    pub dest: Option<VarId>,
    pub(crate) prev: Option<QuadId>,
    pub(crate) next: Option<QuadId>,
}

impl Quad {
    pub fn new(op: Opcode, dest: Option<VarId>, op1: Operand, op2: Option<VarId>) -> Self {
        Self {
            op,
            op1,
            op2,
            dest,
            prev: None,
            next: None,
        }
    }

    /// `dest = src` move with the given opcode tags.
    pub fn mov(ty: DataType, size: DataSize, dest: VarId, src: VarId) -> Self {
        Self::new(
            Opcode::new(OpKind::Move, ty, size),
            Some(dest),
            Operand::Var(src),
            None,
        )
    }

    pub fn kind(&self) -> OpKind {
        self.op.kind()
    }

    pub fn prev(&self) -> Option<QuadId> {
        self.prev
    }

    pub fn next(&self) -> Option<QuadId> {
        self.next
    }

    /// Variable defined by this quad.
    pub fn def(&self) -> Option<VarId> {
        self.dest
    }

    /// Variables read by this quad, op1 first.
    pub fn uses(&self) -> impl Iterator<Item = VarId> {
        self.op1.as_var().into_iter().chain(self.op2)
    }

    /// Variable in the given source slot.
    pub fn source(&self, slot: Slot) -> Option<VarId> {
        match slot {
            Slot::Op1 => self.op1.as_var(),
            Slot::Op2 => self.op2,
        }
    }

    /// Replace the variable in a source slot.
    pub fn set_source(&mut self, slot: Slot, var: VarId) {
        match slot {
            Slot::Op1 => self.op1 = Operand::Var(var),
            Slot::Op2 => self.op2 = Some(var),
        }
    }

    /// Whether `var` is read or written by this quad.
    pub fn references(&self, var: VarId) -> bool {
        self.dest == Some(var) || self.uses().any(|v| v == var)
    }
}
