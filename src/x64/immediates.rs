//! Which operand positions of which x86-64 instructions take an immediate.
//!
//! Most ALU forms accept a sign-extended 32-bit immediate as their second
//! operand. The first operand can only be an immediate when the operation is
//! commutative, because the emitter then swaps the operands. `mul`/`div`
//! have no immediate form at all.

use crate::quad::{DataSize, OpKind, Opcode, Slot};

/// Whether `value` survives sign extension from 32 bits.
pub fn fits_imm32(value: i64) -> bool {
    i32::try_from(value).is_ok()
}

/// Whether `value` fits the immediate field for an operation of `size`.
pub fn fits_imm(value: i64, size: DataSize) -> bool {
    match size {
        DataSize::S8 => i8::try_from(value).is_ok() || u8::try_from(value).is_ok(),
        DataSize::S16 => i16::try_from(value).is_ok() || u16::try_from(value).is_ok(),
        DataSize::S32 | DataSize::S64 => fits_imm32(value),
    }
}

/// Whether the instruction for `op` can encode `value` in operand `slot`.
pub fn accepts_immediate(op: Opcode, slot: Slot, value: i64) -> bool {
    if op.is_float() {
        return false;
    }
    let size = op.data_size();
    match op.kind() {
        OpKind::Add | OpKind::Sub | OpKind::And | OpKind::Or | OpKind::Xor => match slot {
            Slot::Op2 => fits_imm(value, size),
            Slot::Op1 => op.kind().is_commutative() && fits_imm(value, size),
        },
        // Only the three-operand `imul r, r/m, imm` form exists.
        OpKind::Mul if op.is_signed() => fits_imm(value, size),
        OpKind::Mul | OpKind::Div | OpKind::Mod => false,
        OpKind::Shl | OpKind::Shr => {
            slot == Slot::Op2 && (0..i64::from(size.bits())).contains(&value)
        }
        OpKind::CmpEq
        | OpKind::CmpNe
        | OpKind::CmpLt
        | OpKind::CmpLe
        | OpKind::CmpGt
        | OpKind::CmpGe => slot == Slot::Op2 && fits_imm(value, size),
        OpKind::Move | OpKind::Store => slot == Slot::Op1 && fits_imm32(value),
        OpKind::SetArg => slot == Slot::Op2 && fits_imm32(value),
        // `mov rax, imm64` handles any value.
        OpKind::Return => slot == Slot::Op2,
        _ => false,
    }
}
