// This module is the x86-64 constraint policy. It knows how each quad will be emitted and
// turns that knowledge into conflict edges: two-address ALU forms (`mov d, a; op d, b`), the
// fixed registers of shifts (count in CL), widening multiply and divide (RDX:RAX), calls
// (Windows x64 argument registers, caller-saved clobbers, result in RAX), memory operand
// restrictions (at most one memory operand, pointers and indices in registers) and immediate
// forms. Before each backward walk, `prepare` decides which single-use constants fold into
// their consumer and which comparisons fuse with the conditional jump that follows them; those
// variables end the build resolved as immediates and never reach the coloring phase.

//! x86-64 target constraint policy.

use log::trace;

use super::calling_convention::{ArgLocation, CCAssigner, Win64Assigner};
use super::immediates::{accepts_immediate, fits_imm32};
use super::regs::{self, RAX, RCX, RDX};
use crate::core::error::CompileResult;
use crate::core::register_file::{Reg, RegSet, RegisterInfo};
use crate::core::var_set::VarSet;
use crate::quad::{Allocation, Imm, OpKind, Operand, QuadId, Slot, VarId};
use crate::regalloc::{ConstraintContext, TargetPolicy};

/// Constraint policy for x86-64 with the Windows x64 calling convention.
#[derive(Debug, Clone)]
pub struct X64Policy {
    regs: RegisterInfo,
    cc: Win64Assigner,
}

impl Default for X64Policy {
    fn default() -> Self {
        Self {
            regs: regs::register_info(),
            cc: Win64Assigner::new(),
        }
    }
}

impl X64Policy {
    pub fn new() -> Self {
        Self::default()
    }

    fn arg_regs(&self) -> RegSet {
        self.cc.get_ccinfo().arg_regs
    }

    fn caller_saved(&self) -> RegSet {
        self.cc.get_ccinfo().caller_saved_regs
    }
}

/// Kinds whose `op1` is a value read by the instruction.
fn op1_is_value(kind: OpKind) -> bool {
    !matches!(
        kind,
        OpKind::Const
            | OpKind::SetArg
            | OpKind::GetArg
            | OpKind::GetRetVal
            | OpKind::Call
            | OpKind::Return
            | OpKind::Label
            | OpKind::Jump
            | OpKind::JumpIf
            | OpKind::JumpIfNot
            | OpKind::Load
    )
}

/// Kinds that read both `op1` and `op2` as values.
fn reads_two_values(kind: OpKind) -> bool {
    kind.is_binary_alu()
        || kind.is_shift()
        || kind.is_compare()
        || matches!(kind, OpKind::Div | OpKind::Mod)
}

impl TargetPolicy for X64Policy {
    fn registers(&self) -> &RegisterInfo {
        &self.regs
    }

    fn stack_argument_slot(&self, position: u32) -> Option<i32> {
        match self.cc.assign_arg(position) {
            ArgLocation::Stack(off) => Some(off),
            ArgLocation::Reg(_) => None,
        }
    }

    fn prepare(&self, ctx: &mut ConstraintContext<'_, '_>) -> CompileResult<()> {
        for b in 0..ctx.flow().len() {
            let quads = ctx.flow().block_quads(ctx.func(), b);
            for (i, &q) in quads.iter().enumerate() {
                let kind = ctx.quad(q).kind();
                if kind == OpKind::Const {
                    fold_constant(ctx, q, &quads[i + 1..]);
                } else if kind.is_compare() {
                    fuse_compare(ctx, q, quads.get(i + 1).copied());
                }
            }
        }
        Ok(())
    }

    fn constrain(
        &self,
        ctx: &mut ConstraintContext<'_, '_>,
        q: QuadId,
        live: &mut VarSet,
    ) -> CompileResult<()> {
        let (kind, op, op1) = {
            let quad = ctx.quad(q);
            (quad.kind(), quad.op, quad.op1)
        };

        if let Operand::Imm(value) = op1 {
            if op1_is_value(kind) && !accepts_immediate(op, Slot::Op1, value) {
                ctx.materialize_op1(q);
            }
        }

        match kind {
            OpKind::Mul if !op.is_float() && !op.is_signed() => self.wide_arith(ctx, q, RAX, live),
            OpKind::Div | OpKind::Mod if !op.is_float() => {
                let result = if kind == OpKind::Mod { RDX } else { RAX };
                self.wide_arith(ctx, q, result, live)
            }
            OpKind::Mul if !op.is_float() => {
                ctx.dest_to_register(q, live);
                binary_alu(ctx, q);
            }
            OpKind::Add
            | OpKind::Sub
            | OpKind::Mul
            | OpKind::Div
            | OpKind::Mod
            | OpKind::And
            | OpKind::Or
            | OpKind::Xor => binary_alu(ctx, q),
            OpKind::Shl | OpKind::Shr => shift(ctx, q, live),
            OpKind::Neg | OpKind::Not | OpKind::LNot | OpKind::Move => unary(ctx, q),
            OpKind::CmpEq
            | OpKind::CmpNe
            | OpKind::CmpLt
            | OpKind::CmpLe
            | OpKind::CmpGt
            | OpKind::CmpGe => compare(ctx, q),
            OpKind::Cast | OpKind::AddrOf => {
                ctx.dest_to_register(q, live);
            }
            OpKind::ArrayAddr | OpKind::Load => {
                ctx.dest_to_register(q, live);
                ctx.source_to_register(q, Slot::Op2);
            }
            OpKind::Store => {
                ctx.source_to_register(q, Slot::Op2);
                ctx.source_to_register(q, Slot::Op1);
            }
            OpKind::Const => constant(ctx, q, live),
            OpKind::SetArg => self.set_arg(ctx, q, live),
            OpKind::Call => self.call(ctx, q, live),
            OpKind::GetRetVal => {
                ctx.pin_dest(q, self.cc.return_reg(), live);
            }
            OpKind::GetArg => self.get_arg(ctx, q, live),
            OpKind::Return => {
                ctx.pin_source(q, Slot::Op2, self.cc.return_reg(), live);
            }
            OpKind::Label | OpKind::Jump | OpKind::JumpIf | OpKind::JumpIfNot => {}
        }

        ctx.session().record_quad_constrained();
        Ok(())
    }
}

impl X64Policy {
    /// Unsigned `mul`, `div` and `mod`: dividend in RAX, result in `result`,
    /// RDX:RAX clobbered.
    fn wide_arith(
        &self,
        ctx: &mut ConstraintContext<'_, '_>,
        q: QuadId,
        result: Reg,
        live: &mut VarSet,
    ) {
        let pair = RegSet::from_regs(&[RAX, RDX]);
        let (dest, divisor) = {
            let quad = ctx.quad(q);
            (quad.dest, quad.op2)
        };
        if let Some(divisor) = divisor {
            if !ctx.is_immediate(divisor) {
                ctx.conflict_regs(divisor, pair);
            }
        }
        ctx.clobber(live, dest, pair);
        ctx.pin_source(q, Slot::Op1, RAX, live);
        ctx.pin_dest(q, result, live);
    }

    fn set_arg(&self, ctx: &mut ConstraintContext<'_, '_>, q: QuadId, live: &mut VarSet) {
        let position = ctx.quad(q).op1.as_imm().unwrap_or(0) as u32;
        match Win64Assigner::arg_reg(position) {
            Some(reg) => {
                // The register is loaded here and must survive until the call.
                ctx.clobber(live, None, RegSet::from_regs(&[reg]));
                ctx.pin_source(q, Slot::Op2, reg, live);
                self.protect_until_call(ctx, q, reg);
            }
            None => {
                if let Some(value) = ctx.source_to_register(q, Slot::Op2) {
                    if !ctx.is_immediate(value) {
                        ctx.conflict_regs(value, self.arg_regs());
                    }
                }
            }
        }
    }

    /// Values defined between a loaded argument and its call stay out of `reg`.
    fn protect_until_call(&self, ctx: &mut ConstraintContext<'_, '_>, q: QuadId, reg: Reg) {
        let end = ctx.flow().blocks[ctx.block()].end;
        let mut cur = q;
        while cur != end {
            let Some(next) = ctx.func().next(cur) else {
                break;
            };
            let quad = ctx.quad(next);
            if quad.kind() == OpKind::Call {
                break;
            }
            if let Some(d) = quad.def() {
                if !ctx.is_immediate(d) {
                    trace!(
                        "{} defined while {} holds an argument",
                        ctx.func().var_name(d),
                        ctx.registers().name(reg)
                    );
                    ctx.conflict_reg(d, reg);
                }
            }
            cur = next;
        }
    }

    fn call(&self, ctx: &mut ConstraintContext<'_, '_>, q: QuadId, live: &mut VarSet) {
        ctx.clobber(live, None, self.caller_saved());
        let pointer = ctx.quad(q).op2;
        if let Some(pointer) = pointer {
            ctx.conflict_regs(pointer, self.arg_regs());
        }
    }

    fn get_arg(&self, ctx: &mut ConstraintContext<'_, '_>, q: QuadId, live: &mut VarSet) {
        let quad = ctx.quad(q);
        let position = quad.op1.as_imm().unwrap_or(0) as u32;
        let dest = quad.dest;
        match Win64Assigner::arg_reg(position) {
            Some(reg) => {
                let mut exposed: Vec<VarId> = live.iter().map(|v| VarId(v as u32)).collect();
                let pinned = ctx.pin_dest(q, reg, live);
                // A copied destination is written by the move behind this quad.
                if let Some(d) = dest.filter(|&d| Some(d) != pinned) {
                    exposed.push(d);
                }

                // Incoming arguments not read yet still occupy their registers,
                // except where a later `getarg` already claimed one.
                for &pending in Win64Assigner::GP_ARG_REGS.iter().skip(position as usize + 1) {
                    for &v in &exposed {
                        if Some(v) != pinned && ctx.pins().pinned(v) != Some(pending) {
                            ctx.conflict_reg(v, pending);
                        }
                    }
                }
            }
            None => {
                let home = self.stack_argument_slot(position).map(Allocation::Memory);
                if let Some(d) = dest {
                    if Some(ctx.alloc(d)) != home {
                        ctx.dest_to_register(q, live);
                    }
                }
            }
        }
    }
}

/// `mov d, a; op d, b`.
fn binary_alu(ctx: &mut ConstraintContext<'_, '_>, q: QuadId) {
    let quad = ctx.quad(q);
    let (kind, dest) = (quad.kind(), quad.dest);
    let (a, b) = (quad.op1.as_var(), quad.op2);

    // `d = a - d` would overwrite `b` with the first move.
    if b.is_some() && dest == b && a != b && !kind.is_commutative() {
        ctx.copy_source(q, Slot::Op2);
    }

    let in_memory = |ctx: &ConstraintContext<'_, '_>, slot: Slot| {
        ctx.quad(q).source(slot).is_some_and(|v| ctx.is_memory(v))
    };
    if in_memory(ctx, Slot::Op1) && in_memory(ctx, Slot::Op2) {
        ctx.copy_source(q, Slot::Op1);
    }
    if dest.is_some_and(|d| ctx.is_memory(d)) {
        for slot in [Slot::Op1, Slot::Op2] {
            if in_memory(ctx, slot) {
                ctx.copy_source(q, slot);
            }
        }
    }

    let quad = ctx.quad(q);
    if let (Some(d), Some(b)) = (quad.dest, quad.op2) {
        ctx.conflict(d, b);
    }
}

/// Count in CL; the destination and everything live across lose RCX.
fn shift(ctx: &mut ConstraintContext<'_, '_>, q: QuadId, live: &mut VarSet) {
    let rcx = RegSet::from_regs(&[RCX]);
    let dest = ctx.quad(q).dest;
    if let Some(d) = dest {
        ctx.conflict_regs(d, rcx);
    }
    ctx.clobber(live, None, rcx);
    ctx.pin_source(q, Slot::Op2, RCX, live);
    unary(ctx, q);
}

/// `mov d, a` followed by an in-place operation.
fn unary(ctx: &mut ConstraintContext<'_, '_>, q: QuadId) {
    let quad = ctx.quad(q);
    let dest_in_memory = quad.dest.is_some_and(|d| ctx.is_memory(d));
    let source_in_memory = quad.op1.as_var().is_some_and(|v| ctx.is_memory(v));
    if dest_in_memory && source_in_memory {
        ctx.copy_source(q, Slot::Op1);
    }
}

fn compare(ctx: &mut ConstraintContext<'_, '_>, q: QuadId) {
    let dest = ctx.quad(q).dest;
    let fused = dest.is_some_and(|d| ctx.alloc(d) == Allocation::Immediate(Imm::Condition));
    if fused {
        let quad = ctx.quad(q);
        let both_memory = quad.op1.as_var().is_some_and(|v| ctx.is_memory(v))
            && quad.op2.is_some_and(|v| ctx.is_memory(v));
        if both_memory {
            ctx.copy_source(q, Slot::Op1);
        }
        return;
    }

    ctx.source_to_register(q, Slot::Op1);
    ctx.source_to_register(q, Slot::Op2);
    let quad = ctx.quad(q);
    let (dest, sources): (_, Vec<VarId>) = (quad.dest, quad.uses().collect());
    if let Some(d) = dest {
        for s in sources {
            ctx.conflict(d, s);
        }
    }
}

/// A constant that was not folded needs a register on its way to memory
/// when it does not fit a 32-bit immediate.
fn constant(ctx: &mut ConstraintContext<'_, '_>, q: QuadId, live: &mut VarSet) {
    let quad = ctx.quad(q);
    let (Some(dest), Some(value)) = (quad.dest, quad.op1.as_imm()) else {
        return;
    };
    if ctx.is_memory(dest) && !fits_imm32(value) {
        ctx.copy_dest(q, live);
    }
}

/// Fold a single-use temporary constant into its consumer.
fn fold_constant(ctx: &mut ConstraintContext<'_, '_>, q: QuadId, rest: &[QuadId]) {
    let quad = ctx.quad(q);
    let (Some(dest), Some(value)) = (quad.dest, quad.op1.as_imm()) else {
        return;
    };
    let var = ctx.func().var(dest);
    if !var.is_temp() || var.writes != 1 || var.reads != 1 || var.alloc.is_resolved() {
        return;
    }
    if quad.op.is_float() {
        return;
    }

    let Some(&consumer) = rest.iter().find(|&&c| ctx.quad(c).references(dest)) else {
        return;
    };
    let user = ctx.quad(consumer);
    let slot = match (user.op1.as_var() == Some(dest), user.op2 == Some(dest)) {
        (true, false) => Slot::Op1,
        (false, true) => Slot::Op2,
        _ => return,
    };
    if user.dest == Some(dest) || !accepts_immediate(user.op, slot, value) {
        return;
    }

    if reads_two_values(user.kind()) {
        let other_is_immediate = match slot {
            Slot::Op1 => user.op2.is_some_and(|v| ctx.is_immediate(v)),
            Slot::Op2 => match user.op1 {
                Operand::Imm(_) => true,
                Operand::Var(v) => ctx.is_immediate(v),
                _ => false,
            },
        };
        if other_is_immediate {
            return;
        }
    }

    trace!("fold {} = {value} into quad {}", ctx.func().var_name(dest), consumer.0);
    ctx.set_alloc(dest, Allocation::Immediate(Imm::Int(value)));
    ctx.session().record_immediate_folded();
}

/// A comparison read once, by the conditional jump right after it, never
/// materialises its result.
fn fuse_compare(ctx: &mut ConstraintContext<'_, '_>, q: QuadId, next: Option<QuadId>) {
    let Some(dest) = ctx.quad(q).dest else {
        return;
    };
    let Some(next) = next else {
        return;
    };
    let var = ctx.func().var(dest);
    if var.writes != 1 || var.reads != 1 || var.alloc.is_resolved() {
        return;
    }
    let jump = ctx.quad(next);
    if jump.kind().is_conditional_jump() && jump.op2 == Some(dest) {
        ctx.set_alloc(dest, Allocation::Immediate(Imm::Condition));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_value_operand_kinds() {
        assert!(op1_is_value(OpKind::Sub));
        assert!(op1_is_value(OpKind::Store));
        assert!(!op1_is_value(OpKind::SetArg));
        assert!(!op1_is_value(OpKind::Const));
        assert!(reads_two_values(OpKind::Shl));
        assert!(!reads_two_values(OpKind::Store));
    }

    #[test]
    fn test_policy_registers() {
        let policy = X64Policy::new();
        assert_eq!(policy.registers().count, 16);
        assert_eq!(policy.stack_argument_slot(3), None);
        assert_eq!(policy.stack_argument_slot(4), Some(48));
    }
}
