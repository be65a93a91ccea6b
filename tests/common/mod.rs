//! Shared checks for allocation integration tests.

#![allow(dead_code)]

use quadc::core::var_set::VarSet;
use quadc::quad::{OpKind, QuadId, VarId};
use quadc::x64::regs::{RBP, RSP};
use quadc::{FlowGraph, Function};

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Every variable ends up somewhere, and never in the stack or frame pointer.
pub fn assert_all_resolved(func: &Function<'_>) {
    for v in func.var_ids() {
        let alloc = func.var(v).alloc;
        assert!(alloc.is_resolved(), "{} left unassigned", func.var_name(v));
        if let Some(reg) = alloc.register() {
            assert!(
                reg != RSP && reg != RBP,
                "{} placed in a reserved register",
                func.var_name(v)
            );
        }
    }
}

/// A definition never lands in the register of a variable that is live
/// across it. The source of a move may share the destination's register.
pub fn assert_no_register_overlap(func: &Function<'_>) {
    let flow = FlowGraph::build(func).expect("allocated function still has valid flow");
    for b in 0..flow.len() {
        let mut live: VarSet = flow.blocks[b].live_out.clone();
        for &q in flow.block_quads(func, b).iter().rev() {
            let quad = func.quad(q);
            if let Some(d) = quad.def() {
                let source = match quad.kind() {
                    OpKind::Move => quad.op1.as_var(),
                    _ => None,
                };
                if let Some(reg) = func.var(d).alloc.register() {
                    for v in live.iter().map(|v| VarId(v as u32)) {
                        if v != d && Some(v) != source {
                            assert_ne!(
                                func.var(v).alloc.register(),
                                Some(reg),
                                "{} and {} share a register at quad {}",
                                func.var_name(d),
                                func.var_name(v),
                                q.0
                            );
                        }
                    }
                }
                live.clear(d.index());
            }
            for u in quad.uses() {
                live.set(u.index());
            }
        }
    }
}

/// First quad of `kind` in list order.
pub fn find_quad(func: &Function<'_>, kind: OpKind) -> QuadId {
    func.quad_ids()
        .find(|&q| func.quad(q).kind() == kind)
        .unwrap_or_else(|| panic!("no `{}` quad in {}", kind.name(), func.name()))
}

/// Variable declared under `name` in the text format.
pub fn named(func: &Function<'_>, name: &str) -> VarId {
    func.var_ids()
        .find(|&v| func.var(v).name == Some(name))
        .unwrap_or_else(|| panic!("no variable `{name}` in {}", func.name()))
}
