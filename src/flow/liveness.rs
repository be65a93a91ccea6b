//! Backward liveness over basic blocks.
//!
//! Sweeps the blocks in reverse creation order, recomputing
//! `in = use | (out - def)` with `out` the union of the successors' live-in,
//! until a full sweep changes nothing. Live-out is then refreshed from the
//! final live-in sets so every block's `live_out` matches its successors.

use log::trace;

use super::FlowNode;
use crate::core::var_set::VarSet;

/// Run the fixed point over `blocks`. Returns the number of sweeps.
pub fn solve(blocks: &mut [FlowNode]) -> usize {
    let mut out = VarSet::new();
    let mut sweeps = 0;

    loop {
        sweeps += 1;
        let mut changed = false;
        for b in (0..blocks.len()).rev() {
            successor_union(blocks, b, &mut out);
            let node = &mut blocks[b];
            out.subtract(&node.defs);
            out.union_with(&node.uses);
            if out != node.live_in {
                node.live_in.copy_from(&out);
                changed = true;
            }
        }
        if !changed {
            break;
        }
    }

    for b in 0..blocks.len() {
        successor_union(blocks, b, &mut out);
        blocks[b].live_out.copy_from(&out);
    }
    trace!("liveness converged after {sweeps} sweeps over {} blocks", blocks.len());
    sweeps
}

fn successor_union(blocks: &[FlowNode], b: usize, out: &mut VarSet) {
    out.clear_all();
    for s in blocks[b].successors() {
        out.union_with(&blocks[s].live_in);
    }
}

#[cfg(test)]
mod tests {
    use crate::core::test_utils::test::{parse_single, with_test_context};
    use crate::flow::FlowGraph;

    #[test]
    fn test_recompute_is_idempotent() {
        with_test_context(|ctx| {
            let session = ctx.create_session();
            let func = parse_single(
                &session,
                r#"
                func sum
                  param n: i64 @0
                  local s: i64
                  temp c: bool
                  s = const 0
                again:
                  c = le n, 0
                  jmpif c, out
                  s = add s, n
                  n = sub n, 1
                  jmp again
                out:
                  ret s
                end
                "#,
            );
            let mut flow = FlowGraph::build(&func).unwrap();
            assert!(!flow.recompute_liveness());
            assert!(flow.blocks[1].live_in.contains(0));
            assert!(flow.blocks[1].live_in.contains(1));
        });
    }

    #[test]
    fn test_value_live_through_diamond() {
        with_test_context(|ctx| {
            let session = ctx.create_session();
            let func = parse_single(
                &session,
                r#"
                func pick
                  param x: i64 @0
                  local y: i64
                  temp c: bool
                  c = gt x, 0
                  jmpif c, pos
                  y = const 1
                  jmp join
                pos:
                  y = const 2
                join:
                  y = add y, x
                  ret y
                end
                "#,
            );
            let flow = FlowGraph::build(&func).unwrap();
            assert_eq!(flow.len(), 4);
            for b in 1..3 {
                assert!(flow.blocks[b].live_out.contains(0), "x live out of B{b}");
                assert!(flow.blocks[b].live_out.contains(1), "y live out of B{b}");
                assert!(!flow.blocks[b].live_in.contains(1), "y defined in B{b}");
            }
        });
    }
}
