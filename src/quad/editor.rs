//! Block-aware quad insertion.
//!
//! The constraint policy inserts helper moves into the very list the flow
//! graph has already partitioned. Insertion always happens relative to the
//! quad currently being constrained, and the owning block's boundaries are
//! updated eagerly so the backward walk never needs a rebuild. Quads are
//! only ever inserted, never removed.

use super::{Function, Quad, QuadId};
use crate::flow::FlowGraph;

/// Splices quads into a function while keeping block boundaries current.
pub struct QuadEditor<'e, 'a> {
    func: &'e mut Function<'a>,
    flow: &'e mut FlowGraph,
}

impl<'e, 'a> QuadEditor<'e, 'a> {
    pub fn new(func: &'e mut Function<'a>, flow: &'e mut FlowGraph) -> Self {
        Self { func, flow }
    }

    /// Insert `quad` immediately before `at`, which belongs to `block`.
    pub fn insert_before(&mut self, block: usize, at: QuadId, quad: Quad) -> QuadId {
        let id = self.func.splice_before(at, quad);
        let node = &mut self.flow.blocks[block];
        if node.start == at {
            node.start = id;
        }
        id
    }

    /// Insert `quad` immediately after `at`, which belongs to `block`.
    pub fn insert_after(&mut self, block: usize, at: QuadId, quad: Quad) -> QuadId {
        debug_assert!(
            !self.func.quad(at).kind().is_block_end(),
            "cannot insert after a control transfer"
        );
        let id = self.func.splice_after(at, quad);
        let node = &mut self.flow.blocks[block];
        if node.end == at {
            node.end = id;
        }
        id
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::test_utils::test::{parse_single, with_test_context};
    use crate::quad::{DataSize, DataType, VarId};

    #[test]
    fn test_insert_updates_block_bounds() {
        with_test_context(|ctx| {
            let session = ctx.create_session();
            let mut func = parse_single(
                &session,
                r#"
                func f
                  local a: i64
                  local b: i64
                  a = const 1
                  b = mov a
                  ret b
                end
                "#,
            );
            let mut flow = FlowGraph::build(&func).unwrap();
            let block = 0;
            let start = flow.blocks[block].start;
            let end = flow.blocks[block].end;
            let (a, b) = (VarId(0), VarId(1));

            let t = func.add_temp(DataType::Signed, DataSize::S64);
            let mut editor = QuadEditor::new(&mut func, &mut flow);
            let load = Quad::mov(DataType::Signed, DataSize::S64, t, a);
            let head = editor.insert_before(block, start, load);
            let mid = func.next(start).unwrap();
            let mut editor = QuadEditor::new(&mut func, &mut flow);
            let store = Quad::mov(DataType::Signed, DataSize::S64, b, t);
            let after_mid = editor.insert_after(block, mid, store);

            assert_eq!(flow.blocks[block].start, head);
            assert_eq!(flow.blocks[block].end, end);
            assert_eq!(func.next(mid), Some(after_mid));
            assert_eq!(func.first(), Some(head));
            assert_eq!(func.var(t).reads, 1);
            assert_eq!(func.var(t).writes, 1);
        });
    }
}
