// This module partitions a function's quad list into basic blocks and records, per block,
// the local def/use sets, live-in/live-out sets and up to two successors. Blocks are found in
// one forward walk: a block opens at the first quad and at every label and closes before a
// label or after a control transfer. Successors resolve jump targets through a label table;
// a jump to a label no block defines is reported as CompileError::UnresolvedLabel. The
// liveness fixed point lives in the liveness submodule. All sets are indexed by variable
// index. Blocks are identified by their position in creation order, which is also list order.

//! Basic blocks and liveness.

pub mod liveness;

use hashbrown::HashMap;
use log::trace;
use std::fmt::Write as _;

use crate::core::error::{CompileError, CompileResult};
use crate::core::var_set::VarSet;
use crate::quad::{Function, LabelId, OpKind, QuadId};

/// One basic block.
#[derive(Debug, Clone)]
pub struct FlowNode {
    /// First quad of the block.
    pub start: QuadId,
    /// Last quad of the block, inclusive.
    pub end: QuadId,
    /// Variables written in the block.
    pub defs: VarSet,
    /// Variables read in the block before any write to them in the block.
    pub uses: VarSet,
    pub live_in: VarSet,
    pub live_out: VarSet,
    /// Successor block indices; the jump target comes first.
    pub succ: [Option<usize>; 2],
}

impl FlowNode {
    fn new(start: QuadId, end: QuadId, var_count: usize) -> Self {
        Self {
            start,
            end,
            defs: VarSet::with_capacity(var_count),
            uses: VarSet::with_capacity(var_count),
            live_in: VarSet::with_capacity(var_count),
            live_out: VarSet::with_capacity(var_count),
            succ: [None, None],
        }
    }

    pub fn successors(&self) -> impl Iterator<Item = usize> + '_ {
        self.succ.iter().flatten().copied()
    }
}

/// Control-flow graph of a single function.
#[derive(Debug, Clone, Default)]
pub struct FlowGraph {
    pub blocks: Vec<FlowNode>,
    labels: HashMap<LabelId, usize>,
}

impl FlowGraph {
    /// Partition `func` into blocks, link successors and solve liveness.
    pub fn build(func: &Function<'_>) -> CompileResult<Self> {
        let var_count = func.var_count();
        let mut graph = FlowGraph::default();
        let mut open: Option<QuadId> = None;

        for q in func.quad_ids() {
            let quad = func.quad(q);
            if quad.kind() == OpKind::Label {
                if let (Some(start), Some(prev)) = (open, func.prev(q)) {
                    graph.blocks.push(FlowNode::new(start, prev, var_count));
                }
                let label = quad.op1.as_label().ok_or_else(|| CompileError::InvalidQuad {
                    reason: "label quad without a label operand".to_string(),
                })?;
                graph.labels.insert(label, graph.blocks.len());
                open = Some(q);
            } else if open.is_none() {
                open = Some(q);
            }

            if quad.kind().is_block_end() {
                if let Some(start) = open.take() {
                    graph.blocks.push(FlowNode::new(start, q, var_count));
                }
            }
        }
        if let (Some(start), Some(last)) = (open, func.last()) {
            graph.blocks.push(FlowNode::new(start, last, var_count));
        }

        for b in 0..graph.blocks.len() {
            graph.compute_local_sets(func, b);
            graph.link_successors(func, b)?;
        }
        liveness::solve(&mut graph.blocks);

        trace!(
            "flow graph for {}: {} blocks, {} labels",
            func.name(),
            graph.blocks.len(),
            graph.labels.len()
        );
        Ok(graph)
    }

    fn compute_local_sets(&mut self, func: &Function<'_>, b: usize) {
        let node = &mut self.blocks[b];
        let mut cur = Some(node.start);
        while let Some(q) = cur {
            let quad = func.quad(q);
            for v in quad.uses() {
                if !node.defs.contains(v.index()) {
                    node.uses.set(v.index());
                }
            }
            if let Some(d) = quad.def() {
                node.defs.set(d.index());
            }
            if q == node.end {
                break;
            }
            cur = func.next(q);
        }
    }

    fn link_successors(&mut self, func: &Function<'_>, b: usize) -> CompileResult<()> {
        let fallthrough = (b + 1 < self.blocks.len()).then_some(b + 1);
        let last = func.quad(self.blocks[b].end);
        let succ = match last.kind() {
            OpKind::Jump => [Some(self.resolve(last.op1.as_label())?), None],
            OpKind::JumpIf | OpKind::JumpIfNot => {
                [Some(self.resolve(last.op1.as_label())?), fallthrough]
            }
            OpKind::Return => [None, None],
            _ => [fallthrough, None],
        };
        self.blocks[b].succ = succ;
        Ok(())
    }

    fn resolve(&self, label: Option<LabelId>) -> CompileResult<usize> {
        let label = label.ok_or_else(|| CompileError::InvalidQuad {
            reason: "jump without a label operand".to_string(),
        })?;
        self.labels
            .get(&label)
            .copied()
            .ok_or(CompileError::UnresolvedLabel { label })
    }

    /// Quads of block `b` in list order.
    pub fn block_quads(&self, func: &Function<'_>, b: usize) -> Vec<QuadId> {
        let node = &self.blocks[b];
        let mut quads = Vec::new();
        let mut cur = Some(node.start);
        while let Some(q) = cur {
            quads.push(q);
            if q == node.end {
                break;
            }
            cur = func.next(q);
        }
        quads
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    /// Solve liveness again; returns whether any live set changed.
    pub fn recompute_liveness(&mut self) -> bool {
        let before: Vec<(VarSet, VarSet)> = self
            .blocks
            .iter()
            .map(|n| (n.live_in.clone(), n.live_out.clone()))
            .collect();
        liveness::solve(&mut self.blocks);
        self.blocks
            .iter()
            .zip(before)
            .any(|(n, (live_in, live_out))| n.live_in != live_in || n.live_out != live_out)
    }

    /// Human-readable dump of blocks and live sets.
    pub fn describe(&self, func: &Function<'_>) -> String {
        let names = |set: &VarSet| -> String {
            set.iter()
                .map(|v| func.var_name(crate::quad::VarId(v as u32)))
                .collect::<Vec<_>>()
                .join(" ")
        };
        let mut out = String::new();
        for (b, node) in self.blocks.iter().enumerate() {
            let succ: Vec<String> = node.successors().map(|s| format!("B{s}")).collect();
            let _ = writeln!(
                out,
                "B{b}: quads {}..={} -> [{}]",
                node.start.0,
                node.end.0,
                succ.join(", ")
            );
            let _ = writeln!(out, "  in:  {}", names(&node.live_in));
            let _ = writeln!(out, "  out: {}", names(&node.live_out));
        }
        out
    }
}
