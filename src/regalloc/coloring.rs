// This module drives register allocation for one function at a time. Variables that can never
// live in a register (globals, arrays, aggregates, anything whose address is taken, incoming
// stack arguments) are placed in memory first. The flow graph is built once; then each round
// resets the register and immediate resolutions, clears the conflict graph and rebuilds it by
// walking every block backwards through the target policy, which may insert moves as it goes.
// Variables that end the build with an edge to every register are resolved before coloring:
// a directly pinned one is split (later pins go through a copy) and everything else moves to
// memory. Coloring is the classic simplify/select scheme with an optimistic pass over what
// simplify leaves behind; when that fails, the unpinned variable with the most conflicts is
// spilled (or, if only pinned ones are left, one of them is split) and the round starts over.
// Memory resolutions survive every restart, so spills are monotonic.

//! Simplify/select graph coloring over the conflict graph.

use log::{debug, trace, warn};

use super::context::{ConstraintContext, PinTable};
use super::frame::StackFrame;
use super::{AllocatorConfig, FunctionAllocation, TargetPolicy};
use crate::core::conflict_graph::ConflictGraph;
use crate::core::error::{CompileError, CompileResult};
use crate::core::register_file::{Reg, RegSet};
use crate::core::session::CompilationSession;
use crate::core::var_set::VarSet;
use crate::flow::FlowGraph;
use crate::quad::{Allocation, Function, OpKind, VarId, VarKind};

/// Outcome of one build/color round.
enum Round {
    Colored,
    Retry,
}

/// Register allocator for one target.
pub struct Allocator<'p, P: TargetPolicy> {
    policy: &'p P,
    config: AllocatorConfig,
}

impl<'p, P: TargetPolicy> Allocator<'p, P> {
    pub fn new(policy: &'p P, config: AllocatorConfig) -> Self {
        Self { policy, config }
    }

    /// Resolve every variable of `func` to a register, memory or an immediate.
    pub fn allocate<'a>(
        &self,
        session: &CompilationSession<'a>,
        func: &mut Function<'a>,
    ) -> CompileResult<FunctionAllocation> {
        session.set_current_function(func.name());
        let quads_before = func.quad_count();
        let mut state = FunctionState::new(self.policy, func);
        state.place_memory_vars(self.policy, func);

        let mut flow = FlowGraph::build(func)?;
        let mut result = Err(CompileError::RegisterAllocation {
            function: func.name().to_string(),
            reason: format!("no coloring within {} rounds", self.config.max_iterations),
        });

        for round in 1..=self.config.max_iterations {
            state.iterations = round;
            debug!("{}: allocation round {round}", func.name());
            if let Round::Colored = self.round(session, func, &mut flow, &mut state)? {
                result = Ok(());
                break;
            }
        }
        result?;

        let allocation = state.finish(func, self.policy);
        session.record_function_allocated(func.name(), quads_before, allocation.iterations);
        session.clear_function_state();
        debug!(
            "{}: allocated in {} rounds, {} spilled, {} moves, frame {} bytes",
            allocation.name,
            allocation.iterations,
            allocation.spilled.len(),
            allocation.moves_inserted,
            allocation.frame_size
        );
        Ok(allocation)
    }

    fn round<'a>(
        &self,
        session: &CompilationSession<'a>,
        func: &mut Function<'a>,
        flow: &mut FlowGraph,
        state: &mut FunctionState,
    ) -> CompileResult<Round> {
        reset_resolutions(func);
        state.graph.clear();
        state.graph.ensure_variables(func.var_count());
        state.pins.begin_build();

        let moves = self.build(session, func, flow, state)?;
        state.moves_inserted += moves;

        if self.resolve_impossible(session, func, state)? {
            return Ok(Round::Retry);
        }

        for v in func.var_ids() {
            let node = state.graph.var_node(v.index());
            if func.var(v).alloc.is_resolved() {
                state.graph.deactivate(node);
            }
        }

        let stack = self.simplify(func, state);
        let remaining: Vec<VarId> = func
            .var_ids()
            .filter(|v| state.graph.is_active(state.graph.var_node(v.index())))
            .collect();

        if remaining.is_empty() {
            self.assign(session, func, state, &stack)?;
            return Ok(Round::Colored);
        }

        if self.config.optimistic {
            let snapshot = state.graph.snapshot();
            if self.color_in_order(func, state, &remaining) {
                trace!("{}: optimistic coloring of {} nodes", func.name(), remaining.len());
                self.assign(session, func, state, &stack)?;
                for &v in &remaining {
                    if func.var(v).alloc.register().is_some() {
                        session.record_register_allocated();
                    }
                }
                return Ok(Round::Colored);
            }
            state.graph.restore(snapshot);
            for &v in &remaining {
                func.var_mut(v).alloc = Allocation::Unassigned;
            }
        }

        // Spill candidates are the variables not forced into a register.
        let candidate = most_conflicted(
            state,
            remaining
                .iter()
                .copied()
                .filter(|&v| !state.pins.is_created(v) && state.pins.pinned(v).is_none()),
        );
        if let Some((victim, conflicts)) = candidate {
            debug!(
                "{}: spill {} ({conflicts} conflicts)",
                func.name(),
                func.var_name(victim)
            );
            state.spill(func, victim);
            session.record_spill_generated();
            return Ok(Round::Retry);
        }

        // Only pinned variables are left: route the pins of one through copies.
        let splittable = most_conflicted(
            state,
            remaining
                .iter()
                .copied()
                .filter(|&v| !state.pins.is_created(v) && !state.pins.is_split(v)),
        );
        if let Some((var, conflicts)) = splittable {
            debug!(
                "{}: split {} ({conflicts} conflicts)",
                func.name(),
                func.var_name(var)
            );
            state.pins.split(var);
            return Ok(Round::Retry);
        }

        Err(CompileError::RegisterAllocation {
            function: func.name().to_string(),
            reason: format!(
                "{} uncolorable variables and none can be spilled",
                remaining.len()
            ),
        })
    }

    /// Run the policy over every quad, last block first, last quad first.
    fn build<'a>(
        &self,
        session: &CompilationSession<'a>,
        func: &mut Function<'a>,
        flow: &mut FlowGraph,
        state: &mut FunctionState,
    ) -> CompileResult<usize> {
        let regs = self.policy.registers();
        let mut ctx = ConstraintContext::new(
            func,
            flow,
            &mut state.graph,
            regs,
            &mut state.pins,
            session,
        );
        self.policy.prepare(&mut ctx)?;

        let mut live = VarSet::new();
        for b in (0..ctx.flow().len()).rev() {
            ctx.set_block(b);
            live.copy_from(&ctx.flow().blocks[b].live_out);
            let mut cur = ctx.flow().blocks[b].end;
            loop {
                self.policy.constrain(&mut ctx, cur, &mut live)?;
                ctx.def_conflicts(cur, &live);

                let quad = ctx.quad(cur);
                if let Some(d) = quad.def() {
                    live.clear(d.index());
                }
                for u in quad.uses() {
                    live.set(u.index());
                }

                // Re-read: the policy may have inserted quads before the start.
                if cur == ctx.flow().blocks[b].start {
                    break;
                }
                cur = ctx.func().prev(cur).ok_or_else(|| CompileError::InvalidQuad {
                    reason: format!("block {b} is not linked back to its start"),
                })?;
            }
        }
        Ok(ctx.moves_inserted())
    }

    /// Resolve variables that conflict with every register. Returns whether
    /// anything changed and the build must be redone.
    fn resolve_impossible(
        &self,
        session: &CompilationSession<'_>,
        func: &mut Function<'_>,
        state: &mut FunctionState,
    ) -> CompileResult<bool> {
        let reg_count = self.policy.registers().count;
        let mut changed = false;

        for v in func.var_ids() {
            if func.var(v).alloc.is_resolved() {
                continue;
            }
            let node = state.graph.var_node(v.index());
            if !(0..reg_count).all(|r| state.graph.has_edge(node, r)) {
                continue;
            }

            if state.pins.is_created(v) {
                return Err(CompileError::RegisterAllocation {
                    function: func.name().to_string(),
                    reason: format!("register constraints of {} conflict", func.var_name(v)),
                });
            }
            if state.pins.pinned(v).is_some() && !state.pins.is_split(v) {
                trace!("split {}", func.var_name(v));
                state.pins.split(v);
            } else {
                trace!("{} cannot take any register", func.var_name(v));
                state.spill(func, v);
                session.record_spill_generated();
            }
            changed = true;
        }
        Ok(changed)
    }

    /// Remove nodes with fewer than `R` active conflicts, lowest index first.
    fn simplify(&self, func: &Function<'_>, state: &mut FunctionState) -> Vec<VarId> {
        let reg_count = self.policy.registers().count;
        let mut stack = Vec::new();
        'scan: loop {
            for v in func.var_ids() {
                let node = state.graph.var_node(v.index());
                if state.graph.is_active(node) && state.graph.count_conflicts(node) < reg_count {
                    state.graph.deactivate(node);
                    stack.push(v);
                    continue 'scan;
                }
            }
            break;
        }
        stack
    }

    /// Give `var` the lowest register it has no edge to, and tell every
    /// neighbour about it.
    fn color(&self, func: &mut Function<'_>, state: &mut FunctionState, var: VarId) -> bool {
        let reg_count = self.policy.registers().count;
        let node = state.graph.var_node(var.index());
        let Some(reg) = (0..reg_count).find(|&r| !state.graph.has_edge(node, r)) else {
            return false;
        };

        let neighbors: Vec<usize> = state
            .graph
            .neighbors(node)
            .filter(|&n| !state.graph.is_register(n))
            .collect();
        for n in neighbors {
            state.graph.add_edge(n, reg);
        }
        func.var_mut(var).alloc = Allocation::Register(Reg::new(reg as u8));
        trace!("{} -> r{reg}", func.var_name(var));
        true
    }

    fn color_in_order(
        &self,
        func: &mut Function<'_>,
        state: &mut FunctionState,
        vars: &[VarId],
    ) -> bool {
        vars.iter().all(|&v| self.color(func, state, v))
    }

    /// Pop the simplify stack and color each variable.
    fn assign(
        &self,
        session: &CompilationSession<'_>,
        func: &mut Function<'_>,
        state: &mut FunctionState,
        stack: &[VarId],
    ) -> CompileResult<()> {
        for &v in stack.iter().rev() {
            if !self.color(func, state, v) {
                return Err(CompileError::RegisterAllocation {
                    function: func.name().to_string(),
                    reason: format!("no register left for simplified {}", func.var_name(v)),
                });
            }
            session.record_register_allocated();
        }
        Ok(())
    }
}

/// Allocation state that outlives a single round.
struct FunctionState {
    graph: ConflictGraph,
    pins: PinTable,
    frame: StackFrame,
    spilled: Vec<VarId>,
    moves_inserted: usize,
    iterations: usize,
}

impl FunctionState {
    fn new<P: TargetPolicy>(policy: &P, func: &Function<'_>) -> Self {
        let regs = policy.registers();
        Self {
            graph: ConflictGraph::new(regs.count, &regs.reserved_nodes(), func.var_count()),
            pins: PinTable::new(),
            frame: StackFrame::new(),
            spilled: Vec::new(),
            moves_inserted: 0,
            iterations: 0,
        }
    }

    /// Globals, aggregates, address-taken variables and stack arguments
    /// never take part in coloring.
    fn place_memory_vars<P: TargetPolicy>(&mut self, policy: &P, func: &mut Function<'_>) {
        let mut address_taken = VarSet::new();
        for q in func.quad_ids() {
            let quad = func.quad(q);
            if quad.kind() == OpKind::AddrOf {
                if let Some(v) = quad.op1.as_var() {
                    address_taken.set(v.index());
                }
            }
        }

        for v in func.var_ids() {
            let var = func.var(v);
            let stack_arg = match var.kind {
                VarKind::Argument { index } => policy.stack_argument_slot(index),
                _ => None,
            };
            let alloc = if matches!(var.kind, VarKind::Global | VarKind::Function) {
                Some(Allocation::Memory(0))
            } else if let Some(slot) = stack_arg {
                Some(Allocation::Memory(slot))
            } else if var.is_non_local() || address_taken.contains(v.index()) {
                let (size, align) = (var.size, var.align);
                Some(Allocation::Memory(self.frame.allocate(size, align)))
            } else {
                None
            };
            if let Some(alloc) = alloc {
                trace!("{} placed in memory: {:?}", func.var_name(v), alloc);
                func.var_mut(v).alloc = alloc;
            }
        }
    }

    fn spill(&mut self, func: &mut Function<'_>, var: VarId) {
        let data = func.var(var);
        let (size, align) = (data.size.max(1), data.align);
        let offset = self.frame.allocate(size, align);
        func.var_mut(var).alloc = Allocation::Memory(offset);
        self.spilled.push(var);
    }

    fn finish<P: TargetPolicy>(self, func: &Function<'_>, policy: &P) -> FunctionAllocation {
        let regs = policy.registers();
        let mut used = RegSet::new();
        for v in func.var_ids() {
            if let Some(reg) = func.var(v).alloc.register() {
                used.set(reg);
            }
        }
        let callee_saved = used.intersection(regs.callee_saved).difference(regs.reserved);
        if func.var_ids().any(|v| func.var(v).alloc == Allocation::Unassigned) {
            warn!("{}: variables left unassigned", func.name());
        }

        FunctionAllocation {
            name: func.name().to_string(),
            iterations: self.iterations,
            spilled: self.spilled,
            moves_inserted: self.moves_inserted,
            frame_size: self.frame.size(),
            callee_saved,
        }
    }
}

/// The variable with the most conflicts, the first one on ties.
fn most_conflicted(
    state: &FunctionState,
    vars: impl Iterator<Item = VarId>,
) -> Option<(VarId, usize)> {
    vars.fold(None, |best, v| {
        let count = state.graph.count_conflicts(state.graph.var_node(v.index()));
        match best {
            Some((_, best_count)) if best_count >= count => best,
            _ => Some((v, count)),
        }
    })
}

/// Forget register and immediate decisions; memory is permanent.
fn reset_resolutions(func: &mut Function<'_>) {
    for v in func.var_ids().collect::<Vec<_>>() {
        let var = func.var_mut(v);
        if !var.alloc.is_memory() {
            var.alloc = Allocation::Unassigned;
        }
    }
}

/// Allocate one function with the default configuration.
pub fn allocate_function<'a, P: TargetPolicy>(
    session: &CompilationSession<'a>,
    func: &mut Function<'a>,
    policy: &P,
) -> CompileResult<FunctionAllocation> {
    Allocator::new(policy, AllocatorConfig::default()).allocate(session, func)
}

/// Allocate every function, one after the other.
pub fn allocate_module<'a, P: TargetPolicy>(
    session: &CompilationSession<'a>,
    funcs: &mut [Function<'a>],
    policy: &P,
    config: &AllocatorConfig,
) -> CompileResult<Vec<FunctionAllocation>> {
    let allocator = Allocator::new(policy, config.clone());
    funcs
        .iter_mut()
        .map(|func| allocator.allocate(session, func))
        .collect()
}
