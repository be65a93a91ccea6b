// This module holds the state a target policy works on while the allocator walks one function
// backwards: the function itself, its flow graph, the conflict graph being built, and the pin
// bookkeeping. A pin ties a variable to one physical register by giving it an edge to every
// other register. When a variable cannot be pinned in place (it lives in memory, it is still
// needed after the quad, it is already pinned elsewhere, or it has been split after an
// earlier unsatisfiable pin) the context copies it through a fresh temporary instead, inserting
// the move right before or right after the constrained quad. Temporaries created this way are
// remembered across builds and are never chosen for spilling.

//! Constraint-building context shared by the allocator and target policies.

use hashbrown::HashMap;
use log::trace;

use crate::core::conflict_graph::ConflictGraph;
use crate::core::register_file::{Reg, RegSet, RegisterInfo};
use crate::core::session::CompilationSession;
use crate::core::var_set::VarSet;
use crate::flow::FlowGraph;
use crate::quad::{
    Allocation, DataSize, DataType, Function, OpKind, Opcode, Operand, Quad, QuadEditor, QuadId,
    Slot, VarId,
};

/// Pin bookkeeping. `pinned` is rebuilt on every build; `split` and
/// `created` persist for the whole allocation of one function.
#[derive(Debug, Default)]
pub struct PinTable {
    pinned: HashMap<VarId, Reg>,
    split: VarSet,
    created: VarSet,
}

impl PinTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Forget the pins of the previous build.
    pub fn begin_build(&mut self) {
        self.pinned.clear();
    }

    pub fn pinned(&self, var: VarId) -> Option<Reg> {
        self.pinned.get(&var).copied()
    }

    /// Route every later pin of `var` through a copy.
    pub fn split(&mut self, var: VarId) {
        self.split.set(var.index());
    }

    pub fn is_split(&self, var: VarId) -> bool {
        self.split.contains(var.index())
    }

    /// Whether `var` was created by a policy and must end up in a register.
    pub fn is_created(&self, var: VarId) -> bool {
        self.created.contains(var.index())
    }
}

/// Everything a policy may read or change while constraining one quad.
pub struct ConstraintContext<'c, 'a> {
    func: &'c mut Function<'a>,
    flow: &'c mut FlowGraph,
    graph: &'c mut ConflictGraph,
    regs: &'c RegisterInfo,
    pins: &'c mut PinTable,
    session: &'c CompilationSession<'a>,
    block: usize,
    moves_inserted: usize,
}

impl<'c, 'a> ConstraintContext<'c, 'a> {
    pub fn new(
        func: &'c mut Function<'a>,
        flow: &'c mut FlowGraph,
        graph: &'c mut ConflictGraph,
        regs: &'c RegisterInfo,
        pins: &'c mut PinTable,
        session: &'c CompilationSession<'a>,
    ) -> Self {
        Self {
            func,
            flow,
            graph,
            regs,
            pins,
            session,
            block: 0,
            moves_inserted: 0,
        }
    }

    pub fn func(&self) -> &Function<'a> {
        &*self.func
    }

    pub fn func_mut(&mut self) -> &mut Function<'a> {
        &mut *self.func
    }

    pub fn flow(&self) -> &FlowGraph {
        &*self.flow
    }

    pub fn session(&self) -> &CompilationSession<'a> {
        self.session
    }

    pub fn registers(&self) -> &RegisterInfo {
        self.regs
    }

    pub fn pins(&self) -> &PinTable {
        &*self.pins
    }

    pub fn graph(&self) -> &ConflictGraph {
        &*self.graph
    }

    /// Block that owns the quads being constrained.
    pub fn block(&self) -> usize {
        self.block
    }

    pub fn set_block(&mut self, block: usize) {
        self.block = block;
    }

    pub fn moves_inserted(&self) -> usize {
        self.moves_inserted
    }

    pub fn quad(&self, q: QuadId) -> &Quad {
        self.func.quad(q)
    }

    pub fn alloc(&self, var: VarId) -> Allocation {
        self.func.var(var).alloc
    }

    pub fn is_memory(&self, var: VarId) -> bool {
        self.alloc(var).is_memory()
    }

    pub fn is_immediate(&self, var: VarId) -> bool {
        self.alloc(var).is_immediate()
    }

    pub fn set_alloc(&mut self, var: VarId, alloc: Allocation) {
        self.func.var_mut(var).alloc = alloc;
    }

    // ---- conflict edges ----

    fn node(&self, var: VarId) -> usize {
        self.graph.var_node(var.index())
    }

    /// `a` and `b` must not share a register.
    pub fn conflict(&mut self, a: VarId, b: VarId) {
        if a != b {
            let (na, nb) = (self.node(a), self.node(b));
            self.graph.add_edge(na, nb);
        }
    }

    /// `var` must not be assigned `reg`.
    pub fn conflict_reg(&mut self, var: VarId, reg: Reg) {
        let node = self.node(var);
        self.graph.add_edge(node, reg.index());
    }

    pub fn conflict_regs(&mut self, var: VarId, regs: RegSet) {
        for reg in regs.iter() {
            self.conflict_reg(var, reg);
        }
    }

    /// Every variable in `live` except `except` conflicts with `regs`.
    pub fn clobber(&mut self, live: &VarSet, except: Option<VarId>, regs: RegSet) {
        for v in live.iter().map(|v| VarId(v as u32)) {
            if Some(v) != except {
                self.conflict_regs(v, regs);
            }
        }
    }

    pub fn has_reg_edge(&self, var: VarId, reg: Reg) -> bool {
        self.graph.has_edge(self.node(var), reg.index())
    }

    /// Whether every register already conflicts with `var`.
    pub fn is_unassignable(&self, var: VarId) -> bool {
        let node = self.node(var);
        (0..self.regs.count).all(|r| self.graph.has_edge(node, r))
    }

    /// Pin `var` to `reg`: an edge between `var` and every other register.
    pub fn require_register(&mut self, var: VarId, reg: Reg) {
        let node = self.node(var);
        for r in 0..self.regs.count {
            if r != reg.index() {
                self.graph.add_edge(node, r);
            }
        }
        self.pins.pinned.insert(var, reg);
        trace!("pin {} to {}", self.func.var_name(var), self.regs.name(reg));
    }

    /// Generic definition rule: the destination of `q` conflicts with every
    /// variable live after it (for moves, except the source).
    pub fn def_conflicts(&mut self, q: QuadId, live: &VarSet) {
        let quad = self.func.quad(q);
        let Some(dest) = quad.dest else {
            return;
        };
        if self.is_immediate(dest) {
            return;
        }
        let source = match quad.kind() {
            OpKind::Move => quad.op1.as_var(),
            _ => None,
        };
        for v in live.iter().map(|v| VarId(v as u32)) {
            if Some(v) != source {
                self.conflict(dest, v);
            }
        }
    }

    // ---- temporaries and copies ----

    /// Fresh register-bound temporary.
    pub fn new_temp(&mut self, ty: DataType, size: DataSize) -> VarId {
        let var = self.func.add_temp(ty, size);
        let node = self.graph.add_variable_node();
        debug_assert_eq!(node, self.node(var));
        self.pins.created.set(var.index());
        var
    }

    fn temp_like(&mut self, var: VarId) -> VarId {
        let data = self.func.var(var);
        let (ty, size) = (data.data_type(), data.data_size());
        self.new_temp(ty, size)
    }

    fn insert_before(&mut self, at: QuadId, quad: Quad) -> QuadId {
        self.moves_inserted += 1;
        self.session.record_move_inserted();
        QuadEditor::new(&mut *self.func, &mut *self.flow).insert_before(self.block, at, quad)
    }

    fn insert_after(&mut self, at: QuadId, quad: Quad) -> QuadId {
        self.moves_inserted += 1;
        self.session.record_move_inserted();
        QuadEditor::new(&mut *self.func, &mut *self.flow).insert_after(self.block, at, quad)
    }

    /// Copy the source in `slot` of `q` into a fresh temporary defined
    /// right before `q`, and make `q` read the temporary instead.
    pub fn copy_source(&mut self, q: QuadId, slot: Slot) -> Option<VarId> {
        let var = self.func.quad(q).source(slot)?;
        let temp = self.temp_like(var);
        let data = self.func.var(var);
        let mov = Quad::mov(data.data_type(), data.data_size(), temp, var);
        self.insert_before(q, mov);
        self.func.quad_mut(q).set_source(slot, temp);
        self.func.transfer_read(var, temp);
        trace!(
            "copy {} into {} before quad {}",
            self.func.var_name(var),
            self.func.var_name(temp),
            q.0
        );
        Some(temp)
    }

    /// Replace an immediate first operand of `q` with a `const` temporary.
    pub fn materialize_op1(&mut self, q: QuadId) -> Option<VarId> {
        let quad = self.func.quad(q);
        let value = quad.op1.as_imm()?;
        let (ty, size) = (quad.op.data_type(), quad.op.data_size());
        let temp = self.new_temp(ty, size);
        self.insert_before(
            q,
            Quad::new(Opcode::new(OpKind::Const, ty, size), Some(temp), Operand::Imm(value), None),
        );
        self.func.quad_mut(q).op1 = Operand::Var(temp);
        self.func.var_mut(temp).reads += 1;
        Some(temp)
    }

    /// Make `q` write a fresh temporary and copy it into the original
    /// destination right after `q`. `live` is updated to describe the point
    /// between `q` and the inserted move.
    pub fn copy_dest(&mut self, q: QuadId, live: &mut VarSet) -> Option<VarId> {
        let dest = self.func.quad(q).dest?;
        let temp = self.temp_like(dest);
        let data = self.func.var(dest);
        let mov = Quad::mov(data.data_type(), data.data_size(), dest, temp);
        self.insert_after(q, mov);
        self.func.quad_mut(q).dest = Some(temp);
        self.func.transfer_write(dest, temp);

        // The inserted move is behind the walk; apply its definition rule here.
        for v in live.iter().map(|v| VarId(v as u32)) {
            self.conflict(dest, v);
        }
        live.clear(dest.index());
        live.set(temp.index());
        trace!(
            "route {} through {} after quad {}",
            self.func.var_name(dest),
            self.func.var_name(temp),
            q.0
        );
        Some(temp)
    }

    // ---- pins ----

    fn must_copy(&self, var: VarId, reg: Reg) -> bool {
        self.is_memory(var)
            || self.pins.is_split(var)
            || self.pins.pinned(var).is_some_and(|r| r != reg)
            || self.has_reg_edge(var, reg)
    }

    /// Make the source in `slot` of `q` arrive in `reg`. Returns the variable
    /// actually pinned.
    pub fn pin_source(
        &mut self,
        q: QuadId,
        slot: Slot,
        reg: Reg,
        live: &VarSet,
    ) -> Option<VarId> {
        let var = self.func.quad(q).source(slot)?;
        if self.is_immediate(var) {
            return None;
        }
        let dest = self.func.quad(q).dest;
        let live_after = live.contains(var.index()) && dest != Some(var);
        let var = if live_after || self.must_copy(var, reg) {
            self.copy_source(q, slot)?
        } else {
            var
        };
        self.require_register(var, reg);
        Some(var)
    }

    /// Make the destination of `q` be produced in `reg`. Returns the
    /// variable actually pinned.
    pub fn pin_dest(&mut self, q: QuadId, reg: Reg, live: &mut VarSet) -> Option<VarId> {
        let dest = self.func.quad(q).dest?;
        let var = if self.must_copy(dest, reg) {
            self.copy_dest(q, live)?
        } else {
            dest
        };
        self.require_register(var, reg);
        Some(var)
    }

    /// Route the destination of `q` through a register if it is in memory.
    pub fn dest_to_register(&mut self, q: QuadId, live: &mut VarSet) -> Option<VarId> {
        let dest = self.func.quad(q).dest?;
        if self.is_memory(dest) {
            self.copy_dest(q, live)
        } else {
            Some(dest)
        }
    }

    /// Route the source in `slot` through a register if it is in memory.
    pub fn source_to_register(&mut self, q: QuadId, slot: Slot) -> Option<VarId> {
        let var = self.func.quad(q).source(slot)?;
        if self.is_memory(var) {
            self.copy_source(q, slot)
        } else {
            Some(var)
        }
    }
}
