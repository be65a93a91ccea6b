// This module holds the per-function container handed over by the quad generator: an
// arena-backed, index-linked list of quads bounded by a first and a last quad, the variable
// table, and the table of call-target symbols. Quads are stored in a bumpalo Vec owned by the
// compilation session's arena and are never removed; the list order is defined only by the
// prev/next links, so splicing a quad in the middle is an O(1) link rewrite. Variables keep
// read/write occurrence counts which are maintained on every append and every splice, since
// the constraint policy relies on them for immediate folding and pinning decisions.

//! Arena-backed function body.

use bumpalo::collections::Vec as BumpVec;

use super::var::{VarData, VarKind};
use super::{DataSize, DataType, LabelId, Operand, Quad, QuadId, SymbolId, VarId};
use crate::core::session::CompilationSession;

/// One function: quad list, variable table and symbols.
#[derive(Debug)]
pub struct Function<'a> {
    name: &'a str,
    quads: BumpVec<'a, Quad>,
    first: Option<QuadId>,
    last: Option<QuadId>,
    vars: BumpVec<'a, VarData<'a>>,
    symbols: BumpVec<'a, &'a str>,
    next_label: LabelId,
}

impl<'a> Function<'a> {
    /// Create an empty function whose storage lives in the session arena.
    pub fn new(session: &CompilationSession<'a>, name: &str) -> Self {
        let arena = session.arena();
        Self {
            name: session.intern_str(name),
            quads: BumpVec::new_in(arena),
            first: None,
            last: None,
            vars: BumpVec::new_in(arena),
            symbols: BumpVec::new_in(arena),
            next_label: 0,
        }
    }

    pub fn name(&self) -> &'a str {
        self.name
    }

    // ---- variables ----

    pub fn add_var(&mut self, var: VarData<'a>) -> VarId {
        let id = VarId(self.vars.len() as u32);
        self.vars.push(var);
        id
    }

    /// New unnamed temporary.
    pub fn add_temp(&mut self, ty: DataType, size: DataSize) -> VarId {
        self.add_var(VarData::temp(ty, size))
    }

    pub fn var(&self, id: VarId) -> &VarData<'a> {
        &self.vars[id.index()]
    }

    pub fn var_mut(&mut self, id: VarId) -> &mut VarData<'a> {
        &mut self.vars[id.index()]
    }

    pub fn var_count(&self) -> usize {
        self.vars.len()
    }

    pub fn var_ids(&self) -> impl Iterator<Item = VarId> {
        (0..self.vars.len() as u32).map(VarId)
    }

    /// Printable name of a variable (`%N` for unnamed ones).
    pub fn var_name(&self, id: VarId) -> String {
        match self.var(id).name {
            Some(name) => name.to_string(),
            None => format!("%{}", id.0),
        }
    }

    /// Incoming argument variable for `position`, if declared.
    pub fn argument_var(&self, position: u32) -> Option<VarId> {
        self.var_ids()
            .find(|&v| self.var(v).kind == VarKind::Argument { index: position })
    }

    // ---- symbols and labels ----

    pub fn add_symbol(&mut self, name: &'a str) -> SymbolId {
        if let Some(pos) = self.symbols.iter().position(|&s| s == name) {
            return pos as SymbolId;
        }
        self.symbols.push(name);
        (self.symbols.len() - 1) as SymbolId
    }

    pub fn symbol(&self, id: SymbolId) -> &'a str {
        self.symbols.get(id as usize).copied().unwrap_or("?")
    }

    /// Fresh label id, above every label seen so far.
    pub fn new_label(&mut self) -> LabelId {
        let label = self.next_label;
        self.next_label += 1;
        label
    }

    fn note_label(&mut self, quad: &Quad) {
        if let Operand::Label(l) = quad.op1 {
            self.next_label = self.next_label.max(l + 1);
        }
    }

    // ---- quads ----

    pub fn first(&self) -> Option<QuadId> {
        self.first
    }

    pub fn last(&self) -> Option<QuadId> {
        self.last
    }

    pub fn quad(&self, id: QuadId) -> &Quad {
        &self.quads[id.index()]
    }

    pub fn quad_mut(&mut self, id: QuadId) -> &mut Quad {
        &mut self.quads[id.index()]
    }

    pub fn prev(&self, id: QuadId) -> Option<QuadId> {
        self.quads[id.index()].prev
    }

    pub fn next(&self, id: QuadId) -> Option<QuadId> {
        self.quads[id.index()].next
    }

    /// Append a quad at the end of the list.
    pub fn push_quad(&mut self, mut quad: Quad) -> QuadId {
        let id = QuadId(self.quads.len() as u32);
        quad.prev = self.last;
        quad.next = None;
        self.note_references(&quad);
        self.note_label(&quad);
        self.quads.push(quad);

        match self.last {
            Some(last) => self.quads[last.index()].next = Some(id),
            None => self.first = Some(id),
        }
        self.last = Some(id);
        id
    }

    /// Link `quad` immediately before `at`.
    pub(crate) fn splice_before(&mut self, at: QuadId, mut quad: Quad) -> QuadId {
        let id = QuadId(self.quads.len() as u32);
        let prev = self.quads[at.index()].prev;
        quad.prev = prev;
        quad.next = Some(at);
        self.note_references(&quad);
        self.quads.push(quad);

        self.quads[at.index()].prev = Some(id);
        match prev {
            Some(p) => self.quads[p.index()].next = Some(id),
            None => self.first = Some(id),
        }
        id
    }

    /// Link `quad` immediately after `at`.
    pub(crate) fn splice_after(&mut self, at: QuadId, mut quad: Quad) -> QuadId {
        let id = QuadId(self.quads.len() as u32);
        let next = self.quads[at.index()].next;
        quad.prev = Some(at);
        quad.next = next;
        self.note_references(&quad);
        self.quads.push(quad);

        self.quads[at.index()].next = Some(id);
        match next {
            Some(n) => self.quads[n.index()].prev = Some(id),
            None => self.last = Some(id),
        }
        id
    }

    fn note_references(&mut self, quad: &Quad) {
        if let Some(d) = quad.dest {
            self.vars[d.index()].writes += 1;
        }
        for v in quad.uses() {
            self.vars[v.index()].reads += 1;
        }
    }

    /// Move one read of `var` to another variable after an operand rewrite.
    pub(crate) fn transfer_read(&mut self, from: VarId, to: VarId) {
        let old = &mut self.vars[from.index()];
        old.reads = old.reads.saturating_sub(1);
        self.vars[to.index()].reads += 1;
    }

    /// Move one write of `var` to another variable after a dest rewrite.
    pub(crate) fn transfer_write(&mut self, from: VarId, to: VarId) {
        let old = &mut self.vars[from.index()];
        old.writes = old.writes.saturating_sub(1);
        self.vars[to.index()].writes += 1;
    }

    /// Recompute every variable's read/write counts from the quad list.
    pub fn recount_references(&mut self) {
        for var in self.vars.iter_mut() {
            var.reads = 0;
            var.writes = 0;
        }
        let mut cur = self.first;
        while let Some(id) = cur {
            let quad = self.quads[id.index()].clone();
            self.note_references(&quad);
            cur = quad.next;
        }
    }

    /// Quad ids in list order.
    pub fn quad_ids(&self) -> QuadIter<'_, 'a> {
        QuadIter {
            func: self,
            next: self.first,
        }
    }

    /// Number of linked quads.
    pub fn quad_count(&self) -> usize {
        self.quad_ids().count()
    }
}

/// Forward walk over a function's quad list.
pub struct QuadIter<'f, 'a> {
    func: &'f Function<'a>,
    next: Option<QuadId>,
}

impl Iterator for QuadIter<'_, '_> {
    type Item = QuadId;

    fn next(&mut self) -> Option<QuadId> {
        let current = self.next?;
        self.next = self.func.next(current);
        Some(current)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::test_utils::test::with_test_context;
    use crate::quad::{OpKind, Opcode};

    #[test]
    fn test_push_and_splice() {
        with_test_context(|ctx| {
            let session = ctx.create_session();
            let mut func = Function::new(&session, "f");
            let a = func.add_temp(DataType::Signed, DataSize::S64);
            let b = func.add_temp(DataType::Signed, DataSize::S64);

            let q0 = func.push_quad(Quad::new(
                Opcode::new(OpKind::Const, DataType::Signed, DataSize::S64),
                Some(a),
                Operand::Imm(1),
                None,
            ));
            let q1 = func.push_quad(Quad::new(
                Opcode::plain(OpKind::Return),
                None,
                Operand::None,
                Some(b),
            ));
            let mid = func.splice_before(q1, Quad::mov(DataType::Signed, DataSize::S64, b, a));
            let head = func.splice_before(q0, Quad::new(
                Opcode::plain(OpKind::Label),
                None,
                Operand::Label(7),
                None,
            ));
            let tail = func.splice_after(q1, Quad::new(
                Opcode::plain(OpKind::Label),
                None,
                Operand::Label(8),
                None,
            ));

            assert_eq!(func.quad_ids().collect::<Vec<_>>(), vec![head, q0, mid, q1, tail]);
            assert_eq!(func.first(), Some(head));
            assert_eq!(func.last(), Some(tail));
            assert_eq!(func.prev(q1), Some(mid));
            assert_eq!(func.var(a).reads, 1);
            assert_eq!(func.var(b).writes, 1);
            assert_eq!(func.var(b).reads, 1);
        });
    }

    #[test]
    fn test_recount_matches_incremental() {
        with_test_context(|ctx| {
            let session = ctx.create_session();
            let mut func = Function::new(&session, "g");
            let a = func.add_temp(DataType::Signed, DataSize::S32);
            func.push_quad(Quad::new(
                Opcode::new(OpKind::Add, DataType::Signed, DataSize::S32),
                Some(a),
                Operand::Var(a),
                Some(a),
            ));
            let before = func.var(a).clone();
            func.recount_references();
            assert_eq!(func.var(a), &before);
            assert_eq!(before.reads, 2);
            assert_eq!(before.writes, 1);
        });
    }

    #[test]
    fn test_labels_and_symbols() {
        with_test_context(|ctx| {
            let session = ctx.create_session();
            let mut func = Function::new(&session, "h");
            func.push_quad(Quad::new(
                Opcode::plain(OpKind::Label),
                None,
                Operand::Label(4),
                None,
            ));
            assert_eq!(func.new_label(), 5);
            let s = func.add_symbol("puts");
            assert_eq!(func.add_symbol("puts"), s);
            assert_eq!(func.symbol(s), "puts");
        });
    }
}
