// This module implements the interference ("conflict") graph used by the graph-coloring
// register allocator. Nodes are physical registers followed by program variables, so a
// register assignment is simply an edge pattern: a variable may only take a register it has
// no edge to. The adjacency matrix is a single VarSet of width*width bits, where width is
// rounded up to a power of two so that row addressing is a shift. A second VarSet tracks
// which nodes are still active (not yet simplified). Construction seeds a clique among the
// registers and an edge between every reserved register (the stack pointer, usually also
// the frame pointer) and every variable. Variables created mid-allocation are added with
// add_variable_node, which extends the matrix in place when capacity allows and otherwise
// rebuilds it by replaying every existing edge into a matrix of twice the width.

//! Interference graph with registers as literal nodes.

use super::var_set::VarSet;

/// Smallest matrix width; keeps every row word-aligned.
const MIN_WIDTH: usize = 64;

/// Saved adjacency and activity, used by optimistic coloring.
#[derive(Debug, Clone)]
pub struct GraphSnapshot {
    bits: VarSet,
    active: VarSet,
    var_count: usize,
    width: usize,
    shift: u32,
}

/// Square bit matrix of "must not share a location" edges.
#[derive(Debug, Clone)]
pub struct ConflictGraph {
    /// Number of physical register nodes.
    reg_count: usize,
    /// Register nodes that conflict with every variable.
    reserved: Vec<usize>,
    /// Number of variable nodes.
    var_count: usize,
    /// Row length in bits, a power of two.
    width: usize,
    /// `log2(width)`.
    shift: u32,
    /// Adjacency matrix; bit `(a << shift) + b` is the edge `a -- b`.
    bits: VarSet,
    /// Nodes still taking part in simplification.
    active: VarSet,
}

impl ConflictGraph {
    /// Create a seeded graph for `reg_count` registers and `var_count` variables.
    pub fn new(reg_count: usize, reserved: &[usize], var_count: usize) -> Self {
        assert!(reserved.iter().all(|&r| r < reg_count), "reserved register out of range");
        let width = (reg_count + var_count).next_power_of_two().max(MIN_WIDTH);
        let mut graph = Self {
            reg_count,
            reserved: reserved.to_vec(),
            var_count,
            width,
            shift: width.trailing_zeros(),
            bits: VarSet::with_capacity(width * width),
            active: VarSet::with_capacity(width),
        };
        graph.seed();
        graph
    }

    fn seed(&mut self) {
        for a in 0..self.reg_count {
            self.active.set(a);
            for b in (a + 1)..self.reg_count {
                self.add_edge(a, b);
            }
        }
        for v in 0..self.var_count {
            self.seed_variable(self.reg_count + v);
        }
    }

    fn seed_variable(&mut self, node: usize) {
        self.active.set(node);
        for i in 0..self.reserved.len() {
            let reg = self.reserved[i];
            self.add_edge(reg, node);
        }
    }

    pub fn reg_count(&self) -> usize {
        self.reg_count
    }

    pub fn var_count(&self) -> usize {
        self.var_count
    }

    /// Total number of nodes, registers included.
    pub fn node_count(&self) -> usize {
        self.reg_count + self.var_count
    }

    /// Node index of variable `var`.
    pub fn var_node(&self, var: usize) -> usize {
        self.reg_count + var
    }

    /// Whether `node` names a physical register.
    pub fn is_register(&self, node: usize) -> bool {
        node < self.reg_count
    }

    /// Current row width; exposed for growth tests.
    pub fn width(&self) -> usize {
        self.width
    }

    /// Record that `a` and `b` must not share a location.
    pub fn add_edge(&mut self, a: usize, b: usize) {
        assert_ne!(a, b, "conflict edge between a node and itself");
        debug_assert!(a < self.node_count() && b < self.node_count());
        self.bits.set((a << self.shift) + b);
        self.bits.set((b << self.shift) + a);
    }

    pub fn has_edge(&self, a: usize, b: usize) -> bool {
        self.bits.contains((a << self.shift) + b)
    }

    /// Append one variable node and return its node index.
    pub fn add_variable_node(&mut self) -> usize {
        let node = self.node_count();
        if node >= self.width {
            self.rebuild(self.width * 2);
        }
        self.var_count += 1;
        self.seed_variable(node);
        node
    }

    /// Add variable nodes until at least `var_count` exist.
    pub fn ensure_variables(&mut self, var_count: usize) {
        while self.var_count < var_count {
            self.add_variable_node();
        }
    }

    /// Replay every edge into a matrix of `new_width` columns.
    fn rebuild(&mut self, new_width: usize) {
        let old_shift = self.shift;
        let old_mask = self.width - 1;
        let new_shift = new_width.trailing_zeros();

        let mut bits = VarSet::with_capacity(new_width * new_width);
        for bit in self.bits.iter() {
            let a = bit >> old_shift;
            let b = bit & old_mask;
            bits.set((a << new_shift) + b);
        }
        self.active.grow(new_width);

        log::trace!(
            "conflict graph grown from width {} to {}",
            self.width,
            new_width
        );
        self.bits = bits;
        self.width = new_width;
        self.shift = new_shift;
    }

    /// Number of active nodes `node` conflicts with. Registers are always active.
    pub fn count_conflicts(&self, node: usize) -> usize {
        let words_per_row = self.width / 64;
        let row_start = (node << self.shift) / 64;
        let row = &self.bits.words()[row_start..row_start + words_per_row];
        let active = self.active.words();
        row.iter()
            .zip(active.iter().chain(std::iter::repeat(&0)))
            .map(|(r, a)| (r & a).count_ones() as usize)
            .sum()
    }

    /// Reset to the seeded state, keeping node count and capacity.
    pub fn clear(&mut self) {
        self.bits.clear_all();
        self.active.clear_all();
        self.seed();
    }

    pub fn activate(&mut self, node: usize) {
        self.active.set(node);
    }

    pub fn deactivate(&mut self, node: usize) {
        debug_assert!(!self.is_register(node), "register nodes stay active");
        self.active.clear(node);
    }

    pub fn is_active(&self, node: usize) -> bool {
        self.active.contains(node)
    }

    /// Nodes adjacent to `node`, in ascending order.
    pub fn neighbors(&self, node: usize) -> impl Iterator<Item = usize> + '_ {
        let row_start = node << self.shift;
        let count = self.node_count();
        (0..count).filter(move |&other| self.bits.contains(row_start + other))
    }

    /// Number of undirected edges, registers included.
    pub fn edge_count(&self) -> usize {
        self.bits.count() / 2
    }

    pub fn snapshot(&self) -> GraphSnapshot {
        GraphSnapshot {
            bits: self.bits.clone(),
            active: self.active.clone(),
            var_count: self.var_count,
            width: self.width,
            shift: self.shift,
        }
    }

    pub fn restore(&mut self, snapshot: GraphSnapshot) {
        self.bits = snapshot.bits;
        self.active = snapshot.active;
        self.var_count = snapshot.var_count;
        self.width = snapshot.width;
        self.shift = snapshot.shift;
    }
}
