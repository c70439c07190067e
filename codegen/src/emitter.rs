//! The op dispatch engine.
//!
//! Walks the graph in construction order and lowers one instruction group
//! per node through an exhaustive match on the operation enum. All shared
//! emission state (the lowered-value cache, the induction-variable table,
//! the insertion block) lives here as explicit fields and is reused by the
//! nested recursion for reduction bodies.

use std::collections::HashMap;

use smallvec::SmallVec;
use swale_ir::{Constraint, Graph, NodeId, Op, RegionId, Sym, SymExpr, SymbolContext};

use crate::error::*;
use crate::index::{IndexScope, lower_index};
use crate::tir::{BlockId, Func, Inst, Type, Value};
use crate::{control, memory, ops};

/// Resolution hook for graph inputs not produced by any handler; the one
/// interface into the kernel-signature collaborator.
pub trait ResolveRef {
    fn resolve(&mut self, func: &mut Func, block: BlockId, node: NodeId) -> Option<SmallVec<[Value; 2]>>;
}

/// Ready-made [`ResolveRef`] backed by a table of pre-bound parameter
/// values (buffers and scalars the signature collaborator placed in the
/// function's entry block).
#[derive(Debug, Default)]
pub struct ParamBindings {
    values: HashMap<NodeId, SmallVec<[Value; 2]>>,
}

impl ParamBindings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn bind(&mut self, node: NodeId, value: Value) -> &mut Self {
        self.values.insert(node, SmallVec::from_slice(&[value]));
        self
    }
}

impl ResolveRef for ParamBindings {
    fn resolve(&mut self, _func: &mut Func, _block: BlockId, node: NodeId) -> Option<SmallVec<[Value; 2]>> {
        self.values.get(&node).cloned()
    }
}

/// One emission pass over a graph. Created per pass and discarded with it.
pub struct Emitter<'a> {
    pub(crate) graph: &'a Graph,
    pub(crate) constraints: &'a [Constraint],
    pub(crate) symbols: &'a SymbolContext,
    dynamic_symbols: &'a [Sym],
    resolver: &'a mut dyn ResolveRef,

    pub(crate) func: &'a mut Func,
    /// Current insertion block; reduction lowering switches this for the
    /// duration of a body and restores it on exit.
    pub(crate) block: BlockId,

    /// Whether the gather/scatter synthesizer may emit constant offset
    /// vectors when every lane folds. The general per-lane path is the
    /// default; both produce identical addressing.
    pub constant_offset_fast_path: bool,

    values: HashMap<NodeId, SmallVec<[Value; 2]>>,
    thread_ids: SmallVec<[Value; 3]>,
    workgroup_ids: SmallVec<[Value; 3]>,
    pub(crate) induction_vars: HashMap<Sym, Value>,
    dynamic_dims: HashMap<Sym, Value>,
}

impl<'a> Emitter<'a> {
    pub fn new(
        graph: &'a Graph,
        constraints: &'a [Constraint],
        symbols: &'a SymbolContext,
        dynamic_symbols: &'a [Sym],
        func: &'a mut Func,
        resolver: &'a mut dyn ResolveRef,
    ) -> Self {
        let block = func.entry();
        Self {
            graph,
            constraints,
            symbols,
            dynamic_symbols,
            resolver,
            func,
            block,
            constant_offset_fast_path: false,
            values: HashMap::new(),
            thread_ids: SmallVec::new(),
            workgroup_ids: SmallVec::new(),
            induction_vars: HashMap::new(),
            dynamic_dims: HashMap::new(),
        }
    }

    /// Run the pass: materialize program invariants, then lower the root
    /// region. Returns the root output's operand nodes.
    pub fn emit(mut self) -> Result<SmallVec<[NodeId; 2]>> {
        tracing::debug!(constraints = self.constraints.len(), "starting emission pass");
        self.emit_program_invariants();
        self.visit(Graph::ROOT)
    }

    /// Thread/workgroup ids for all three hardware axes, and dynamic
    /// dimension sizes taken from the Index-typed entry parameters in
    /// declared order.
    fn emit_program_invariants(&mut self) {
        for axis in 0..3 {
            let t = self.func.push1(self.block, Inst::ThreadId { axis }, Type::index());
            self.thread_ids.push(t);
            let wg = self.func.push1(self.block, Inst::WorkgroupId { axis }, Type::index());
            self.workgroup_ids.push(wg);
        }

        let index_params: Vec<Value> = self
            .func
            .block_params(self.func.entry())
            .iter()
            .copied()
            .filter(|v| self.func.ty(*v) == &Type::index())
            .collect();
        for (sym, value) in self.dynamic_symbols.iter().zip(index_params) {
            self.dynamic_dims.insert(*sym, value);
        }
    }

    /// Lower a region's nodes in construction order. An `Output` node
    /// terminates the walk and names the region's results.
    pub(crate) fn visit(&mut self, region: RegionId) -> Result<SmallVec<[NodeId; 2]>> {
        let graph = self.graph;
        for &id in graph.region_nodes(region) {
            let node = graph.node(id);
            if let Op::Output { values } = &node.op {
                return Ok(values.clone());
            }
            self.dispatch(id)?;
        }
        Ok(SmallVec::new())
    }

    fn dispatch(&mut self, id: NodeId) -> Result<()> {
        let graph = self.graph;
        let node = graph.node(id);
        tracing::trace!(node = id.0, op = node.op.as_ref(), "dispatch");

        match &node.op {
            // Inputs are resolved lazily through `lookup`.
            Op::Placeholder { .. } => Ok(()),

            // Body placeholders are bound by the reduction handler before
            // its region is visited; one reaching dispatch unbound sits in a
            // position no handler covers.
            Op::IterArg { .. } | Op::Captured { .. } => {
                if self.is_bound(id) {
                    Ok(())
                } else {
                    UnhandledOperationSnafu { op: node.op.as_ref().to_owned() }.fail()
                }
            }

            Op::Register { value } => ops::handle_register(self, id, node, *value),
            Op::Allocate { shape } => ops::handle_allocate(self, id, node, shape),
            Op::Read { memory, mapping } => memory::handle_read(self, id, node, *memory, mapping.as_ref()),
            Op::Write { register, memory, mapping } => {
                memory::handle_write(self, node, *register, *memory, mapping.as_ref())
            }
            Op::Binary(op, lhs, rhs) => ops::handle_binary(self, id, *op, *lhs, *rhs),
            Op::Unary(op, src) => ops::handle_unary(self, id, *op, *src),
            Op::Mma { lhs, rhs, acc } => ops::handle_mma(self, id, *lhs, *rhs, *acc),
            Op::Shuffle { src, offset, width } => ops::handle_shuffle(self, id, *src, *offset, *width),
            Op::Broadcast { src, lanes } => ops::handle_broadcast(self, id, *src, *lanes),
            Op::ExtractSlice { src, offset, size, stride } => {
                ops::handle_extract_slice(self, id, *src, *offset, *size, *stride)
            }
            Op::Barrier => {
                self.func.push0(self.block, Inst::Barrier);
                Ok(())
            }
            Op::Reduction { .. } => control::handle_reduction(self, id, node),
            Op::GetResult { src, index } => control::handle_get_result(self, id, *src, *index),

            // `visit` consumes Output before dispatch sees it.
            Op::Output { .. } => unreachable!("output node reached dispatch"),
        }
    }

    // -- lowered-value cache ------------------------------------------------

    /// Cached values for a node, falling back to the reference-resolution
    /// hook exactly once; hook results are memoized like handler results.
    pub(crate) fn lookup(&mut self, id: NodeId) -> Result<SmallVec<[Value; 2]>> {
        if let Some(values) = self.values.get(&id) {
            return Ok(values.clone());
        }
        if let Some(values) = self.resolver.resolve(self.func, self.block, id) {
            self.values.insert(id, values.clone());
            return Ok(values);
        }
        UnresolvedReferenceSnafu { node: id }.fail()
    }

    pub(crate) fn lookup1(&mut self, id: NodeId) -> Result<Value> {
        let values = self.lookup(id)?;
        match values.as_slice() {
            [v] => Ok(*v),
            _ => MalformedArgumentsSnafu { reason: format!("node {id:?} lowers to {} values, expected one", values.len()) }
                .fail(),
        }
    }

    pub(crate) fn is_bound(&self, id: NodeId) -> bool {
        self.values.contains_key(&id)
    }

    /// Record a node's lowered values. Rebinding is a defect and fails
    /// fast.
    pub(crate) fn bind(&mut self, id: NodeId, values: SmallVec<[Value; 2]>) -> Result<()> {
        if self.values.contains_key(&id) {
            return NodeReboundSnafu { node: id }.fail();
        }
        self.values.insert(id, values);
        Ok(())
    }

    pub(crate) fn bind1(&mut self, id: NodeId, value: Value) -> Result<()> {
        self.bind(id, SmallVec::from_slice(&[value]))
    }

    // -- induction variables ------------------------------------------------

    /// Bind a reduction axis to its loop induction variable. Each axis may
    /// be bound by exactly one reduction per pass.
    pub(crate) fn bind_induction(&mut self, axis: Sym, value: Value) -> Result<()> {
        if self.induction_vars.contains_key(&axis) {
            return InductionReboundSnafu { axis }.fail();
        }
        self.induction_vars.insert(axis, value);
        Ok(())
    }

    /// Induction-variable symbols currently live, per the tiling
    /// constraints.
    fn induction_syms(&self) -> SmallVec<[Sym; 2]> {
        self.constraints
            .iter()
            .filter_map(Constraint::as_tiling)
            .filter(|t| self.induction_vars.contains_key(&t.dim))
            .map(|t| t.induction_var)
            .collect()
    }

    /// Runtime symbol bindings visible to index expressions right now.
    fn runtime_bindings(&self) -> HashMap<Sym, Value> {
        let mut bindings = HashMap::new();
        for axis in 0..3 {
            bindings.insert(Sym::thread(axis), self.thread_ids[axis]);
            bindings.insert(Sym::workgroup(axis), self.workgroup_ids[axis]);
        }
        for tiling in self.constraints.iter().filter_map(Constraint::as_tiling) {
            if let Some(&iv) = self.induction_vars.get(&tiling.dim) {
                bindings.insert(tiling.induction_var, iv);
            }
        }
        for (&sym, &value) in &self.dynamic_dims {
            bindings.insert(sym, value);
        }
        bindings
    }

    /// Lower an index expression at the current insertion point.
    pub(crate) fn lower_expr(&mut self, expr: &SymExpr) -> Result<Value> {
        let bindings = self.runtime_bindings();
        let induction_syms = self.induction_syms();
        let mut scope = IndexScope {
            func: &mut *self.func,
            block: self.block,
            symbols: self.symbols,
            bindings: &bindings,
            induction_syms: &induction_syms,
        };
        lower_index(&mut scope, expr)
    }

    /// Splat a scalar value to a vector at the current insertion point.
    pub(crate) fn splat(&mut self, value: Value, lanes: usize) -> Value {
        crate::tir::splat(self.func, self.block, value, lanes)
    }
}
