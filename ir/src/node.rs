//! The dataflow graph the emission backend consumes.
//!
//! Nodes live in one arena and are addressed by stable integer ids; nested
//! reduction bodies are regions holding node ids in construction order.
//! Nodes are immutable once constructed: the tracer builds them, the
//! emitter only reads them.

use smallvec::SmallVec;
use swale_dtype::{ConstValue, DType, ScalarDType};

use crate::expr::SymExpr;
use crate::mapping::IndexMapping;
use crate::sym::Sym;
use crate::types::{BinaryOp, MemoryType, NodeType, UnaryOp};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RegionId(pub u32);

/// An operand that is either a node reference or an integer literal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operand {
    Node(NodeId),
    Lit(i64),
}

/// One dimension of an index annotation: `(start, size, stride)` where
/// `start` is symbolic and `size`/`stride` are per-thread lane counts.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexSeq {
    pub start: SymExpr,
    pub size: usize,
    pub stride: usize,
}

/// Per-dimension index assignment of a node, in declared dimension order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IndexAnnot {
    dims: SmallVec<[(Sym, IndexSeq); 4]>,
}

impl IndexAnnot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_dim(mut self, dim: Sym, start: SymExpr, size: usize, stride: usize) -> Self {
        self.dims.push((dim, IndexSeq { start, size, stride }));
        self
    }

    pub fn entries(&self) -> &[(Sym, IndexSeq)] {
        &self.dims
    }

    pub fn dims(&self) -> impl Iterator<Item = Sym> + '_ {
        self.dims.iter().map(|(d, _)| *d)
    }

    pub fn get(&self, dim: Sym) -> Option<&IndexSeq> {
        self.dims.iter().find(|(d, _)| *d == dim).map(|(_, seq)| seq)
    }

    pub fn last(&self) -> Option<&(Sym, IndexSeq)> {
        self.dims.last()
    }

    pub fn len(&self) -> usize {
        self.dims.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dims.is_empty()
    }

    /// Start expressions in declared order.
    pub fn starts(&self) -> SmallVec<[SymExpr; 4]> {
        self.dims.iter().map(|(_, seq)| seq.start.clone()).collect()
    }

    /// The widest per-dimension lane count; registers take their vector
    /// width from this.
    pub fn max_lane_size(&self) -> usize {
        self.dims.iter().map(|(_, seq)| seq.size).max().unwrap_or(1)
    }
}

/// Operation kind with typed operands.
///
/// A closed variant: the emitter matches exhaustively, so adding an
/// operation here forces every backend site to take a position on it.
#[derive(Debug, Clone, PartialEq, strum::AsRefStr)]
#[strum(serialize_all = "snake_case")]
pub enum Op {
    /// Graph input bound to a kernel parameter; lowered values come from the
    /// reference-resolution hook.
    Placeholder { name: String },
    /// Loop-carried placeholder inside a reduction body.
    IterArg { slot: usize },
    /// Externally captured placeholder inside a reduction body; aliases the
    /// already-lowered value of the reduction's capture at the same slot.
    Captured { slot: usize },

    /// Splat-constant vector register; width comes from the node's index
    /// annotation.
    Register { value: ConstValue },
    /// Workgroup-shared allocation with a concrete distributed shape.
    Allocate { shape: SmallVec<[i64; 4]> },

    Read { memory: NodeId, mapping: Option<IndexMapping> },
    Write { register: NodeId, memory: NodeId, mapping: Option<IndexMapping> },

    Binary(BinaryOp, NodeId, NodeId),
    Unary(UnaryOp, NodeId),
    /// Fused matrix-multiply-accumulate over the hardware tile shape.
    Mma { lhs: NodeId, rhs: NodeId, acc: NodeId },
    /// Cross-lane xor shuffle; offset and width must be literals.
    Shuffle { src: NodeId, offset: Operand, width: Operand },
    /// Unit vector replicated to `lanes` elements.
    Broadcast { src: NodeId, lanes: usize },
    ExtractSlice { src: NodeId, offset: usize, size: usize, stride: usize },
    /// Shared-memory barrier.
    Barrier,

    /// Bounded reduction loop over `axis` with carried state.
    Reduction {
        axis: Sym,
        init: SmallVec<[NodeId; 2]>,
        body: RegionId,
        captures: SmallVec<[NodeId; 2]>,
        trip_count: Option<u64>,
    },
    /// Select one result of a multi-result node by index.
    GetResult { src: NodeId, index: usize },

    /// Terminates a region's traversal and names its results.
    Output { values: SmallVec<[NodeId; 2]> },
}

#[derive(Debug, Clone)]
pub struct Node {
    pub op: Op,
    pub ty: NodeType,
    pub index: Option<IndexAnnot>,
    /// Elements-per-lane attribute of memory operations.
    pub elements: Option<usize>,
}

impl Node {
    pub fn value_dtype(&self) -> Option<&DType> {
        self.ty.as_value()
    }

    pub fn memory_type(&self) -> Option<&MemoryType> {
        self.ty.as_memory()
    }
}

/// Arena-backed graph with per-region construction order.
#[derive(Debug, Default)]
pub struct Graph {
    nodes: Vec<Node>,
    regions: Vec<Vec<NodeId>>,
}

impl Graph {
    pub const ROOT: RegionId = RegionId(0);

    pub fn new() -> Self {
        Self { nodes: Vec::new(), regions: vec![Vec::new()] }
    }

    pub fn add_region(&mut self) -> RegionId {
        self.regions.push(Vec::new());
        RegionId((self.regions.len() - 1) as u32)
    }

    pub fn push(&mut self, region: RegionId, node: Node) -> NodeId {
        let id = NodeId(self.nodes.len() as u32);
        self.nodes.push(node);
        self.regions[region.0 as usize].push(id);
        id
    }

    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.0 as usize]
    }

    pub fn region_nodes(&self, region: RegionId) -> &[NodeId] {
        &self.regions[region.0 as usize]
    }

    /// Attach an index annotation after construction (the solver assigns
    /// index sequences in a later pass than tracing).
    pub fn set_index(&mut self, id: NodeId, index: IndexAnnot) {
        self.nodes[id.0 as usize].index = Some(index);
    }

    // -- constructors ------------------------------------------------------

    fn push_value(&mut self, region: RegionId, op: Op, dtype: DType) -> NodeId {
        self.push(region, Node { op, ty: NodeType::Value(dtype), index: None, elements: None })
    }

    pub fn placeholder(&mut self, region: RegionId, name: &str, memory: MemoryType) -> NodeId {
        self.push(
            region,
            Node {
                op: Op::Placeholder { name: name.to_owned() },
                ty: NodeType::Memory(memory),
                index: None,
                elements: None,
            },
        )
    }

    pub fn register(&mut self, region: RegionId, value: ConstValue, elem: ScalarDType, index: IndexAnnot) -> NodeId {
        let dtype = DType::Scalar(elem).vec(index.max_lane_size());
        self.push(
            region,
            Node { op: Op::Register { value }, ty: NodeType::Value(dtype), index: Some(index), elements: None },
        )
    }

    pub fn allocate(&mut self, region: RegionId, shape: impl IntoIterator<Item = i64>, memory: MemoryType) -> NodeId {
        self.push(
            region,
            Node {
                op: Op::Allocate { shape: shape.into_iter().collect() },
                ty: NodeType::Memory(memory),
                index: None,
                elements: None,
            },
        )
    }

    pub fn read(
        &mut self,
        region: RegionId,
        memory: NodeId,
        elements: usize,
        mapping: Option<IndexMapping>,
        index: IndexAnnot,
    ) -> NodeId {
        let elem = self.node(memory).memory_type().expect("read memory operand must be a memory node").elem;
        let dtype = DType::Scalar(elem).vec(elements);
        self.push(
            region,
            Node {
                op: Op::Read { memory, mapping },
                ty: NodeType::Value(dtype),
                index: Some(index),
                elements: Some(elements),
            },
        )
    }

    pub fn write(
        &mut self,
        region: RegionId,
        register: NodeId,
        memory: NodeId,
        elements: usize,
        mapping: Option<IndexMapping>,
        index: IndexAnnot,
    ) -> NodeId {
        self.push(
            region,
            Node {
                op: Op::Write { register, memory, mapping },
                ty: NodeType::Void,
                index: Some(index),
                elements: Some(elements),
            },
        )
    }

    pub fn binary(&mut self, region: RegionId, op: BinaryOp, lhs: NodeId, rhs: NodeId) -> NodeId {
        let dtype = self.node(lhs).value_dtype().cloned().expect("binary lhs must be a value");
        self.push_value(region, Op::Binary(op, lhs, rhs), dtype)
    }

    pub fn unary(&mut self, region: RegionId, op: UnaryOp, src: NodeId) -> NodeId {
        let dtype = self.node(src).value_dtype().cloned().expect("unary src must be a value");
        self.push_value(region, Op::Unary(op, src), dtype)
    }

    pub fn mma(&mut self, region: RegionId, lhs: NodeId, rhs: NodeId, acc: NodeId) -> NodeId {
        let dtype = self.node(acc).value_dtype().cloned().expect("mma acc must be a value");
        self.push_value(region, Op::Mma { lhs, rhs, acc }, dtype)
    }

    pub fn shuffle(&mut self, region: RegionId, src: NodeId, offset: Operand, width: Operand) -> NodeId {
        let dtype = self.node(src).value_dtype().cloned().expect("shuffle src must be a value");
        self.push_value(region, Op::Shuffle { src, offset, width }, dtype)
    }

    pub fn broadcast(&mut self, region: RegionId, src: NodeId, lanes: usize) -> NodeId {
        let base = self.node(src).value_dtype().map(|dt| dt.base()).expect("broadcast src must be a value");
        self.push_value(region, Op::Broadcast { src, lanes }, DType::Scalar(base).vec(lanes))
    }

    pub fn extract_slice(
        &mut self,
        region: RegionId,
        src: NodeId,
        offset: usize,
        size: usize,
        stride: usize,
    ) -> NodeId {
        let base = self.node(src).value_dtype().map(|dt| dt.base()).expect("extract_slice src must be a value");
        self.push_value(region, Op::ExtractSlice { src, offset, size, stride }, DType::Scalar(base).vec(size))
    }

    pub fn barrier(&mut self, region: RegionId) -> NodeId {
        self.push(region, Node { op: Op::Barrier, ty: NodeType::Void, index: None, elements: None })
    }

    pub fn reduction(
        &mut self,
        region: RegionId,
        axis: Sym,
        init: impl IntoIterator<Item = NodeId>,
        body: RegionId,
        captures: impl IntoIterator<Item = NodeId>,
        trip_count: Option<u64>,
    ) -> NodeId {
        self.push(
            region,
            Node {
                op: Op::Reduction {
                    axis,
                    init: init.into_iter().collect(),
                    body,
                    captures: captures.into_iter().collect(),
                    trip_count,
                },
                ty: NodeType::Void,
                index: None,
                elements: None,
            },
        )
    }

    pub fn iter_arg(&mut self, region: RegionId, slot: usize, dtype: DType) -> NodeId {
        self.push_value(region, Op::IterArg { slot }, dtype)
    }

    pub fn captured(&mut self, region: RegionId, slot: usize, ty: NodeType) -> NodeId {
        self.push(region, Node { op: Op::Captured { slot }, ty, index: None, elements: None })
    }

    pub fn get_result(&mut self, region: RegionId, src: NodeId, index: usize, dtype: DType) -> NodeId {
        self.push_value(region, Op::GetResult { src, index }, dtype)
    }

    pub fn output(&mut self, region: RegionId, values: impl IntoIterator<Item = NodeId>) -> NodeId {
        self.push(
            region,
            Node {
                op: Op::Output { values: values.into_iter().collect() },
                ty: NodeType::Void,
                index: None,
                elements: None,
            },
        )
    }
}
