//! Target instruction representation the emitter appends into.
//!
//! The real target IR, with its type system, printer and verifier, lives
//! outside this crate; this module is the minimal interface boundary the
//! emission pass needs: an append-only SSA function body with typed values,
//! blocks, and a closed instruction enum. The caller opens a [`Func`]
//! (the "pre-existing function body"), hands the emitter an insertion
//! block, and owns whatever was appended when the pass returns.

use smallvec::SmallVec;
use swale_dtype::{AddrSpace, ConstValue, DType, ScalarDType};

/// An SSA value handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Value(u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BlockId(u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct InstId(u32);

/// Type of an SSA value: plain data or a memory reference.
#[derive(Debug, Clone, PartialEq)]
pub enum Type {
    Data(DType),
    MemRef { elem: ScalarDType, space: AddrSpace },
}

impl Type {
    pub fn index() -> Self {
        Self::Data(DType::index())
    }

    pub fn data(&self) -> Option<&DType> {
        match self {
            Self::Data(dt) => Some(dt),
            Self::MemRef { .. } => None,
        }
    }
}

/// Vector element binary instruction families, split by signedness the way
/// the target splits them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VecBinOp {
    AddF,
    AddI,
    SubF,
    SubI,
    MulF,
    MulI,
    DivF,
    DivS,
    DivU,
    MaxF,
    MaxS,
    MaxU,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VecUnOp {
    NegF,
    Exp2,
}

/// One target instruction. Index arithmetic (`Add`..`BitAnd`) operates on
/// `Index`-typed scalars or per-lane vectors; the `Binary`/`Unary` families
/// are the element-typed vector ALU.
#[derive(Debug, Clone, PartialEq)]
pub enum Inst {
    ConstIndex { value: i64 },
    ConstIndexVec { values: SmallVec<[i64; 8]> },
    ConstScalar { value: ConstValue, dtype: DType },
    /// Dense splat-constant vector.
    SplatConst { value: ConstValue, dtype: DType },
    /// Boolean vector with the leading `set` lanes true.
    ConstMask { lanes: usize, set: usize },

    ThreadId { axis: usize },
    WorkgroupId { axis: usize },

    Add { lhs: Value, rhs: Value },
    Mul { lhs: Value, rhs: Value },
    /// Truncating signed division.
    DivS { lhs: Value, rhs: Value },
    /// Ceiling signed division.
    CeilDivS { lhs: Value, rhs: Value },
    RemS { lhs: Value, rhs: Value },
    /// Signed strict less-than; produces a 1-bit predicate per lane.
    LtS { lhs: Value, rhs: Value },
    BitAnd { lhs: Value, rhs: Value },

    Splat { value: Value, lanes: usize },
    Extract { vector: Value, lane: usize },
    Insert { value: Value, vector: Value, lane: usize },
    ExtractSlice { vector: Value, offset: usize, size: usize, stride: usize },

    Binary { op: VecBinOp, lhs: Value, rhs: Value },
    Unary { op: VecUnOp, operand: Value },
    /// Widen a float to 32 bits.
    ExtF { value: Value },
    /// Narrow a 32-bit float back down.
    TruncF { value: Value },

    Load { mem: Value, indices: SmallVec<[Value; 4]> },
    MaskedLoad { mem: Value, indices: SmallVec<[Value; 4]>, mask: Value, passthru: Value },
    Store { value: Value, mem: Value, indices: SmallVec<[Value; 4]> },
    MaskedStore { value: Value, mem: Value, indices: SmallVec<[Value; 4]>, mask: Value },
    Gather { mem: Value, indices: SmallVec<[Value; 4]>, offsets: Value, mask: Value, passthru: Value },
    Scatter { value: Value, mem: Value, indices: SmallVec<[Value; 4]>, offsets: Value, mask: Value },

    Alloc { shape: SmallVec<[i64; 4]>, elem: ScalarDType, space: AddrSpace },
    Barrier,

    /// Fused matrix-multiply-accumulate over one (m, n, k) hardware tile.
    Mma { m: usize, n: usize, k: usize, lhs: Value, rhs: Value, acc: Value },
    /// Cross-lane shuffle by exclusive-or of the lane id with `offset`,
    /// within groups of `width` lanes.
    ShuffleXor { value: Value, offset: Value, width: Value },

    /// Counted loop `[lower, upper)` by `step` with carried values; the body
    /// block's parameters are the induction variable followed by the carried
    /// values, and the instruction's results are their final states.
    For { lower: Value, upper: Value, step: Value, init: SmallVec<[Value; 2]>, body: BlockId },
    Yield { values: SmallVec<[Value; 2]> },
}

#[derive(Debug)]
pub struct InstData {
    pub inst: Inst,
    pub results: SmallVec<[Value; 2]>,
}

#[derive(Debug)]
struct ValueInfo {
    ty: Type,
    origin: ValueOrigin,
}

#[derive(Debug, Clone, Copy)]
enum ValueOrigin {
    Param(BlockId, usize),
    Inst(InstId, usize),
}

#[derive(Debug, Default)]
struct Block {
    params: SmallVec<[Value; 4]>,
    insts: Vec<InstId>,
}

/// An open function body: blocks of instructions over one value arena.
#[derive(Debug, Default)]
pub struct Func {
    values: Vec<ValueInfo>,
    blocks: Vec<Block>,
    insts: Vec<InstData>,
}

impl Func {
    /// A function body whose entry block takes `params` (kernel buffers and
    /// dynamic sizes, bound by the signature collaborator).
    pub fn new(params: &[Type]) -> Self {
        let mut func = Self::default();
        func.add_block(params);
        func
    }

    pub fn entry(&self) -> BlockId {
        BlockId(0)
    }

    pub fn add_block(&mut self, params: &[Type]) -> BlockId {
        let block = BlockId(self.blocks.len() as u32);
        self.blocks.push(Block::default());
        for (i, ty) in params.iter().enumerate() {
            let v = self.new_value(ty.clone(), ValueOrigin::Param(block, i));
            self.blocks[block.0 as usize].params.push(v);
        }
        block
    }

    fn new_value(&mut self, ty: Type, origin: ValueOrigin) -> Value {
        let v = Value(self.values.len() as u32);
        self.values.push(ValueInfo { ty, origin });
        v
    }

    pub fn block_params(&self, block: BlockId) -> &[Value] {
        &self.blocks[block.0 as usize].params
    }

    /// Append `inst` to `block`, producing one result per entry of
    /// `result_types`.
    pub fn push(&mut self, block: BlockId, inst: Inst, result_types: &[Type]) -> SmallVec<[Value; 2]> {
        let id = InstId(self.insts.len() as u32);
        let results: SmallVec<[Value; 2]> = result_types
            .iter()
            .enumerate()
            .map(|(i, ty)| self.new_value(ty.clone(), ValueOrigin::Inst(id, i)))
            .collect();
        self.insts.push(InstData { inst, results: results.clone() });
        self.blocks[block.0 as usize].insts.push(id);
        results
    }

    pub fn push1(&mut self, block: BlockId, inst: Inst, ty: Type) -> Value {
        self.push(block, inst, std::slice::from_ref(&ty))[0]
    }

    pub fn push0(&mut self, block: BlockId, inst: Inst) {
        self.push(block, inst, &[]);
    }

    pub fn ty(&self, value: Value) -> &Type {
        &self.values[value.0 as usize].ty
    }

    /// Data type of a value; `None` for memory references.
    pub fn dtype(&self, value: Value) -> Option<&DType> {
        self.ty(value).data()
    }

    /// The integer behind a `ConstIndex`-defined value, if that is what
    /// `value` is.
    pub fn as_const_index(&self, value: Value) -> Option<i64> {
        match self.values[value.0 as usize].origin {
            ValueOrigin::Inst(id, 0) => match self.insts[id.0 as usize].inst {
                Inst::ConstIndex { value } => Some(value),
                _ => None,
            },
            _ => None,
        }
    }

    pub fn insts(&self, block: BlockId) -> impl Iterator<Item = &Inst> + '_ {
        self.blocks[block.0 as usize].insts.iter().map(|id| &self.insts[id.0 as usize].inst)
    }

    pub fn inst_data(&self, block: BlockId) -> impl Iterator<Item = &InstData> + '_ {
        self.blocks[block.0 as usize].insts.iter().map(|id| &self.insts[id.0 as usize])
    }
}

/// Append an `Index`-typed integer constant.
pub fn const_index(func: &mut Func, block: BlockId, value: i64) -> Value {
    func.push1(block, Inst::ConstIndex { value }, Type::index())
}

/// Replicate a scalar value across `lanes`.
pub fn splat(func: &mut Func, block: BlockId, value: Value, lanes: usize) -> Value {
    let base = func.dtype(value).expect("splat of a non-data value").base();
    func.push1(block, Inst::Splat { value, lanes }, Type::Data(DType::Scalar(base).vec(lanes)))
}

/// Append a typed scalar constant.
pub fn const_scalar(func: &mut Func, block: BlockId, value: ConstValue, dtype: DType) -> Value {
    func.push1(block, Inst::ConstScalar { value, dtype: dtype.clone() }, Type::Data(dtype))
}
