//! Type definitions shared by graph nodes.

use smallvec::SmallVec;
use swale_dtype::{AddrSpace, DType, ScalarDType};

use crate::sym::Sym;

/// Binary operation kinds the emitter lowers elementwise.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Max,
}

/// Unary operation kinds. Both are floating-point only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UnaryOp {
    Neg,
    Exp2,
}

/// Type of a memory operand: a symbolically shaped buffer.
///
/// Dimension extents are symbols; the resolved symbol context (or a dynamic
/// runtime binding) supplies their values. The address space decides whether
/// out-of-bounds access is possible at all.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MemoryType {
    pub shape: SmallVec<[Sym; 4]>,
    pub elem: ScalarDType,
    pub space: AddrSpace,
}

impl MemoryType {
    pub fn new(shape: impl IntoIterator<Item = Sym>, elem: ScalarDType, space: AddrSpace) -> Self {
        Self { shape: shape.into_iter().collect(), elem, space }
    }
}

/// Result type of a graph node.
#[derive(Debug, Clone, PartialEq)]
pub enum NodeType {
    /// A per-thread SSA value (scalar or vector register).
    Value(DType),
    /// A memory reference.
    Memory(MemoryType),
    /// No result (writes, barriers, outputs).
    Void,
}

impl NodeType {
    pub fn as_value(&self) -> Option<&DType> {
        match self {
            Self::Value(dt) => Some(dt),
            _ => None,
        }
    }

    pub fn as_memory(&self) -> Option<&MemoryType> {
        match self {
            Self::Memory(mt) => Some(mt),
            _ => None,
        }
    }
}
