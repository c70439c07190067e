//! Intermediate representation for the swale kernel compiler.
//!
//! This crate defines the input side of the emission backend: the dataflow
//! graph with its closed operation enum, symbolic index expressions, index
//! mappings, and the constraint objects the solver hands down.
//!
//! # Module Organization
//!
//! - [`sym`] - Interned symbols and the resolved symbol-substitution context
//! - [`expr`] - Symbolic expression tree with exact rational arithmetic
//! - [`types`] - Operation kinds, memory and node result types
//! - [`mapping`] - Logical-to-physical index mappings
//! - [`node`] - Graph arena, nodes, regions and index annotations
//! - [`constraints`] - Distribution constraints, bounds and stride utilities

pub mod constraints;
pub mod expr;
pub mod mapping;
pub mod node;
pub mod sym;
pub mod types;

// Re-exports: all core types remain accessible at the crate root.
pub use constraints::{
    Constraint, HardwareConstraint, MmaKind, TilingConstraint, WorkgroupConstraint, find_index_bounds,
    strides_from_symbolic_shape,
};
pub use expr::SymExpr;
pub use mapping::IndexMapping;
pub use node::{Graph, IndexAnnot, IndexSeq, Node, NodeId, Op, Operand, RegionId};
pub use sym::{Sym, SymbolContext};
pub use types::{BinaryOp, MemoryType, NodeType, UnaryOp};

// Re-export element types for convenience.
pub use swale_dtype::{AddrSpace, ConstValue, DType, ScalarDType};
