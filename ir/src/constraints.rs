//! Distribution constraints and the bounds/stride utilities built on them.
//!
//! Constraints are produced by the solver and are opaque to the emitter
//! except for three queries: the hardware MMA tile shape, the induction
//! variable attached to a tiled axis, and which dimensions of an index need
//! a bounds mask.

use smallvec::SmallVec;

use crate::expr::SymExpr;
use crate::node::IndexAnnot;
use crate::sym::{Sym, SymbolContext};

/// Hardware matrix-multiply-accumulate instruction variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[allow(non_camel_case_types)]
pub enum MmaKind {
    F32_16x16x16_F16,
    F32_32x32x8_F16,
}

impl MmaKind {
    /// Fixed (M, N, K) operand/result tile of one instruction.
    pub const fn shape(&self) -> (usize, usize, usize) {
        match self {
            Self::F32_16x16x16_F16 => (16, 16, 16),
            Self::F32_32x32x8_F16 => (32, 32, 8),
        }
    }
}

/// Wave/workgroup geometry and the selected MMA instruction.
#[derive(Debug, Clone, PartialEq)]
pub struct HardwareConstraint {
    pub threads_per_wave: usize,
    pub waves_per_block: [usize; 3],
    pub mma: Option<MmaKind>,
}

/// Distributes `dim` across workgroups along a hardware axis, `tile`
/// elements per workgroup.
#[derive(Debug, Clone, PartialEq)]
pub struct WorkgroupConstraint {
    pub dim: Sym,
    pub tile: SymExpr,
    pub axis: usize,
}

/// Tiles `dim` into a sequential loop; `induction_var` is the symbol index
/// expressions use for the loop counter.
#[derive(Debug, Clone, PartialEq)]
pub struct TilingConstraint {
    pub dim: Sym,
    pub tile: SymExpr,
    pub induction_var: Sym,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Constraint {
    Hardware(HardwareConstraint),
    Workgroup(WorkgroupConstraint),
    Tiling(TilingConstraint),
}

impl Constraint {
    pub fn as_hardware(&self) -> Option<&HardwareConstraint> {
        match self {
            Self::Hardware(hw) => Some(hw),
            _ => None,
        }
    }

    pub fn as_tiling(&self) -> Option<&TilingConstraint> {
        match self {
            Self::Tiling(t) => Some(t),
            _ => None,
        }
    }
}

/// Which dimensions of `index` need a bounds mask, or `None` when none do.
///
/// A distributed dimension is in bounds by construction when its tile
/// statically divides its extent. Non-dividing tiles and unresolved
/// extents or tiles must be masked.
pub fn find_index_bounds(
    constraints: &[Constraint],
    index: &IndexAnnot,
    symbols: &SymbolContext,
) -> Option<SmallVec<[Sym; 4]>> {
    let mut bounds: SmallVec<[Sym; 4]> = SmallVec::new();
    let resolve = symbols.resolver();

    for constraint in constraints {
        let (dim, tile) = match constraint {
            Constraint::Workgroup(wg) => (wg.dim, &wg.tile),
            Constraint::Tiling(t) => (t.dim, &t.tile),
            Constraint::Hardware(_) => continue,
        };
        if index.get(dim).is_none() || bounds.contains(&dim) {
            continue;
        }
        let divides = match (resolve(dim), tile.as_const(&resolve)) {
            (Some(size), Some(tile)) if tile > 0 => size % tile == 0,
            _ => false,
        };
        if !divides {
            bounds.push(dim);
        }
    }

    (!bounds.is_empty()).then_some(bounds)
}

/// Row-major strides for a symbolically shaped tensor: each dimension
/// strides over the product of the extents to its right.
pub fn strides_from_symbolic_shape(shape: &[Sym]) -> SmallVec<[SymExpr; 4]> {
    let mut strides: SmallVec<[SymExpr; 4]> = SmallVec::new();
    for i in 0..shape.len() {
        if i + 1 == shape.len() {
            strides.push(SymExpr::Int(1));
        } else {
            strides.push(SymExpr::Mul(shape[i + 1..].iter().map(|s| SymExpr::Sym(*s)).collect()));
        }
    }
    strides
}
