//! Index mappings between logical and physical coordinates.
//!
//! A mapping relates the iteration space of a read/write to the coordinate
//! space of the tensor it touches, one expression per axis over a shared set
//! of iterator symbols. At least one side must be the identity; a general
//! bidirectional permutation is not representable by the emitter.

use smallvec::SmallVec;

use crate::expr::SymExpr;
use crate::sym::Sym;

#[derive(Debug, Clone, PartialEq)]
pub struct IndexMapping {
    iterators: usize,
    inputs: SmallVec<[(Sym, SymExpr); 4]>,
    outputs: SmallVec<[(Sym, SymExpr); 4]>,
}

impl IndexMapping {
    pub fn new(
        iterators: usize,
        inputs: impl IntoIterator<Item = (Sym, SymExpr)>,
        outputs: impl IntoIterator<Item = (Sym, SymExpr)>,
    ) -> Self {
        Self { iterators, inputs: inputs.into_iter().collect(), outputs: outputs.into_iter().collect() }
    }

    /// The canonical symbol for the `i`-th mapping iterator.
    pub fn iterator(i: usize) -> Sym {
        Sym::intern(&format!("$it{i}"))
    }

    pub fn iterators(&self) -> usize {
        self.iterators
    }

    /// All iterator symbols of this mapping, in order.
    pub fn iterator_syms(&self) -> SmallVec<[Sym; 4]> {
        (0..self.iterators).map(Self::iterator).collect()
    }

    pub fn input_dims(&self) -> SmallVec<[Sym; 4]> {
        self.inputs.iter().map(|(d, _)| *d).collect()
    }

    pub fn output_dims(&self) -> SmallVec<[Sym; 4]> {
        self.outputs.iter().map(|(d, _)| *d).collect()
    }

    fn side_is_identity(side: &[(Sym, SymExpr)], iterators: usize) -> bool {
        side.len() == iterators
            && side.iter().enumerate().all(|(i, (_, e))| *e == SymExpr::Sym(Self::iterator(i)))
    }

    /// The input side passes iterators through untouched.
    pub fn is_input_identity(&self) -> bool {
        Self::side_is_identity(&self.inputs, self.iterators)
    }

    /// The output side passes iterators through untouched.
    pub fn is_output_identity(&self) -> bool {
        Self::side_is_identity(&self.outputs, self.iterators)
    }

    /// Both sides are the identity: the mapping permutes or remaps nothing.
    pub fn is_identity(&self) -> bool {
        self.is_input_identity() && self.is_output_identity()
    }

    fn map_side(side: &[(Sym, SymExpr)], shape: &[Sym]) -> Option<SmallVec<[SymExpr; 4]>> {
        shape
            .iter()
            .map(|dim| side.iter().find(|(d, _)| d == dim).map(|(_, e)| e.clone()))
            .collect()
    }

    /// Input-side expressions reordered to `shape`'s dimension order.
    /// `None` when a dimension of `shape` has no expression in the mapping.
    pub fn map_input_indices(&self, shape: &[Sym]) -> Option<SmallVec<[SymExpr; 4]>> {
        Self::map_side(&self.inputs, shape)
    }

    /// Output-side expressions reordered to `shape`'s dimension order.
    pub fn map_output_indices(&self, shape: &[Sym]) -> Option<SmallVec<[SymExpr; 4]>> {
        Self::map_side(&self.outputs, shape)
    }
}
