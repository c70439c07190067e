//! Error types for instruction emission.
//!
//! Every error is fatal to the current emission pass: the caller discards
//! the partially filled function body and reports a failed compilation.

use snafu::Snafu;
use swale_dtype::DType;
use swale_ir::{NodeId, Sym};

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Errors that can occur while lowering a graph.
#[derive(Debug, Clone, PartialEq, Snafu)]
#[snafu(visibility(pub))]
pub enum Error {
    /// Operation reached the dispatcher in a position it cannot be lowered in.
    #[snafu(display("no handler for operation '{op}' here"))]
    UnhandledOperation { op: String },

    /// Node attributes don't form a lowerable operation.
    #[snafu(display("malformed arguments: {reason}"))]
    MalformedArguments { reason: String },

    /// Symbol with neither a compile-time value nor a runtime binding.
    #[snafu(display("unknown symbol {symbol}"))]
    UnknownSymbol { symbol: Sym },

    /// Expression kind the index compiler does not lower.
    #[snafu(display("cannot lower expression term {expr}"))]
    UnsupportedExpression { expr: String },

    /// A deferred rational reached an operation that needs a concrete value.
    #[snafu(display("rational operand is not supported in '{context}'"))]
    RationalNotSupported { context: &'static str },

    /// Two vector operands of different widths.
    #[snafu(display("cannot broadcast {lhs} and {rhs}"))]
    BroadcastMismatch { lhs: DType, rhs: DType },

    /// Binary operands must agree in shape and element type.
    #[snafu(display("operand type mismatch: {lhs} vs {rhs}"))]
    TypeMismatch { lhs: DType, rhs: DType },

    /// Element type outside the instruction family of the operation.
    #[snafu(display("unhandled operand type for {op}: {dtype}"))]
    UnsupportedType { op: &'static str, dtype: DType },

    /// Mapping is non-identity on the side that must be identity.
    #[snafu(display("unsupported index mapping: {reason}"))]
    UnsupportedMapping { reason: String },

    /// Shuffle operand outside the single-element <=32-bit float shapes.
    #[snafu(display("unsupported shuffle operand shape: {dtype}"))]
    UnsupportedShuffleShape { dtype: DType },

    /// Shuffle offset/width given as graph values instead of literals.
    #[snafu(display("shuffle offset and width must be compile-time constants"))]
    UnsupportedDynamicParameter,

    /// No active hardware constraint carries an MMA tile shape.
    #[snafu(display("no hardware constraint with a tile shape is active"))]
    MissingHardwareConstraint,

    /// Reduction whose trip count was not resolved upstream.
    #[snafu(display("reduction over {axis} has no statically known trip count"))]
    MissingTripCount { axis: Sym },

    /// Expression evaluation did not reduce to a single concrete value.
    #[snafu(display("expression did not reduce to one concrete value (stack depth {depth})"))]
    MalformedExpression { depth: usize },

    /// A node's lowered values were bound twice.
    #[snafu(display("node {node:?} is already bound to lowered values"))]
    NodeRebound { node: NodeId },

    /// Two reductions tried to bind the same axis symbol.
    #[snafu(display("induction variable for axis {axis} is already bound"))]
    InductionRebound { axis: Sym },

    /// Node with no lowered value that the reference hook could not resolve.
    #[snafu(display("no lowered value for node {node:?} and reference resolution failed"))]
    UnresolvedReference { node: NodeId },
}
