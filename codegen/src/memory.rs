//! The memory-access synthesizer.
//!
//! Reads and writes either become contiguous vector accesses at lowered
//! start offsets, or, under a non-identity index mapping, explicit
//! gather/scatter with one linear offset per lane. Bounds masks guard every
//! dimension whose distributed tiles do not exactly cover it, except in
//! exactly-sized address spaces where out-of-bounds access cannot occur.

use smallvec::SmallVec;
use swale_dtype::{AddrSpace, ConstValue, DType};
use swale_ir::{
    IndexAnnot, IndexMapping, Node, NodeId, Sym, SymExpr, find_index_bounds, strides_from_symbolic_shape,
};

use crate::emitter::Emitter;
use crate::error::*;
use crate::tir::{Inst, Type, Value, const_index, const_scalar};

fn malformed(reason: &str) -> Error {
    Error::MalformedArguments { reason: reason.to_owned() }
}

#[derive(Clone, Copy, PartialEq)]
enum Direction {
    Read,
    Write,
}

/// Gather/scatter addressing: per-dimension reference starts, a per-lane
/// offset vector, and the bounds mask.
struct GatherAccess {
    starts: SmallVec<[Value; 4]>,
    offsets: Value,
    mask: Value,
}

/// Lower each dimension's start expression to an offset value.
fn build_start_indices(e: &mut Emitter, index: &IndexAnnot) -> Result<SmallVec<[Value; 4]>> {
    index.entries().iter().map(|(_, seq)| e.lower_expr(&seq.start)).collect()
}

/// Bounds mask over every bounded dimension of `index`:
/// `start + lane < extent` per lane, AND-folded across dimensions. `None`
/// when no dimension is bounded and the access needs no mask at all.
pub(crate) fn build_mask(e: &mut Emitter, index: &IndexAnnot, elements: usize) -> Result<Option<Value>> {
    let Some(bounds) = find_index_bounds(e.constraints, index, e.symbols) else {
        return Ok(None);
    };

    let mut starts: Vec<(Sym, SymExpr)> =
        index.entries().iter().map(|(dim, seq)| (*dim, seq.start.clone())).collect();
    if let Some(last) = starts.last_mut() {
        last.1 = last.1.clone() + SymExpr::Iota(elements);
    }

    let preds = bounds.iter().map(|dim| {
        let start =
            starts.iter().find(|(d, _)| d == dim).map(|(_, s)| s.clone()).expect("bounded dim missing from index");
        start.lt(SymExpr::Sym(*dim))
    });
    let mask_expr = SymExpr::and_all(preds);

    let mut mask = e.lower_expr(&mask_expr)?;
    if e.func.dtype(mask).map(DType::vcount) != Some(elements) {
        mask = e.splat(mask, elements);
    }
    Ok(Some(mask))
}

fn all_true_mask(e: &mut Emitter, lanes: usize) -> Value {
    e.func.push1(e.block, Inst::ConstMask { lanes, set: lanes }, Type::Data(DType::bool_().vec(lanes)))
}

/// `sum(coord * stride)` over all dimensions.
fn linear_offset(coords: &[SymExpr], strides: &[SymExpr]) -> SymExpr {
    let terms: Vec<SymExpr> = coords.iter().zip(strides).map(|(c, s)| c.clone() * s.clone()).collect();
    if terms.is_empty() { SymExpr::Int(0) } else { SymExpr::Add(terms) }
}

/// Reorder the mapping's expressions to `shape` order, requiring identity
/// on the side opposite the data-flow direction.
fn mapped_exprs(
    mapping: &IndexMapping,
    shape: &[Sym],
    dir: Direction,
) -> Result<SmallVec<[SymExpr; 4]>> {
    match dir {
        Direction::Read => {
            if !mapping.is_output_identity() {
                return UnsupportedMappingSnafu { reason: "non-identity output mapping on a read".to_owned() }.fail();
            }
            mapping.map_input_indices(shape)
        }
        Direction::Write => {
            if !mapping.is_input_identity() {
                return UnsupportedMappingSnafu { reason: "non-identity input mapping on a write".to_owned() }.fail();
            }
            mapping.map_output_indices(shape)
        }
    }
    .ok_or_else(|| Error::UnsupportedMapping { reason: "mapping does not cover every tensor dimension".to_owned() })
}

/// Fast path: when every lane's offset folds to a compile-time integer, the
/// offsets become one constant vector relative to the mapped start
/// coordinates. Returns `None` when any lane stays symbolic.
fn try_constant_offsets(
    e: &mut Emitter,
    mapped: &[SymExpr],
    iters: &[Sym],
    starts_orig: &[SymExpr],
    strides: &[SymExpr],
    index: &IndexAnnot,
    elements: usize,
) -> Result<Option<GatherAccess>> {
    let symbols = e.symbols;
    let resolve = symbols.resolver();

    let base_subs: Vec<(Sym, SymExpr)> = iters.iter().copied().zip(starts_orig.iter().cloned()).collect();
    let mapped_starts: Vec<SymExpr> = mapped.iter().map(|m| m.subs(&base_subs)).collect();
    let base_offset = linear_offset(&mapped_starts, strides);

    let mut lane_offsets: SmallVec<[i64; 8]> = SmallVec::new();
    for lane in 0..elements {
        let mut subs = base_subs.clone();
        let last = subs.last_mut().expect("mapping with no iterators");
        last.1 = starts_orig.last().expect("index with no dimensions").clone() + SymExpr::Int(lane as i64);
        let coords: Vec<SymExpr> = mapped.iter().map(|m| m.subs(&subs)).collect();
        let offset = linear_offset(&coords, strides) - base_offset.clone();
        match offset.as_const(&resolve) {
            Some(v) => lane_offsets.push(v),
            None => return Ok(None),
        }
    }

    let starts: SmallVec<[Value; 4]> =
        mapped_starts.iter().map(|s| e.lower_expr(s)).collect::<Result<_>>()?;
    let offsets =
        e.func.push1(e.block, Inst::ConstIndexVec { values: lane_offsets }, Type::Data(DType::index().vec(elements)));
    let mask = match build_mask(e, index, elements)? {
        Some(mask) => mask,
        None => all_true_mask(e, elements),
    };
    Ok(Some(GatherAccess { starts, offsets, mask }))
}

/// General path: all-zero reference starts and absolute per-lane offsets,
/// obtained by substituting `start + iota` for the most-minor iterator and
/// lowering the full linear-offset expression in one go.
fn gather_scatter_indices(
    e: &mut Emitter,
    shape: &[Sym],
    index: &IndexAnnot,
    mapping: &IndexMapping,
    elements: usize,
    dir: Direction,
) -> Result<GatherAccess> {
    let mapped = mapped_exprs(mapping, shape, dir)?;
    let iters = mapping.iterator_syms();
    let starts_orig = index.starts();
    if iters.len() != starts_orig.len() {
        return UnsupportedMappingSnafu { reason: "iterator count does not match the index rank".to_owned() }.fail();
    }
    let strides = strides_from_symbolic_shape(shape);

    if e.constant_offset_fast_path
        && let Some(access) = try_constant_offsets(e, &mapped, &iters, &starts_orig, &strides, index, elements)?
    {
        return Ok(access);
    }

    let mut subs: Vec<(Sym, SymExpr)> = iters.iter().copied().zip(starts_orig.iter().cloned()).collect();
    let last = subs.last_mut().expect("mapping with no iterators");
    last.1 = last.1.clone() + SymExpr::Iota(elements);

    let lane_coords: Vec<SymExpr> = mapped.iter().map(|m| m.subs(&subs)).collect();
    let offset_expr = linear_offset(&lane_coords, &strides);
    let mut offsets = e.lower_expr(&offset_expr)?;
    if e.func.dtype(offsets).map(DType::vcount) != Some(elements) {
        offsets = e.splat(offsets, elements);
    }

    let starts: SmallVec<[Value; 4]> = (0..shape.len()).map(|_| const_index(e.func, e.block, 0)).collect();
    let mask = match build_mask(e, index, elements)? {
        Some(mask) => mask,
        None => all_true_mask(e, elements),
    };
    Ok(GatherAccess { starts, offsets, mask })
}

pub(crate) fn handle_read(
    e: &mut Emitter,
    id: NodeId,
    node: &Node,
    memory: NodeId,
    mapping: Option<&IndexMapping>,
) -> Result<()> {
    let elements = node.elements.ok_or_else(|| malformed("read without an elements-per-lane attribute"))?;
    let index = node.index.as_ref().ok_or_else(|| malformed("read without a resolved index"))?;
    let mem_ty =
        e.graph.node(memory).memory_type().cloned().ok_or_else(|| malformed("read memory operand is not a memory"))?;
    let mem = e.lookup1(memory)?;
    let vec_dtype = DType::Scalar(mem_ty.elem).vec(elements);

    let identity =
        mapping.is_none_or(|m| m.is_identity() && m.input_dims().as_slice() == mem_ty.shape.as_slice());

    let result = if identity {
        let indices = build_start_indices(e, index)?;
        let mask = build_mask(e, index, elements)?;
        match mask {
            // Shared memory is exactly sized; the mask is dropped even when
            // one was computed.
            Some(mask) if mem_ty.space != AddrSpace::Shared => {
                let zero = const_scalar(e.func, e.block, ConstValue::zero(mem_ty.elem), DType::Scalar(mem_ty.elem));
                let passthru = e.splat(zero, elements);
                e.func.push1(e.block, Inst::MaskedLoad { mem, indices, mask, passthru }, Type::Data(vec_dtype))
            }
            _ => e.func.push1(e.block, Inst::Load { mem, indices }, Type::Data(vec_dtype)),
        }
    } else {
        let mapping = mapping.expect("non-identity branch always has a mapping");
        let access = gather_scatter_indices(e, &mem_ty.shape, index, mapping, elements, Direction::Read)?;
        let zero = const_scalar(e.func, e.block, ConstValue::zero(mem_ty.elem), DType::Scalar(mem_ty.elem));
        let passthru = e.splat(zero, elements);
        e.func.push1(
            e.block,
            Inst::Gather { mem, indices: access.starts, offsets: access.offsets, mask: access.mask, passthru },
            Type::Data(vec_dtype),
        )
    };
    e.bind1(id, result)
}

pub(crate) fn handle_write(
    e: &mut Emitter,
    node: &Node,
    register: NodeId,
    memory: NodeId,
    mapping: Option<&IndexMapping>,
) -> Result<()> {
    let elements = node.elements.ok_or_else(|| malformed("write without an elements-per-lane attribute"))?;
    let index = node.index.as_ref().ok_or_else(|| malformed("write without a resolved index"))?;
    let mem_ty =
        e.graph.node(memory).memory_type().cloned().ok_or_else(|| malformed("write memory operand is not a memory"))?;
    let mem = e.lookup1(memory)?;
    let value = e.lookup1(register)?;

    let value_dtype = e.func.dtype(value).cloned().ok_or_else(|| malformed("write source is not a data value"))?;
    if value_dtype.vcount() != elements {
        return MalformedArgumentsSnafu {
            reason: format!("write source has {} lanes, elements-per-lane is {elements}", value_dtype.vcount()),
        }
        .fail();
    }

    let register_dims: Option<SmallVec<[Sym; 4]>> =
        e.graph.node(register).index.as_ref().map(|a| a.dims().collect());
    let identity = mapping.is_none_or(|m| {
        m.is_identity()
            && register_dims.as_ref().is_none_or(|dims| m.input_dims() == *dims)
            && m.output_dims().as_slice() == mem_ty.shape.as_slice()
    });

    if identity {
        let indices = build_start_indices(e, index)?;
        let mask = build_mask(e, index, elements)?;
        match mask {
            Some(mask) if mem_ty.space != AddrSpace::Shared => {
                e.func.push0(e.block, Inst::MaskedStore { value, mem, indices, mask });
            }
            _ => e.func.push0(e.block, Inst::Store { value, mem, indices }),
        }
        return Ok(());
    }

    let mapping = mapping.expect("non-identity branch always has a mapping");
    if elements == 1 {
        // One address is involved; a masked store at the mapped start
        // coordinates replaces a degenerate scatter.
        let mapped = mapped_exprs(mapping, &mem_ty.shape, Direction::Write)?;
        let iters = mapping.iterator_syms();
        let starts_orig = index.starts();
        if iters.len() != starts_orig.len() {
            return UnsupportedMappingSnafu { reason: "iterator count does not match the index rank".to_owned() }
                .fail();
        }
        let subs: Vec<(Sym, SymExpr)> = iters.iter().copied().zip(starts_orig.iter().cloned()).collect();
        let indices: SmallVec<[Value; 4]> =
            mapped.iter().map(|m| e.lower_expr(&m.subs(&subs))).collect::<Result<_>>()?;
        let mask = match build_mask(e, index, 1)? {
            Some(mask) => mask,
            None => all_true_mask(e, 1),
        };
        e.func.push0(e.block, Inst::MaskedStore { value, mem, indices, mask });
    } else {
        let access = gather_scatter_indices(e, &mem_ty.shape, index, mapping, elements, Direction::Write)?;
        e.func.push0(
            e.block,
            Inst::Scatter { value, mem, indices: access.starts, offsets: access.offsets, mask: access.mask },
        );
    }
    Ok(())
}
