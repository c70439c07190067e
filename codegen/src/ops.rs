//! Vector/scalar operation lowering with element-type dispatch.
//!
//! Floating-point operands route to the float instruction family; integers
//! route to the signed or unsigned variant where the target distinguishes
//! them (division, maximum). Unary negate/exp2 exist only for floats.

use smallvec::SmallVec;
use swale_dtype::{ConstValue, DType, ScalarDType};
use swale_ir::{BinaryOp, Node, NodeId, Operand, UnaryOp};

use crate::emitter::Emitter;
use crate::error::*;
use crate::tir::{Inst, Type, VecBinOp, VecUnOp, Value, const_scalar};

pub(crate) fn handle_register(e: &mut Emitter, id: NodeId, node: &Node, value: ConstValue) -> Result<()> {
    let index = node
        .index
        .as_ref()
        .ok_or_else(|| Error::MalformedArguments { reason: "register without a resolved index".to_owned() })?;
    let lanes = index.max_lane_size();
    let base = node
        .value_dtype()
        .map(DType::base)
        .ok_or_else(|| Error::MalformedArguments { reason: "register without a value type".to_owned() })?;
    let dtype = DType::Scalar(base).vec(lanes);
    let v = e.func.push1(e.block, Inst::SplatConst { value, dtype: dtype.clone() }, Type::Data(dtype));
    e.bind1(id, v)
}

pub(crate) fn handle_allocate(e: &mut Emitter, id: NodeId, node: &Node, shape: &SmallVec<[i64; 4]>) -> Result<()> {
    let mem_ty = node
        .memory_type()
        .ok_or_else(|| Error::MalformedArguments { reason: "allocate without a memory type".to_owned() })?;
    let v = e.func.push1(
        e.block,
        Inst::Alloc { shape: shape.clone(), elem: mem_ty.elem, space: mem_ty.space },
        Type::MemRef { elem: mem_ty.elem, space: mem_ty.space },
    );
    e.bind1(id, v)
}

pub(crate) fn handle_binary(e: &mut Emitter, id: NodeId, op: BinaryOp, lhs: NodeId, rhs: NodeId) -> Result<()> {
    let lv = e.lookup1(lhs)?;
    let rv = e.lookup1(rhs)?;
    let lt = e.func.dtype(lv).cloned().ok_or_else(|| Error::MalformedArguments {
        reason: "binary operand is not a data value".to_owned(),
    })?;
    let rt = e.func.dtype(rv).cloned().ok_or_else(|| Error::MalformedArguments {
        reason: "binary operand is not a data value".to_owned(),
    })?;
    if lt != rt {
        return TypeMismatchSnafu { lhs: lt, rhs: rt }.fail();
    }

    let base = lt.base();
    let vec_op = select_binary(op, base)
        .ok_or_else(|| Error::UnsupportedType { op: op_name(op), dtype: lt.clone() })?;
    let v = e.func.push1(e.block, Inst::Binary { op: vec_op, lhs: lv, rhs: rv }, Type::Data(lt));
    e.bind1(id, v)
}

fn op_name(op: BinaryOp) -> &'static str {
    match op {
        BinaryOp::Add => "add",
        BinaryOp::Sub => "sub",
        BinaryOp::Mul => "mul",
        BinaryOp::Div => "div",
        BinaryOp::Max => "max",
    }
}

fn select_binary(op: BinaryOp, base: ScalarDType) -> Option<VecBinOp> {
    let float = base.is_float();
    let int = base.is_int();
    let unsigned = base.is_unsigned();
    match op {
        BinaryOp::Add if float => Some(VecBinOp::AddF),
        BinaryOp::Add if int => Some(VecBinOp::AddI),
        BinaryOp::Sub if float => Some(VecBinOp::SubF),
        BinaryOp::Sub if int => Some(VecBinOp::SubI),
        BinaryOp::Mul if float => Some(VecBinOp::MulF),
        BinaryOp::Mul if int => Some(VecBinOp::MulI),
        BinaryOp::Div if float => Some(VecBinOp::DivF),
        BinaryOp::Div if unsigned => Some(VecBinOp::DivU),
        BinaryOp::Div if int => Some(VecBinOp::DivS),
        BinaryOp::Max if float => Some(VecBinOp::MaxF),
        BinaryOp::Max if unsigned => Some(VecBinOp::MaxU),
        BinaryOp::Max if int => Some(VecBinOp::MaxS),
        _ => None,
    }
}

pub(crate) fn handle_unary(e: &mut Emitter, id: NodeId, op: UnaryOp, src: NodeId) -> Result<()> {
    let sv = e.lookup1(src)?;
    let dtype = e.func.dtype(sv).cloned().ok_or_else(|| Error::MalformedArguments {
        reason: "unary operand is not a data value".to_owned(),
    })?;
    if !dtype.is_float() {
        let name = match op {
            UnaryOp::Neg => "neg",
            UnaryOp::Exp2 => "exp2",
        };
        return UnsupportedTypeSnafu { op: name, dtype }.fail();
    }
    let vec_op = match op {
        UnaryOp::Neg => VecUnOp::NegF,
        UnaryOp::Exp2 => VecUnOp::Exp2,
    };
    let v = e.func.push1(e.block, Inst::Unary { op: vec_op, operand: sv }, Type::Data(dtype));
    e.bind1(id, v)
}

pub(crate) fn handle_mma(e: &mut Emitter, id: NodeId, lhs: NodeId, rhs: NodeId, acc: NodeId) -> Result<()> {
    let lv = e.lookup1(lhs)?;
    let rv = e.lookup1(rhs)?;
    let av = e.lookup1(acc)?;

    let (m, n, k) = e
        .constraints
        .iter()
        .find_map(|c| c.as_hardware())
        .and_then(|hw| hw.mma)
        .map(|kind| kind.shape())
        .ok_or(Error::MissingHardwareConstraint)?;

    let acc_ty = e.func.ty(av).clone();
    let v = e.func.push1(e.block, Inst::Mma { m, n, k, lhs: lv, rhs: rv, acc: av }, acc_ty);
    e.bind1(id, v)
}

/// Shuffle lowering: scalarize, widen to 32 bits if narrower, xor-shuffle,
/// narrow back, re-broadcast to the original vector shape.
pub(crate) fn handle_shuffle(
    e: &mut Emitter,
    id: NodeId,
    src: NodeId,
    offset: Operand,
    width: Operand,
) -> Result<()> {
    let (Operand::Lit(offset), Operand::Lit(width)) = (offset, width) else {
        return UnsupportedDynamicParameterSnafu.fail();
    };

    let sv = e.lookup1(src)?;
    let src_dtype = e.func.dtype(sv).cloned().ok_or_else(|| Error::MalformedArguments {
        reason: "shuffle operand is not a data value".to_owned(),
    })?;
    let base = src_dtype.base();
    if src_dtype.vcount() != 1 || !base.is_float() || base.bits() > 32 {
        return UnsupportedShuffleShapeSnafu { dtype: src_dtype }.fail();
    }

    let element = if src_dtype.is_vector() {
        e.func.push1(e.block, Inst::Extract { vector: sv, lane: 0 }, Type::Data(DType::Scalar(base)))
    } else {
        sv
    };

    let padded = if base.bits() < 32 {
        e.func.push1(e.block, Inst::ExtF { value: element }, Type::Data(DType::float32()))
    } else {
        element
    };

    let offset_v = const_scalar(e.func, e.block, ConstValue::Int(offset), DType::int32());
    let width_v = const_scalar(e.func, e.block, ConstValue::Int(width), DType::int32());
    let shuffled = e.func.push1(
        e.block,
        Inst::ShuffleXor { value: padded, offset: offset_v, width: width_v },
        Type::Data(if base.bits() < 32 { DType::float32() } else { DType::Scalar(base) }),
    );

    let narrowed = if base.bits() < 32 {
        e.func.push1(e.block, Inst::TruncF { value: shuffled }, Type::Data(DType::Scalar(base)))
    } else {
        shuffled
    };

    let result = if src_dtype.is_vector() {
        e.func.push1(e.block, Inst::Splat { value: narrowed, lanes: 1 }, Type::Data(src_dtype))
    } else {
        narrowed
    };
    e.bind1(id, result)
}

pub(crate) fn handle_broadcast(e: &mut Emitter, id: NodeId, src: NodeId, lanes: usize) -> Result<()> {
    let sv = e.lookup1(src)?;
    let src_dtype = e.func.dtype(sv).cloned().ok_or_else(|| Error::MalformedArguments {
        reason: "broadcast operand is not a data value".to_owned(),
    })?;
    if src_dtype.vcount() != 1 {
        return MalformedArgumentsSnafu {
            reason: format!("broadcast source must be a unit vector, got {src_dtype}"),
        }
        .fail();
    }

    let element = if src_dtype.is_vector() {
        e.func.push1(e.block, Inst::Extract { vector: sv, lane: 0 }, Type::Data(src_dtype.scalar_dtype()))
    } else {
        sv
    };
    let result = if lanes == 1 { element } else { e.splat(element, lanes) };
    e.bind1(id, result)
}

pub(crate) fn handle_extract_slice(
    e: &mut Emitter,
    id: NodeId,
    src: NodeId,
    offset: usize,
    size: usize,
    stride: usize,
) -> Result<()> {
    let sv = e.lookup1(src)?;
    let src_dtype = e.func.dtype(sv).cloned().ok_or_else(|| Error::MalformedArguments {
        reason: "extract_slice operand is not a data value".to_owned(),
    })?;
    if size == 0 || offset + (size - 1) * stride >= src_dtype.vcount() {
        return MalformedArgumentsSnafu { reason: format!("slice [{offset}; {size}; {stride}] exceeds {src_dtype}") }
            .fail();
    }
    let result_ty = DType::Scalar(src_dtype.base()).vec(size);
    let v = e.func.push1(
        e.block,
        Inst::ExtractSlice { vector: sv, offset, size, stride },
        Type::Data(result_ty),
    );
    e.bind1(id, v)
}
