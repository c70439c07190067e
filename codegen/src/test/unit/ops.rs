//! Element-type dispatch, MMA and shuffle lowering tests.

use swale_dtype::{AddrSpace, ConstValue, ScalarDType};
use swale_ir::{
    BinaryOp, Constraint, Graph, HardwareConstraint, IndexAnnot, MemoryType, MmaKind, NodeId, Operand, Sym,
    SymExpr, SymbolContext, UnaryOp,
};
use test_case::test_case;

use crate::emitter::{Emitter, ParamBindings};
use crate::error::Error;
use crate::tir::{Func, Inst, VecBinOp};

fn lane_annot(elem_count: usize) -> IndexAnnot {
    IndexAnnot::new().with_dim(Sym::intern("op_lane"), SymExpr::Int(0), elem_count, 1)
}

/// Emit a graph with no buffers and return the finished function body.
fn emit(graph: &Graph, constraints: &[Constraint]) -> Result<Func, Error> {
    let symbols = SymbolContext::new();
    let mut func = Func::new(&[]);
    let mut params = ParamBindings::new();
    Emitter::new(graph, constraints, &symbols, &[], &mut func, &mut params).emit()?;
    Ok(func)
}

fn reg(graph: &mut Graph, value: ConstValue, elem: ScalarDType, lanes: usize) -> NodeId {
    graph.register(Graph::ROOT, value, elem, lane_annot(lanes))
}

#[test_case(ScalarDType::Float32, BinaryOp::Add, VecBinOp::AddF)]
#[test_case(ScalarDType::Int32, BinaryOp::Add, VecBinOp::AddI)]
#[test_case(ScalarDType::Float32, BinaryOp::Div, VecBinOp::DivF)]
#[test_case(ScalarDType::Int32, BinaryOp::Div, VecBinOp::DivS)]
#[test_case(ScalarDType::UInt32, BinaryOp::Div, VecBinOp::DivU)]
#[test_case(ScalarDType::Float32, BinaryOp::Max, VecBinOp::MaxF)]
#[test_case(ScalarDType::Int32, BinaryOp::Max, VecBinOp::MaxS)]
#[test_case(ScalarDType::UInt32, BinaryOp::Max, VecBinOp::MaxU)]
fn binary_dispatch(elem: ScalarDType, op: BinaryOp, expected: VecBinOp) {
    let value = if elem.is_float() { ConstValue::Float(1.0) } else { ConstValue::Int(1) };
    let mut graph = Graph::new();
    let a = reg(&mut graph, value, elem, 4);
    let b = reg(&mut graph, value, elem, 4);
    graph.binary(Graph::ROOT, op, a, b);
    graph.output(Graph::ROOT, []);

    let func = emit(&graph, &[]).unwrap();
    assert!(func.insts(func.entry()).any(|i| matches!(i, Inst::Binary { op, .. } if *op == expected)));
}

#[test]
fn binary_operand_types_must_agree() {
    let mut graph = Graph::new();
    let a = reg(&mut graph, ConstValue::Float(1.0), ScalarDType::Float32, 4);
    let b = reg(&mut graph, ConstValue::Int(1), ScalarDType::Int32, 4);
    graph.binary(Graph::ROOT, BinaryOp::Add, a, b);
    graph.output(Graph::ROOT, []);

    assert!(matches!(emit(&graph, &[]), Err(Error::TypeMismatch { .. })));
}

#[test_case(UnaryOp::Neg)]
#[test_case(UnaryOp::Exp2)]
fn unary_is_float_only(op: UnaryOp) {
    let mut graph = Graph::new();
    let a = reg(&mut graph, ConstValue::Int(1), ScalarDType::Int32, 4);
    graph.unary(Graph::ROOT, op, a);
    graph.output(Graph::ROOT, []);

    assert!(matches!(emit(&graph, &[]), Err(Error::UnsupportedType { .. })));
}

fn mma_graph() -> Graph {
    let mut graph = Graph::new();
    let a = reg(&mut graph, ConstValue::Float(1.0), ScalarDType::Float16, 4);
    let b = reg(&mut graph, ConstValue::Float(1.0), ScalarDType::Float16, 4);
    let acc = reg(&mut graph, ConstValue::Float(0.0), ScalarDType::Float32, 4);
    graph.mma(Graph::ROOT, a, b, acc);
    graph.output(Graph::ROOT, []);
    graph
}

#[test]
fn mma_takes_its_tile_from_the_hardware_constraint() {
    let constraints = [Constraint::Hardware(HardwareConstraint {
        threads_per_wave: 64,
        waves_per_block: [2, 2, 1],
        mma: Some(MmaKind::F32_16x16x16_F16),
    })];
    let func = emit(&mma_graph(), &constraints).unwrap();
    assert!(
        func.insts(func.entry())
            .any(|i| matches!(i, Inst::Mma { m: 16, n: 16, k: 16, .. }))
    );
}

#[test]
fn mma_without_hardware_constraint_fails() {
    assert!(matches!(emit(&mma_graph(), &[]), Err(Error::MissingHardwareConstraint)));

    // A hardware constraint without a tile shape is just as missing.
    let constraints = [Constraint::Hardware(HardwareConstraint {
        threads_per_wave: 64,
        waves_per_block: [1, 1, 1],
        mma: None,
    })];
    assert!(matches!(emit(&mma_graph(), &constraints), Err(Error::MissingHardwareConstraint)));
}

/// Shuffling a half-width float (offset 16, width 32) widens the value to
/// 32 bits, xor-shuffles, and narrows back.
#[test]
fn shuffle_pads_narrow_floats() {
    let mut graph = Graph::new();
    let src = reg(&mut graph, ConstValue::Float(1.0), ScalarDType::Float16, 1);
    graph.shuffle(Graph::ROOT, src, Operand::Lit(16), Operand::Lit(32));
    graph.output(Graph::ROOT, []);

    let func = emit(&graph, &[]).unwrap();
    let order: Vec<&Inst> = func
        .insts(func.entry())
        .filter(|i| matches!(i, Inst::ExtF { .. } | Inst::ShuffleXor { .. } | Inst::TruncF { .. }))
        .collect();
    assert!(matches!(order.as_slice(), [Inst::ExtF { .. }, Inst::ShuffleXor { .. }, Inst::TruncF { .. }]));

    // The lane offset rides in as a 32-bit constant 16.
    let offset = func
        .insts(func.entry())
        .find_map(|i| match i {
            Inst::ShuffleXor { offset, .. } => Some(*offset),
            _ => None,
        })
        .unwrap();
    let mut machine = crate::test::eval::Machine::default();
    machine.run(&func, func.entry());
    assert_eq!(machine.get(offset).as_i(), 16);
}

#[test]
fn shuffle_of_full_width_floats_needs_no_padding() {
    let mut graph = Graph::new();
    let src = reg(&mut graph, ConstValue::Float(1.0), ScalarDType::Float32, 1);
    graph.shuffle(Graph::ROOT, src, Operand::Lit(1), Operand::Lit(64));
    graph.output(Graph::ROOT, []);

    let func = emit(&graph, &[]).unwrap();
    assert!(!func.insts(func.entry()).any(|i| matches!(i, Inst::ExtF { .. } | Inst::TruncF { .. })));
    assert!(func.insts(func.entry()).any(|i| matches!(i, Inst::ShuffleXor { .. })));
}

#[test_case(ScalarDType::Float64, 1; "too wide")]
#[test_case(ScalarDType::Float16, 4; "not a unit vector")]
#[test_case(ScalarDType::Int32, 1; "not a float")]
fn shuffle_shape_restrictions(elem: ScalarDType, lanes: usize) {
    let value = if elem.is_float() { ConstValue::Float(1.0) } else { ConstValue::Int(1) };
    let mut graph = Graph::new();
    let src = reg(&mut graph, value, elem, lanes);
    graph.shuffle(Graph::ROOT, src, Operand::Lit(16), Operand::Lit(32));
    graph.output(Graph::ROOT, []);

    assert!(matches!(emit(&graph, &[]), Err(Error::UnsupportedShuffleShape { .. })));
}

#[test]
fn shuffle_parameters_must_be_literal() {
    let mut graph = Graph::new();
    let src = reg(&mut graph, ConstValue::Float(1.0), ScalarDType::Float16, 1);
    let offset = reg(&mut graph, ConstValue::Int(16), ScalarDType::Int32, 1);
    graph.shuffle(Graph::ROOT, src, Operand::Node(offset), Operand::Lit(32));
    graph.output(Graph::ROOT, []);

    assert!(matches!(emit(&graph, &[]), Err(Error::UnsupportedDynamicParameter)));
}

#[test]
fn register_splats_to_its_annotation_width() {
    let mut graph = Graph::new();
    reg(&mut graph, ConstValue::Float(2.5), ScalarDType::Float32, 4);
    graph.output(Graph::ROOT, []);

    let func = emit(&graph, &[]).unwrap();
    assert!(
        func.insts(func.entry())
            .any(|i| matches!(i, Inst::SplatConst { dtype, .. } if dtype.vcount() == 4))
    );
}

#[test]
fn broadcast_replicates_a_unit_vector() {
    let mut graph = Graph::new();
    let src = reg(&mut graph, ConstValue::Float(1.5), ScalarDType::Float32, 1);
    graph.broadcast(Graph::ROOT, src, 8);
    graph.output(Graph::ROOT, []);

    let func = emit(&graph, &[]).unwrap();
    assert!(func.insts(func.entry()).any(|i| matches!(i, Inst::Splat { lanes: 8, .. })));
}

#[test]
fn broadcast_of_a_wide_vector_is_malformed() {
    let mut graph = Graph::new();
    let src = reg(&mut graph, ConstValue::Float(1.5), ScalarDType::Float32, 4);
    graph.broadcast(Graph::ROOT, src, 8);
    graph.output(Graph::ROOT, []);

    assert!(matches!(emit(&graph, &[]), Err(Error::MalformedArguments { .. })));
}

#[test]
fn extract_slice_lowers_and_checks_bounds() {
    let mut graph = Graph::new();
    let src = reg(&mut graph, ConstValue::Float(1.0), ScalarDType::Float32, 8);
    graph.extract_slice(Graph::ROOT, src, 2, 2, 2);
    graph.output(Graph::ROOT, []);
    let func = emit(&graph, &[]).unwrap();
    assert!(
        func.insts(func.entry())
            .any(|i| matches!(i, Inst::ExtractSlice { offset: 2, size: 2, stride: 2, .. }))
    );

    let mut graph = Graph::new();
    let src = reg(&mut graph, ConstValue::Float(1.0), ScalarDType::Float32, 4);
    graph.extract_slice(Graph::ROOT, src, 2, 4, 1);
    graph.output(Graph::ROOT, []);
    assert!(matches!(emit(&graph, &[]), Err(Error::MalformedArguments { .. })));
}

#[test]
fn allocate_and_barrier_lower_in_place() {
    let tile = Sym::intern("op_tile");
    let mut graph = Graph::new();
    graph.allocate(
        Graph::ROOT,
        [32, 32],
        MemoryType::new([tile, tile], ScalarDType::Float32, AddrSpace::Shared),
    );
    graph.barrier(Graph::ROOT);
    graph.output(Graph::ROOT, []);

    let func = emit(&graph, &[]).unwrap();
    assert!(
        func.insts(func.entry())
            .any(|i| matches!(i, Inst::Alloc { space: AddrSpace::Shared, .. }))
    );
    assert!(func.insts(func.entry()).any(|i| matches!(i, Inst::Barrier)));
}
