//! Memory-access synthesizer tests: mask construction, identity elision,
//! gather/scatter addressing.

use swale_ir::{
    Constraint, Graph, IndexAnnot, IndexMapping, Sym, SymExpr, SymbolContext, WorkgroupConstraint,
};

use swale_dtype::{AddrSpace, ScalarDType};

use crate::emitter::{Emitter, ParamBindings};
use crate::error::Error;
use crate::test::eval::Machine;
use crate::test::{func_with_globals, global_f32, shared_f32};
use crate::tir::{Func, Inst, Type};

fn it(i: usize) -> SymExpr {
    SymExpr::Sym(IndexMapping::iterator(i))
}

fn memory_insts(func: &Func) -> Vec<&Inst> {
    func.insts(func.entry())
        .filter(|i| {
            matches!(
                i,
                Inst::Load { .. }
                    | Inst::MaskedLoad { .. }
                    | Inst::Store { .. }
                    | Inst::MaskedStore { .. }
                    | Inst::Gather { .. }
                    | Inst::Scatter { .. }
            )
        })
        .collect()
}

/// A straight copy kernel (identity access, exactly tiled buffer) is one
/// vector load immediately followed by one vector store, with no mask and
/// no gather/scatter.
#[test]
fn copy_is_plain_load_then_store() {
    let m = Sym::intern("cp_m");
    let n = Sym::intern("cp_n");
    let mut symbols = SymbolContext::new();
    symbols.bind(m, 256);
    symbols.bind(n, 128);

    let mut graph = Graph::new();
    let src = global_f32(&mut graph, "src", &[m, n]);
    let dst = global_f32(&mut graph, "dst", &[m, n]);
    let annot = IndexAnnot::new()
        .with_dim(m, SymExpr::Sym(Sym::workgroup(0)), 1, 1)
        .with_dim(n, SymExpr::Sym(Sym::thread(0)) * SymExpr::Int(4), 4, 1);
    let value = graph.read(Graph::ROOT, src, 4, None, annot.clone());
    graph.write(Graph::ROOT, value, dst, 4, None, annot);
    graph.output(Graph::ROOT, []);

    let mut func = func_with_globals(2);
    let mut params = ParamBindings::new();
    params.bind(src, func.block_params(func.entry())[0]);
    params.bind(dst, func.block_params(func.entry())[1]);

    Emitter::new(&graph, &[], &symbols, &[], &mut func, &mut params).emit().unwrap();

    let mems = memory_insts(&func);
    assert_eq!(mems.len(), 2, "expected exactly load + store, got {mems:?}");
    assert!(matches!(mems[0], Inst::Load { .. }));
    assert!(matches!(mems[1], Inst::Store { .. }));
}

/// Emit a bounded 1-d read of `elements` lanes starting at `start` into a
/// buffer of extent `size` (tile 64 never divides it in these tests), and
/// return the evaluated mask lanes.
fn masked_read_lanes(start: i64, size: i64, elements: usize) -> Vec<bool> {
    let m = Sym::intern("mask_m");
    let mut symbols = SymbolContext::new();
    symbols.bind(m, size);
    let constraints = [Constraint::Workgroup(WorkgroupConstraint { dim: m, tile: SymExpr::Int(64), axis: 0 })];

    let mut graph = Graph::new();
    let src = global_f32(&mut graph, "src", &[m]);
    let annot = IndexAnnot::new().with_dim(m, SymExpr::Int(start), elements, 1);
    graph.read(Graph::ROOT, src, elements, None, annot);
    graph.output(Graph::ROOT, []);

    let mut func = func_with_globals(1);
    let mut params = ParamBindings::new();
    params.bind(src, func.block_params(func.entry())[0]);
    Emitter::new(&graph, &constraints, &symbols, &[], &mut func, &mut params).emit().unwrap();

    let mask = func
        .insts(func.entry())
        .find_map(|i| match i {
            Inst::MaskedLoad { mask, .. } => Some(*mask),
            _ => None,
        })
        .expect("bounded read must be masked");
    let mut machine = Machine::default();
    machine.run(&func, func.entry());
    machine.get(mask).as_vec_b()
}

#[test]
fn mask_is_all_false_at_the_extent() {
    assert_eq!(masked_read_lanes(100, 100, 4), vec![false; 4]);
}

#[test]
fn mask_is_all_true_for_a_full_leading_window() {
    assert_eq!(masked_read_lanes(0, 4, 4), vec![true; 4]);
}

#[test]
fn mask_is_lanewise_at_the_edge() {
    assert_eq!(masked_read_lanes(98, 100, 4), vec![true, true, false, false]);
}

/// An identity mapping must generate exactly the code an absent mapping
/// generates.
#[test]
fn identity_mapping_is_elided() {
    let m = Sym::intern("ide_m");
    let n = Sym::intern("ide_n");

    let build = |mapping: Option<IndexMapping>| {
        let mut symbols = SymbolContext::new();
        symbols.bind(m, 64);
        symbols.bind(n, 64);
        let mut graph = Graph::new();
        let src = global_f32(&mut graph, "src", &[m, n]);
        let annot = IndexAnnot::new()
            .with_dim(m, SymExpr::Int(0), 1, 1)
            .with_dim(n, SymExpr::Sym(Sym::thread(0)), 4, 1);
        graph.read(Graph::ROOT, src, 4, mapping, annot);
        graph.output(Graph::ROOT, []);

        let mut func = func_with_globals(1);
        let mut params = ParamBindings::new();
        params.bind(src, func.block_params(func.entry())[0]);
        Emitter::new(&graph, &[], &symbols, &[], &mut func, &mut params).emit().unwrap();
        func
    };

    let without = build(None);
    let identity = IndexMapping::new(2, [(m, it(0)), (n, it(1))], [(m, it(0)), (n, it(1))]);
    let with = build(Some(identity));

    let without_insts: Vec<_> = without.insts(without.entry()).collect();
    let with_insts: Vec<_> = with.insts(with.entry()).collect();
    assert_eq!(without_insts, with_insts);
}

/// Shared memory is exactly sized, so a bounded access still lowers to a
/// plain (unmasked) load.
#[test]
fn shared_memory_skips_the_mask() {
    let m = Sym::intern("shm_m");
    let mut symbols = SymbolContext::new();
    symbols.bind(m, 100);
    let constraints = [Constraint::Workgroup(WorkgroupConstraint { dim: m, tile: SymExpr::Int(64), axis: 0 })];

    let mut graph = Graph::new();
    let src = shared_f32(&mut graph, "tile", &[m]);
    let annot = IndexAnnot::new().with_dim(m, SymExpr::Int(0), 4, 1);
    graph.read(Graph::ROOT, src, 4, None, annot);
    graph.output(Graph::ROOT, []);

    let mut func = Func::new(&[Type::MemRef { elem: ScalarDType::Float32, space: AddrSpace::Shared }]);
    let mut params = ParamBindings::new();
    params.bind(src, func.block_params(func.entry())[0]);
    Emitter::new(&graph, &constraints, &symbols, &[], &mut func, &mut params).emit().unwrap();

    let mems = memory_insts(&func);
    assert_eq!(mems.len(), 1);
    assert!(matches!(mems[0], Inst::Load { .. }), "shared access must not be masked: {mems:?}");
}

/// Shared setup for the transpose tests: an (m=8, n=4) logical space.
fn transpose_setup() -> (Graph, SymbolContext, Sym, Sym) {
    let m = Sym::intern("tw_m");
    let n = Sym::intern("tw_n");
    let mut symbols = SymbolContext::new();
    symbols.bind(m, 8);
    symbols.bind(n, 4);
    (Graph::new(), symbols, m, n)
}

/// A register written through a coordinate-swap mapping must produce
/// scatter addressing, never a straight store.
#[test]
fn transpose_write_scatters() {
    let (mut graph, symbols, m, n) = transpose_setup();
    let src = global_f32(&mut graph, "src", &[m, n]);
    let dst = global_f32(&mut graph, "dst", &[n, m]);

    let annot = IndexAnnot::new()
        .with_dim(m, SymExpr::Int(0), 1, 1)
        .with_dim(n, SymExpr::Int(0), 2, 1);
    let value = graph.read(Graph::ROOT, src, 2, None, annot.clone());
    let swap = IndexMapping::new(2, [(m, it(0)), (n, it(1))], [(n, it(1)), (m, it(0))]);
    graph.write(Graph::ROOT, value, dst, 2, Some(swap), annot);
    graph.output(Graph::ROOT, []);

    let mut func = func_with_globals(2);
    let mut params = ParamBindings::new();
    params.bind(src, func.block_params(func.entry())[0]);
    params.bind(dst, func.block_params(func.entry())[1]);
    Emitter::new(&graph, &[], &symbols, &[], &mut func, &mut params).emit().unwrap();

    let mems = memory_insts(&func);
    assert!(mems.iter().any(|i| matches!(i, Inst::Scatter { .. })), "expected a scatter: {mems:?}");
    assert!(
        !mems.iter().any(|i| matches!(i, Inst::Store { .. } | Inst::MaskedStore { .. })),
        "transpose write must never be a straight store: {mems:?}"
    );
}

/// A single-element write under a non-identity mapping degrades to a masked
/// store at the mapped address.
#[test]
fn single_element_mapped_write_is_a_masked_store() {
    let (mut graph, symbols, m, n) = transpose_setup();
    let src = global_f32(&mut graph, "src", &[m, n]);
    let dst = global_f32(&mut graph, "dst", &[n, m]);

    let annot = IndexAnnot::new()
        .with_dim(m, SymExpr::Int(3), 1, 1)
        .with_dim(n, SymExpr::Int(1), 1, 1);
    let value = graph.read(Graph::ROOT, src, 1, None, annot.clone());
    let swap = IndexMapping::new(2, [(m, it(0)), (n, it(1))], [(n, it(1)), (m, it(0))]);
    graph.write(Graph::ROOT, value, dst, 1, Some(swap), annot);
    graph.output(Graph::ROOT, []);

    let mut func = func_with_globals(2);
    let mut params = ParamBindings::new();
    params.bind(src, func.block_params(func.entry())[0]);
    params.bind(dst, func.block_params(func.entry())[1]);
    Emitter::new(&graph, &[], &symbols, &[], &mut func, &mut params).emit().unwrap();

    let mems = memory_insts(&func);
    assert!(mems.iter().any(|i| matches!(i, Inst::MaskedStore { .. })));
    assert!(!mems.iter().any(|i| matches!(i, Inst::Scatter { .. })));
}

/// A read whose mapping is non-identity on the output side is unsupported,
/// as is a write whose mapping is non-identity on the input side.
#[test]
fn bidirectional_remap_is_rejected() {
    let m = Sym::intern("bi_m");
    let n = Sym::intern("bi_n");
    let mut symbols = SymbolContext::new();
    symbols.bind(m, 8);
    symbols.bind(n, 8);

    let mut graph = Graph::new();
    let src = global_f32(&mut graph, "src", &[m, n]);
    let annot = IndexAnnot::new()
        .with_dim(m, SymExpr::Int(0), 1, 1)
        .with_dim(n, SymExpr::Int(0), 2, 1);
    // Swapped on both sides: no identity side at all.
    let both = IndexMapping::new(2, [(n, it(1)), (m, it(0))], [(n, it(1)), (m, it(0))]);
    graph.read(Graph::ROOT, src, 2, Some(both), annot);
    graph.output(Graph::ROOT, []);

    let mut func = func_with_globals(1);
    let mut params = ParamBindings::new();
    params.bind(src, func.block_params(func.entry())[0]);
    let err = Emitter::new(&graph, &[], &symbols, &[], &mut func, &mut params).emit().unwrap_err();
    assert!(matches!(err, Error::UnsupportedMapping { .. }));
}

/// The constant-offset fast path and the general per-lane path must agree
/// on the addresses a scatter touches.
#[test]
fn fast_path_matches_general_path() {
    let build = |fast: bool| {
        let (mut graph, symbols, m, n) = transpose_setup();
        let src = global_f32(&mut graph, "src", &[m, n]);
        let dst = global_f32(&mut graph, "dst", &[n, m]);
        let annot = IndexAnnot::new()
            .with_dim(m, SymExpr::Int(0), 1, 1)
            .with_dim(n, SymExpr::Int(0), 2, 1);
        let value = graph.read(Graph::ROOT, src, 2, None, annot.clone());
        let swap = IndexMapping::new(2, [(m, it(0)), (n, it(1))], [(n, it(1)), (m, it(0))]);
        graph.write(Graph::ROOT, value, dst, 2, Some(swap), annot);
        graph.output(Graph::ROOT, []);

        let mut func = func_with_globals(2);
        let mut params = ParamBindings::new();
        params.bind(src, func.block_params(func.entry())[0]);
        params.bind(dst, func.block_params(func.entry())[1]);
        let mut emitter = Emitter::new(&graph, &[], &symbols, &[], &mut func, &mut params);
        emitter.constant_offset_fast_path = fast;
        emitter.emit().unwrap();

        let (starts, offsets) = func
            .insts(func.entry())
            .find_map(|i| match i {
                Inst::Scatter { indices, offsets, .. } => Some((indices.clone(), *offsets)),
                _ => None,
            })
            .expect("scatter expected");
        let mut machine = Machine::default();
        machine.run(&func, func.entry());
        let start_vals: Vec<i64> = starts.iter().map(|s| machine.get(*s).as_i()).collect();
        let offset_vals = machine.get(offsets).as_vec_i();
        (start_vals, offset_vals)
    };

    let (general_starts, general_offsets) = build(false);
    let (fast_starts, fast_offsets) = build(true);

    // Same effective lane addresses: start-linearized base + per-lane offset.
    // Both runs use zero/constant starts here, so compare directly.
    let linear = |starts: &[i64], offsets: &[i64]| -> Vec<i64> {
        // dst shape is (n, m) = (4, 8): row-major strides (8, 1)
        let base = starts[0] * 8 + starts[1];
        offsets.iter().map(|o| base + o).collect()
    };
    assert_eq!(linear(&general_starts, &general_offsets), linear(&fast_starts, &fast_offsets));
}
