//! Control-flow lowering for bounded reduction loops.
//!
//! A reduction becomes one counted loop with its initial values as carried
//! state. The body region is lowered by recursing into the dispatch engine
//! with the insertion point moved inside the loop; carried placeholders map
//! to the loop's block parameters and captured placeholders alias values
//! already lowered outside. The loop's results become the reduction node's
//! values, selected individually by `GetResult`.

use itertools::Itertools;
use smallvec::SmallVec;
use swale_ir::{Node, NodeId, Op, RegionId};

use crate::emitter::Emitter;
use crate::error::*;
use crate::tir::{Inst, Type, Value, const_index};

pub(crate) fn handle_reduction(e: &mut Emitter, id: NodeId, node: &Node) -> Result<()> {
    let Op::Reduction { axis, init, body, captures, trip_count } = &node.op else {
        unreachable!("handle_reduction on a non-reduction node");
    };
    let trip_count = (*trip_count).ok_or(Error::MissingTripCount { axis: *axis })?;

    // Initial carried values, flattened across the init operands.
    let init_values: SmallVec<[Value; 2]> =
        init.iter().map(|&n| e.lookup(n)).flatten_ok().collect::<Result<_>>()?;
    let carried_types: Vec<Type> = init_values.iter().map(|v| e.func.ty(*v).clone()).collect();

    let lower = const_index(e.func, e.block, 0);
    let upper = const_index(e.func, e.block, trip_count as i64);
    // Trip counts are pre-divided by the tile size upstream, so the step is
    // always 1.
    let step = const_index(e.func, e.block, 1);

    let mut body_params = vec![Type::index()];
    body_params.extend(carried_types.iter().cloned());
    let body_block = e.func.add_block(&body_params);

    let induction_value = e.func.block_params(body_block)[0];
    e.bind_induction(*axis, induction_value)?;

    bind_body_placeholders(e, *body, body_block, init_values.len(), captures)?;

    tracing::debug!(axis = %axis, trip_count, carried = init_values.len(), "lowering reduction body");
    let parent = e.block;
    e.block = body_block;
    let outputs = e.visit(*body)?;

    let yields: SmallVec<[Value; 2]> =
        outputs.iter().map(|&n| e.lookup(n)).flatten_ok().collect::<Result<_>>()?;
    if yields.len() != init_values.len() {
        return MalformedArgumentsSnafu {
            reason: format!("reduction body yields {} values, carries {}", yields.len(), init_values.len()),
        }
        .fail();
    }
    e.func.push0(body_block, Inst::Yield { values: yields });
    e.block = parent;

    let results = e.func.push(
        parent,
        Inst::For { lower, upper, step, init: init_values, body: body_block },
        &carried_types,
    );
    e.bind(id, results)
}

/// Bind the body's `IterArg` placeholders to the loop's carried block
/// parameters and alias each `Captured` placeholder to the already-lowered
/// value of the capture at its slot.
fn bind_body_placeholders(
    e: &mut Emitter,
    body: RegionId,
    body_block: crate::tir::BlockId,
    carried: usize,
    captures: &SmallVec<[NodeId; 2]>,
) -> Result<()> {
    let graph = e.graph;
    for &n in graph.region_nodes(body) {
        match &graph.node(n).op {
            Op::IterArg { slot } => {
                if *slot >= carried {
                    return MalformedArgumentsSnafu {
                        reason: format!("iter arg slot {slot} exceeds {carried} carried values"),
                    }
                    .fail();
                }
                let param = e.func.block_params(body_block)[1 + slot];
                e.bind1(n, param)?;
            }
            Op::Captured { slot } => {
                let &root = captures.get(*slot).ok_or_else(|| Error::MalformedArguments {
                    reason: format!("capture slot {slot} exceeds {} captures", captures.len()),
                })?;
                let values = e.lookup(root)?;
                e.bind(n, values)?;
            }
            _ => {}
        }
    }
    Ok(())
}

pub(crate) fn handle_get_result(e: &mut Emitter, id: NodeId, src: NodeId, index: usize) -> Result<()> {
    let values = e.lookup(src)?;
    let &value = values.get(index).ok_or_else(|| Error::MalformedArguments {
        reason: format!("result index {index} exceeds {} results", values.len()),
    })?;
    e.bind1(id, value)
}
