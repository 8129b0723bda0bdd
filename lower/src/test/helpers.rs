//! Test utilities for halo analysis tests.
//!
//! Builders for the small fusions the tests share, plus accessors that dig
//! loop nests and guards out of a lowered kernel.

use std::collections::HashMap;
use std::sync::Arc;

use halo_ir::{Expr, Fusion, IfThenElse, Instr, LoopHeader, Scope, TensorExpr, TensorId};

use crate::{ComputeAtMap, HaloConfig, HaloMap};

/// `T0 (input, [extent]) -> set -> T1 -> shift(offset, pad) -> T2 (output)`.
pub fn shift_chain(extent: i64, offset: i64, pad: bool) -> (Fusion, TensorId, TensorId) {
    let mut fusion = Fusion::new();
    let tv0 = fusion.add_input([extent]);
    let tv1 = fusion.set(tv0).unwrap();
    let tv2 = fusion.shift(tv1, &[offset], pad).unwrap();
    fusion.mark_output(tv2);
    (fusion, tv1, tv2)
}

/// `T0 (input, [extent]) -> set -> T1 -> gather(window, pad) -> T2 (output)`.
pub fn gather_chain(extent: i64, window: usize, pad: [usize; 2]) -> (Fusion, TensorId, TensorId) {
    let mut fusion = Fusion::new();
    let tv0 = fusion.add_input([extent]);
    let tv1 = fusion.set(tv0).unwrap();
    let tv2 = fusion.gather(tv1, &[window], &[pad]).unwrap();
    fusion.mark_output(tv2);
    (fusion, tv1, tv2)
}

/// `T0 (input, [8]) -> broadcast([true, false]) -> T1 [1, 8] -> shift(offsets) -> T2 (output)`.
pub fn broadcast_shift(offsets: [i64; 2]) -> (Fusion, TensorId, TensorId) {
    let mut fusion = Fusion::new();
    let tv0 = fusion.add_input([8]);
    let tv1 = fusion.broadcast(tv0, &[true, false]).unwrap();
    let tv2 = fusion.shift(tv1, &offsets, false).unwrap();
    fusion.mark_output(tv2);
    (fusion, tv1, tv2)
}

/// `T0 (input, [8, 1]) -> sum(axis 1) -> T1 -> shift(offset) -> T2 (output)`.
pub fn trivial_reduction_shift(offset: i64) -> (Fusion, TensorId, TensorId) {
    let mut fusion = Fusion::new();
    let tv0 = fusion.add_input([8, 1]);
    let tv1 = fusion.sum(tv0, &[1]).unwrap();
    let tv2 = fusion.shift(tv1, &[offset], false).unwrap();
    fusion.mark_output(tv2);
    (fusion, tv1, tv2)
}

/// Build the halo map with an empty compute-at map and default config.
pub fn analyse(fusion: &Fusion) -> (ComputeAtMap, HaloMap) {
    let loop_map = ComputeAtMap::new(fusion);
    let halo = HaloMap::build(fusion, &loop_map, &HaloConfig::default()).unwrap();
    (loop_map, halo)
}

/// Low and high width of a root axis as constants.
pub fn root_widths(fusion: &Fusion, halo: &HaloMap, tensor: TensorId, pos: usize) -> (Option<i64>, Option<i64>) {
    use crate::HaloSide;

    let axis = fusion.tensor(tensor).domain.root[pos];
    let info = halo.root_axis_info(fusion, axis).unwrap();
    (info.width(HaloSide::Low).as_int(), info.width(HaloSide::High).as_int())
}

/// Descend the loop nest at `pos` of `scope` to its first non-loop instruction.
pub fn loop_nest(scope: &Scope, pos: usize) -> (Vec<LoopHeader>, &Instr) {
    let mut loops = Vec::new();
    let mut instr = scope.get(pos).expect("no instruction at position");
    while let Instr::For(for_loop) = instr {
        loops.push(for_loop.header.clone());
        instr = for_loop.body.get(0).expect("empty loop body");
    }
    (loops, instr)
}

pub fn as_tensor(instr: &Instr) -> &TensorExpr {
    match instr {
        Instr::Tensor(expr) => expr,
        other => panic!("expected tensor expression, got {other:?}"),
    }
}

pub fn as_if(instr: &Instr) -> &IfThenElse {
    match instr {
        Instr::If(ite) => ite,
        other => panic!("expected conditional, got {other:?}"),
    }
}

fn env(bindings: &[(&str, i64)]) -> HashMap<String, i64> {
    bindings.iter().map(|(k, v)| (k.to_string(), *v)).collect()
}

/// Evaluate a boolean expression with integer bindings.
pub fn eval_bool(expr: &Arc<Expr>, bindings: &[(&str, i64)]) -> Option<bool> {
    expr.eval(&env(bindings)).and_then(|v| v.as_bool())
}

pub fn eval_int(expr: &Arc<Expr>, bindings: &[(&str, i64)]) -> Option<i64> {
    expr.eval(&env(bindings)).and_then(|v| v.as_int())
}

/// Loop index variable name of the loop over `axis`.
pub fn index_var(header: &LoopHeader) -> String {
    header.index.to_string()
}
