//! Shift and padding predicates.
//!
//! A guarded tensor expression is rewritten into
//!
//! ```text
//! if (shift_pred) {
//!   out = f(in);
//! } else {
//!   if (padding_pred) {
//!     out = pad_value;
//!   }
//! }
//! ```
//!
//! The padding branch is omitted when its predicate folds to false. Expressions
//! containing a block barrier keep their position and get the shift predicate
//! attached directly, without padding.

use std::sync::Arc;

use snafu::{OptionExt, ensure};
use tracing::{debug, trace};

use halo_ir::{
    Expr, Fusion, GatherSpec, IfThenElse, Instr, Kernel, LoopHeader, MemoryType, Predicate, PredicateKind, Scope,
    ShiftSpec, TensorExpr, WindowOp, error::UndefinedTensorSnafu,
};

use crate::axis_halo::HaloSide;
use crate::config::HaloConfig;
use crate::error::*;
use crate::halo_map::HaloMap;
use crate::index::IndexCompute;

pub struct ShiftPredicateInserter<'a, I: IndexCompute> {
    fusion: &'a Fusion,
    halo: &'a HaloMap,
    index: &'a I,
    config: &'a HaloConfig,
}

impl<'a, I: IndexCompute> ShiftPredicateInserter<'a, I> {
    pub fn new(fusion: &'a Fusion, halo: &'a HaloMap, index: &'a I, config: &'a HaloConfig) -> Self {
        Self { fusion, halo, index, config }
    }

    /// Whether `expr` must be guarded.
    ///
    /// Fill expressions and expressions writing tensors outside the halo map
    /// (dead branches) never are.
    pub fn needs_guard(&self, expr: &TensorExpr) -> Result<bool> {
        if !self.halo.covers(expr.output) {
            return Ok(false);
        }
        match expr.op() {
            Some(op) => self.halo.needs_shift_predicate(self.fusion, op),
            None => Ok(false),
        }
    }

    /// Build the predicate of `kind` for `expr` inside `loops`.
    pub fn predicate(
        &self,
        expr: &TensorExpr,
        loops: &[LoopHeader],
        thread_pred: &Arc<Expr>,
        kind: PredicateKind,
    ) -> Result<Arc<Expr>> {
        let fusion = self.fusion;
        let out = fusion.tensor(expr.output);
        let op_id = expr.op().or(out.definition).context(UndefinedTensorSnafu { tensor: expr.output })?;
        ensure!(self.halo.needs_shift_predicate(fusion, op_id)?, PredicateNotNeededSnafu { tensor: expr.output });

        let window = fusion.op(op_id).kind.window();
        if kind == PredicateKind::Padding && !window.pads() {
            return Ok(Expr::bool(false));
        }

        let root = &out.domain.root;
        let contiguity = vec![false; root.len()];
        let pred_indices = self.index.consumer_root_pred_indices(fusion, expr.output, loops, &contiguity)?;
        let indices = &pred_indices.indices;
        let buffer_init = pred_indices.buffer_init;

        if out.memory == MemoryType::Local && buffer_init {
            return Ok(merge_thread_predicate(Expr::bool(true), thread_pred));
        }
        ensure!(
            indices.len() == root.len(),
            IndexCountMismatchSnafu { tensor: expr.output, expected: root.len(), actual: indices.len() }
        );

        let mut pred = Expr::bool(true);
        for (i, &root_id) in root.iter().enumerate() {
            let axis = fusion.axis(root_id);
            if axis.is_broadcast() || (buffer_init && axis.is_reduction()) || axis.is_trivial_reduction() {
                continue;
            }
            let info = self.halo.root_axis_info(fusion, root_id)?;
            let lowered = fusion.lower_axis(root_id);
            let consumer_index = &indices[i];

            if kind == PredicateKind::Padding {
                let padding_max = lowered.extent.add_expr(&info.total());
                pred = pred.and_expr(&consumer_index.lt_expr(&padding_max));
                continue;
            }

            // Consumer layout along the axis: [low halo][start, stop)[high halo].
            let low = info.width(HaloSide::Low);
            let left_limit = low.add_expr(&lowered.start);
            let right_limit = lowered.stop.add_expr(low);

            let producer_index = match window {
                WindowOp::Shift(shift) => shift_producer_index(i, consumer_index, shift),
                WindowOp::Gather(gather) => gather_producer_index(i, consumer_index, gather, indices).context(
                    IndexCountMismatchSnafu {
                        tensor: expr.output,
                        expected: gather.gather_axis(i) + 1,
                        actual: indices.len(),
                    },
                )?,
                WindowOp::Other => consumer_index.clone(),
            };

            match window {
                WindowOp::Shift(shift) if shift.offset(i) > 0 => {
                    let index = if shift.pad { &producer_index } else { consumer_index };
                    pred = pred.and_expr(&index.ge_expr(&left_limit));
                }
                WindowOp::Gather(_) => {
                    pred = pred.and_expr(&consumer_index.ge_expr(&left_limit));
                    if !producer_index.same_as(consumer_index) {
                        pred = pred.and_expr(&producer_index.ge_expr(&left_limit));
                    }
                }
                _ if !left_limit.is_zero() => pred = pred.and_expr(&consumer_index.ge_expr(&left_limit)),
                _ => {}
            }

            match window {
                WindowOp::Shift(shift) if shift.offset(i) < 0 => {
                    let index = if shift.pad { &producer_index } else { consumer_index };
                    pred = pred.and_expr(&index.lt_expr(&right_limit));
                }
                WindowOp::Gather(_) => {
                    pred = pred.and_expr(&consumer_index.lt_expr(&right_limit));
                    if !producer_index.same_as(consumer_index) {
                        pred = pred.and_expr(&producer_index.lt_expr(&right_limit));
                    }
                }
                _ => pred = pred.and_expr(&consumer_index.lt_expr(&right_limit)),
            }
        }

        let pred = merge_thread_predicate(pred, thread_pred);
        trace!(tensor = %expr.output, %kind, predicate = %pred, "synthesized predicate");
        Ok(pred)
    }

    /// Guard the tensor expression at `pos` of `scope`.
    ///
    /// Returns `false` when no guard is needed and the scope is left untouched.
    pub fn insert(&self, scope: &mut Scope, pos: usize, loops: &[LoopHeader], thread_pred: &Arc<Expr>) -> Result<bool> {
        let Some(Instr::Tensor(expr)) = scope.get(pos) else {
            return NotATensorExprSnafu { pos }.fail();
        };
        if !self.needs_guard(expr)? {
            return Ok(false);
        }

        let shift_pred = Predicate::new(
            PredicateKind::Shift,
            self.predicate(expr, loops, thread_pred, PredicateKind::Shift)?,
        );

        if expr.block_sync {
            if let Some(Instr::Tensor(expr)) = scope.get_mut(pos) {
                expr.predicate = Some(shift_pred);
            }
            return Ok(true);
        }

        let padding_pred = self.predicate(expr, loops, thread_pred, PredicateKind::Padding)?;
        let output = expr.output;

        let mut shift_ite = IfThenElse::new(shift_pred);
        if padding_pred.as_bool() != Some(false) {
            let mut bounds_ite = IfThenElse::new(Predicate::new(PredicateKind::Padding, padding_pred));
            bounds_ite.then_body.push(Instr::Tensor(TensorExpr::fill(output, Expr::int(self.config.pad_value))));
            shift_ite.else_body.push(Instr::If(bounds_ite));
        }

        scope.rewrite_at(pos, move |instr| {
            shift_ite.then_body.push(instr);
            Instr::If(shift_ite)
        });
        Ok(true)
    }

    /// Guard every tensor expression of `kernel` that needs it.
    ///
    /// `thread_pred` supplies the thread participation predicate of each
    /// expression. Returns the number of guarded expressions.
    #[tracing::instrument(skip_all)]
    pub fn insert_shift_predicates(
        &self,
        kernel: &mut Kernel,
        thread_pred: impl Fn(&TensorExpr) -> Arc<Expr>,
    ) -> Result<usize> {
        let mut loops = Vec::new();
        let mut guarded = 0;
        self.guard_scope(&mut kernel.body, &mut loops, &thread_pred, &mut guarded)?;
        debug!(guarded, "shift predicates inserted");
        Ok(guarded)
    }

    fn guard_scope(
        &self,
        scope: &mut Scope,
        loops: &mut Vec<LoopHeader>,
        thread_pred: &impl Fn(&TensorExpr) -> Arc<Expr>,
        guarded: &mut usize,
    ) -> Result<()> {
        for pos in 0..scope.len() {
            if let Some(Instr::Tensor(expr)) = scope.get(pos) {
                let pred = thread_pred(expr);
                if self.insert(scope, pos, loops, &pred)? {
                    *guarded += 1;
                }
                continue;
            }
            match scope.get_mut(pos) {
                Some(Instr::For(for_loop)) => {
                    loops.push(for_loop.header.clone());
                    self.guard_scope(&mut for_loop.body, loops, thread_pred, guarded)?;
                    loops.pop();
                }
                Some(Instr::If(ite)) => {
                    self.guard_scope(&mut ite.then_body, loops, thread_pred, guarded)?;
                    self.guard_scope(&mut ite.else_body, loops, thread_pred, guarded)?;
                }
                Some(Instr::Tensor(_)) | None => {}
            }
        }
        Ok(())
    }
}

/// Conjoin `pred` with the thread participation predicate.
pub fn merge_thread_predicate(pred: Arc<Expr>, thread_pred: &Arc<Expr>) -> Arc<Expr> {
    match thread_pred.as_bool() {
        Some(false) => Expr::bool(false),
        Some(true) => pred,
        None => pred.and_expr(thread_pred),
    }
}

/// Producer index of a shift along consumer root axis `dim`.
pub fn shift_producer_index(dim: usize, consumer_index: &Arc<Expr>, shift: &ShiftSpec) -> Arc<Expr> {
    match shift.offset(dim) {
        0 => consumer_index.clone(),
        offset => consumer_index.sub_int(offset),
    }
}

/// Producer index of a gather along consumer root axis `dim`.
///
/// Adds the window position and removes the left padding. Window axes and
/// unit windows read the consumer index unchanged. `None` if `indices` lacks
/// the window axis.
pub fn gather_producer_index(
    dim: usize,
    consumer_index: &Arc<Expr>,
    gather: &GatherSpec,
    indices: &[Arc<Expr>],
) -> Option<Arc<Expr>> {
    if dim >= gather.rank() || !gather.is_windowed(dim) {
        return Some(consumer_index.clone());
    }
    let window_index = indices.get(gather.gather_axis(dim))?;
    Some(consumer_index.add_expr(window_index).sub_int(gather.pad_left(dim) as i64))
}
