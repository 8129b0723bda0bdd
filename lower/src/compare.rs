//! Extent comparison of loop-mapped axes.
//!
//! Loop-mapped axes iterate the same logical range, so their extended extents
//! can only differ by halo. Comparing extents therefore reduces to comparing
//! scalar halo widths, or to comparing merge operands pairwise when the axes
//! are merge outputs of halo-extended axes.
//!
//! Both relations are sound but incomplete: `false` means "not proven".

use std::collections::HashMap;
use std::sync::Arc;

use snafu::ensure;

use halo_ir::{AxisId, AxisTransform, Expr, ExprOp, Fusion};

use crate::error::*;
use crate::halo_map::HaloMap;
use crate::loop_map::LoopMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Relation {
    LessEqual,
    Equal,
}

impl HaloMap {
    /// Prove `extent(lhs) <= extent(rhs)`.
    pub fn extent_less_equal(&self, fusion: &Fusion, loop_map: &impl LoopMap, lhs: AxisId, rhs: AxisId) -> Result<bool> {
        self.extent_compare(fusion, loop_map, lhs, rhs, Relation::LessEqual, &mut ExprEquality::default())
    }

    /// Prove `extent(lhs) == extent(rhs)`.
    pub fn extent_equal(&self, fusion: &Fusion, loop_map: &impl LoopMap, lhs: AxisId, rhs: AxisId) -> Result<bool> {
        self.extent_compare(fusion, loop_map, lhs, rhs, Relation::Equal, &mut ExprEquality::default())
    }

    fn extent_compare(
        &self,
        fusion: &Fusion,
        loop_map: &impl LoopMap,
        lhs: AxisId,
        rhs: AxisId,
        relation: Relation,
        eq: &mut ExprEquality,
    ) -> Result<bool> {
        ensure!(loop_map.are_mapped(lhs, rhs), AxesNotMappedSnafu { lhs, rhs });

        match (self.widths.get(&lhs), self.widths.get(&rhs)) {
            (Some(a), Some(b)) => Ok(match relation {
                Relation::LessEqual => less_equal(a, b),
                Relation::Equal => eq.equal(a, b),
            }),
            (None, None) => {
                let (Some((lo, li)), Some((ro, ri))) = (merge_operands(fusion, lhs), merge_operands(fusion, rhs))
                else {
                    return InvalidComparisonSnafu { lhs, rhs, reason: "axes without halo width must be merge outputs" }
                        .fail();
                };
                let inner = self.extent_compare(fusion, loop_map, li, ri, relation, eq)?;
                let outer = self.extent_compare(fusion, loop_map, lo, ro, relation, eq)?;
                Ok(inner && outer)
            }
            _ => InvalidComparisonSnafu { lhs, rhs, reason: "only one axis has a halo width" }.fail(),
        }
    }
}

fn merge_operands(fusion: &Fusion, axis: AxisId) -> Option<(AxisId, AxisId)> {
    let tf = fusion.axis(axis).definition?;
    match fusion.transform(tf) {
        AxisTransform::Merge { outer, inner, .. } => Some((*outer, *inner)),
        _ => None,
    }
}

/// `a <= b`, proven by identity, constants, or folding.
pub fn less_equal(a: &Arc<Expr>, b: &Arc<Expr>) -> bool {
    if a.same_as(b) {
        return true;
    }
    if let (Some(x), Some(y)) = (a.as_int(), b.as_int()) {
        return x <= y;
    }
    a.le_expr(b).as_bool() == Some(true)
}

/// Structural equality of expression graphs, memoized by node pair.
#[derive(Debug, Default)]
pub struct ExprEquality {
    memo: HashMap<(u64, u64), bool>,
}

impl ExprEquality {
    pub fn equal(&mut self, a: &Arc<Expr>, b: &Arc<Expr>) -> bool {
        if a.same_as(b) {
            return true;
        }
        if let Some(&known) = self.memo.get(&(a.id, b.id)) {
            return known;
        }

        let result = match (a.op(), b.op()) {
            (ExprOp::Const(x), ExprOp::Const(y)) => x == y,
            (ExprOp::Var(x), ExprOp::Var(y)) => x == y,
            (ExprOp::Binary(op_a, la, ra), ExprOp::Binary(op_b, lb, rb)) => {
                op_a == op_b && self.equal(la, lb) && self.equal(ra, rb)
            }
            _ => false,
        };
        self.memo.insert((a.id, b.id), result);
        result
    }
}
