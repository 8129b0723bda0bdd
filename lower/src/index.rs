//! Root-axis indices for predication.

use std::collections::HashMap;
use std::sync::Arc;

use snafu::{OptionExt, ensure};

use halo_ir::{AxisId, AxisTransform, Expr, Fusion, LoopHeader, TensorId};

use crate::error::*;
use crate::loop_map::LoopMap;

/// Consumer root indices of one access.
#[derive(Debug, Clone)]
pub struct RootPredIndices {
    /// One index per root axis, in root order.
    pub indices: Vec<Arc<Expr>>,
    /// The access initializes a reduction buffer: reduction loops are not open.
    pub buffer_init: bool,
}

/// Index computation consumed by the predicate synthesizer.
pub trait IndexCompute {
    /// Indices of the root axes of `consumer` inside `loops`.
    ///
    /// `contiguity` has one flag per root axis; a set flag would allow
    /// contiguous axes to share one index.
    fn consumer_root_pred_indices(
        &self,
        fusion: &Fusion,
        consumer: TensorId,
        loops: &[LoopHeader],
        contiguity: &[bool],
    ) -> Result<RootPredIndices>;
}

/// Derives root indices from the enclosing loop nest.
///
/// Each leaf axis takes the index of the loop over it (or over a loop-mapped
/// axis). Transforms are then inverted from leaf to root: a split input gets
/// `outer * factor + inner`, merge operands get `out / inner_extent` and
/// `out % inner_extent`. Leaf axes without a loop are indexed at zero.
#[derive(Debug, Clone, Copy)]
pub struct LoopNestIndexing<'a, M: LoopMap> {
    loop_map: &'a M,
}

impl<'a, M: LoopMap> LoopNestIndexing<'a, M> {
    pub fn new(loop_map: &'a M) -> Self {
        Self { loop_map }
    }

    fn leaf_index(&self, axis: AxisId, loops: &[LoopHeader]) -> Option<Arc<Expr>> {
        loops
            .iter()
            .rev()
            .find(|l| l.axis == axis || self.loop_map.are_mapped(l.axis, axis))
            .map(|l| l.index.clone())
    }
}

impl<M: LoopMap> IndexCompute for LoopNestIndexing<'_, M> {
    fn consumer_root_pred_indices(
        &self,
        fusion: &Fusion,
        consumer: TensorId,
        loops: &[LoopHeader],
        contiguity: &[bool],
    ) -> Result<RootPredIndices> {
        let domain = &fusion.tensor(consumer).domain;
        ensure!(
            contiguity.len() == domain.root.len(),
            IndexCountMismatchSnafu { tensor: consumer, expected: domain.root.len(), actual: contiguity.len() }
        );
        ensure!(!contiguity.iter().any(|c| *c), ContiguousIndexingSnafu { tensor: consumer });

        let mut index: HashMap<AxisId, Arc<Expr>> = HashMap::new();
        let mut buffer_init = false;
        for &leaf in &domain.leaf {
            let idx = match self.leaf_index(leaf, loops) {
                Some(idx) => idx,
                None => {
                    buffer_init |= fusion.axis(leaf).is_reduction();
                    Expr::zero()
                }
            };
            index.insert(leaf, idx);
        }

        let lookup = |index: &HashMap<AxisId, Arc<Expr>>, axis: AxisId| {
            index.get(&axis).cloned().context(MissingLeafIndexSnafu { tensor: consumer, axis })
        };
        for &tf in domain.transforms.iter().rev() {
            match fusion.transform(tf) {
                AxisTransform::Split { input, outer, inner, factor } => {
                    let idx = lookup(&index, *outer)?.mul_expr(factor).add_expr(&lookup(&index, *inner)?);
                    index.insert(*input, idx);
                }
                AxisTransform::Merge { outer, inner, out } => {
                    let out_idx = lookup(&index, *out)?;
                    let inner_extent = &fusion.axis(*inner).extent;
                    index.insert(*outer, out_idx.div_expr(inner_extent));
                    index.insert(*inner, out_idx.mod_expr(inner_extent));
                }
                transform @ AxisTransform::Swizzle { .. } => {
                    return UnsupportedTransformSnafu { transform: transform.name(), tensor: consumer }.fail();
                }
            }
        }

        let indices = domain.root.iter().map(|&axis| lookup(&index, axis)).collect::<Result<Vec<_>>>()?;
        Ok(RootPredIndices { indices, buffer_init })
    }
}
