//! Parallelization checks for halo-extended axes.

use snafu::ensure;
use tracing::trace;

use halo_ir::{AxisId, Fusion, MemoryType, OpKind, ParallelType, TensorId};

use crate::error::*;
use crate::halo_map::HaloMap;
use crate::loop_map::LoopMap;

impl HaloMap {
    /// Check every leaf axis of `tensor`.
    ///
    /// Each axis must have the same extended extent as its concrete axis. A
    /// halo-extended axis bound to a thread dimension requires shared memory
    /// once a consumer needs values computed by other threads; block
    /// parallelization of such an axis is rejected.
    pub fn validate(&self, fusion: &Fusion, loop_map: &impl LoopMap, tensor: TensorId) -> Result<()> {
        let memory = fusion.tensor(tensor).memory;

        for &axis in &fusion.tensor(tensor).domain.leaf {
            let concrete = loop_map.concrete(axis);
            ensure!(
                self.extent_equal(fusion, loop_map, axis, concrete)?,
                ExtentMismatchSnafu { tensor, axis, concrete }
            );

            if self.extent(axis).is_none() {
                continue;
            }
            let ptype = loop_map.parallel_type(axis);
            if ptype == ParallelType::Serial {
                continue;
            }
            ensure!(ptype.is_thread(), UnsupportedParallelTypeSnafu { tensor, axis, ptype });

            if !self.needs_shared_visibility(fusion, loop_map, tensor, axis)? {
                continue;
            }
            trace!(%tensor, %axis, %ptype, "halo axis needs shared visibility");

            if ptype.is_thread_dim() {
                ensure!(
                    memory == MemoryType::Shared,
                    SharedMemoryRequiredSnafu { tensor, axis, ptype, memory }
                );
            } else if ptype.is_block_dim() {
                return BlockParallelHaloSnafu { tensor, axis, ptype }.fail();
            } else {
                return UnsupportedParallelTypeSnafu { tensor, axis, ptype }.fail();
            }
        }
        Ok(())
    }

    /// Some use of `tensor` reads values of `axis` owned by other threads.
    fn needs_shared_visibility(
        &self,
        fusion: &Fusion,
        loop_map: &impl LoopMap,
        tensor: TensorId,
        axis: AxisId,
    ) -> Result<bool> {
        for &use_op in &fusion.tensor(tensor).uses {
            let op = fusion.op(use_op);
            if matches!(op.kind, OpKind::Shift(_) | OpKind::Gather(_)) {
                return Ok(true);
            }
            if !self.covers(op.output) {
                continue;
            }
            let consumer_leaf = &fusion.tensor(op.output).domain.leaf;
            let Some(&consumer_axis) = consumer_leaf.iter().find(|c| loop_map.are_mapped(axis, **c)) else {
                continue;
            };
            if !self.extent_equal(fusion, loop_map, axis, consumer_axis)? {
                return Ok(true);
            }
        }
        Ok(false)
    }
}
