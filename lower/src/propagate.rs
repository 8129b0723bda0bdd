//! Halo propagation.
//!
//! Root-axis widths flow backward from consumers to producers, then each
//! tensor's widths flow forward through its own split / merge transforms.

use snafu::{OptionExt, ensure};
use tracing::{debug, trace};

use halo_ir::{AxisTransform, Expr, Fusion, FusionOp, TensorId, WindowOp};

use crate::axis_halo::{AxisHaloWidth, HaloSide};
use crate::config::HaloConfig;
use crate::error::*;
use crate::halo_map::HaloMap;
use crate::loop_map::LoopMap;

impl HaloMap {
    /// Run the full analysis over `fusion`.
    ///
    /// Phases are strictly ordered: every root width is final before any
    /// tensor domain is built, and every domain is built before validation.
    #[tracing::instrument(skip_all)]
    pub fn build(fusion: &Fusion, loop_map: &impl LoopMap, config: &HaloConfig) -> Result<Self> {
        let mut map = HaloMap::default();
        let tensors = fusion.used_tensors();

        for &tv in &tensors {
            let domain = &fusion.tensor(tv).domain;
            for &axis in &domain.root {
                map.set_root_axis_info(fusion, axis, AxisHaloWidth::default())?;
            }
            // Reductions and rfactor are not analysed; the entries only make lookups succeed.
            for &axis in domain.rfactor.iter().flatten() {
                map.set_root_axis_info(fusion, axis, AxisHaloWidth::default())?;
            }
            map.domains.insert(tv, domain.root.clone());
        }

        let ops: Vec<&FusionOp> = fusion.ops().iter().rev().filter(|op| map.covers(op.output)).collect();
        for op in ops {
            for &producer in &op.inputs {
                map.propagate_root_axis_info(fusion, op, producer)?;
            }
        }
        debug!(num_tensors = tensors.len(), "root axis halo propagated");

        for &tv in &tensors {
            map.build_domain(fusion, tv)?;
        }
        debug!(num_extended = map.extents.len(), "leaf extents propagated");

        if config.validate_parallelization {
            for &tv in &tensors {
                map.validate(fusion, loop_map, tv)?;
            }
        }
        if config.dump_halo_map {
            debug!(halo_map = %map, "halo map built");
        }
        Ok(map)
    }

    /// Backward step over one producer/consumer edge of `op`.
    fn propagate_root_axis_info(&mut self, fusion: &Fusion, op: &FusionOp, producer: TensorId) -> Result<()> {
        if fusion.tensor(producer).is_input {
            return Ok(());
        }
        let consumer = op.output;
        let c2p = fusion.root_map(producer, consumer)?;
        let window = op.kind.window();

        for (i, &c_id) in fusion.tensor(consumer).domain.root.iter().enumerate() {
            let Some(&p_id) = c2p.get(&c_id) else { continue };
            let c_info = self.root_axis_info(fusion, c_id)?.clone();
            let mut p_info = self.root_axis_info(fusion, p_id)?.clone();

            if fusion.axis(c_id).is_broadcast() {
                ensure!(
                    !c_info.has_halo(),
                    BroadcastWithHaloSnafu { axis: c_id, consumer, width: c_info.to_string() }
                );
                p_info.merge(&c_info);
                self.set_root_axis_info(fusion, p_id, p_info)?;
                continue;
            }

            match window {
                WindowOp::Shift(shift) => {
                    let offset = shift.offset(i);
                    if offset == 0 {
                        p_info.merge(&c_info);
                    } else {
                        let side = if offset > 0 { HaloSide::Low } else { HaloSide::High };
                        p_info.merge_side(side, &c_info.width(side).add_int(offset.abs()));
                    }
                }
                WindowOp::Gather(gather) if gather.is_windowed(i) => {
                    let pad_left = gather.pad_left(i) as i64;
                    let window = gather.window(i).unwrap_or(1) as i64;
                    p_info.merge_side(HaloSide::Low, &c_info.width(HaloSide::Low).add_int(pad_left));
                    p_info.merge_side(HaloSide::High, &c_info.width(HaloSide::High).add_int(window - pad_left - 1));
                }
                WindowOp::Gather(_) | WindowOp::Other => p_info.merge(&c_info),
            }

            trace!(producer = %p_id, consumer = %c_id, op = op.kind.name(), halo = %p_info, "propagated edge");
            self.set_root_axis_info(fusion, p_id, p_info)?;
        }
        Ok(())
    }

    /// Forward step: push root widths through the transforms of `tensor`.
    fn build_domain(&mut self, fusion: &Fusion, tensor: TensorId) -> Result<()> {
        let domain = &fusion.tensor(tensor).domain;

        for &root in &domain.root {
            let info = self.root_axis_info(fusion, root)?;
            let width = info.total();
            let extended = info.has_halo().then(|| fusion.axis(root).extent.add_expr(&width));
            ensure!(!self.widths.contains_key(&root), DuplicateHaloWidthSnafu { axis: root });
            if let Some(extent) = extended {
                self.extents.insert(root, extent);
                self.widths.insert(root, width);
            } else {
                self.widths.insert(root, Expr::zero());
            }
        }

        for &tf in &domain.transforms {
            match fusion.transform(tf) {
                AxisTransform::Split { input, outer, inner, .. } => {
                    ensure!(!self.is_halo_merge(*input), SplitOfHaloMergeSnafu { tensor, axis: *input });
                    let width = self.widths.get(input).cloned().context(MissingHaloWidthSnafu { axis: *input })?;
                    if width.is_zero() {
                        self.widths.insert(*outer, width.clone());
                        self.widths.insert(*inner, width);
                        continue;
                    }
                    let extent = fusion.axis(*inner).extent.add_expr(&width);
                    self.extents.insert(*inner, extent);
                    self.widths.insert(*outer, Expr::zero());
                    self.widths.insert(*inner, width);
                }
                AxisTransform::Merge { outer, inner, out } => {
                    let (outer_ext, inner_ext) = (self.extent(*outer).cloned(), self.extent(*inner).cloned());
                    if outer_ext.is_none() && inner_ext.is_none() {
                        self.widths.insert(*out, Expr::zero());
                        continue;
                    }
                    let outer_ext = outer_ext.unwrap_or_else(|| fusion.axis(*outer).extent.clone());
                    let inner_ext = inner_ext.unwrap_or_else(|| fusion.axis(*inner).extent.clone());
                    self.extents.insert(*out, outer_ext.mul_expr(&inner_ext));
                    self.merged_halo.insert(*out);
                }
                transform @ AxisTransform::Swizzle { .. } => {
                    return UnsupportedTransformSnafu { transform: transform.name(), tensor }.fail();
                }
            }
        }
        Ok(())
    }
}
