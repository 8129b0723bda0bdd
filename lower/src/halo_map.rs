//! Halo tables of one compilation unit.
//!
//! One [`HaloMap`] holds every table the analysis produces, keyed by [`AxisId`]:
//!
//! - root-axis halo widths (one [`AxisHaloWidth`] per root / rfactor axis),
//! - halo-extended extents, present only for axes that carry halo,
//! - combined scalar halo widths, used by the extent comparator,
//! - the set of merge outputs built from halo-extended axes.
//!
//! Logical axes and their lowered counterparts ([`KernelAxis`](halo_ir::KernelAxis))
//! resolve to the same `AxisId`, so a single entry serves both.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

use itertools::Itertools;
use snafu::{OptionExt, ensure};

use halo_ir::{AxisId, AxisRef, Expr, Fusion, Kernel, OpId, OpKind, TensorId};

use crate::axis_halo::AxisHaloWidth;
use crate::error::*;

#[derive(Debug, Clone, Default)]
pub struct HaloMap {
    pub(crate) root: HashMap<AxisId, AxisHaloWidth>,
    pub(crate) extents: HashMap<AxisId, Arc<Expr>>,
    pub(crate) widths: HashMap<AxisId, Arc<Expr>>,
    pub(crate) merged_halo: HashSet<AxisId>,
    /// Root axes per analysed tensor, for dumps and use scans.
    pub(crate) domains: BTreeMap<TensorId, Vec<AxisId>>,
}

impl HaloMap {
    /// Halo widths of a root or rfactor axis.
    pub fn root_axis_info(&self, fusion: &Fusion, axis: impl AxisRef) -> Result<&AxisHaloWidth> {
        let axis = axis.axis_id();
        ensure!(fusion.is_root_like(axis), NotRootAxisSnafu { axis });
        self.root.get(&axis).context(MissingRootAxisInfoSnafu { axis })
    }

    pub fn set_root_axis_info(&mut self, fusion: &Fusion, axis: impl AxisRef, info: AxisHaloWidth) -> Result<()> {
        let axis = axis.axis_id();
        ensure!(fusion.is_root_like(axis), NotRootAxisSnafu { axis });
        self.root.insert(axis, info);
        Ok(())
    }

    /// Halo-extended extent, `None` when the axis carries no halo.
    pub fn extent(&self, axis: impl AxisRef) -> Option<&Arc<Expr>> {
        self.extents.get(&axis.axis_id())
    }

    /// Extent to allocate and iterate over: extended if the axis carries halo.
    pub fn allocation_extent(&self, fusion: &Fusion, axis: impl AxisRef) -> Arc<Expr> {
        let axis = axis.axis_id();
        self.extents.get(&axis).cloned().unwrap_or_else(|| fusion.axis(axis).extent.clone())
    }

    /// Combined low + high width.
    ///
    /// Absent for merge outputs of halo-extended axes.
    pub fn halo_width(&self, axis: impl AxisRef) -> Result<&Arc<Expr>> {
        let axis = axis.axis_id();
        self.widths.get(&axis).context(MissingHaloWidthSnafu { axis })
    }

    pub fn has_halo_width(&self, axis: impl AxisRef) -> bool {
        self.widths.contains_key(&axis.axis_id())
    }

    /// Output of a merge with a halo-extended input.
    pub fn is_halo_merge(&self, axis: impl AxisRef) -> bool {
        self.merged_halo.contains(&axis.axis_id())
    }

    /// Tensors covered by this map.
    pub fn tensors(&self) -> impl Iterator<Item = TensorId> + '_ {
        self.domains.keys().copied()
    }

    pub fn covers(&self, tensor: TensorId) -> bool {
        self.domains.contains_key(&tensor)
    }

    /// Lower `fusion` with every loop running over [`Self::allocation_extent`].
    pub fn lower_kernel(&self, fusion: &Fusion) -> Kernel {
        Kernel::from_fusion_with_extents(fusion, |axis| self.allocation_extent(fusion, axis))
    }

    /// Whether the tensor expression defined by `op` must be guarded.
    ///
    /// True if any output root axis carries halo, or is a shifted (non-zero
    /// offset) or windowed (window wider than one) non-broadcast axis.
    pub fn needs_shift_predicate(&self, fusion: &Fusion, op: OpId) -> Result<bool> {
        let op = fusion.op(op);
        let root = &fusion.tensor(op.output).domain.root;
        for (i, &axis) in root.iter().enumerate() {
            if self.root_axis_info(fusion, axis)?.has_halo() {
                return Ok(true);
            }
            let relocated = match &op.kind {
                OpKind::Shift(shift) => shift.offset(i) != 0,
                OpKind::Gather(gather) => gather.is_windowed(i),
                _ => false,
            };
            if relocated && !fusion.axis(axis).is_broadcast() {
                return Ok(true);
            }
        }
        Ok(false)
    }
}

impl fmt::Display for HaloMap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Halo map:")?;
        for (tensor, root) in &self.domains {
            let entries = root
                .iter()
                .map(|axis| match self.root.get(axis) {
                    Some(info) => format!("{axis} -> {info}"),
                    None => format!("{axis} -> ?"),
                })
                .join(", ");
            writeln!(f, "{tensor} root domain: {entries}")?;
        }
        Ok(())
    }
}
