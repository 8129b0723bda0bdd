//! Tensor operation graph.
//!
//! A [`Fusion`] owns every axis, axis transform, tensor and operation of one
//! compilation unit in flat arenas. Handles ([`AxisId`], [`TransformId`],
//! [`TensorId`], [`OpId`]) are plain indices, so analyses key their tables by them
//! directly. Operations are appended in topological order: an operation can only
//! consume tensors created before it.
//!
//! # Domains
//!
//! Each tensor has a root domain (the axes produced by its defining operation)
//! and a leaf domain obtained by applying split / merge / swizzle transforms.
//! Transforms are recorded per tensor in application order, which is also a
//! topological order of the axis expressions.

use std::collections::HashMap;
use std::sync::Arc;

use smallvec::SmallVec;
use snafu::{OptionExt, ensure};

use crate::error::*;
use crate::expr::{Expr, IntoExpr};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, derive_more::Display)]
#[display("iS{_0}")]
pub struct AxisId(pub usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, derive_more::Display)]
#[display("tf{_0}")]
pub struct TransformId(pub usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, derive_more::Display)]
#[display("T{_0}")]
pub struct TensorId(pub usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, derive_more::Display)]
#[display("op{_0}")]
pub struct OpId(pub usize);

/// Iteration semantics of an axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AxisKind {
    Iteration,
    /// Size-1 axis that is implicitly expanded by consumers.
    Broadcast,
    Reduction,
}

/// Parallel dimension an axis is bound to.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, strum::Display, strum::EnumIter)]
pub enum ParallelType {
    #[default]
    Serial,
    #[strum(serialize = "BIDx")]
    BlockX,
    #[strum(serialize = "BIDy")]
    BlockY,
    #[strum(serialize = "BIDz")]
    BlockZ,
    #[strum(serialize = "TIDx")]
    ThreadX,
    #[strum(serialize = "TIDy")]
    ThreadY,
    #[strum(serialize = "TIDz")]
    ThreadZ,
    /// Lane within a warp.
    Warp,
    /// Block index within a thread-block cluster.
    Cluster,
    Vectorize,
    Unroll,
    Unswitch,
}

impl ParallelType {
    /// Bound to a hardware thread or block index.
    pub const fn is_thread(&self) -> bool {
        self.is_thread_dim() || self.is_block_dim() || matches!(self, Self::Cluster)
    }

    /// Thread or warp-lane index within a block.
    pub const fn is_thread_dim(&self) -> bool {
        matches!(self, Self::ThreadX | Self::ThreadY | Self::ThreadZ | Self::Warp)
    }

    /// Block index within the grid.
    pub const fn is_block_dim(&self) -> bool {
        matches!(self, Self::BlockX | Self::BlockY | Self::BlockZ)
    }
}

/// Memory space a tensor is allocated in.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, strum::Display)]
pub enum MemoryType {
    #[default]
    Global,
    /// Block-shared memory.
    Shared,
    /// Thread-local registers or scratch.
    Local,
}

/// Axis record.
///
/// `start` and `stop` bound the valid index range within `[0, extent)`. A shift
/// without padding narrows that range on the side the data is shifted in from.
#[derive(Debug, Clone)]
pub struct Axis {
    pub id: AxisId,
    pub extent: Arc<Expr>,
    pub start: Arc<Expr>,
    pub stop: Arc<Expr>,
    pub kind: AxisKind,
    pub parallel: ParallelType,
    /// Transform that produced this axis; `None` for root axes.
    pub definition: Option<TransformId>,
    pub rfactor_product: bool,
}

impl Axis {
    pub fn is_broadcast(&self) -> bool {
        self.kind == AxisKind::Broadcast
    }

    pub fn is_reduction(&self) -> bool {
        self.kind == AxisKind::Reduction
    }

    /// Reduction over a single element: always exactly one iteration.
    pub fn is_trivial_reduction(&self) -> bool {
        self.is_reduction() && self.extent.is_one()
    }
}

/// Axis expression applied while scheduling a tensor.
#[derive(Debug, Clone)]
pub enum AxisTransform {
    /// `input` → (`outer` = ceilDiv(extent, factor), `inner` = factor).
    Split { input: AxisId, outer: AxisId, inner: AxisId, factor: Arc<Expr> },
    /// (`outer`, `inner`) → `out` with extent `outer * inner`.
    Merge { outer: AxisId, inner: AxisId, out: AxisId },
    /// In-tile permutation of two axes.
    Swizzle { x: AxisId, y: AxisId, out_x: AxisId, out_y: AxisId },
}

impl AxisTransform {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Split { .. } => "split",
            Self::Merge { .. } => "merge",
            Self::Swizzle { .. } => "swizzle",
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct TensorDomain {
    pub root: Vec<AxisId>,
    pub rfactor: Option<Vec<AxisId>>,
    pub leaf: Vec<AxisId>,
    /// Transforms in application order.
    pub transforms: Vec<TransformId>,
}

#[derive(Debug, Clone)]
pub struct Tensor {
    pub id: TensorId,
    pub domain: TensorDomain,
    pub memory: MemoryType,
    pub is_input: bool,
    pub is_output: bool,
    pub definition: Option<OpId>,
    pub uses: Vec<OpId>,
}

/// Per-axis shift offsets. A positive offset reads from lower indices.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShiftSpec {
    pub offsets: Vec<i64>,
    /// Out-of-range reads produce zero instead of shrinking the valid range.
    pub pad: bool,
}

impl ShiftSpec {
    pub fn offset(&self, dim: usize) -> i64 {
        self.offsets.get(dim).copied().unwrap_or(0)
    }
}

/// Per-axis sliding window with `[left, right]` padding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GatherSpec {
    pub window: Vec<usize>,
    pub pad: Vec<[usize; 2]>,
}

impl GatherSpec {
    pub fn rank(&self) -> usize {
        self.window.len()
    }

    pub fn window(&self, dim: usize) -> Option<usize> {
        self.window.get(dim).copied()
    }

    pub fn pad_left(&self, dim: usize) -> usize {
        self.pad.get(dim).map_or(0, |pad| pad[0])
    }

    /// A dimension with a window wider than one element.
    pub fn is_windowed(&self, dim: usize) -> bool {
        self.window(dim).is_some_and(|w| w != 1)
    }

    /// Position of the window axis of `dim` in the output root domain.
    pub fn gather_axis(&self, dim: usize) -> usize {
        self.rank() + dim
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display)]
pub enum PointwiseOp {
    Set,
    Neg,
    Add,
    Sub,
    Mul,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OpKind {
    Shift(ShiftSpec),
    Gather(GatherSpec),
    Pointwise(PointwiseOp),
    /// `is_new[i]` marks output axes that do not exist in the input.
    Broadcast { is_new: Vec<bool> },
    Reduction { axes: Vec<usize> },
}

/// How an operation relocates data along its axes.
#[derive(Debug, Clone, Copy)]
pub enum WindowOp<'a> {
    Shift(&'a ShiftSpec),
    Gather(&'a GatherSpec),
    Other,
}

impl WindowOp<'_> {
    /// Out-of-range slots are zero-filled rather than left untouched.
    pub fn pads(&self) -> bool {
        match self {
            WindowOp::Shift(shift) => shift.pad,
            WindowOp::Gather(_) => true,
            WindowOp::Other => false,
        }
    }
}

impl OpKind {
    pub fn window(&self) -> WindowOp<'_> {
        match self {
            OpKind::Shift(shift) => WindowOp::Shift(shift),
            OpKind::Gather(gather) => WindowOp::Gather(gather),
            OpKind::Pointwise(_) | OpKind::Broadcast { .. } | OpKind::Reduction { .. } => WindowOp::Other,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            OpKind::Shift(_) => "shift",
            OpKind::Gather(_) => "gather",
            OpKind::Pointwise(_) => "pointwise",
            OpKind::Broadcast { .. } => "broadcast",
            OpKind::Reduction { .. } => "reduction",
        }
    }
}

#[derive(Debug, Clone)]
pub struct FusionOp {
    pub id: OpId,
    pub kind: OpKind,
    pub inputs: SmallVec<[TensorId; 2]>,
    pub output: TensorId,
}

/// Operation graph of one compilation unit.
#[derive(Debug, Clone, Default)]
pub struct Fusion {
    axes: Vec<Axis>,
    transforms: Vec<AxisTransform>,
    tensors: Vec<Tensor>,
    ops: Vec<FusionOp>,
}

impl Fusion {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn axis(&self, id: AxisId) -> &Axis {
        &self.axes[id.0]
    }

    pub fn transform(&self, id: TransformId) -> &AxisTransform {
        &self.transforms[id.0]
    }

    pub fn tensor(&self, id: TensorId) -> &Tensor {
        &self.tensors[id.0]
    }

    pub fn op(&self, id: OpId) -> &FusionOp {
        &self.ops[id.0]
    }

    pub fn tensors(&self) -> &[Tensor] {
        &self.tensors
    }

    /// Operations in topological order.
    pub fn ops(&self) -> &[FusionOp] {
        &self.ops
    }

    pub fn num_axes(&self) -> usize {
        self.axes.len()
    }

    /// Tensors that contribute to a fusion output, in creation order.
    ///
    /// With no marked outputs every tensor is considered used.
    pub fn used_tensors(&self) -> Vec<TensorId> {
        let outputs: Vec<TensorId> = self.tensors.iter().filter(|t| t.is_output).map(|t| t.id).collect();
        if outputs.is_empty() {
            return self.tensors.iter().map(|t| t.id).collect();
        }

        let mut used = vec![false; self.tensors.len()];
        let mut stack = outputs;
        while let Some(tv) = stack.pop() {
            if std::mem::replace(&mut used[tv.0], true) {
                continue;
            }
            if let Some(def) = self.tensor(tv).definition {
                stack.extend(self.op(def).inputs.iter().copied());
            }
        }
        self.tensors.iter().filter(|t| used[t.id.0]).map(|t| t.id).collect()
    }

    // =========================================================================
    // Graph construction
    // =========================================================================

    fn new_axis(&mut self, extent: Arc<Expr>, kind: AxisKind) -> AxisId {
        let id = AxisId(self.axes.len());
        self.axes.push(Axis {
            id,
            start: Expr::zero(),
            stop: extent.clone(),
            extent,
            kind,
            parallel: ParallelType::Serial,
            definition: None,
            rfactor_product: false,
        });
        id
    }

    fn new_tensor(&mut self, root: Vec<AxisId>, is_input: bool) -> TensorId {
        let id = TensorId(self.tensors.len());
        self.tensors.push(Tensor {
            id,
            domain: TensorDomain { leaf: root.clone(), root, ..Default::default() },
            memory: MemoryType::Global,
            is_input,
            is_output: false,
            definition: None,
            uses: Vec::new(),
        });
        id
    }

    fn add_op(&mut self, kind: OpKind, inputs: &[TensorId], root: Vec<AxisId>) -> TensorId {
        let output = self.new_tensor(root, false);
        let id = OpId(self.ops.len());
        for input in inputs {
            self.tensors[input.0].uses.push(id);
        }
        self.tensors[output.0].definition = Some(id);
        self.ops.push(FusionOp { id, kind, inputs: inputs.iter().copied().collect(), output });
        output
    }

    /// Root axes of `tensor` that survive into consumers (reductions are dropped).
    fn logical_root(&self, tensor: TensorId) -> Vec<AxisId> {
        self.tensor(tensor).domain.root.iter().copied().filter(|a| !self.axis(*a).is_reduction()).collect()
    }

    fn copy_axis(&mut self, axis: AxisId) -> AxisId {
        let Axis { extent, kind, .. } = self.axis(axis).clone();
        self.new_axis(extent, kind)
    }

    pub fn add_input<E: IntoExpr>(&mut self, extents: impl IntoIterator<Item = E>) -> TensorId {
        let root = extents.into_iter().map(|e| self.new_axis(e.into_expr(), AxisKind::Iteration)).collect();
        self.new_tensor(root, true)
    }

    pub fn mark_output(&mut self, tensor: TensorId) {
        self.tensors[tensor.0].is_output = true;
    }

    pub fn pointwise(&mut self, op: PointwiseOp, inputs: &[TensorId]) -> Result<TensorId> {
        let first = *inputs.first().context(EmptyOperandsSnafu { op: "pointwise" })?;
        let rank = self.logical_root(first).len();
        let roots: Vec<Vec<AxisId>> = inputs.iter().map(|t| self.logical_root(*t)).collect();
        for root in &roots {
            ensure!(root.len() == rank, RankMismatchSnafu { op: "pointwise", expected: rank, actual: root.len() });
        }

        // Prefer a concrete input axis over a broadcast one at every position.
        let root = (0..rank)
            .map(|dim| {
                let source =
                    roots.iter().map(|r| r[dim]).find(|a| !self.axis(*a).is_broadcast()).unwrap_or(roots[0][dim]);
                self.copy_axis(source)
            })
            .collect();
        Ok(self.add_op(OpKind::Pointwise(op), inputs, root))
    }

    pub fn set(&mut self, input: TensorId) -> Result<TensorId> {
        self.pointwise(PointwiseOp::Set, &[input])
    }

    pub fn add(&mut self, lhs: TensorId, rhs: TensorId) -> Result<TensorId> {
        self.pointwise(PointwiseOp::Add, &[lhs, rhs])
    }

    /// Shift `input` by `offsets`: `out[i] = in[i - offset]`.
    ///
    /// Without padding the output's valid range shrinks by the offset on the side
    /// the data is shifted in from.
    pub fn shift(&mut self, input: TensorId, offsets: &[i64], pad: bool) -> Result<TensorId> {
        let producer_root = self.logical_root(input);
        ensure!(
            offsets.len() == producer_root.len(),
            RankMismatchSnafu { op: "shift", expected: producer_root.len(), actual: offsets.len() }
        );
        if let Some(dim) = offsets.iter().position(|o| *o == i64::MIN) {
            return InvalidShiftOffsetSnafu { dim, offset: i64::MIN }.fail();
        }

        let root = producer_root
            .iter()
            .zip(offsets)
            .map(|(&axis, &offset)| {
                let id = self.copy_axis(axis);
                if !pad {
                    let out = &mut self.axes[id.0];
                    if offset > 0 {
                        out.start = Expr::int(offset);
                    } else if offset < 0 {
                        out.stop = out.extent.add_int(offset);
                    }
                }
                id
            })
            .collect();
        Ok(self.add_op(OpKind::Shift(ShiftSpec { offsets: offsets.to_vec(), pad }), &[input], root))
    }

    /// Sliding-window gather.
    ///
    /// The output root domain holds one centre axis per input axis followed by one
    /// window axis per input axis.
    pub fn gather(&mut self, input: TensorId, window: &[usize], pad: &[[usize; 2]]) -> Result<TensorId> {
        let producer_root = self.logical_root(input);
        let rank = producer_root.len();
        ensure!(window.len() == rank, RankMismatchSnafu { op: "gather", expected: rank, actual: window.len() });
        ensure!(pad.len() == rank, RankMismatchSnafu { op: "gather.pad", expected: rank, actual: pad.len() });
        for (dim, (&w, &[left, right])) in window.iter().zip(pad).enumerate() {
            ensure!(
                w > 0 && left < w && right < w,
                InvalidWindowSnafu { dim, window: w, pad_left: left, pad_right: right }
            );
        }

        let mut root: Vec<AxisId> = producer_root
            .iter()
            .zip(window.iter().zip(pad))
            .map(|(&axis, (&w, &[left, right]))| {
                let Axis { extent, kind, .. } = self.axis(axis).clone();
                let extent = extent.add_int((left + right) as i64).sub_int(w as i64 - 1);
                self.new_axis(extent, kind)
            })
            .collect();
        for &w in window {
            root.push(self.new_axis(Expr::int(w as i64), AxisKind::Iteration));
        }

        let spec = GatherSpec { window: window.to_vec(), pad: pad.to_vec() };
        Ok(self.add_op(OpKind::Gather(spec), &[input], root))
    }

    pub fn broadcast(&mut self, input: TensorId, is_new: &[bool]) -> Result<TensorId> {
        let producer_root = self.logical_root(input);
        let kept = is_new.iter().filter(|n| !**n).count();
        ensure!(
            kept == producer_root.len(),
            RankMismatchSnafu { op: "broadcast", expected: producer_root.len(), actual: kept }
        );

        let mut source = producer_root.into_iter();
        let mut root = Vec::with_capacity(is_new.len());
        for &new in is_new {
            let axis = if new { None } else { source.next() };
            root.push(match axis {
                Some(axis) => self.copy_axis(axis),
                None => self.new_axis(Expr::int(1), AxisKind::Broadcast),
            });
        }
        Ok(self.add_op(OpKind::Broadcast { is_new: is_new.to_vec() }, &[input], root))
    }

    pub fn sum(&mut self, input: TensorId, axes: &[usize]) -> Result<TensorId> {
        let producer_root = self.logical_root(input);
        let rank = producer_root.len();
        if let Some(&axis) = axes.iter().find(|a| **a >= rank) {
            return InvalidReductionAxisSnafu { axis, rank }.fail();
        }

        let root = producer_root
            .iter()
            .enumerate()
            .map(|(dim, &axis)| {
                let id = self.copy_axis(axis);
                if axes.contains(&dim) {
                    self.axes[id.0].kind = AxisKind::Reduction;
                }
                id
            })
            .collect();
        Ok(self.add_op(OpKind::Reduction { axes: axes.to_vec() }, &[input], root))
    }

    // =========================================================================
    // Scheduling
    // =========================================================================

    fn leaf_axis(&self, tensor: TensorId, pos: usize) -> Result<AxisId> {
        let leaf = &self.tensor(tensor).domain.leaf;
        leaf.get(pos).copied().context(AxisPositionOutOfRangeSnafu { tensor, pos, rank: leaf.len() })
    }

    fn derived_axis(&mut self, extent: Arc<Expr>, kind: AxisKind, definition: TransformId) -> AxisId {
        let id = self.new_axis(extent, kind);
        self.axes[id.0].definition = Some(definition);
        id
    }

    /// Split leaf axis `pos` into `[outer, inner]` with `inner` of size `factor`.
    pub fn split(&mut self, tensor: TensorId, pos: usize, factor: impl IntoExpr) -> Result<()> {
        let input = self.leaf_axis(tensor, pos)?;
        let factor = factor.into_expr();
        if let Some(value) = factor.as_int() {
            ensure!(value > 0, InvalidSplitFactorSnafu { tensor, pos, factor: value });
        }

        let tf = TransformId(self.transforms.len());
        let Axis { extent, kind, .. } = self.axis(input).clone();
        let outer = self.derived_axis(extent.ceil_div_expr(&factor), kind, tf);
        let inner = self.derived_axis(factor.clone(), kind, tf);
        self.transforms.push(AxisTransform::Split { input, outer, inner, factor });

        let domain = &mut self.tensors[tensor.0].domain;
        domain.leaf[pos] = outer;
        domain.leaf.insert(pos + 1, inner);
        domain.transforms.push(tf);
        Ok(())
    }

    /// Merge leaf axes `pos` and `pos + 1` into one.
    pub fn merge(&mut self, tensor: TensorId, pos: usize) -> Result<()> {
        let outer = self.leaf_axis(tensor, pos)?;
        let inner = self.leaf_axis(tensor, pos + 1)?;

        let tf = TransformId(self.transforms.len());
        let (o, i) = (self.axis(outer).clone(), self.axis(inner).clone());
        let kind = match (o.kind, i.kind) {
            (AxisKind::Broadcast, other) | (other, AxisKind::Broadcast) => other,
            (AxisKind::Reduction, AxisKind::Reduction) => AxisKind::Reduction,
            _ => AxisKind::Iteration,
        };
        let out = self.derived_axis(o.extent.mul_expr(&i.extent), kind, tf);
        self.transforms.push(AxisTransform::Merge { outer, inner, out });

        let domain = &mut self.tensors[tensor.0].domain;
        domain.leaf[pos] = out;
        domain.leaf.remove(pos + 1);
        domain.transforms.push(tf);
        Ok(())
    }

    /// Swizzle leaf axes `pos` and `pos + 1`.
    pub fn swizzle(&mut self, tensor: TensorId, pos: usize) -> Result<()> {
        let x = self.leaf_axis(tensor, pos)?;
        let y = self.leaf_axis(tensor, pos + 1)?;

        let tf = TransformId(self.transforms.len());
        let (ax, ay) = (self.axis(x).clone(), self.axis(y).clone());
        let out_x = self.derived_axis(ax.extent, ax.kind, tf);
        let out_y = self.derived_axis(ay.extent, ay.kind, tf);
        self.transforms.push(AxisTransform::Swizzle { x, y, out_x, out_y });

        let domain = &mut self.tensors[tensor.0].domain;
        domain.leaf[pos] = out_x;
        domain.leaf[pos + 1] = out_y;
        domain.transforms.push(tf);
        Ok(())
    }

    pub fn parallelize(&mut self, tensor: TensorId, pos: usize, parallel: ParallelType) -> Result<()> {
        let axis = self.leaf_axis(tensor, pos)?;
        self.axes[axis.0].parallel = parallel;
        Ok(())
    }

    pub fn set_memory_type(&mut self, tensor: TensorId, memory: MemoryType) {
        self.tensors[tensor.0].memory = memory;
    }

    /// Freeze the current leaf domain as the rfactor domain of `tensor`.
    pub fn set_rfactor(&mut self, tensor: TensorId) {
        let leaf = self.tensor(tensor).domain.leaf.clone();
        for &axis in &leaf {
            if self.axis(axis).definition.is_some() {
                self.axes[axis.0].rfactor_product = true;
            }
        }
        self.tensors[tensor.0].domain.rfactor = Some(leaf);
    }

    // =========================================================================
    // Queries
    // =========================================================================

    /// Root axis of a domain: not produced by a transform, or an rfactor product.
    pub fn is_root_like(&self, axis: AxisId) -> bool {
        let axis = self.axis(axis);
        axis.definition.is_none() || axis.rfactor_product
    }

    /// Map consumer root axes to the producer root axes they read from.
    ///
    /// Axes without a counterpart (new broadcast axes, gather window axes) are
    /// absent from the result.
    pub fn root_map(&self, producer: TensorId, consumer: TensorId) -> Result<HashMap<AxisId, AxisId>> {
        let op = self.tensor(consumer).definition.context(UndefinedTensorSnafu { tensor: consumer })?;
        let op = self.op(op);
        ensure!(op.inputs.contains(&producer), NotAProducerSnafu { producer, consumer, op: op.id });

        let producer_root = self.logical_root(producer);
        let consumer_root = &self.tensor(consumer).domain.root;
        let pairs: Vec<(AxisId, AxisId)> = match &op.kind {
            OpKind::Broadcast { is_new } => consumer_root
                .iter()
                .zip(is_new)
                .filter(|(_, new)| !**new)
                .map(|(c, _)| *c)
                .zip(producer_root)
                .collect(),
            // Window axes trail the centre axes and have no producer counterpart.
            OpKind::Gather(_) | OpKind::Shift(_) | OpKind::Pointwise(_) | OpKind::Reduction { .. } => {
                consumer_root.iter().copied().zip(producer_root).collect()
            }
        };
        Ok(pairs.into_iter().collect())
    }

    /// Tensor expression defining `op` waits on a block-wide barrier.
    pub fn has_block_sync(&self, op: OpId) -> bool {
        let op = self.op(op);
        matches!(op.kind, OpKind::Reduction { .. })
            && self.tensor(op.output).domain.leaf.iter().any(|a| {
                let axis = self.axis(*a);
                axis.is_reduction() && axis.parallel.is_thread()
            })
    }
}
