//! Loop and parallel correspondence between axes.
//!
//! Two axes are *loop-mapped* when they iterate the same logical range
//! (ignoring halo). The *parallel* relation is a sub-relation of the loop one:
//! parallel-mapped axes also share one concrete representative and one
//! parallel type.

use egglog_union_find::UnionFind;

use halo_ir::{AxisId, Fusion, ParallelType, TensorId};

use crate::error::Result;

/// Axis correspondence consumed by the halo analysis.
pub trait LoopMap {
    fn are_mapped(&self, lhs: AxisId, rhs: AxisId) -> bool;

    /// Canonical representative of the parallel set of `axis`.
    fn concrete(&self, axis: AxisId) -> AxisId;

    /// Parallel type shared by the parallel set of `axis`.
    fn parallel_type(&self, axis: AxisId) -> ParallelType;
}

/// Equivalence classes of axes.
///
/// The union-find is union-by-min, so the representative of a class is its
/// smallest axis. Representatives are cached after every union so queries do
/// not need path compression.
struct AxisClasses {
    uf: UnionFind<usize>,
    class: Vec<usize>,
}

impl std::fmt::Debug for AxisClasses {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AxisClasses").field("class", &self.class).finish_non_exhaustive()
    }
}

impl AxisClasses {
    fn new(len: usize) -> Self {
        Self { uf: UnionFind::default(), class: (0..len).collect() }
    }

    fn find(&self, axis: usize) -> usize {
        self.class.get(axis).copied().unwrap_or(axis)
    }

    fn union(&mut self, a: usize, b: usize) {
        let (ra, rb) = (self.uf.find(a), self.uf.find(b));
        if ra == rb {
            return;
        }
        self.uf.union(ra, rb);
        for axis in 0..self.class.len() {
            self.class[axis] = self.uf.find(axis);
        }
    }
}

/// Union-find [`LoopMap`] built from explicit compute-at decisions.
///
/// Parallel types are read from the fusion when the map is created.
#[derive(Debug)]
pub struct ComputeAtMap {
    loops: AxisClasses,
    parallel: AxisClasses,
    ptypes: Vec<ParallelType>,
}

impl ComputeAtMap {
    pub fn new(fusion: &Fusion) -> Self {
        let n = fusion.num_axes();
        Self {
            loops: AxisClasses::new(n),
            parallel: AxisClasses::new(n),
            ptypes: (0..n).map(|i| fusion.axis(AxisId(i)).parallel).collect(),
        }
    }

    pub fn map_loop(&mut self, lhs: AxisId, rhs: AxisId) {
        self.loops.union(lhs.0, rhs.0);
    }

    /// Map in the parallel relation, which implies the loop relation.
    pub fn map_parallel(&mut self, lhs: AxisId, rhs: AxisId) {
        self.parallel.union(lhs.0, rhs.0);
        self.map_loop(lhs, rhs);
    }

    /// Inline `producer` into `consumer` at leaf position `pos`.
    ///
    /// Root axes related by the operation and the first `pos` leaf axes of both
    /// tensors become loop-mapped. Parallel sets are left alone, since the two
    /// sides may carry different halo.
    pub fn compute_at(&mut self, fusion: &Fusion, producer: TensorId, consumer: TensorId, pos: usize) -> Result<()> {
        for (c, p) in fusion.root_map(producer, consumer)? {
            self.map_loop(c, p);
        }
        let p_leaf = &fusion.tensor(producer).domain.leaf;
        let c_leaf = &fusion.tensor(consumer).domain.leaf;
        for (&p, &c) in p_leaf.iter().zip(c_leaf).take(pos) {
            self.map_loop(p, c);
        }
        Ok(())
    }
}

impl LoopMap for ComputeAtMap {
    fn are_mapped(&self, lhs: AxisId, rhs: AxisId) -> bool {
        lhs == rhs || self.loops.find(lhs.0) == self.loops.find(rhs.0)
    }

    fn concrete(&self, axis: AxisId) -> AxisId {
        AxisId(self.parallel.find(axis.0))
    }

    fn parallel_type(&self, axis: AxisId) -> ParallelType {
        let root = self.parallel.find(axis.0);
        (0..self.ptypes.len())
            .filter(|&i| self.parallel.find(i) == root)
            .map(|i| self.ptypes[i])
            .find(|p| *p != ParallelType::Serial)
            .unwrap_or_default()
    }
}
