use snafu::Snafu;

use halo_ir::{AxisId, MemoryType, ParallelType, TensorId};

pub type Result<T, E = HaloError> = std::result::Result<T, E>;

/// Failures of the halo analysis.
///
/// Every variant is fatal for the compilation unit: the driver aborts lowering
/// on `Err`. Variants carry the tensor / axis identity involved.
#[derive(Debug, Clone, PartialEq, Eq, Snafu)]
#[snafu(visibility(pub))]
pub enum HaloError {
    #[snafu(display("graph query failed: {source}"))]
    Ir { source: halo_ir::Error },

    #[snafu(display("{axis} is neither a root axis nor an rfactor product"))]
    NotRootAxis { axis: AxisId },

    #[snafu(display("no halo record for root axis {axis}"))]
    MissingRootAxisInfo { axis: AxisId },

    #[snafu(display("broadcast axis {axis} of {consumer} carries halo {width}"))]
    BroadcastWithHalo { axis: AxisId, consumer: TensorId, width: String },

    #[snafu(display("halo width of {axis} recorded twice"))]
    DuplicateHaloWidth { axis: AxisId },

    #[snafu(display("no halo width recorded for {axis}"))]
    MissingHaloWidth { axis: AxisId },

    #[snafu(display("{axis} of {tensor} is the output of a halo-extended merge and cannot be split"))]
    SplitOfHaloMerge { tensor: TensorId, axis: AxisId },

    #[snafu(display("{transform} of {tensor} is not supported on halo-extended domains"))]
    UnsupportedTransform { transform: &'static str, tensor: TensorId },

    #[snafu(display("{lhs} and {rhs} are not loop-mapped"))]
    AxesNotMapped { lhs: AxisId, rhs: AxisId },

    #[snafu(display("cannot compare {lhs} with {rhs}: {reason}"))]
    InvalidComparison { lhs: AxisId, rhs: AxisId, reason: &'static str },

    #[snafu(display("extent of {axis} of {tensor} differs from its concrete axis {concrete}"))]
    ExtentMismatch { tensor: TensorId, axis: AxisId, concrete: AxisId },

    #[snafu(display("parallel type {ptype} of {axis} of {tensor} is not supported on a halo-extended axis"))]
    UnsupportedParallelType { tensor: TensorId, axis: AxisId, ptype: ParallelType },

    #[snafu(display(
        "{axis} of {tensor} is parallelized with {ptype} and needs shared memory, but the tensor is in {memory} memory"
    ))]
    SharedMemoryRequired { tensor: TensorId, axis: AxisId, ptype: ParallelType, memory: MemoryType },

    #[snafu(display("{axis} of {tensor} carries halo and cannot be parallelized with {ptype}"))]
    BlockParallelHalo { tensor: TensorId, axis: AxisId, ptype: ParallelType },

    #[snafu(display("{tensor}: expected {expected} root indices, got {actual}"))]
    IndexCountMismatch { tensor: TensorId, expected: usize, actual: usize },

    #[snafu(display("{tensor}: predicate indices must be computed per root axis"))]
    ContiguousIndexing { tensor: TensorId },

    #[snafu(display("no leaf index for {axis} of {tensor}"))]
    MissingLeafIndex { tensor: TensorId, axis: AxisId },

    #[snafu(display("instruction at position {pos} is not a tensor expression"))]
    NotATensorExpr { pos: usize },

    #[snafu(display("{tensor} was asked for a shift predicate it does not need"))]
    PredicateNotNeeded { tensor: TensorId },
}

impl From<halo_ir::Error> for HaloError {
    fn from(source: halo_ir::Error) -> Self {
        HaloError::Ir { source }
    }
}
