use snafu::Snafu;

use crate::fusion::{OpId, TensorId};

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Clone, PartialEq, Eq, Snafu)]
#[snafu(visibility(pub))]
pub enum Error {
    /// Leaf position does not exist in the tensor domain.
    #[snafu(display("axis position {pos} is out of range for {tensor} with {rank} leaf axes"))]
    AxisPositionOutOfRange { tensor: TensorId, pos: usize, rank: usize },

    /// Per-axis argument count does not match the tensor rank.
    #[snafu(display("{op} expects {expected} per-axis arguments, got {actual}"))]
    RankMismatch { op: &'static str, expected: usize, actual: usize },

    /// Operation needs at least one input tensor.
    #[snafu(display("{op} requires at least one input tensor"))]
    EmptyOperands { op: &'static str },

    /// Gather window is empty or its padding reaches past the window.
    #[snafu(display(
        "invalid gather window on dimension {dim}: window {window}, padding ({pad_left}, {pad_right})"
    ))]
    InvalidWindow { dim: usize, window: usize, pad_left: usize, pad_right: usize },

    /// Shift offset has no representable magnitude.
    #[snafu(display("shift offset {offset} on dimension {dim} is out of range"))]
    InvalidShiftOffset { dim: usize, offset: i64 },

    /// Reduction axis is not a dimension of the input.
    #[snafu(display("reduction axis {axis} is invalid for a tensor with {rank} dimensions"))]
    InvalidReductionAxis { axis: usize, rank: usize },

    /// Split factor must be a positive integer.
    #[snafu(display("split factor of axis {pos} of {tensor} must be positive, got {factor}"))]
    InvalidSplitFactor { tensor: TensorId, pos: usize, factor: i64 },

    /// Root mapping requested for a tensor pair that is not producer/consumer.
    #[snafu(display("{producer} is not an input of {op} defining {consumer}"))]
    NotAProducer { producer: TensorId, consumer: TensorId, op: OpId },

    /// Root mapping requested for a tensor without a defining operation.
    #[snafu(display("{tensor} has no defining operation"))]
    UndefinedTensor { tensor: TensorId },
}
