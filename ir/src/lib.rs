//! Intermediate representation consumed by halo lowering.
//!
//! This crate defines the tensor operation graph, the symbolic index expressions
//! built over it, and the lowered kernel instruction stream that predicates are
//! spliced into.
//!
//! # Module Organization
//!
//! - [`expr`] - Symbolic integer and boolean expressions with constant folding
//! - [`fusion`] - Axes, axis transforms, tensors and tensor operations
//! - [`kernel`] - Loops, conditionals, tensor expressions and predicates
//! - [`error`] - Error types and result handling

pub mod error;
pub mod expr;
pub mod fusion;
pub mod kernel;
pub mod prelude;


pub use error::{Error, Result};
pub use expr::{BinaryOp, ConstValue, Expr, ExprOp, IntoExpr};
pub use fusion::{
    Axis, AxisId, AxisKind, AxisTransform, Fusion, FusionOp, GatherSpec, MemoryType, OpId, OpKind, ParallelType,
    PointwiseOp, ShiftSpec, Tensor, TensorDomain, TensorId, TransformId, WindowOp,
};
pub use kernel::{
    AxisRef, ForLoop, IfThenElse, Instr, InstrId, Kernel, KernelAxis, LoopHeader, Predicate, PredicateKind, Scope,
    TensorExpr, TensorExprKind,
};
