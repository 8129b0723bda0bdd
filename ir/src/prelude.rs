//! Common imports for building fusions and inspecting kernels:
//!
//! ```rust,ignore
//! use halo_ir::prelude::*;
//! ```

pub use crate::expr::{Expr, IntoExpr};
pub use crate::fusion::{AxisId, Fusion, MemoryType, OpId, ParallelType, TensorId};
pub use crate::kernel::{Instr, Kernel, LoopHeader, Predicate, PredicateKind, Scope, TensorExpr};
