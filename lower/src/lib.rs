//! Halo analysis and predication for shift and gather lowering.
//!
//! Shift and gather operations read producer values outside the consumer's
//! index range. This crate computes how far each axis must extend (its halo),
//! checks that parallelizing halo-extended axes stays correct, and guards the
//! generated tensor expressions with boundary and zero-padding predicates.
//!
//! # Module Organization
//!
//! - [`axis_halo`] - Low / high halo widths of one axis
//! - [`halo_map`] - Halo tables of a compilation unit
//! - [`propagate`] - Backward root-axis and forward leaf-axis propagation
//! - [`compare`] - Extent comparison of loop-mapped axes
//! - [`validate`] - Parallelization checks
//! - [`predicate`] - Shift / padding predicates and guard insertion
//! - [`loop_map`] - Loop and parallel axis correspondence
//! - [`index`] - Root-axis index computation
//! - [`config`] - Analysis configuration
//! - [`error`] - Error types and result handling
//!
//! # Usage
//!
//! ```rust,ignore
//! let loop_map = ComputeAtMap::new(&fusion);
//! let config = HaloConfig::from_env();
//! let halo = HaloMap::build(&fusion, &loop_map, &config)?;
//!
//! let mut kernel = Kernel::from_fusion(&fusion);
//! let indexing = LoopNestIndexing::new(&loop_map);
//! ShiftPredicateInserter::new(&fusion, &halo, &indexing, &config)
//!     .insert_shift_predicates(&mut kernel, |_| Expr::bool(true))?;
//! ```

pub mod axis_halo;
pub mod compare;
pub mod config;
pub mod error;
pub mod halo_map;
pub mod index;
pub mod loop_map;
pub mod predicate;
pub mod propagate;
pub mod validate;


pub use axis_halo::{AxisHaloWidth, HaloSide};
pub use compare::ExprEquality;
pub use config::HaloConfig;
pub use error::{HaloError, Result};
pub use halo_map::HaloMap;
pub use index::{IndexCompute, LoopNestIndexing, RootPredIndices};
pub use loop_map::{ComputeAtMap, LoopMap};
pub use predicate::ShiftPredicateInserter;
