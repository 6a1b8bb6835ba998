//! Function specialization for interprocedural constant propagation.
//!
//! Functions whose call sites pass constant arguments are cloned once per
//! distinct set of constants, the clones are handed to the constant
//! propagation solver with those arguments bound, and the calls are
//! redirected to them. [`pipeline::run_specialization`] drives the whole
//! thing over a [`Module`].

pub mod analysis;
pub mod config;
pub mod error;
pub mod ir;
pub mod pipeline;
pub mod solver;
pub mod specializer;

// Re-export the types most callers need
pub use analysis::{CostModel, DefaultCostModel, DefaultInlineEstimator, InlineCostEstimator};
pub use config::SpecializerConfig;
pub use error::{ConfigError, IrError};
pub use ir::{FuncId, Module};
pub use pipeline::{run_specialization, run_specialization_with, SpecializationReport};
pub use solver::{SccpSolver, Solver};
pub use specializer::FunctionSpecializer;
