//! Interprocedural constant-propagation solver.
//!
//! The specializer drives the solver through the [`Solver`] trait: it reads
//! lattice values and block executability, registers new clones, seeds their
//! arguments and re-runs the solver to a fixpoint. [`SccpSolver`] is the
//! sparse conditional implementation shipped with the crate.

pub mod lattice;
pub mod sccp;

pub use lattice::LatticeValue;
pub use sccp::SccpSolver;

use crate::ir::{BlockId, CallSiteRef, Constant, FuncId, Module, ValueId};
use crate::specializer::ArgInfo;

pub trait Solver {
    fn is_block_executable(&self, func: FuncId, block: BlockId) -> bool;

    /// Lattice value of a scalar value.
    fn lattice_value_for(&self, func: FuncId, value: ValueId) -> LatticeValue;

    /// Per-field lattice values of a struct-typed value. Empty while nothing
    /// is known about it.
    fn struct_lattice_value_for(&self, func: FuncId, value: ValueId) -> Vec<LatticeValue>;

    /// The single constant `value` is known to hold, if any. Struct values
    /// qualify when every field is constant.
    fn constant_or_null(&self, func: FuncId, value: ValueId) -> Option<Constant>;

    /// Whether the solver merges actual arguments into `func`'s formals.
    fn is_argument_tracked_function(&self, func: FuncId) -> bool;

    fn add_argument_tracked_function(&mut self, func: FuncId);

    /// Track the return value of `func`.
    fn add_tracked_function(&mut self, func: FuncId);

    /// Seed a clone's formals: bound arguments get their constants, every
    /// other argument inherits the lattice value of `original`'s formal.
    fn set_lattice_value_for_specialization_arguments(
        &mut self,
        module: &Module,
        clone: FuncId,
        original: FuncId,
        args: &[ArgInfo],
    );

    /// Returns whether the block was newly marked.
    fn mark_block_executable(&mut self, func: FuncId, block: BlockId) -> bool;

    fn mark_function_unreachable(&mut self, func: FuncId);

    /// Forget everything known about `value` and queue it for re-evaluation.
    fn reset_lattice_value_for(&mut self, func: FuncId, value: ValueId);

    /// Solve to a fixpoint, resolving undefined branch conditions only
    /// inside `funcs`.
    fn solve_while_resolved_undefs_in(&mut self, module: &Module, funcs: &[FuncId]);

    /// Solve to a fixpoint over the whole module.
    fn solve_while_resolved_undefs(&mut self, module: &Module);

    /// Scalar return value of a return-tracked function.
    fn tracked_ret_val(&self, func: FuncId) -> Option<LatticeValue>;

    /// Whether every field of `func`'s struct return value is constant.
    fn is_struct_lattice_constant(&self, func: FuncId) -> bool;

    /// Queue a call site whose arguments changed.
    fn visit_call(&mut self, site: CallSiteRef);
}
