// =============================================================================
// Interprocedural constant propagation with function specialization
// =============================================================================
//
// Seeds the solver over the whole module, solves it, then lets the
// specializer clone functions on constant arguments until it stops finding
// anything or the iteration limit is reached:
// 1. Internal definitions whose address is never taken have their arguments
//    and return value tracked; every other function is reachable from
//    outside, so its entry is executable and its arguments are overdefined
// 2. Solve to a fixpoint
// 3. Run the specializer up to `max_iterations` times; each run re-solves
//    the clones it made and promotes constant stack arguments, which is what
//    lets a later run specialize recursive functions one level deeper
// 4. Erase fully specialized functions and strip `ssa_copy` from clones
//
// Example: with literal specialization enabled,
//   define internal i32 @f(i32 %n) { ... branch on %n == 5 ... }
//   call i32 @f(i32 5)
//   call i32 @f(i32 6)
// →
//   call i32 @f.specialized.1(i32 5)
//   call i32 @f.specialized.2(i32 6)
// with @f erased once nothing calls it.

use crate::analysis::{CostModel, InlineCostEstimator};
use crate::config::SpecializerConfig;
use crate::ir::{BlockId, Linkage, Module};
use crate::solver::{SccpSolver, Solver};
use crate::specializer::FunctionSpecializer;
use serde::Serialize;
use tracing::{debug, info};

/// Outcome of one [`run_specialization`] call.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SpecializationReport {
    /// Whether the module was modified.
    pub changed: bool,
    pub clones_created: usize,
    /// Names of fully specialized functions that were erased.
    pub functions_removed: Vec<String>,
    /// Stack values promoted to constant globals.
    pub promoted_constants: usize,
    /// Specializer runs executed, including the last one that found nothing.
    pub iterations: u32,
}

/// Seed `solver` the way a whole-module constant propagation pass does.
pub fn seed_solver(module: &Module, solver: &mut dyn Solver) {
    for (id, f) in module.functions() {
        let tracked = f.linkage == Linkage::Internal
            && !f.is_declaration()
            && !module.is_address_taken(id);
        if tracked {
            solver.add_argument_tracked_function(id);
            if !f.ret_ty.is_void() {
                solver.add_tracked_function(id);
            }
        } else if !f.is_declaration() {
            solver.mark_block_executable(id, BlockId::ENTRY);
        }
    }
}

/// Run function specialization over `module` with the bundled solver.
pub fn run_specialization(
    module: &mut Module,
    config: &SpecializerConfig,
    cost_model: &dyn CostModel,
    inline_estimator: &dyn InlineCostEstimator,
) -> SpecializationReport {
    let mut solver = SccpSolver::new();
    run_specialization_with(module, &mut solver, config, cost_model, inline_estimator)
}

/// Run function specialization over `module`, driving a caller-supplied solver.
pub fn run_specialization_with(
    module: &mut Module,
    solver: &mut dyn Solver,
    config: &SpecializerConfig,
    cost_model: &dyn CostModel,
    inline_estimator: &dyn InlineCostEstimator,
) -> SpecializationReport {
    seed_solver(module, solver);
    solver.solve_while_resolved_undefs(module);

    let mut specializer = FunctionSpecializer::new(config, cost_model, inline_estimator);
    let mut report = SpecializationReport::default();

    while report.iterations < config.max_iterations {
        report.iterations += 1;
        let changed = specializer.run(module, solver);
        debug!(
            "FnSpecialization: Iteration {} {}",
            report.iterations,
            if changed { "changed the module" } else { "found nothing" }
        );
        if !changed {
            break;
        }
        report.changed = true;
    }

    let summary = specializer.finish(module);
    report.clones_created = specializer.num_specs_created();
    report.promoted_constants = specializer.num_promoted();
    report.functions_removed = summary.removed;
    report.changed |= report.promoted_constants > 0;

    info!(
        "Function specialization on {}: {} clones, {} functions removed, {} iterations",
        module.name,
        report.clones_created,
        report.functions_removed.len(),
        report.iterations
    );
    report
}
