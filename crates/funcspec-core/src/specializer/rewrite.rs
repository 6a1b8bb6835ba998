//! Redirecting remaining call sites to the best matching clone.

use super::candidate::candidate_constant;
use super::spec::Spec;
use crate::config::SpecializerConfig;
use crate::ir::{CallSiteRef, FuncId, Module};
use crate::solver::Solver;
use indexmap::IndexSet;
use tracing::debug;

/// Point every executable call of `func` at the highest-scoring clone among
/// `specs` whose bindings all match the call's actual arguments.
///
/// When no call needs the original body any more it is marked unreachable
/// and recorded in `fully_specialized`. Returns the number of redirected
/// calls.
pub fn update_call_sites(
    module: &mut Module,
    solver: &mut dyn Solver,
    config: &SpecializerConfig,
    func: FuncId,
    specs: &[Spec],
    fully_specialized: &mut IndexSet<FuncId>,
) -> usize {
    let sites: Vec<CallSiteRef> = module
        .call_sites_of(func)
        .into_iter()
        .filter(|site| {
            let parent = module.function(site.caller).inst(site.inst).parent;
            solver.is_block_executable(site.caller, parent)
        })
        .collect();

    let mut calls_left = sites.len();
    let mut redirected = 0;
    for site in sites {
        // A recursive call goes away together with the original body.
        let mut resolved = site.caller == func;

        if let Some(clone) = best_clone(module, &*solver, config, site, specs) {
            debug!(
                "FnSpecialization: Redirecting call in {} to call {}",
                module.function(site.caller).name,
                module.function(clone).name
            );
            module.set_called_function(site, clone);
            redirected += 1;
            resolved = true;
        }

        if resolved {
            calls_left -= 1;
        }
    }

    if calls_left == 0 && solver.is_argument_tracked_function(func) {
        solver.mark_function_unreachable(func);
        fully_specialized.insert(func);
    }
    redirected
}

fn best_clone(
    module: &Module,
    solver: &dyn Solver,
    config: &SpecializerConfig,
    site: CallSiteRef,
    specs: &[Spec],
) -> Option<FuncId> {
    let call = module.call_inst(site)?;
    let mut best: Option<&Spec> = None;
    for spec in specs {
        if spec.clone.is_none() || best.is_some_and(|b| spec.score <= b.score) {
            continue;
        }
        let matches = spec.sig.args().iter().all(|arg| {
            call.args.get(arg.formal as usize).and_then(|op| {
                candidate_constant(module, solver, config, site.caller, op)
            }) == Some(arg.actual.clone())
        });
        if matches {
            best = Some(spec);
        }
    }
    best.and_then(|s| s.clone)
}
