// =============================================================================
// Function specialization
// =============================================================================
//
// One `FunctionSpecializer::run` call works in phases:
// 1. For every candidate function, derive a signature from the constant
//    actual arguments of each call site, merge equal signatures and score
//    each unique one (estimated benefit minus the cost of a clone)
// 2. Keep the best signatures module-wide, within a budget of `max_clones`
//    per candidate function
// 3. Clone, seed the solver with the bound constants, redirect the call
//    sites that produced each signature and re-solve the clones
// 4. Redirect any other call that now matches a clone, retire originals
//    that nothing calls any more, and let call sites of clones with a
//    narrowed return value see it
// 5. Promote constant stack slots passed to tracked functions so that the
//    next run can specialize recursive functions further
//
// `FunctionSpecializer::finish` erases retired functions.

pub mod candidate;
pub mod cost_visitor;
pub mod promote;
pub mod rewrite;
pub mod selection;
pub mod spec;

pub use cost_visitor::{FunctionAnalyses, InstCostVisitor, KnownConstants};
pub use spec::{ArgInfo, Spec, SpecSig};

use crate::analysis::{CodeMetrics, Cost, CostModel, InlineCostEstimator};
use crate::config::SpecializerConfig;
use crate::ir::printer::constant_text;
use crate::ir::{BlockId, CallAttrs, FnAttrs, FuncId, Linkage, Module, ValueId};
use crate::solver::Solver;
use indexmap::{IndexMap, IndexSet};
use rustc_hash::{FxHashMap, FxHashSet};
use std::ops::Range;
use tracing::{debug, info};

/// Clones are named `<original>.specialized.<N>`.
pub const CLONE_SUFFIX: &str = "specialized";

/// Per-pipeline specialization state.
///
/// The set of produced clones, the set of fully specialized originals and the
/// code metrics cache live as long as the specializer; nothing is shared
/// between specializers.
pub struct FunctionSpecializer<'a> {
    config: &'a SpecializerConfig,
    cost_model: &'a dyn CostModel,
    inline_estimator: &'a dyn InlineCostEstimator,
    /// Clones created so far; these are never specialized again.
    specializations: FxHashSet<FuncId>,
    /// Originals with no remaining callers, erased by [`Self::finish`].
    fully_specialized: IndexSet<FuncId>,
    metrics: FxHashMap<FuncId, CodeMetrics>,
    num_specs_created: usize,
    num_promoted: usize,
}

/// What [`FunctionSpecializer::finish`] cleaned up.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FinishSummary {
    /// Names of the erased functions.
    pub removed: Vec<String>,
    /// `ssa_copy` instructions stripped from clones.
    pub ssa_copies_removed: usize,
}

impl<'a> FunctionSpecializer<'a> {
    pub fn new(
        config: &'a SpecializerConfig,
        cost_model: &'a dyn CostModel,
        inline_estimator: &'a dyn InlineCostEstimator,
    ) -> Self {
        Self {
            config,
            cost_model,
            inline_estimator,
            specializations: FxHashSet::default(),
            fully_specialized: IndexSet::new(),
            metrics: FxHashMap::default(),
            num_specs_created: 0,
            num_promoted: 0,
        }
    }

    /// Clones created over the lifetime of this specializer.
    pub fn num_specs_created(&self) -> usize {
        self.num_specs_created
    }

    /// Stack values promoted to constant globals so far.
    pub fn num_promoted(&self) -> usize {
        self.num_promoted
    }

    pub fn is_specialization(&self, func: FuncId) -> bool {
        self.specializations.contains(&func)
    }

    pub fn fully_specialized(&self) -> impl Iterator<Item = FuncId> + '_ {
        self.fully_specialized.iter().copied()
    }

    /// Run one round of specialization. Returns whether any clone was made.
    pub fn run(&mut self, module: &mut Module, solver: &mut dyn Solver) -> bool {
        let mut all_specs: Vec<Spec> = Vec::new();
        let mut spec_ranges: FxHashMap<FuncId, Range<usize>> = FxHashMap::default();
        let mut num_candidates = 0usize;

        for func in module.function_ids() {
            if !candidate::is_candidate_function(module, &*solver, &self.specializations, func) {
                continue;
            }
            let Some(spec_cost) = self.specialization_cost(module, func) else {
                debug!(
                    "FnSpecialization: Invalid specialization cost for {}",
                    module.function(func).name
                );
                continue;
            };
            debug!(
                "FnSpecialization: Specialization cost for {} is {}",
                module.function(func).name,
                spec_cost
            );
            if !self.find_specializations(module, &*solver, func, spec_cost, &mut all_specs, &mut spec_ranges) {
                debug!(
                    "FnSpecialization: No possible specializations found for {}",
                    module.function(func).name
                );
                continue;
            }
            num_candidates += 1;
        }

        if num_candidates == 0 {
            debug!("FnSpecialization: No possible specializations found in module");
            return false;
        }

        let budget = num_candidates.saturating_mul(self.config.max_clones as usize);
        if all_specs.len() > budget {
            debug!(
                "FnSpecialization: Number of candidates exceed the maximum number of clones threshold."
            );
            debug!(
                "FnSpecialization: Specializing the {} most profitable candidates.",
                budget
            );
        }
        let scores: Vec<Cost> = all_specs.iter().map(|s| s.score).collect();
        let best = selection::select_best(&scores, budget);

        for &index in &best {
            let spec = &all_specs[index];
            debug!(
                "FnSpecialization: Function {} , score {}",
                module.function(spec.func).name,
                spec.score
            );
            for arg in spec.sig.args() {
                let f = module.function(spec.func);
                debug!(
                    "FnSpecialization:   FormalArg = {}, ActualArg = {}",
                    f.value_name(ValueId::Arg(arg.formal)),
                    constant_text(module, &arg.actual)
                );
            }
        }

        // Create the chosen clones and redirect the calls that produced them.
        let mut originals: IndexSet<FuncId> = IndexSet::new();
        let mut clones: Vec<FuncId> = Vec::with_capacity(best.len());
        for &index in &best {
            let clone = self.create_specialization(module, solver, &all_specs[index]);
            let spec = &mut all_specs[index];
            spec.clone = Some(clone);
            for &site in &spec.call_sites {
                debug!(
                    "FnSpecialization: Redirecting call in {} to call {}",
                    module.function(site.caller).name,
                    module.function(clone).name
                );
                module.set_called_function(site, clone);
            }
            clones.push(clone);
            originals.insert(spec.func);
        }

        solver.solve_while_resolved_undefs_in(module, &clones);

        // Recursive calls, calls that lost the budget race and calls that
        // only match a clone now that the solver has run.
        for &func in &originals {
            if let Some(range) = spec_ranges.get(&func) {
                rewrite::update_call_sites(
                    module,
                    solver,
                    self.config,
                    func,
                    &all_specs[range.clone()],
                    &mut self.fully_specialized,
                );
            }
        }

        for &clone in &clones {
            if !Self::has_narrowed_return(module, &*solver, clone) {
                continue;
            }
            for site in module.call_sites_of(clone) {
                solver.reset_lattice_value_for(site.caller, ValueId::Inst(site.inst));
            }
        }

        solver.solve_while_resolved_undefs(module);

        self.num_promoted +=
            promote::promote_constant_stack_values(module, solver, self.config);
        true
    }

    /// Whether the solver proved a single return value for `clone`: every
    /// field constant for struct returns, anything short of overdefined for
    /// scalar ones.
    fn has_narrowed_return(module: &Module, solver: &dyn Solver, clone: FuncId) -> bool {
        let ret_ty = &module.function(clone).ret_ty;
        if ret_ty.is_void() {
            return false;
        }
        if ret_ty.is_struct() {
            return solver.is_struct_lattice_constant(clone);
        }
        let tracked = solver.tracked_ret_val(clone);
        debug_assert!(tracked.is_some(), "return value of a clone ought to be tracked");
        tracked.is_some_and(|v| !v.is_overdefined())
    }

    /// Erase fully specialized functions and strip `ssa_copy` from clones.
    pub fn finish(&mut self, module: &mut Module) -> FinishSummary {
        if self.num_specs_created > 0 {
            info!(
                "FnSpecialization: Created {} specializations in module {}",
                self.num_specs_created, module.name
            );
        }
        let mut summary = FinishSummary::default();
        for func in self.fully_specialized.drain(..) {
            if let Some(removed) = module.erase_function(func) {
                debug!("FnSpecialization: Removing dead function {}", removed.name);
                summary.removed.push(removed.name);
            }
            self.metrics.remove(&func);
        }
        let mut clones: Vec<FuncId> = self.specializations.iter().copied().collect();
        clones.sort();
        for clone in clones {
            if module.contains_function(clone) {
                summary.ssa_copies_removed += module.function_mut(clone).remove_ssa_copies();
            }
        }
        summary
    }

    fn analyze_function(&mut self, module: &Module, func: FuncId) -> &CodeMetrics {
        let cost_model = self.cost_model;
        self.metrics
            .entry(func)
            .or_insert_with(|| CodeMetrics::analyze(module, module.function(func), cost_model))
    }

    /// The fixed cost of cloning `func`, or `None` when it must not be cloned.
    pub fn specialization_cost(&mut self, module: &Module, func: FuncId) -> Option<Cost> {
        let force = self.config.force_specialization;
        let min_size = self.config.min_function_size;
        let no_inline = module.function(func).attrs.contains(FnAttrs::NO_INLINE);
        let metrics = self.analyze_function(module, func);
        let num_insts = metrics.num_insts?;
        if metrics.not_duplicatable || (!force && !no_inline && num_insts < min_size) {
            return None;
        }
        Some(num_insts)
    }

    fn create_specialization(
        &mut self,
        module: &mut Module,
        solver: &mut dyn Solver,
        spec: &Spec,
    ) -> FuncId {
        let prefix = format!("{}.{}", module.function(spec.func).name, CLONE_SUFFIX);
        let clone = module.clone_function(spec.func, &prefix);
        let f = module.function_mut(clone);
        f.remove_ssa_copies();
        f.linkage = Linkage::Internal;

        solver.set_lattice_value_for_specialization_arguments(
            module,
            clone,
            spec.func,
            spec.sig.args(),
        );
        solver.mark_block_executable(clone, BlockId::ENTRY);
        solver.add_argument_tracked_function(clone);
        solver.add_tracked_function(clone);

        self.specializations.insert(clone);
        self.num_specs_created += 1;
        clone
    }

    /// Collect, deduplicate and score the signatures of `func`'s call sites.
    ///
    /// New specs are appended to `all_specs`; `spec_ranges[func]` covers them.
    /// Returns whether any signature was found.
    fn find_specializations(
        &self,
        module: &Module,
        solver: &dyn Solver,
        func: FuncId,
        spec_cost: Cost,
        all_specs: &mut Vec<Spec>,
        spec_ranges: &mut FxHashMap<FuncId, Range<usize>>,
    ) -> bool {
        let f = module.function(func);
        let args: Vec<u32> = (0..f.params.len() as u32)
            .filter(|&i| candidate::is_argument_interesting(module, solver, self.config, func, i))
            .collect();
        if args.is_empty() {
            return false;
        }

        let analyses = FunctionAnalyses::compute(f);
        let mut unique: IndexMap<SpecSig, usize> = IndexMap::new();

        for site in module.call_sites_of(func) {
            let caller = module.function(site.caller);
            let data = caller.inst(site.inst);
            let Some(call) = data.kind.as_call() else {
                continue;
            };
            if call.attrs.contains(CallAttrs::MIN_SIZE) {
                continue;
            }
            if !solver.is_block_executable(site.caller, data.parent) {
                continue;
            }

            let mut bindings = Vec::new();
            for &formal in &args {
                let Some(actual) = call.args.get(formal as usize) else {
                    continue;
                };
                let Some(c) =
                    candidate::candidate_constant(module, solver, self.config, site.caller, actual)
                else {
                    continue;
                };
                debug!(
                    "FnSpecialization: Found interesting argument {} : {}",
                    f.value_name(ValueId::Arg(formal)),
                    constant_text(module, &c)
                );
                bindings.push(ArgInfo::new(formal, c));
            }
            if bindings.is_empty() {
                continue;
            }
            let sig = SpecSig::new(bindings);
            let recursive = site.caller == func;

            if let Some(&index) = unique.get(&sig) {
                // Recursive calls are matched against the best clone later.
                if !recursive {
                    all_specs[index].call_sites.push(site);
                }
                continue;
            }

            let mut score = -spec_cost;
            let mut visitor =
                InstCostVisitor::new(module, func, solver, self.cost_model, &analyses);
            for arg in sig.args() {
                score = score.saturating_add(
                    self.specialization_bonus(module, solver, func, arg, &mut visitor),
                );
            }
            if !self.config.force_specialization && score <= 0 {
                continue;
            }

            let mut spec = Spec::new(func, sig.clone(), score);
            if !recursive {
                spec.call_sites.push(site);
            }
            let index = all_specs.len();
            all_specs.push(spec);
            unique.insert(sig, index);
            spec_ranges
                .entry(func)
                .and_modify(|r| r.end = index + 1)
                .or_insert(index..index + 1);
        }

        !unique.is_empty()
    }

    /// Benefit of binding `arg`: the folding bonus of its users plus, for a
    /// function address, the inlining opportunity of indirect calls through
    /// it.
    fn specialization_bonus(
        &self,
        module: &Module,
        solver: &dyn Solver,
        func: FuncId,
        arg: &ArgInfo,
        visitor: &mut InstCostVisitor<'_>,
    ) -> Cost {
        let f = module.function(func);
        let formal = ValueId::Arg(arg.formal);
        debug!(
            "FnSpecialization: Analysing bonus for constant: {}",
            constant_text(module, &arg.actual)
        );

        let def_use = f.def_use();
        let mut total: Cost = 0;
        for &user in def_use.users(formal) {
            if solver.is_block_executable(func, f.inst(user).parent) {
                total = total.saturating_add(visitor.user_bonus(user, formal, arg.actual.clone()));
            }
        }
        debug!(
            "FnSpecialization:   Accumulated user bonus {} for argument {}",
            total,
            f.value_name(formal)
        );

        let Some(target) = arg.actual.as_function() else {
            return total;
        };
        let Some(callee) = module.get_function(target) else {
            return total;
        };
        let callee_ty = callee.fn_type();

        let mut params = self.config.inline_params();
        params.default_threshold += params.indirect_call_threshold;
        let mut bonus: Cost = 0;
        for &user in def_use.users(formal) {
            let Some(call) = f.inst(user).kind.as_call() else {
                continue;
            };
            if !call.callee.is_value(formal) || call.fn_ty != callee_ty {
                continue;
            }
            let ic = self.inline_estimator.inline_cost(f, call, callee, &params);
            if ic.is_always() {
                bonus = bonus.saturating_add(params.default_threshold);
            } else if ic.is_variable() && ic.cost_delta() > 0 {
                bonus = bonus.saturating_add(ic.cost_delta());
            }
            debug!(
                "FnSpecialization:   Inlining bonus {} for user {}",
                bonus,
                f.value_name(ValueId::Inst(user))
            );
        }
        total.saturating_add(bonus)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::{DefaultCostModel, DefaultInlineEstimator};
    use crate::ir::{
        BinaryOp, CallSiteRef, CmpPredicate, Constant, Function, FunctionBuilder, InstId, Operand,
        Param, Type,
    };
    use crate::solver::{LatticeValue, SccpSolver};

    /// Internal `f(i32 %n)`: `if (n == 5) { n + 1 + 1 } else { n * 3 }`,
    /// called from `main` once per entry of `actuals`.
    fn module(profile: bool, actuals: &[i32]) -> (Module, FuncId, FuncId) {
        let mut m = Module::new("m");
        let mut f = Function::new("f", vec![Param::new("n", Type::I32)], Type::I32);
        f.linkage = Linkage::Internal;
        let f = m.add_function(f);
        {
            let mut b = FunctionBuilder::new(&mut m, f);
            let entry = b.block("entry");
            let then = b.add_block("then");
            let other = b.add_block("else");
            let c = b.cmp(CmpPredicate::Eq, Operand::arg(0), Constant::i32(5).into());
            b.cond_br(c, then, other);
            b.position_at_end(then);
            let a = b.binary(BinaryOp::Add, Operand::arg(0), Constant::i32(1).into());
            let a = b.binary(BinaryOp::Add, a, Constant::i32(1).into());
            b.ret(Some(a));
            b.position_at_end(other);
            let m3 = b.binary(BinaryOp::Mul, Operand::arg(0), Constant::i32(3).into());
            b.ret(Some(m3));
            if profile {
                b.set_profile_count(entry, 1);
                b.set_profile_count(then, 100);
                b.set_profile_count(other, 100);
            }
        }
        let main = m.add_function(Function::new("main", vec![], Type::Void));
        {
            let mut b = FunctionBuilder::new(&mut m, main);
            b.block("entry");
            for &n in actuals {
                b.call_direct(f, vec![Constant::i32(n).into()]);
            }
            b.ret(None);
        }
        (m, f, main)
    }

    fn seeded_solver(m: &Module, f: FuncId, main: FuncId) -> SccpSolver {
        let mut solver = SccpSolver::new();
        solver.add_argument_tracked_function(f);
        solver.add_tracked_function(f);
        solver.mark_block_executable(main, BlockId::ENTRY);
        solver.solve_while_resolved_undefs(m);
        solver
    }

    fn literal_config() -> SpecializerConfig {
        SpecializerConfig {
            specialize_literal_constants: true,
            min_function_size: 0,
            ..SpecializerConfig::default()
        }
    }

    fn call(m: &Module, main: FuncId, index: usize) -> InstId {
        m.function(main).block(BlockId::ENTRY).insts[index]
    }

    #[test]
    fn test_every_signature_gets_a_clone() {
        let (mut m, f, main) = module(true, &[5, 6]);
        let mut solver = seeded_solver(&m, f, main);
        let config = literal_config();
        let estimator = DefaultInlineEstimator::default();
        let mut specializer = FunctionSpecializer::new(&config, &DefaultCostModel, &estimator);

        assert!(specializer.run(&mut m, &mut solver));
        assert_eq!(specializer.num_specs_created(), 2);

        let first = m.function_by_name("f.specialized.1").unwrap();
        let second = m.function_by_name("f.specialized.2").unwrap();
        assert!(specializer.is_specialization(first));
        assert_eq!(m.function(first).linkage, Linkage::Internal);
        assert_eq!(
            m.call_inst(CallSiteRef { caller: main, inst: call(&m, main, 0) })
                .and_then(|c| c.called_function()),
            Some(first)
        );
        assert_eq!(
            m.call_inst(CallSiteRef { caller: main, inst: call(&m, main, 1) })
                .and_then(|c| c.called_function()),
            Some(second)
        );

        // The narrowed return value reaches the caller.
        assert_eq!(
            solver.lattice_value_for(main, ValueId::Inst(call(&m, main, 0))),
            LatticeValue::Constant(Constant::i32(7))
        );
        assert_eq!(
            solver.lattice_value_for(main, ValueId::Inst(call(&m, main, 1))),
            LatticeValue::Constant(Constant::i32(18))
        );

        assert_eq!(specializer.fully_specialized().collect::<Vec<_>>(), vec![f]);
        let summary = specializer.finish(&mut m);
        assert_eq!(summary.removed, vec!["f".to_string()]);
        assert!(m.function_by_name("f").is_none());
    }

    #[test]
    fn test_budget_keeps_the_best_signature() {
        let (mut m, f, main) = module(true, &[5, 6]);
        let mut solver = seeded_solver(&m, f, main);
        let config = SpecializerConfig {
            max_clones: 1,
            ..literal_config()
        };
        let estimator = DefaultInlineEstimator::default();
        let mut specializer = FunctionSpecializer::new(&config, &DefaultCostModel, &estimator);

        assert!(specializer.run(&mut m, &mut solver));
        assert_eq!(specializer.num_specs_created(), 1);
        // n == 6 frees the three-instruction arm, n == 5 only two.
        let clone = m.function_by_name("f.specialized.1").unwrap();
        let sites = m.call_sites_of(clone);
        assert_eq!(sites.len(), 1);
        assert_eq!(sites[0].inst, call(&m, main, 1));
        assert_eq!(m.call_sites_of(f).len(), 1);
        assert_eq!(specializer.fully_specialized().count(), 0);
    }

    #[test]
    fn test_unprofitable_specialization_needs_force() {
        // Without profile data the arms weigh nothing and the score is negative.
        let (mut m, f, main) = module(false, &[5, 6]);
        let mut solver = seeded_solver(&m, f, main);
        let config = literal_config();
        let estimator = DefaultInlineEstimator::default();
        let mut specializer = FunctionSpecializer::new(&config, &DefaultCostModel, &estimator);
        assert!(!specializer.run(&mut m, &mut solver));
        assert_eq!(specializer.num_specs_created(), 0);

        let (mut m, f, main) = module(false, &[5, 6]);
        let mut solver = seeded_solver(&m, f, main);
        let config = SpecializerConfig {
            force_specialization: true,
            ..literal_config()
        };
        let mut specializer = FunctionSpecializer::new(&config, &DefaultCostModel, &estimator);
        assert!(specializer.run(&mut m, &mut solver));
        assert_eq!(specializer.num_specs_created(), 2);
    }

    #[test]
    fn test_literals_are_ignored_by_default() {
        let (mut m, f, main) = module(true, &[5, 6]);
        let mut solver = seeded_solver(&m, f, main);
        let config = SpecializerConfig {
            min_function_size: 0,
            ..SpecializerConfig::default()
        };
        let estimator = DefaultInlineEstimator::default();
        let mut specializer = FunctionSpecializer::new(&config, &DefaultCostModel, &estimator);
        assert!(!specializer.run(&mut m, &mut solver));
    }

    #[test]
    fn test_constant_argument_is_not_interesting() {
        // Every call passes 5, so the solver already knows %n.
        let (mut m, f, main) = module(true, &[5, 5]);
        let mut solver = seeded_solver(&m, f, main);
        let config = literal_config();
        let estimator = DefaultInlineEstimator::default();
        let mut specializer = FunctionSpecializer::new(&config, &DefaultCostModel, &estimator);
        assert!(!specializer.run(&mut m, &mut solver));
    }

    #[test]
    fn test_specialization_cost_thresholds() {
        let (mut m, f, _) = module(false, &[]);
        let estimator = DefaultInlineEstimator::default();

        let config = SpecializerConfig::default();
        let mut specializer = FunctionSpecializer::new(&config, &DefaultCostModel, &estimator);
        assert_eq!(specializer.specialization_cost(&m, f), None);

        let forced = SpecializerConfig {
            force_specialization: true,
            ..SpecializerConfig::default()
        };
        let mut specializer = FunctionSpecializer::new(&forced, &DefaultCostModel, &estimator);
        // cmp, br, add, add, ret, mul, ret
        assert_eq!(specializer.specialization_cost(&m, f), Some(7));

        m.function_mut(f).attrs |= FnAttrs::NO_INLINE;
        let mut specializer = FunctionSpecializer::new(&config, &DefaultCostModel, &estimator);
        assert_eq!(specializer.specialization_cost(&m, f), Some(7));
    }

    #[test]
    fn test_huge_profile_count_still_specializes() {
        let (mut m, f, main) = module(true, &[5, 6]);
        m.function_mut(f).block_mut(BlockId(2)).profile_count = Some(u64::MAX);
        let mut solver = seeded_solver(&m, f, main);
        let config = literal_config();
        let estimator = DefaultInlineEstimator::default();
        let mut specializer = FunctionSpecializer::new(&config, &DefaultCostModel, &estimator);

        assert!(specializer.run(&mut m, &mut solver));
        assert_eq!(specializer.num_specs_created(), 2);
    }

    fn find(
        specializer: &FunctionSpecializer<'_>,
        m: &Module,
        solver: &SccpSolver,
        f: FuncId,
    ) -> Vec<Spec> {
        let mut all_specs = Vec::new();
        let mut ranges = FxHashMap::default();
        let found = specializer.find_specializations(m, solver, f, 7, &mut all_specs, &mut ranges);
        assert_eq!(found, !all_specs.is_empty());
        if found {
            assert_eq!(ranges[&f], 0..all_specs.len());
        }
        all_specs
    }

    #[test]
    fn test_min_size_call_sites_are_skipped() {
        let (mut m, f, main) = module(true, &[5, 6]);
        let first = call(&m, main, 0);
        if let Some(c) = m.function_mut(main).inst_mut(first).kind.as_call_mut() {
            c.attrs |= CallAttrs::MIN_SIZE;
        }
        let solver = seeded_solver(&m, f, main);
        let config = literal_config();
        let estimator = DefaultInlineEstimator::default();
        let specializer = FunctionSpecializer::new(&config, &DefaultCostModel, &estimator);

        let specs = find(&specializer, &m, &solver, f);
        assert_eq!(specs.len(), 1);
        assert_eq!(specs[0].sig.args()[0].actual, Constant::i32(6));
        assert_eq!(
            specs[0].call_sites,
            vec![CallSiteRef { caller: main, inst: call(&m, main, 1) }]
        );
    }

    /// `main` calls internal `f(i32 %n)` with 5 and 6; the `else` arm of `f`
    /// calls `f(5)` again. `main` comes first so its calls are seen first.
    fn self_calling_module() -> (Module, FuncId, FuncId) {
        let mut m = Module::new("m");
        let main = m.add_function(Function::new("main", vec![], Type::Void));
        let mut f = Function::new("f", vec![Param::new("n", Type::I32)], Type::I32);
        f.linkage = Linkage::Internal;
        let f = m.add_function(f);
        {
            let mut b = FunctionBuilder::new(&mut m, f);
            b.block("entry");
            let then = b.add_block("then");
            let other = b.add_block("else");
            let c = b.cmp(CmpPredicate::Eq, Operand::arg(0), Constant::i32(5).into());
            b.cond_br(c, then, other);
            b.position_at_end(then);
            b.ret(Some(Operand::arg(0)));
            b.position_at_end(other);
            let r = b.call_direct(f, vec![Constant::i32(5).into()]);
            b.ret(Some(r));
        }
        {
            let mut b = FunctionBuilder::new(&mut m, main);
            b.block("entry");
            b.call_direct(f, vec![Constant::i32(5).into()]);
            b.call_direct(f, vec![Constant::i32(6).into()]);
            b.ret(None);
        }
        (m, f, main)
    }

    #[test]
    fn test_recursive_call_is_not_attached_to_seen_signature() {
        let (m, f, main) = self_calling_module();
        let solver = seeded_solver(&m, f, main);
        let config = SpecializerConfig {
            force_specialization: true,
            ..literal_config()
        };
        let estimator = DefaultInlineEstimator::default();
        let specializer = FunctionSpecializer::new(&config, &DefaultCostModel, &estimator);

        let specs = find(&specializer, &m, &solver, f);
        assert_eq!(specs.len(), 2);
        assert_eq!(specs[0].sig.args()[0].actual, Constant::i32(5));
        // `f(5)` inside `f` shares the signature but stays unattached.
        assert_eq!(
            specs[0].call_sites,
            vec![CallSiteRef { caller: main, inst: call(&m, main, 0) }]
        );
        assert_eq!(
            specs[1].call_sites,
            vec![CallSiteRef { caller: main, inst: call(&m, main, 1) }]
        );
    }

    #[test]
    fn test_constant_struct_return_reaches_callers() {
        let pair = Type::Struct(vec![Type::I32, Type::I32]);
        let konst = |a: i32, b: i32| {
            Operand::Const(Constant::Aggregate {
                ty: pair.clone(),
                elems: vec![Constant::i32(a), Constant::i32(b)],
            })
        };
        let mut m = Module::new("m");
        let mut f = Function::new("f", vec![Param::new("n", Type::I32)], pair.clone());
        f.linkage = Linkage::Internal;
        let f = m.add_function(f);
        {
            let mut b = FunctionBuilder::new(&mut m, f);
            b.block("entry");
            let then = b.add_block("then");
            let other = b.add_block("else");
            let c = b.cmp(CmpPredicate::Eq, Operand::arg(0), Constant::i32(5).into());
            b.cond_br(c, then, other);
            b.position_at_end(then);
            b.ret(Some(konst(1, 2)));
            b.position_at_end(other);
            b.ret(Some(konst(3, 4)));
        }
        let main = m.add_function(Function::new("main", vec![], Type::Void));
        {
            let mut b = FunctionBuilder::new(&mut m, main);
            b.block("entry");
            b.call_direct(f, vec![Constant::i32(5).into()]);
            b.call_direct(f, vec![Constant::i32(6).into()]);
            b.ret(None);
        }

        let mut solver = seeded_solver(&m, f, main);
        assert!(!solver.is_struct_lattice_constant(f));

        let config = SpecializerConfig {
            force_specialization: true,
            ..literal_config()
        };
        let estimator = DefaultInlineEstimator::default();
        let mut specializer = FunctionSpecializer::new(&config, &DefaultCostModel, &estimator);
        assert!(specializer.run(&mut m, &mut solver));

        let first = m.function_by_name("f.specialized.1").unwrap();
        assert!(solver.is_struct_lattice_constant(first));
        let fields = |a: i32, b: i32| {
            vec![
                LatticeValue::Constant(Constant::i32(a)),
                LatticeValue::Constant(Constant::i32(b)),
            ]
        };
        assert_eq!(
            solver.struct_lattice_value_for(main, ValueId::Inst(call(&m, main, 0))),
            fields(1, 2)
        );
        assert_eq!(
            solver.struct_lattice_value_for(main, ValueId::Inst(call(&m, main, 1))),
            fields(3, 4)
        );
    }
}
