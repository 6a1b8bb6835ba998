//! Which functions, arguments and actual values are worth specializing on.

use crate::config::SpecializerConfig;
use crate::ir::{
    BlockId, Constant, FnAttrs, FuncId, Module, Operand, ParamAttrs, ValueId,
};
use crate::solver::{LatticeValue, Solver};
use rustc_hash::FxHashSet;
use tracing::debug;

/// Whether `func` may be cloned at all.
pub fn is_candidate_function(
    module: &Module,
    solver: &dyn Solver,
    specializations: &FxHashSet<FuncId>,
    func: FuncId,
) -> bool {
    let f = module.function(func);
    if f.is_declaration() || f.params.is_empty() {
        return false;
    }
    if f.attrs.contains(FnAttrs::NO_DUPLICATE) {
        return false;
    }
    // Clones are never specialized again.
    if specializations.contains(&func) {
        return false;
    }
    if f.attrs.intersects(FnAttrs::OPT_SIZE | FnAttrs::MIN_SIZE) {
        return false;
    }
    if !solver.is_block_executable(func, BlockId::ENTRY) {
        return false;
    }
    if f.attrs.contains(FnAttrs::ALWAYS_INLINE) {
        return false;
    }
    debug!("FnSpecialization: Try function: {}", f.name);
    true
}

/// Whether formal `index` of `func` could profit from being bound to a
/// constant.
pub fn is_argument_interesting(
    module: &Module,
    solver: &dyn Solver,
    config: &SpecializerConfig,
    func: FuncId,
    index: u32,
) -> bool {
    let f = module.function(func);
    let param = &f.params[index as usize];
    let arg = ValueId::Arg(index);
    if !f.def_use().has_users(arg) {
        return false;
    }

    let ty = &param.ty;
    let literal = ty.is_integer() || ty.is_float() || ty.is_struct();
    if !ty.is_pointer() && !(config.specialize_literal_constants && literal) {
        return false;
    }

    // Stack copies made for by-value arguments are invisible to the solver.
    if param.attrs.contains(ParamAttrs::BYVAL) && !f.only_reads_memory() {
        return false;
    }

    if !solver.is_argument_tracked_function(func) {
        return true;
    }

    let overdefined = if ty.is_struct() {
        solver
            .struct_lattice_value_for(func, arg)
            .iter()
            .any(LatticeValue::is_overdefined)
    } else {
        solver.lattice_value_for(func, arg).is_overdefined()
    };
    if overdefined {
        debug!(
            "FnSpecialization: Found interesting parameter {}",
            f.value_name(arg)
        );
    } else {
        debug!(
            "FnSpecialization: Nothing to do, parameter {} is already constant",
            f.value_name(arg)
        );
    }
    overdefined
}

/// The constant an actual argument of a call in `caller` is known to hold.
///
/// Poison never qualifies. Addresses inside a mutable global are rejected
/// unless `specialize_on_address` is set.
pub fn candidate_constant(
    module: &Module,
    solver: &dyn Solver,
    config: &SpecializerConfig,
    caller: FuncId,
    value: &Operand,
) -> Option<Constant> {
    let c = match value {
        Operand::Const(c) if c.is_poison() => return None,
        Operand::Const(c) => c.clone(),
        Operand::Value(v) => solver.constant_or_null(caller, *v)?,
    };
    if let Some(global) = c.underlying_global() {
        if !module.global(global).is_constant && !config.specialize_on_address {
            return None;
        }
    }
    Some(c)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{Function, FunctionBuilder, Global, Linkage, Param, Type};
    use crate::solver::SccpSolver;

    struct Fixture {
        module: Module,
        solver: SccpSolver,
        callee: FuncId,
        caller: FuncId,
    }

    /// `callee(ptr %p, i32 %n, ptr %unused)` called from external `caller`.
    fn fixture(attrs: FnAttrs) -> Fixture {
        let mut module = Module::new("m");
        let mut callee = Function::new(
            "callee",
            vec![
                Param::new("p", Type::Ptr),
                Param::new("n", Type::I32),
                Param::new("unused", Type::Ptr),
            ],
            Type::I32,
        );
        callee.linkage = Linkage::Internal;
        callee.attrs = attrs;
        let callee = module.add_function(callee);
        {
            let mut b = FunctionBuilder::new(&mut module, callee);
            b.block("entry");
            let v = b.load(Type::I32, Operand::arg(0));
            let s = b.binary(crate::ir::BinaryOp::Add, v, Operand::arg(1));
            b.ret(Some(s));
        }
        let caller = module.add_function(Function::new(
            "caller",
            vec![Param::new("x", Type::Ptr)],
            Type::I32,
        ));
        {
            let mut b = FunctionBuilder::new(&mut module, caller);
            b.block("entry");
            let r = b.call_direct(
                callee,
                vec![
                    Operand::arg(0),
                    Constant::i32(1).into(),
                    Operand::Const(Constant::Null),
                ],
            );
            b.ret(Some(r));
        }
        let mut solver = SccpSolver::new();
        solver.add_argument_tracked_function(callee);
        solver.add_tracked_function(callee);
        solver.mark_block_executable(caller, BlockId::ENTRY);
        solver.solve_while_resolved_undefs(&module);
        Fixture {
            module,
            solver,
            callee,
            caller,
        }
    }

    #[test]
    fn test_candidate_function_filters() {
        let fx = fixture(FnAttrs::empty());
        let none = FxHashSet::default();
        assert!(is_candidate_function(&fx.module, &fx.solver, &none, fx.callee));

        let clones: FxHashSet<FuncId> = [fx.callee].into_iter().collect();
        assert!(!is_candidate_function(&fx.module, &fx.solver, &clones, fx.callee));

        for attrs in [FnAttrs::OPT_SIZE, FnAttrs::ALWAYS_INLINE, FnAttrs::NO_DUPLICATE] {
            let fx = fixture(attrs);
            assert!(!is_candidate_function(&fx.module, &fx.solver, &none, fx.callee));
        }
    }

    #[test]
    fn test_argument_interest() {
        let fx = fixture(FnAttrs::empty());
        let config = SpecializerConfig::default();
        assert!(is_argument_interesting(&fx.module, &fx.solver, &config, fx.callee, 0));
        // Integers need literal-constant specialization.
        assert!(!is_argument_interesting(&fx.module, &fx.solver, &config, fx.callee, 1));
        // Unused.
        assert!(!is_argument_interesting(&fx.module, &fx.solver, &config, fx.callee, 2));

        let literal = SpecializerConfig {
            specialize_literal_constants: true,
            ..SpecializerConfig::default()
        };
        // `n` is 1 at the only call site, so the solver already knows it.
        assert!(!is_argument_interesting(&fx.module, &fx.solver, &literal, fx.callee, 1));
        // Untracked functions have every argument overdefined.
        assert!(is_argument_interesting(&fx.module, &fx.solver, &literal, fx.caller, 0));
    }

    #[test]
    fn test_by_value_pointer_needs_read_only_callee() {
        let mut fx = fixture(FnAttrs::empty());
        let config = SpecializerConfig::default();
        fx.module.function_mut(fx.callee).params[0].attrs = ParamAttrs::BYVAL;
        assert!(!is_argument_interesting(&fx.module, &fx.solver, &config, fx.callee, 0));

        fx.module.function_mut(fx.callee).attrs = FnAttrs::READ_ONLY;
        assert!(is_argument_interesting(&fx.module, &fx.solver, &config, fx.callee, 0));
    }

    #[test]
    fn test_candidate_constant_rejects_mutable_globals() {
        let mut fx = fixture(FnAttrs::empty());
        let mutable = fx
            .module
            .add_global(Global::variable("counter", Type::I32, Some(Constant::i32(0))));
        let frozen = fx.module.add_global(Global::constant("ten", Constant::i32(10)));
        let config = SpecializerConfig::default();
        let pick = |c: Constant, config: &SpecializerConfig| {
            candidate_constant(&fx.module, &fx.solver, config, fx.caller, &Operand::Const(c))
        };

        assert_eq!(pick(Constant::global(frozen), &config), Some(Constant::global(frozen)));
        assert_eq!(pick(Constant::global(mutable), &config), None);
        let on_address = SpecializerConfig {
            specialize_on_address: true,
            ..SpecializerConfig::default()
        };
        assert!(pick(Constant::global(mutable), &on_address).is_some());
        assert_eq!(pick(Constant::Poison(Type::I32), &config), None);
        assert_eq!(pick(Constant::Null, &config), Some(Constant::Null));
        // A formal of an untracked function resolves to nothing.
        assert_eq!(
            candidate_constant(&fx.module, &fx.solver, &config, fx.caller, &Operand::arg(0)),
            None
        );
    }
}
