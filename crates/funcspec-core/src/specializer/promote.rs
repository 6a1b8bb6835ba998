//! Promotion of constant stack slots passed to tracked functions.
//!
//! After one round of specialization a recursive function typically ends up
//! as
//!
//! ```text
//! define internal void @rec.specialized.1(ptr %p) {
//!   %slot = alloca i32
//!   store i32 2, ptr %slot
//!   call void @rec(ptr readonly %slot)
//! ```
//!
//! The stored value is a constant, but the solver cannot see through the
//! slot. Replacing `%slot` with the address of a fresh read-only global
//! holding `2` lets the next round specialize `@rec` on it.

use super::candidate::candidate_constant;
use crate::config::SpecializerConfig;
use crate::ir::{
    CallSiteRef, CastOp, Constant, FuncId, InstId, InstKind, Module, Operand, ParamAttrs, ValueId,
};
use crate::solver::Solver;
use tracing::debug;

/// Prefix of the globals created for promoted stack values.
pub const PROMOTED_GLOBAL_PREFIX: &str = "funcspec.arg";

/// Promote constant stack slots at every executable call of an
/// argument-tracked function. Returns the number of arguments rewritten.
pub fn promote_constant_stack_values(
    module: &mut Module,
    solver: &mut dyn Solver,
    config: &SpecializerConfig,
) -> usize {
    let mut promoted = 0;
    for func in module.function_ids() {
        if !solver.is_argument_tracked_function(func) {
            continue;
        }
        for site in module.call_sites_of(func) {
            let f = module.function(site.caller);
            let data = f.inst(site.inst);
            // Invokes are left alone.
            let InstKind::Call(call) = &data.kind else {
                continue;
            };
            if !solver.is_block_executable(site.caller, data.parent) {
                continue;
            }

            let mut rewrites = Vec::new();
            for (index, arg) in call.args.iter().enumerate() {
                if !only_reads_memory(module, site, func, index)
                    || !f.operand_type(arg).is_pointer()
                {
                    continue;
                }
                if let Some(c) = constant_stack_value(module, &*solver, config, site, arg) {
                    rewrites.push((index, c));
                }
            }
            if rewrites.is_empty() {
                continue;
            }

            for (index, c) in rewrites {
                let global = module.add_constant_global(PROMOTED_GLOBAL_PREFIX, c);
                debug!(
                    "FnSpecialization: Promoted stack value to @{} in {}",
                    module.global(global).name,
                    module.function(site.caller).name
                );
                module.set_call_arg(site, index, Operand::Const(Constant::global(global)));
                promoted += 1;
            }
            solver.visit_call(site);
        }
    }
    promoted
}

/// Whether the callee only reads through argument `index` of `site`.
fn only_reads_memory(module: &Module, site: CallSiteRef, callee: FuncId, index: usize) -> bool {
    let Some(call) = module.call_inst(site) else {
        return false;
    };
    if call.arg_attr(index).contains(ParamAttrs::READONLY) {
        return true;
    }
    let callee = module.function(callee);
    callee.only_reads_memory()
        || callee
            .params
            .get(index)
            .is_some_and(|p| p.attrs.contains(ParamAttrs::READONLY))
}

/// The integer constant `value` holds: either literally, or as the single
/// value ever stored into an integer stack slot.
pub fn constant_stack_value(
    module: &Module,
    solver: &dyn Solver,
    config: &SpecializerConfig,
    site: CallSiteRef,
    value: &Operand,
) -> Option<Constant> {
    let f = module.function(site.caller);
    match f.strip_pointer_casts(value) {
        Operand::Const(c @ Constant::Int { .. }) => Some(c.clone()),
        Operand::Value(ValueId::Inst(id)) => match &f.inst(*id).kind {
            InstKind::Alloca { ty } if ty.is_integer() => {
                promotable_alloca(module, solver, config, site, *id)
            }
            _ => None,
        },
        _ => None,
    }
}

/// The constant stored into `alloca` if its only uses are one non-volatile
/// store and the call at `site` (possibly through a single-use bitcast).
fn promotable_alloca(
    module: &Module,
    solver: &dyn Solver,
    config: &SpecializerConfig,
    site: CallSiteRef,
    alloca: InstId,
) -> Option<Constant> {
    let f = module.function(site.caller);
    let du = f.def_use();
    let slot = ValueId::Inst(alloca);
    let mut stored = None;
    for &user in du.users(slot) {
        if user == site.inst {
            continue;
        }
        match &f.inst(user).kind {
            InstKind::Cast {
                op: CastOp::BitCast,
                ..
            } => {
                if du.users(ValueId::Inst(user)) != std::slice::from_ref(&site.inst) {
                    return None;
                }
            }
            InstKind::Store {
                value,
                ptr,
                volatile,
            } => {
                if stored.is_some() || *volatile || !ptr.is_value(slot) {
                    return None;
                }
                stored = Some(value);
            }
            _ => return None,
        }
    }
    candidate_constant(module, solver, config, site.caller, stored?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{BlockId, CallInst, Function, FunctionBuilder, Linkage, Param, Type};
    use crate::solver::SccpSolver;

    /// `caller` stores `stored` into a slot and passes it to tracked `sink`.
    fn module(readonly: bool, extra_store: bool) -> (Module, FuncId, FuncId) {
        let mut m = Module::new("m");
        let attrs = if readonly {
            ParamAttrs::READONLY
        } else {
            ParamAttrs::empty()
        };
        let mut sink = Function::new(
            "sink",
            vec![Param::new("p", Type::Ptr).with_attrs(attrs)],
            Type::I32,
        );
        sink.linkage = Linkage::Internal;
        let sink = m.add_function(sink);
        {
            let mut b = FunctionBuilder::new(&mut m, sink);
            b.block("entry");
            let v = b.load(Type::I32, Operand::arg(0));
            b.ret(Some(v));
        }
        let caller = m.add_function(Function::new("caller", vec![], Type::I32));
        {
            let mut b = FunctionBuilder::new(&mut m, caller);
            b.block("entry");
            let slot = b.alloca(Type::I32);
            b.store(Constant::i32(42).into(), slot.clone());
            if extra_store {
                b.store(Constant::i32(43).into(), slot.clone());
            }
            let r = b.call(CallInst::new(
                Operand::Const(Constant::Function(sink)),
                vec![slot],
                crate::ir::FnType::new(vec![Type::Ptr], Type::I32),
            ));
            b.ret(Some(r));
        }
        (m, sink, caller)
    }

    fn run(m: &mut Module, sink: FuncId, caller: FuncId) -> (usize, SccpSolver) {
        let mut solver = SccpSolver::new();
        solver.add_argument_tracked_function(sink);
        solver.add_tracked_function(sink);
        solver.mark_block_executable(caller, BlockId::ENTRY);
        solver.solve_while_resolved_undefs(m);
        let n = promote_constant_stack_values(m, &mut solver, &SpecializerConfig::default());
        (n, solver)
    }

    #[test]
    fn test_single_store_slot_is_promoted() {
        let (mut m, sink, caller) = module(true, false);
        let (n, _) = run(&mut m, sink, caller);
        assert_eq!(n, 1);
        let global = m.lookup_global("funcspec.arg.1").unwrap();
        assert!(m.global(global).is_constant);
        assert_eq!(m.global(global).initializer, Some(Constant::i32(42)));

        let site = m.call_sites_of(sink)[0];
        let call = m.call_inst(site).unwrap();
        assert_eq!(call.args[0], Operand::Const(Constant::global(global)));
    }

    #[test]
    fn test_writable_or_multiply_stored_slots_stay() {
        let (mut m, sink, caller) = module(false, false);
        assert_eq!(run(&mut m, sink, caller).0, 0);

        let (mut m, sink, caller) = module(true, true);
        assert_eq!(run(&mut m, sink, caller).0, 0);
        assert!(m.global_by_name("funcspec.arg.1").is_none());
    }
}
