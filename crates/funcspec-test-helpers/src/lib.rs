//! Fixture modules for FuncSpec tests
//!
//! Each builder returns a freshly constructed [`Module`] exhibiting one
//! specialization scenario. Function and global names are fixed so tests can
//! look them up by name.

use funcspec_core::analysis::{DefaultCostModel, DefaultInlineEstimator};
use funcspec_core::ir::{
    BinaryOp, CmpPredicate, Constant, FnType, Function, FunctionBuilder, Global, Linkage, Module,
    Operand, Param, ParamAttrs, Type,
};
use funcspec_core::{run_specialization, SpecializationReport, SpecializerConfig};

/// Run the pipeline with the default cost model and inline estimator.
pub fn specialize(module: &mut Module, config: &SpecializerConfig) -> SpecializationReport {
    run_specialization(
        module,
        config,
        &DefaultCostModel,
        &DefaultInlineEstimator::default(),
    )
}

/// Defaults, plus literal specialization and no size threshold.
pub fn literal_config() -> SpecializerConfig {
    SpecializerConfig {
        specialize_literal_constants: true,
        min_function_size: 0,
        ..SpecializerConfig::default()
    }
}

/// Names of the functions called directly from `caller`, in program order.
///
/// Indirect calls show up as `"<indirect>"`.
pub fn callees(module: &Module, caller: &str) -> Vec<String> {
    let Some(id) = module.function_by_name(caller) else {
        return Vec::new();
    };
    let f = module.function(id);
    f.block_ids()
        .flat_map(|b| f.block(b).insts.iter().copied())
        .filter_map(|inst| f.inst(inst).kind.as_call())
        .map(|call| match call.called_function() {
            Some(callee) => module
                .get_function(callee)
                .map_or_else(|| "<erased>".to_string(), |g| g.name.clone()),
            None => "<indirect>".to_string(),
        })
        .collect()
}

/// Names of all clones in the module, in creation order.
pub fn clone_names(module: &Module) -> Vec<String> {
    module
        .functions()
        .filter(|(_, f)| f.name.contains(".specialized."))
        .map(|(_, f)| f.name.clone())
        .collect()
}

/// `f(ptr %p)` reads `*p` twice in a hot block and adds `padding` to the sum
/// one instruction at a time; `main` calls it with the constant globals
/// `@a = 10` and `@b = 20`.
pub fn two_globals_module(padding: usize) -> Module {
    let mut m = Module::new("two_globals");
    let a = m.add_global(Global::constant("a", Constant::i32(10)));
    let b_global = m.add_global(Global::constant("b", Constant::i32(20)));

    let mut f = Function::new(
        "f",
        vec![Param::new("p", Type::Ptr).with_attrs(ParamAttrs::READONLY)],
        Type::I32,
    );
    f.linkage = Linkage::Internal;
    let f = m.add_function(f);
    {
        let mut b = FunctionBuilder::new(&mut m, f);
        let entry = b.block("entry");
        let body = b.add_block("body");
        b.br(body);
        b.position_at_end(body);
        let x = b.load(Type::I32, Operand::arg(0));
        let y = b.load(Type::I32, Operand::arg(0));
        let mut acc = b.binary(BinaryOp::Add, x, y);
        for _ in 0..padding {
            acc = b.binary(BinaryOp::Add, acc, Constant::i32(1).into());
        }
        b.ret(Some(acc));
        b.set_profile_count(entry, 1);
        b.set_profile_count(body, 1000);
    }

    let main = m.add_function(Function::new("main", vec![], Type::Void));
    {
        let mut b = FunctionBuilder::new(&mut m, main);
        b.block("entry");
        b.call_direct(f, vec![Constant::global(a).into()]);
        b.call_direct(f, vec![Constant::global(b_global).into()]);
        b.ret(None);
    }
    m
}

/// External `g(ptr %fp)` calls `fp(1)` with signature `i32 (i32)`; `main`
/// calls `g(@h)`. When `matching` is false `h` takes an `i64` instead, so the
/// indirect call cannot be promoted to it.
pub fn function_pointer_module(matching: bool) -> Module {
    let mut m = Module::new("function_pointer");
    let param_ty = if matching { Type::I32 } else { Type::I64 };

    let h = m.add_function(Function::new(
        "h",
        vec![Param::new("x", param_ty.clone())],
        param_ty.clone(),
    ));
    {
        let mut b = FunctionBuilder::new(&mut m, h);
        b.block("entry");
        let one = Constant::int(param_ty.int_bits().unwrap_or(32), 1);
        let r = b.binary(BinaryOp::Add, Operand::arg(0), one.into());
        b.ret(Some(r));
    }

    let g = m.add_function(Function::new(
        "g",
        vec![Param::new("fp", Type::Ptr)],
        Type::I32,
    ));
    {
        let mut b = FunctionBuilder::new(&mut m, g);
        b.block("entry");
        let r = b.call_indirect(
            Operand::arg(0),
            FnType::new(vec![Type::I32], Type::I32),
            vec![Constant::i32(1).into()],
        );
        b.ret(Some(r));
    }

    let main = m.add_function(Function::new("main", vec![], Type::I32));
    {
        let mut b = FunctionBuilder::new(&mut m, main);
        b.block("entry");
        let r = b.call_direct(g, vec![Constant::Function(h).into()]);
        b.ret(Some(r));
    }
    m
}

/// Internal `f(i32 %n)`: `if (n == 5) { n + 1 + 1 } else { n * 3 }` with
/// hot arms, called from `main` once per entry of `actuals`.
pub fn branch_module(actuals: &[i32]) -> Module {
    let mut m = Module::new("branch");
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
        b.set_profile_count(entry, 1);
        b.set_profile_count(then, 100);
        b.set_profile_count(other, 100);
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
    m
}

/// Internal `rec(ptr readonly %p)`: while `*p < 4`, store `*p + 1` into a
/// stack slot and recurse on the slot's address. `main` starts the recursion
/// with `@start = 1`.
pub fn recursive_module() -> Module {
    let mut m = Module::new("recursive");
    let start = m.add_global(Global::constant("start", Constant::i32(1)));

    let mut rec = Function::new(
        "rec",
        vec![Param::new("p", Type::Ptr).with_attrs(ParamAttrs::READONLY)],
        Type::Void,
    );
    rec.linkage = Linkage::Internal;
    let rec = m.add_function(rec);
    {
        let mut b = FunctionBuilder::new(&mut m, rec);
        b.block("entry");
        let recurse = b.add_block("recurse");
        let done = b.add_block("done");
        let slot = b.alloca(Type::I32);
        b.name_last("slot");
        let v = b.load(Type::I32, Operand::arg(0));
        b.name_last("v");
        let c = b.cmp(CmpPredicate::Slt, v.clone(), Constant::i32(4).into());
        b.cond_br(c, recurse, done);
        b.position_at_end(recurse);
        let next = b.binary(BinaryOp::Add, v, Constant::i32(1).into());
        b.name_last("next");
        b.store(next, slot.clone());
        b.call_direct(rec, vec![slot]);
        b.br(done);
        b.position_at_end(done);
        b.ret(None);
    }

    let main = m.add_function(Function::new("main", vec![], Type::I32));
    {
        let mut b = FunctionBuilder::new(&mut m, main);
        b.block("entry");
        b.call_direct(rec, vec![Constant::global(start).into()]);
        b.ret(Some(Constant::i32(0).into()));
    }
    m
}

/// The actual argument `index` of the call number `nth` inside `caller`.
pub fn call_arg(module: &Module, caller: &str, nth: usize, index: usize) -> Option<Operand> {
    let id = module.function_by_name(caller)?;
    let f = module.function(id);
    f.block_ids()
        .flat_map(|b| f.block(b).insts.iter().copied())
        .filter_map(|inst| f.inst(inst).kind.as_call())
        .nth(nth)
        .and_then(|call| call.args.get(index).cloned())
}

