//! Textual dump of a module in an LLVM-like syntax.
//!
//! The output is for humans (CLI `--emit text`, debug logs and snapshot
//! tests); there is no parser for it.

use super::constant::Constant;
use super::function::{Function, Linkage};
use super::inst::{InstKind, Operand};
use super::module::Module;
use super::{BlockId, InstId};
use std::fmt::{self, Write};

impl fmt::Display for Module {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "; module {}", self.name)?;
        for (_, global) in self.globals() {
            write!(
                f,
                "@{} = {}{} {}",
                global.name,
                linkage_prefix(global.linkage),
                if global.is_constant { "constant" } else { "global" },
                global.ty
            )?;
            if let Some(init) = &global.initializer {
                write!(f, " {}", constant_text(self, init))?;
            }
            writeln!(f)?;
        }
        for (_, func) in self.functions() {
            writeln!(f)?;
            f.write_str(&function_text(self, func))?;
        }
        Ok(())
    }
}

fn linkage_prefix(linkage: Linkage) -> &'static str {
    match linkage {
        Linkage::External => "",
        Linkage::Internal => "internal ",
    }
}

/// Render a constant, resolving function and global names through `module`.
pub fn constant_text(module: &Module, c: &Constant) -> String {
    match c {
        Constant::Int { bits: 1, value } => (if *value != 0 { "true" } else { "false" }).into(),
        Constant::Int { .. } => c.as_i64().unwrap_or_default().to_string(),
        Constant::Float(bits) => format!("{:?}", f64::from_bits(*bits)),
        Constant::Null => "null".into(),
        Constant::Undef(_) => "undef".into(),
        Constant::Poison(_) => "poison".into(),
        Constant::Function(id) => match module.get_function(*id) {
            Some(func) => format!("@{}", func.name),
            None => format!("@<erased {}>", id),
        },
        Constant::GlobalAddr { global, path } => {
            let name = &module.global(*global).name;
            if path.is_empty() {
                format!("@{}", name)
            } else {
                let path: Vec<String> = path.iter().map(|i| i.to_string()).collect();
                format!("@{}[{}]", name, path.join(", "))
            }
        }
        Constant::Aggregate { ty, elems } => {
            let elems: Vec<String> = elems
                .iter()
                .map(|e| format!("{} {}", e.ty(), constant_text(module, e)))
                .collect();
            if ty.is_struct() {
                format!("{{ {} }}", elems.join(", "))
            } else {
                format!("[{}]", elems.join(", "))
            }
        }
    }
}

fn operand_text(module: &Module, func: &Function, op: &Operand) -> String {
    match op {
        Operand::Value(v) => func.value_name(*v),
        Operand::Const(c) => constant_text(module, c),
    }
}

fn typed(module: &Module, func: &Function, op: &Operand) -> String {
    format!("{} {}", func.operand_type(op), operand_text(module, func, op))
}

fn label(func: &Function, block: BlockId) -> String {
    format!("label %{}", func.block(block).name)
}

/// Render one function definition or declaration.
pub fn function_text(module: &Module, func: &Function) -> String {
    let mut out = String::new();
    let params: Vec<String> = func
        .params
        .iter()
        .map(|p| format!("{} %{}", p.ty, p.name))
        .collect();
    let keyword = if func.is_declaration() { "declare" } else { "define" };
    let _ = write!(
        out,
        "{} {}{} @{}({})",
        keyword,
        linkage_prefix(func.linkage),
        func.ret_ty,
        func.name,
        params.join(", ")
    );
    if func.is_declaration() {
        out.push('\n');
        return out;
    }
    out.push_str(" {\n");
    for block in func.block_ids() {
        let data = func.block(block);
        let _ = write!(out, "{}:", data.name);
        if let Some(count) = data.profile_count {
            let _ = write!(out, " ; count {}", count);
        }
        out.push('\n');
        for &inst in &data.insts {
            let _ = writeln!(out, "  {}", inst_text(module, func, inst));
        }
    }
    out.push_str("}\n");
    out
}

fn inst_text(module: &Module, func: &Function, id: InstId) -> String {
    let inst = func.inst(id);
    let op = |o: &Operand| operand_text(module, func, o);
    let ty_op = |o: &Operand| typed(module, func, o);
    let body = match &inst.kind {
        InstKind::Alloca { ty } => format!("alloca {}", ty),
        InstKind::Load { ty, ptr, volatile } => format!(
            "load {}{}, {}",
            if *volatile { "volatile " } else { "" },
            ty,
            ty_op(ptr)
        ),
        InstKind::Store {
            value,
            ptr,
            volatile,
        } => format!(
            "store {}{}, {}",
            if *volatile { "volatile " } else { "" },
            ty_op(value),
            ty_op(ptr)
        ),
        InstKind::Gep {
            source_ty,
            ptr,
            indices,
        } => {
            let mut s = format!("getelementptr {}, {}", source_ty, ty_op(ptr));
            for idx in indices {
                let _ = write!(s, ", {}", ty_op(idx));
            }
            s
        }
        InstKind::Binary { op: bin, lhs, rhs } => {
            format!("{} {}, {}", bin.name(), ty_op(lhs), op(rhs))
        }
        InstKind::Unary { operand, .. } => format!("fneg {}", ty_op(operand)),
        InstKind::Cast { op: cast, value, to } => {
            format!("{} {} to {}", cast.name(), ty_op(value), to)
        }
        InstKind::Cmp { pred, lhs, rhs } => format!("{} {}, {}", pred.name(), ty_op(lhs), op(rhs)),
        InstKind::Select {
            cond,
            if_true,
            if_false,
        } => format!(
            "select {}, {}, {}",
            ty_op(cond),
            ty_op(if_true),
            ty_op(if_false)
        ),
        InstKind::Call(call) | InstKind::Invoke { call, .. } => {
            let args: Vec<String> = call.args.iter().map(|a| ty_op(a)).collect();
            let mut s = format!(
                "{} {} {}({})",
                inst.kind.opcode_name(),
                call.fn_ty.ret,
                op(&call.callee),
                args.join(", ")
            );
            if let InstKind::Invoke { normal, unwind, .. } = &inst.kind {
                let _ = write!(
                    s,
                    " to {} unwind {}",
                    label(func, *normal),
                    label(func, *unwind)
                );
            }
            s
        }
        InstKind::ExtractValue { aggregate, index } => {
            format!("extractvalue {}, {}", ty_op(aggregate), index)
        }
        InstKind::Phi { incoming } => {
            let arms: Vec<String> = incoming
                .iter()
                .map(|(bb, v)| format!("[ {}, %{} ]", op(v), func.block(*bb).name))
                .collect();
            format!("phi {} {}", inst.ty, arms.join(", "))
        }
        InstKind::SsaCopy { value } => format!("ssa_copy {}", ty_op(value)),
        InstKind::Br { target } => format!("br {}", label(func, *target)),
        InstKind::CondBr {
            cond,
            if_true,
            if_false,
        } => format!(
            "br {}, {}, {}",
            ty_op(cond),
            label(func, *if_true),
            label(func, *if_false)
        ),
        InstKind::Switch {
            cond,
            default,
            cases,
        } => {
            let arms: Vec<String> = cases
                .iter()
                .map(|(c, bb)| format!("{} {}, {}", c.ty(), constant_text(module, c), label(func, *bb)))
                .collect();
            format!(
                "switch {}, {} [ {} ]",
                ty_op(cond),
                label(func, *default),
                arms.join(" ")
            )
        }
        InstKind::Ret { value: Some(v) } => format!("ret {}", ty_op(v)),
        InstKind::Ret { value: None } => "ret void".into(),
        InstKind::Unreachable => "unreachable".into(),
    };
    if inst.ty.is_void() {
        body
    } else {
        format!(
            "{} = {}",
            func.value_name(super::inst::ValueId::Inst(id)),
            body
        )
    }
}
