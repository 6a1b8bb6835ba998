//! Instructions and operands.

use super::constant::Constant;
use super::function::ParamAttrs;
use super::types::{FnType, Type};
use super::{BlockId, FuncId, InstId};
use bitflags::bitflags;
use serde::{Deserialize, Serialize};

/// A function-local SSA value: a formal argument or an instruction result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ValueId {
    Arg(u32),
    Inst(InstId),
}

/// An instruction operand.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Operand {
    Value(ValueId),
    Const(Constant),
}

impl Operand {
    pub fn arg(index: u32) -> Self {
        Operand::Value(ValueId::Arg(index))
    }

    pub fn inst(id: InstId) -> Self {
        Operand::Value(ValueId::Inst(id))
    }

    pub fn as_value(&self) -> Option<ValueId> {
        match self {
            Operand::Value(v) => Some(*v),
            Operand::Const(_) => None,
        }
    }

    pub fn as_const(&self) -> Option<&Constant> {
        match self {
            Operand::Const(c) => Some(c),
            Operand::Value(_) => None,
        }
    }

    pub fn is_value(&self, value: ValueId) -> bool {
        matches!(self, Operand::Value(v) if *v == value)
    }
}

impl From<Constant> for Operand {
    fn from(c: Constant) -> Self {
        Operand::Const(c)
    }
}

impl From<ValueId> for Operand {
    fn from(v: ValueId) -> Self {
        Operand::Value(v)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    UDiv,
    SDiv,
    URem,
    SRem,
    Shl,
    LShr,
    AShr,
    And,
    Or,
    Xor,
    FAdd,
    FSub,
    FMul,
    FDiv,
    FRem,
}

impl BinaryOp {
    pub fn name(self) -> &'static str {
        match self {
            BinaryOp::Add => "add",
            BinaryOp::Sub => "sub",
            BinaryOp::Mul => "mul",
            BinaryOp::UDiv => "udiv",
            BinaryOp::SDiv => "sdiv",
            BinaryOp::URem => "urem",
            BinaryOp::SRem => "srem",
            BinaryOp::Shl => "shl",
            BinaryOp::LShr => "lshr",
            BinaryOp::AShr => "ashr",
            BinaryOp::And => "and",
            BinaryOp::Or => "or",
            BinaryOp::Xor => "xor",
            BinaryOp::FAdd => "fadd",
            BinaryOp::FSub => "fsub",
            BinaryOp::FMul => "fmul",
            BinaryOp::FDiv => "fdiv",
            BinaryOp::FRem => "frem",
        }
    }

    pub fn is_division(self) -> bool {
        matches!(
            self,
            BinaryOp::UDiv
                | BinaryOp::SDiv
                | BinaryOp::URem
                | BinaryOp::SRem
                | BinaryOp::FDiv
                | BinaryOp::FRem
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum UnaryOp {
    FNeg,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CastOp {
    Trunc,
    ZExt,
    SExt,
    BitCast,
    SIToFP,
    FPToSI,
    PtrToInt,
    IntToPtr,
}

impl CastOp {
    pub fn name(self) -> &'static str {
        match self {
            CastOp::Trunc => "trunc",
            CastOp::ZExt => "zext",
            CastOp::SExt => "sext",
            CastOp::BitCast => "bitcast",
            CastOp::SIToFP => "sitofp",
            CastOp::FPToSI => "fptosi",
            CastOp::PtrToInt => "ptrtoint",
            CastOp::IntToPtr => "inttoptr",
        }
    }
}

/// Comparison predicate; integer, pointer and ordered float comparisons share one enum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CmpPredicate {
    Eq,
    Ne,
    Ugt,
    Uge,
    Ult,
    Ule,
    Sgt,
    Sge,
    Slt,
    Sle,
    FOeq,
    FOne,
    FOgt,
    FOge,
    FOlt,
    FOle,
}

impl CmpPredicate {
    pub fn name(self) -> &'static str {
        match self {
            CmpPredicate::Eq => "icmp eq",
            CmpPredicate::Ne => "icmp ne",
            CmpPredicate::Ugt => "icmp ugt",
            CmpPredicate::Uge => "icmp uge",
            CmpPredicate::Ult => "icmp ult",
            CmpPredicate::Ule => "icmp ule",
            CmpPredicate::Sgt => "icmp sgt",
            CmpPredicate::Sge => "icmp sge",
            CmpPredicate::Slt => "icmp slt",
            CmpPredicate::Sle => "icmp sle",
            CmpPredicate::FOeq => "fcmp oeq",
            CmpPredicate::FOne => "fcmp one",
            CmpPredicate::FOgt => "fcmp ogt",
            CmpPredicate::FOge => "fcmp oge",
            CmpPredicate::FOlt => "fcmp olt",
            CmpPredicate::FOle => "fcmp ole",
        }
    }
}

bitflags! {
    /// Attributes attached to one call site.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
    #[serde(transparent)]
    pub struct CallAttrs: u8 {
        /// The call site is optimized for minimum size.
        const MIN_SIZE = 1 << 0;
        /// The call must not be duplicated.
        const NO_DUPLICATE = 1 << 1;
    }
}

/// A direct or indirect call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallInst {
    pub callee: Operand,
    pub args: Vec<Operand>,
    /// Signature the call is made with.
    pub fn_ty: FnType,
    #[serde(default)]
    pub attrs: CallAttrs,
    /// Per-argument attributes; shorter than `args` when trailing entries are empty.
    #[serde(default)]
    pub arg_attrs: Vec<ParamAttrs>,
}

impl CallInst {
    pub fn new(callee: Operand, args: Vec<Operand>, fn_ty: FnType) -> Self {
        Self {
            callee,
            args,
            fn_ty,
            attrs: CallAttrs::empty(),
            arg_attrs: Vec::new(),
        }
    }

    /// The callee when it is literally a function address.
    pub fn called_function(&self) -> Option<FuncId> {
        match &self.callee {
            Operand::Const(Constant::Function(f)) => Some(*f),
            _ => None,
        }
    }

    pub fn arg_attr(&self, index: usize) -> ParamAttrs {
        self.arg_attrs.get(index).copied().unwrap_or_default()
    }
}

/// Instruction kinds. The set is closed: analyses match over it exhaustively.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum InstKind {
    Alloca {
        ty: Type,
    },
    Load {
        ty: Type,
        ptr: Operand,
        #[serde(default)]
        volatile: bool,
    },
    Store {
        value: Operand,
        ptr: Operand,
        #[serde(default)]
        volatile: bool,
    },
    /// Address computation. The first index strides over `source_ty`, the rest
    /// navigate into it.
    Gep {
        source_ty: Type,
        ptr: Operand,
        indices: Vec<Operand>,
    },
    Binary {
        op: BinaryOp,
        lhs: Operand,
        rhs: Operand,
    },
    Unary {
        op: UnaryOp,
        operand: Operand,
    },
    Cast {
        op: CastOp,
        value: Operand,
        to: Type,
    },
    Cmp {
        pred: CmpPredicate,
        lhs: Operand,
        rhs: Operand,
    },
    Select {
        cond: Operand,
        if_true: Operand,
        if_false: Operand,
    },
    Call(CallInst),
    ExtractValue {
        aggregate: Operand,
        index: u32,
    },
    Phi {
        incoming: Vec<(BlockId, Operand)>,
    },
    /// Renaming-only copy of a value.
    SsaCopy {
        value: Operand,
    },
    Br {
        target: BlockId,
    },
    CondBr {
        cond: Operand,
        if_true: BlockId,
        if_false: BlockId,
    },
    Switch {
        cond: Operand,
        default: BlockId,
        cases: Vec<(Constant, BlockId)>,
    },
    Ret {
        value: Option<Operand>,
    },
    Invoke {
        call: CallInst,
        normal: BlockId,
        unwind: BlockId,
    },
    Unreachable,
}

impl InstKind {
    pub fn is_terminator(&self) -> bool {
        matches!(
            self,
            InstKind::Br { .. }
                | InstKind::CondBr { .. }
                | InstKind::Switch { .. }
                | InstKind::Ret { .. }
                | InstKind::Invoke { .. }
                | InstKind::Unreachable
        )
    }

    /// Successor blocks of a terminator, in operand order (may repeat).
    pub fn successors(&self) -> Vec<BlockId> {
        match self {
            InstKind::Br { target } => vec![*target],
            InstKind::CondBr {
                if_true, if_false, ..
            } => vec![*if_true, *if_false],
            InstKind::Switch { default, cases, .. } => {
                let mut succs = Vec::with_capacity(cases.len() + 1);
                succs.push(*default);
                succs.extend(cases.iter().map(|(_, bb)| *bb));
                succs
            }
            InstKind::Invoke { normal, unwind, .. } => vec![*normal, *unwind],
            _ => Vec::new(),
        }
    }

    /// The call carried by a call or invoke.
    pub fn as_call(&self) -> Option<&CallInst> {
        match self {
            InstKind::Call(call) | InstKind::Invoke { call, .. } => Some(call),
            _ => None,
        }
    }

    pub fn as_call_mut(&mut self) -> Option<&mut CallInst> {
        match self {
            InstKind::Call(call) | InstKind::Invoke { call, .. } => Some(call),
            _ => None,
        }
    }

    pub fn operands(&self) -> Vec<&Operand> {
        match self {
            InstKind::Alloca { .. } | InstKind::Br { .. } | InstKind::Unreachable => Vec::new(),
            InstKind::Load { ptr, .. } => vec![ptr],
            InstKind::Store { value, ptr, .. } => vec![value, ptr],
            InstKind::Gep { ptr, indices, .. } => {
                let mut ops = vec![ptr];
                ops.extend(indices.iter());
                ops
            }
            InstKind::Binary { lhs, rhs, .. } | InstKind::Cmp { lhs, rhs, .. } => vec![lhs, rhs],
            InstKind::Unary { operand, .. } => vec![operand],
            InstKind::Cast { value, .. } | InstKind::SsaCopy { value } => vec![value],
            InstKind::Select {
                cond,
                if_true,
                if_false,
            } => vec![cond, if_true, if_false],
            InstKind::Call(call) | InstKind::Invoke { call, .. } => {
                let mut ops = vec![&call.callee];
                ops.extend(call.args.iter());
                ops
            }
            InstKind::ExtractValue { aggregate, .. } => vec![aggregate],
            InstKind::Phi { incoming } => incoming.iter().map(|(_, op)| op).collect(),
            InstKind::CondBr { cond, .. } | InstKind::Switch { cond, .. } => vec![cond],
            InstKind::Ret { value } => value.iter().collect(),
        }
    }

    pub fn operands_mut(&mut self) -> Vec<&mut Operand> {
        match self {
            InstKind::Alloca { .. } | InstKind::Br { .. } | InstKind::Unreachable => Vec::new(),
            InstKind::Load { ptr, .. } => vec![ptr],
            InstKind::Store { value, ptr, .. } => vec![value, ptr],
            InstKind::Gep { ptr, indices, .. } => {
                let mut ops = vec![ptr];
                ops.extend(indices.iter_mut());
                ops
            }
            InstKind::Binary { lhs, rhs, .. } | InstKind::Cmp { lhs, rhs, .. } => vec![lhs, rhs],
            InstKind::Unary { operand, .. } => vec![operand],
            InstKind::Cast { value, .. } | InstKind::SsaCopy { value } => vec![value],
            InstKind::Select {
                cond,
                if_true,
                if_false,
            } => vec![cond, if_true, if_false],
            InstKind::Call(call) | InstKind::Invoke { call, .. } => {
                let mut ops = vec![&mut call.callee];
                ops.extend(call.args.iter_mut());
                ops
            }
            InstKind::ExtractValue { aggregate, .. } => vec![aggregate],
            InstKind::Phi { incoming } => incoming.iter_mut().map(|(_, op)| op).collect(),
            InstKind::CondBr { cond, .. } | InstKind::Switch { cond, .. } => vec![cond],
            InstKind::Ret { value } => value.iter_mut().collect(),
        }
    }

    pub fn opcode_name(&self) -> &'static str {
        match self {
            InstKind::Alloca { .. } => "alloca",
            InstKind::Load { .. } => "load",
            InstKind::Store { .. } => "store",
            InstKind::Gep { .. } => "getelementptr",
            InstKind::Binary { op, .. } => op.name(),
            InstKind::Unary { .. } => "fneg",
            InstKind::Cast { op, .. } => op.name(),
            InstKind::Cmp { pred, .. } => pred.name(),
            InstKind::Select { .. } => "select",
            InstKind::Call(_) => "call",
            InstKind::ExtractValue { .. } => "extractvalue",
            InstKind::Phi { .. } => "phi",
            InstKind::SsaCopy { .. } => "ssa_copy",
            InstKind::Br { .. } | InstKind::CondBr { .. } => "br",
            InstKind::Switch { .. } => "switch",
            InstKind::Ret { .. } => "ret",
            InstKind::Invoke { .. } => "invoke",
            InstKind::Unreachable => "unreachable",
        }
    }
}

/// An instruction in a function's arena.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstData {
    pub kind: InstKind,
    /// Result type; `Void` for instructions that produce no value.
    pub ty: Type,
    /// Block the instruction was created in.
    pub parent: BlockId,
    #[serde(default)]
    pub name: Option<String>,
}
