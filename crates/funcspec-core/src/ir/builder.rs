//! Convenience builder for constructing function bodies.
//!
//! Used by tests and fixtures to write IR by hand. Value-producing helpers
//! return the result as an [`Operand`].

use super::constant::Constant;
use super::function::Function;
use super::inst::{
    BinaryOp, CallInst, CastOp, CmpPredicate, InstKind, Operand, UnaryOp, ValueId,
};
use super::module::Module;
use super::types::{FnType, Type};
use super::{BlockId, FuncId, InstId};

pub struct FunctionBuilder<'m> {
    module: &'m mut Module,
    func: FuncId,
    current: Option<BlockId>,
    last: Option<InstId>,
}

impl<'m> FunctionBuilder<'m> {
    pub fn new(module: &'m mut Module, func: FuncId) -> Self {
        Self {
            module,
            func,
            current: None,
            last: None,
        }
    }

    fn function(&mut self) -> &mut Function {
        self.module.function_mut(self.func)
    }

    pub fn func_id(&self) -> FuncId {
        self.func
    }

    /// Create a block and start inserting into it.
    pub fn block(&mut self, name: &str) -> BlockId {
        let id = self.add_block(name);
        self.current = Some(id);
        id
    }

    /// Create a block without moving the insertion point.
    pub fn add_block(&mut self, name: &str) -> BlockId {
        self.function().add_block(name)
    }

    pub fn position_at_end(&mut self, block: BlockId) {
        self.current = Some(block);
    }

    pub fn set_profile_count(&mut self, block: BlockId, count: u64) {
        self.function().block_mut(block).profile_count = Some(count);
    }

    /// The most recently emitted instruction.
    pub fn last_inst(&self) -> Option<InstId> {
        self.last
    }

    /// Give the most recently emitted instruction a name.
    pub fn name_last(&mut self, name: &str) {
        if let Some(id) = self.last {
            self.function().inst_mut(id).name = Some(name.to_string());
        }
    }

    pub fn operand_type(&self, op: &Operand) -> Type {
        self.module.function(self.func).operand_type(op)
    }

    /// Append `kind` at the insertion point.
    ///
    /// # Panics
    ///
    /// Panics if no block has been selected yet.
    pub fn emit(&mut self, kind: InstKind, ty: Type) -> Operand {
        let block = match self.current {
            Some(block) => block,
            None => panic!("FunctionBuilder: no insertion block selected"),
        };
        let id = self.function().append_inst(block, kind, ty, None);
        self.last = Some(id);
        Operand::Value(ValueId::Inst(id))
    }

    pub fn alloca(&mut self, ty: Type) -> Operand {
        self.emit(InstKind::Alloca { ty }, Type::Ptr)
    }

    pub fn load(&mut self, ty: Type, ptr: Operand) -> Operand {
        self.emit(
            InstKind::Load {
                ty: ty.clone(),
                ptr,
                volatile: false,
            },
            ty,
        )
    }

    pub fn store(&mut self, value: Operand, ptr: Operand) {
        self.emit(
            InstKind::Store {
                value,
                ptr,
                volatile: false,
            },
            Type::Void,
        );
    }

    pub fn gep(&mut self, source_ty: Type, ptr: Operand, indices: Vec<Operand>) -> Operand {
        self.emit(
            InstKind::Gep {
                source_ty,
                ptr,
                indices,
            },
            Type::Ptr,
        )
    }

    pub fn binary(&mut self, op: BinaryOp, lhs: Operand, rhs: Operand) -> Operand {
        let ty = self.operand_type(&lhs);
        self.emit(InstKind::Binary { op, lhs, rhs }, ty)
    }

    pub fn fneg(&mut self, operand: Operand) -> Operand {
        self.emit(
            InstKind::Unary {
                op: UnaryOp::FNeg,
                operand,
            },
            Type::Float,
        )
    }

    pub fn cast(&mut self, op: CastOp, value: Operand, to: Type) -> Operand {
        self.emit(
            InstKind::Cast {
                op,
                value,
                to: to.clone(),
            },
            to,
        )
    }

    pub fn cmp(&mut self, pred: CmpPredicate, lhs: Operand, rhs: Operand) -> Operand {
        self.emit(InstKind::Cmp { pred, lhs, rhs }, Type::I1)
    }

    pub fn select(&mut self, cond: Operand, if_true: Operand, if_false: Operand) -> Operand {
        let ty = self.operand_type(&if_true);
        self.emit(
            InstKind::Select {
                cond,
                if_true,
                if_false,
            },
            ty,
        )
    }

    /// Call a function of this module directly.
    pub fn call_direct(&mut self, callee: FuncId, args: Vec<Operand>) -> Operand {
        let fn_ty = self.module.function(callee).fn_type();
        self.call(CallInst::new(
            Operand::Const(Constant::Function(callee)),
            args,
            fn_ty,
        ))
    }

    /// Call through a function pointer.
    pub fn call_indirect(&mut self, callee: Operand, fn_ty: FnType, args: Vec<Operand>) -> Operand {
        self.call(CallInst::new(callee, args, fn_ty))
    }

    pub fn call(&mut self, call: CallInst) -> Operand {
        let ty = call.fn_ty.ret.clone();
        self.emit(InstKind::Call(call), ty)
    }

    pub fn invoke(&mut self, call: CallInst, normal: BlockId, unwind: BlockId) -> Operand {
        let ty = call.fn_ty.ret.clone();
        self.emit(
            InstKind::Invoke {
                call,
                normal,
                unwind,
            },
            ty,
        )
    }

    pub fn extract_value(&mut self, aggregate: Operand, index: u32) -> Operand {
        let ty = self
            .operand_type(&aggregate)
            .element_type(u64::from(index))
            .cloned()
            .unwrap_or(Type::Void);
        self.emit(InstKind::ExtractValue { aggregate, index }, ty)
    }

    pub fn phi(&mut self, ty: Type, incoming: Vec<(BlockId, Operand)>) -> Operand {
        self.emit(InstKind::Phi { incoming }, ty)
    }

    pub fn ssa_copy(&mut self, value: Operand) -> Operand {
        let ty = self.operand_type(&value);
        self.emit(InstKind::SsaCopy { value }, ty)
    }

    pub fn br(&mut self, target: BlockId) {
        self.emit(InstKind::Br { target }, Type::Void);
    }

    pub fn cond_br(&mut self, cond: Operand, if_true: BlockId, if_false: BlockId) {
        self.emit(
            InstKind::CondBr {
                cond,
                if_true,
                if_false,
            },
            Type::Void,
        );
    }

    pub fn switch(&mut self, cond: Operand, default: BlockId, cases: Vec<(Constant, BlockId)>) {
        self.emit(
            InstKind::Switch {
                cond,
                default,
                cases,
            },
            Type::Void,
        );
    }

    pub fn ret(&mut self, value: Option<Operand>) {
        self.emit(InstKind::Ret { value }, Type::Void);
    }

    pub fn unreachable(&mut self) {
        self.emit(InstKind::Unreachable, Type::Void);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::Param;

    #[test]
    fn test_builder_infers_result_types() {
        let mut m = Module::new("m");
        let f = m.add_function(Function::new(
            "f",
            vec![Param::new("x", Type::I32)],
            Type::I32,
        ));
        let mut b = FunctionBuilder::new(&mut m, f);
        let entry = b.block("entry");
        let exit = b.add_block("exit");
        let sum = b.binary(BinaryOp::Add, Operand::arg(0), Constant::i32(1).into());
        b.name_last("sum");
        let cond = b.cmp(CmpPredicate::Eq, sum.clone(), Constant::i32(3).into());
        b.cond_br(cond.clone(), exit, exit);
        b.position_at_end(exit);
        b.ret(Some(sum.clone()));
        b.set_profile_count(entry, 10);

        assert_eq!(b.operand_type(&sum), Type::I32);
        assert_eq!(b.operand_type(&cond), Type::I1);
        let func = m.function(f);
        assert_eq!(func.successors(entry), vec![exit, exit]);
        assert_eq!(func.entry_count(), Some(10));
        assert_eq!(func.value_name(sum.as_value().unwrap()), "%sum");
    }
}
