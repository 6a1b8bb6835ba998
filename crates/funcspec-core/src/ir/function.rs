//! Functions, basic blocks and parameters.

use super::def_use::DefUse;
use super::inst::{CastOp, InstData, InstKind, Operand, ValueId};
use super::types::{FnType, Type};
use super::{BlockId, InstId};
use bitflags::bitflags;
use serde::{Deserialize, Serialize};

bitflags! {
    /// Function-level attributes.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
    #[serde(transparent)]
    pub struct FnAttrs: u16 {
        /// The body must not be duplicated.
        const NO_DUPLICATE = 1 << 0;
        /// Optimize for size.
        const OPT_SIZE = 1 << 1;
        /// Optimize for minimum size.
        const MIN_SIZE = 1 << 2;
        const ALWAYS_INLINE = 1 << 3;
        const NO_INLINE = 1 << 4;
        /// The function only reads memory.
        const READ_ONLY = 1 << 5;
    }
}

bitflags! {
    /// Parameter attributes, also used for per-argument call-site attributes.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
    #[serde(transparent)]
    pub struct ParamAttrs: u8 {
        /// Aggregate passed by value through a hidden stack copy.
        const BYVAL = 1 << 0;
        /// The pointee is only read through this pointer.
        const READONLY = 1 << 1;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Linkage {
    #[default]
    External,
    Internal,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Param {
    pub name: String,
    pub ty: Type,
    #[serde(default)]
    pub attrs: ParamAttrs,
}

impl Param {
    pub fn new(name: impl Into<String>, ty: Type) -> Self {
        Self {
            name: name.into(),
            ty,
            attrs: ParamAttrs::empty(),
        }
    }

    pub fn with_attrs(mut self, attrs: ParamAttrs) -> Self {
        self.attrs = attrs;
        self
    }
}

/// A basic block: a straight-line list of instructions ending in a terminator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Block {
    pub name: String,
    pub insts: Vec<InstId>,
    /// Profile execution count, when profile data is available.
    #[serde(default)]
    pub profile_count: Option<u64>,
}

/// A function definition, or a declaration when it has no blocks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Function {
    pub name: String,
    pub params: Vec<Param>,
    pub ret_ty: Type,
    #[serde(default)]
    pub attrs: FnAttrs,
    #[serde(default)]
    pub linkage: Linkage,
    #[serde(default)]
    pub blocks: Vec<Block>,
    /// Instruction arena; instructions detached from every block stay here unused.
    #[serde(default)]
    pub insts: Vec<InstData>,
}

impl Function {
    pub fn new(name: impl Into<String>, params: Vec<Param>, ret_ty: Type) -> Self {
        Self {
            name: name.into(),
            params,
            ret_ty,
            attrs: FnAttrs::empty(),
            linkage: Linkage::External,
            blocks: Vec::new(),
            insts: Vec::new(),
        }
    }

    pub fn is_declaration(&self) -> bool {
        self.blocks.is_empty()
    }

    pub fn entry_block(&self) -> Option<BlockId> {
        (!self.blocks.is_empty()).then_some(BlockId::ENTRY)
    }

    pub fn fn_type(&self) -> FnType {
        FnType::new(self.params.iter().map(|p| p.ty.clone()).collect(), self.ret_ty.clone())
    }

    pub fn only_reads_memory(&self) -> bool {
        self.attrs.contains(FnAttrs::READ_ONLY)
    }

    /// Profile count of the entry block, if the function carries profile data.
    pub fn entry_count(&self) -> Option<u64> {
        self.blocks.first().and_then(|b| b.profile_count)
    }

    pub fn block(&self, id: BlockId) -> &Block {
        &self.blocks[id.index()]
    }

    pub fn block_mut(&mut self, id: BlockId) -> &mut Block {
        &mut self.blocks[id.index()]
    }

    pub fn block_ids(&self) -> impl Iterator<Item = BlockId> + '_ {
        (0..self.blocks.len() as u32).map(BlockId)
    }

    pub fn inst(&self, id: InstId) -> &InstData {
        &self.insts[id.index()]
    }

    pub fn inst_mut(&mut self, id: InstId) -> &mut InstData {
        &mut self.insts[id.index()]
    }

    /// All instructions attached to blocks, in block order.
    pub fn instructions(&self) -> impl Iterator<Item = InstId> + '_ {
        self.blocks.iter().flat_map(|b| b.insts.iter().copied())
    }

    pub fn terminator(&self, block: BlockId) -> Option<InstId> {
        let last = *self.block(block).insts.last()?;
        self.inst(last).kind.is_terminator().then_some(last)
    }

    pub fn successors(&self, block: BlockId) -> Vec<BlockId> {
        self.terminator(block)
            .map(|t| self.inst(t).kind.successors())
            .unwrap_or_default()
    }

    pub fn value_type(&self, value: ValueId) -> Type {
        match value {
            ValueId::Arg(i) => self.params[i as usize].ty.clone(),
            ValueId::Inst(id) => self.inst(id).ty.clone(),
        }
    }

    pub fn operand_type(&self, operand: &Operand) -> Type {
        match operand {
            Operand::Value(v) => self.value_type(*v),
            Operand::Const(c) => c.ty(),
        }
    }

    pub fn add_block(&mut self, name: impl Into<String>) -> BlockId {
        let id = BlockId(self.blocks.len() as u32);
        self.blocks.push(Block {
            name: name.into(),
            insts: Vec::new(),
            profile_count: None,
        });
        id
    }

    /// Append an instruction at the end of `block`.
    pub fn append_inst(
        &mut self,
        block: BlockId,
        kind: InstKind,
        ty: Type,
        name: Option<String>,
    ) -> InstId {
        let id = InstId(self.insts.len() as u32);
        self.insts.push(InstData {
            kind,
            ty,
            parent: block,
            name,
        });
        self.blocks[block.index()].insts.push(id);
        id
    }

    /// Remove an instruction from its block. Its arena slot is left in place.
    pub fn detach_inst(&mut self, id: InstId) {
        let parent = self.inst(id).parent;
        self.blocks[parent.index()].insts.retain(|&i| i != id);
    }

    pub fn is_attached(&self, id: InstId) -> bool {
        self.block(self.inst(id).parent).insts.contains(&id)
    }

    /// Rewrite every use of `from` among attached instructions to `with`.
    pub fn replace_all_uses(&mut self, from: ValueId, with: &Operand) -> usize {
        let ids: Vec<InstId> = self.instructions().collect();
        let mut replaced = 0;
        for id in ids {
            for op in self.insts[id.index()].kind.operands_mut() {
                if op.is_value(from) {
                    *op = with.clone();
                    replaced += 1;
                }
            }
        }
        replaced
    }

    /// Forward every `ssa_copy` to its operand and detach it.
    pub fn remove_ssa_copies(&mut self) -> usize {
        let copies: Vec<(InstId, Operand)> = self
            .instructions()
            .filter_map(|id| match &self.inst(id).kind {
                InstKind::SsaCopy { value } => Some((id, value.clone())),
                _ => None,
            })
            .collect();
        for (id, value) in &copies {
            self.replace_all_uses(ValueId::Inst(*id), value);
            self.detach_inst(*id);
        }
        copies.len()
    }

    pub fn def_use(&self) -> DefUse {
        DefUse::compute(self)
    }

    /// Look through pointer-to-pointer bitcasts.
    pub fn strip_pointer_casts<'a>(&'a self, mut op: &'a Operand) -> &'a Operand {
        while let Operand::Value(ValueId::Inst(id)) = op {
            match &self.inst(*id).kind {
                InstKind::Cast {
                    op: CastOp::BitCast,
                    value,
                    to: Type::Ptr,
                } if self.operand_type(value).is_pointer() => op = value,
                _ => break,
            }
        }
        op
    }

    /// Display name of a value, as used by the printer and debug logs.
    pub fn value_name(&self, value: ValueId) -> String {
        match value {
            ValueId::Arg(i) => match self.params.get(i as usize) {
                Some(p) if !p.name.is_empty() => format!("%{}", p.name),
                _ => format!("%arg{}", i),
            },
            ValueId::Inst(id) => match &self.inst(id).name {
                Some(name) => format!("%{}", name),
                None => format!("%{}", id.0),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::constant::Constant;

    fn small_function() -> Function {
        let mut f = Function::new("f", vec![Param::new("x", Type::I32)], Type::I32);
        let entry = f.add_block("entry");
        let copy = f.append_inst(
            entry,
            InstKind::SsaCopy {
                value: Operand::arg(0),
            },
            Type::I32,
            None,
        );
        let add = f.append_inst(
            entry,
            InstKind::Binary {
                op: crate::ir::BinaryOp::Add,
                lhs: Operand::inst(copy),
                rhs: Operand::Const(Constant::i32(1)),
            },
            Type::I32,
            Some("sum".into()),
        );
        f.append_inst(
            entry,
            InstKind::Ret {
                value: Some(Operand::inst(add)),
            },
            Type::Void,
            None,
        );
        f
    }

    #[test]
    fn test_remove_ssa_copies_forwards_operand() {
        let mut f = small_function();
        assert_eq!(f.remove_ssa_copies(), 1);
        assert_eq!(f.block(BlockId::ENTRY).insts.len(), 2);
        let add = f.block(BlockId::ENTRY).insts[0];
        match &f.inst(add).kind {
            InstKind::Binary { lhs, .. } => assert!(lhs.is_value(ValueId::Arg(0))),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_terminator_and_value_names() {
        let f = small_function();
        let term = f.terminator(BlockId::ENTRY).unwrap();
        assert!(f.inst(term).kind.is_terminator());
        assert_eq!(f.value_name(ValueId::Arg(0)), "%x");
        assert_eq!(f.value_name(ValueId::Inst(InstId(1))), "%sum");
        assert!(f.successors(BlockId::ENTRY).is_empty());
    }
}
