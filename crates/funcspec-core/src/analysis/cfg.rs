//! Control Flow Graph view of a function body.
//!
//! The IR already stores successors in each block's terminator; this module
//! materializes predecessor lists and traversal orders once so analyses do
//! not rescan terminators.

use crate::ir::{BlockId, Function};
use rustc_hash::FxHashMap;

/// The control flow graph for a single function.
#[derive(Debug)]
pub struct ControlFlowGraph {
    /// Number of blocks in the function.
    pub block_count: usize,
    /// Predecessor map: block -> list of blocks that can jump here.
    ///
    /// A block that branches to the same target twice is listed twice.
    pub predecessors: FxHashMap<BlockId, Vec<BlockId>>,
    /// Successor map: block -> list of blocks reachable from here.
    pub successors: FxHashMap<BlockId, Vec<BlockId>>,
}

impl ControlFlowGraph {
    pub fn build(func: &Function) -> Self {
        let mut predecessors: FxHashMap<BlockId, Vec<BlockId>> = FxHashMap::default();
        let mut successors: FxHashMap<BlockId, Vec<BlockId>> = FxHashMap::default();
        for block in func.block_ids() {
            let succs = func.successors(block);
            for &succ in &succs {
                predecessors.entry(succ).or_default().push(block);
            }
            successors.insert(block, succs);
        }
        ControlFlowGraph {
            block_count: func.blocks.len(),
            predecessors,
            successors,
        }
    }

    /// Returns the predecessors of a block.
    pub fn preds(&self, id: BlockId) -> &[BlockId] {
        self.predecessors
            .get(&id)
            .map(|v| v.as_slice())
            .unwrap_or(&[])
    }

    /// Returns the successors of a block.
    pub fn succs(&self, id: BlockId) -> &[BlockId] {
        self.successors
            .get(&id)
            .map(|v| v.as_slice())
            .unwrap_or(&[])
    }

    /// The only predecessor of `id`, counting a repeated edge as one.
    pub fn unique_predecessor(&self, id: BlockId) -> Option<BlockId> {
        let preds = self.preds(id);
        let first = *preds.first()?;
        preds.iter().all(|&p| p == first).then_some(first)
    }

    /// Returns blocks reachable from the entry in reverse postorder.
    pub fn reverse_postorder(&self) -> Vec<BlockId> {
        if self.block_count == 0 {
            return Vec::new();
        }
        let mut visited = vec![false; self.block_count];
        let mut postorder = Vec::with_capacity(self.block_count);
        self.dfs_postorder(BlockId::ENTRY, &mut visited, &mut postorder);
        postorder.reverse();
        postorder
    }

    // Iterative so deep CFGs cannot overflow the stack.
    fn dfs_postorder(&self, start: BlockId, visited: &mut [bool], postorder: &mut Vec<BlockId>) {
        let mut stack: Vec<(BlockId, usize)> = vec![(start, 0)];
        visited[start.index()] = true;
        while let Some((block, next)) = stack.last_mut() {
            let succs = self.succs(*block);
            if let Some(&succ) = succs.get(*next) {
                *next += 1;
                if succ.index() < visited.len() && !visited[succ.index()] {
                    visited[succ.index()] = true;
                    stack.push((succ, 0));
                }
            } else {
                postorder.push(*block);
                stack.pop();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{Constant, FunctionBuilder, Module, Operand, Param, Type};

    /// entry -> {then, else} -> join
    fn diamond() -> (Module, crate::ir::FuncId) {
        let mut m = Module::new("m");
        let f = m.add_function(Function::new(
            "diamond",
            vec![Param::new("c", Type::I1)],
            Type::Void,
        ));
        let mut b = FunctionBuilder::new(&mut m, f);
        b.block("entry");
        let then_bb = b.add_block("then");
        let else_bb = b.add_block("else");
        let join = b.add_block("join");
        b.cond_br(Operand::arg(0), then_bb, else_bb);
        b.position_at_end(then_bb);
        b.br(join);
        b.position_at_end(else_bb);
        b.br(join);
        b.position_at_end(join);
        b.ret(None);
        (m, f)
    }

    #[test]
    fn test_diamond_edges() {
        let (m, f) = diamond();
        let cfg = ControlFlowGraph::build(m.function(f));
        assert_eq!(cfg.succs(BlockId::ENTRY), &[BlockId(1), BlockId(2)]);
        assert_eq!(cfg.preds(BlockId(3)), &[BlockId(1), BlockId(2)]);
        assert_eq!(cfg.unique_predecessor(BlockId(1)), Some(BlockId::ENTRY));
        assert_eq!(cfg.unique_predecessor(BlockId(3)), None);
        assert_eq!(cfg.unique_predecessor(BlockId::ENTRY), None);
    }

    #[test]
    fn test_reverse_postorder_starts_at_entry_and_skips_unreachable() {
        let (mut m, f) = diamond();
        {
            let mut b = FunctionBuilder::new(&mut m, f);
            b.block("orphan");
            b.ret(None);
        }
        let cfg = ControlFlowGraph::build(m.function(f));
        let rpo = cfg.reverse_postorder();
        assert_eq!(rpo.first(), Some(&BlockId::ENTRY));
        assert_eq!(rpo.last(), Some(&BlockId(3)));
        assert!(!rpo.contains(&BlockId(4)));
    }

    #[test]
    fn test_repeated_edge_is_still_a_unique_predecessor() {
        let mut m = Module::new("m");
        let f = m.add_function(Function::new("sw", vec![Param::new("x", Type::I32)], Type::Void));
        let mut b = FunctionBuilder::new(&mut m, f);
        b.block("entry");
        let target = b.add_block("target");
        b.switch(
            Operand::arg(0),
            target,
            vec![(Constant::i32(1), target), (Constant::i32(2), target)],
        );
        b.position_at_end(target);
        b.ret(None);
        let cfg = ControlFlowGraph::build(m.function(f));
        assert_eq!(cfg.preds(target).len(), 3);
        assert_eq!(cfg.unique_predecessor(target), Some(BlockId::ENTRY));
    }
}
