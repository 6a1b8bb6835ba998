//! Dominator tree and natural-loop nesting computed from a Control Flow Graph.
//!
//! Uses the Cooper-Harvey-Kennedy iterative algorithm, which is simple and efficient
//! for the moderate-size CFGs typical of single functions.

use super::cfg::ControlFlowGraph;
use crate::ir::BlockId;
use rustc_hash::{FxHashMap, FxHashSet};

/// Dominator tree computed from a CFG.
///
/// Block A **dominates** block B if every path from the entry block to B must
/// pass through A. The **immediate dominator** (idom) of B is the closest
/// strict dominator. Blocks unreachable from the entry have no entry in `idom`.
#[derive(Debug)]
pub struct DominatorTree {
    /// Immediate dominator for each block. Entry block maps to itself.
    pub idom: FxHashMap<BlockId, BlockId>,
    /// Children in the dominator tree: block -> blocks it immediately dominates.
    pub children: FxHashMap<BlockId, Vec<BlockId>>,
}

impl DominatorTree {
    /// Compute the dominator tree from a CFG using the Cooper-Harvey-Kennedy algorithm.
    pub fn build(cfg: &ControlFlowGraph) -> Self {
        let rpo = cfg.reverse_postorder();
        if rpo.is_empty() {
            return DominatorTree {
                idom: FxHashMap::default(),
                children: FxHashMap::default(),
            };
        }

        let mut rpo_index: FxHashMap<BlockId, usize> = FxHashMap::default();
        for (i, &block) in rpo.iter().enumerate() {
            rpo_index.insert(block, i);
        }

        let mut idom: FxHashMap<BlockId, BlockId> = FxHashMap::default();
        idom.insert(BlockId::ENTRY, BlockId::ENTRY);

        let mut changed = true;
        while changed {
            changed = false;
            for &block in rpo.iter().skip(1) {
                let mut new_idom: Option<BlockId> = None;
                for &pred in cfg.preds(block) {
                    if idom.contains_key(&pred) {
                        new_idom = Some(match new_idom {
                            None => pred,
                            Some(current) => Self::intersect(current, pred, &idom, &rpo_index),
                        });
                    }
                }

                if let Some(new_idom) = new_idom {
                    if idom.get(&block) != Some(&new_idom) {
                        idom.insert(block, new_idom);
                        changed = true;
                    }
                }
            }
        }

        let mut children: FxHashMap<BlockId, Vec<BlockId>> = FxHashMap::default();
        for &block in &rpo {
            children.insert(block, Vec::new());
        }
        for &block in &rpo {
            if let Some(&dom) = idom.get(&block) {
                if dom != block {
                    children.entry(dom).or_default().push(block);
                }
            }
        }

        DominatorTree { idom, children }
    }

    /// Returns true if block `a` dominates block `b`.
    pub fn dominates(&self, a: BlockId, b: BlockId) -> bool {
        if a == b {
            return self.idom.contains_key(&a);
        }
        let mut current = b;
        loop {
            match self.idom.get(&current) {
                Some(&dom) if dom == current => return false,
                Some(&dom) if dom == a => return true,
                Some(&dom) => current = dom,
                None => return false,
            }
        }
    }

    /// Returns the immediate dominator of a block, if it has one.
    pub fn immediate_dominator(&self, block: BlockId) -> Option<BlockId> {
        self.idom
            .get(&block)
            .copied()
            .filter(|&dom| dom != block)
    }

    fn intersect(
        mut b1: BlockId,
        mut b2: BlockId,
        idom: &FxHashMap<BlockId, BlockId>,
        rpo_index: &FxHashMap<BlockId, usize>,
    ) -> BlockId {
        while b1 != b2 {
            let idx1 = rpo_index.get(&b1).copied().unwrap_or(usize::MAX);
            let idx2 = rpo_index.get(&b2).copied().unwrap_or(usize::MAX);
            if idx1 > idx2 {
                b1 = match idom.get(&b1) {
                    Some(&dom) => dom,
                    None => return b2,
                };
            } else {
                b2 = match idom.get(&b2) {
                    Some(&dom) => dom,
                    None => return b1,
                };
            }
        }
        b1
    }
}

/// Natural loops found from back edges (an edge whose target dominates its source).
#[derive(Debug, Default)]
pub struct LoopNesting {
    /// Loop headers, in reverse postorder.
    pub headers: Vec<BlockId>,
    /// Edges `(latch, header)` that close a loop.
    pub back_edges: FxHashSet<(BlockId, BlockId)>,
    depth: FxHashMap<BlockId, u32>,
}

impl LoopNesting {
    pub fn build(cfg: &ControlFlowGraph, dom: &DominatorTree) -> Self {
        let mut nesting = LoopNesting::default();
        let mut bodies: FxHashMap<BlockId, FxHashSet<BlockId>> = FxHashMap::default();
        let rpo = cfg.reverse_postorder();

        for &block in &rpo {
            for &succ in cfg.succs(block) {
                if dom.dominates(succ, block) {
                    nesting.back_edges.insert((block, succ));
                    let body = bodies.entry(succ).or_insert_with(|| {
                        nesting.headers.push(succ);
                        let mut body = FxHashSet::default();
                        body.insert(succ);
                        body
                    });
                    // Walk predecessors backwards from the latch up to the header.
                    let mut stack = vec![block];
                    while let Some(b) = stack.pop() {
                        if body.insert(b) {
                            stack.extend(cfg.preds(b).iter().copied());
                        }
                    }
                }
            }
        }

        nesting
            .headers
            .sort_by_key(|h| rpo.iter().position(|b| b == h));
        for body in bodies.values() {
            for &b in body {
                *nesting.depth.entry(b).or_insert(0) += 1;
            }
        }
        nesting
    }

    /// Number of loops containing `block`; zero outside any loop.
    pub fn loop_depth(&self, block: BlockId) -> u32 {
        self.depth.get(&block).copied().unwrap_or(0)
    }

    pub fn is_back_edge(&self, from: BlockId, to: BlockId) -> bool {
        self.back_edges.contains(&(from, to))
    }
}
