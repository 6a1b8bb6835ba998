//! Relative block execution frequencies.
//!
//! When the function carries profile counts they are used directly. Otherwise
//! a static estimate is built: the entry gets [`ENTRY_FREQ`], every block
//! splits its frequency evenly across its forward edges, and each enclosing
//! loop multiplies a block's frequency by [`LOOP_SCALE`].

use super::cfg::ControlFlowGraph;
use super::dominance::{DominatorTree, LoopNesting};
use crate::ir::{BlockId, Function};

/// Static frequency assigned to the entry block.
pub const ENTRY_FREQ: u64 = 1 << 14;

/// Assumed trip count of a loop without profile data.
pub const LOOP_SCALE: u64 = 8;

#[derive(Debug, Clone)]
pub struct BlockFrequencyInfo {
    freqs: Vec<u64>,
    entry: u64,
}

impl BlockFrequencyInfo {
    pub fn compute(func: &Function) -> Self {
        match func.entry_count() {
            Some(entry) if entry > 0 => Self::from_profile(func, entry),
            _ => Self::estimate(func),
        }
    }

    fn from_profile(func: &Function, entry: u64) -> Self {
        let freqs = func
            .blocks
            .iter()
            .map(|b| b.profile_count.unwrap_or(0))
            .collect();
        BlockFrequencyInfo { freqs, entry }
    }

    fn estimate(func: &Function) -> Self {
        let cfg = ControlFlowGraph::build(func);
        let dom = DominatorTree::build(&cfg);
        let loops = LoopNesting::build(&cfg, &dom);

        let mut acyclic = vec![0u64; cfg.block_count];
        if let Some(first) = acyclic.first_mut() {
            *first = ENTRY_FREQ;
        }
        for block in cfg.reverse_postorder() {
            let forward: Vec<BlockId> = cfg
                .succs(block)
                .iter()
                .copied()
                .filter(|&succ| !loops.is_back_edge(block, succ))
                .collect();
            if forward.is_empty() {
                continue;
            }
            let share = acyclic[block.index()] / forward.len() as u64;
            for succ in forward {
                acyclic[succ.index()] = acyclic[succ.index()].saturating_add(share);
            }
        }

        let freqs = acyclic
            .iter()
            .enumerate()
            .map(|(i, &freq)| {
                let depth = loops.loop_depth(BlockId(i as u32));
                freq.saturating_mul(LOOP_SCALE.saturating_pow(depth))
            })
            .collect();
        BlockFrequencyInfo {
            freqs,
            entry: ENTRY_FREQ,
        }
    }

    pub fn block_freq(&self, block: BlockId) -> u64 {
        self.freqs.get(block.index()).copied().unwrap_or(0)
    }

    pub fn entry_freq(&self) -> u64 {
        self.entry
    }

    /// `block_freq / entry_freq`, rounded down. Blocks that run less often
    /// than the entry weigh zero.
    pub fn weight(&self, block: BlockId) -> u64 {
        if self.entry == 0 {
            return 0;
        }
        self.block_freq(block) / self.entry
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{FunctionBuilder, Module, Operand, Param, Type};

    /// entry -> header -> {body, exit}; body -> header
    fn simple_loop(profile: bool) -> Function {
        let mut m = Module::new("m");
        let f = m.add_function(Function::new("loop", vec![Param::new("c", Type::I1)], Type::Void));
        {
            let mut b = FunctionBuilder::new(&mut m, f);
            let entry = b.block("entry");
            let header = b.add_block("header");
            let body = b.add_block("body");
            let exit = b.add_block("exit");
            b.br(header);
            b.position_at_end(header);
            b.cond_br(Operand::arg(0), body, exit);
            b.position_at_end(body);
            b.br(header);
            b.position_at_end(exit);
            b.ret(None);
            if profile {
                b.set_profile_count(entry, 2);
                b.set_profile_count(header, 202);
                b.set_profile_count(body, 200);
                b.set_profile_count(exit, 2);
            }
        }
        m.function(f).clone()
    }

    #[test]
    fn test_static_estimate_scales_loops() {
        let bfi = BlockFrequencyInfo::compute(&simple_loop(false));
        assert_eq!(bfi.weight(BlockId(0)), 1);
        assert_eq!(bfi.block_freq(BlockId(1)), ENTRY_FREQ * LOOP_SCALE);
        assert_eq!(bfi.weight(BlockId(1)), LOOP_SCALE);
        assert_eq!(bfi.weight(BlockId(2)), LOOP_SCALE / 2);
        // Half the entry frequency leaves the loop: weighs nothing.
        assert_eq!(bfi.weight(BlockId(3)), 0);
    }

    #[test]
    fn test_profile_counts_take_precedence() {
        let bfi = BlockFrequencyInfo::compute(&simple_loop(true));
        assert_eq!(bfi.entry_freq(), 2);
        assert_eq!(bfi.weight(BlockId(1)), 101);
        assert_eq!(bfi.weight(BlockId(2)), 100);
        assert_eq!(bfi.weight(BlockId(3)), 1);
    }
}
