//! Estimates how much simpler a function gets once an argument is a constant.
//!
//! Starting from the argument, every user that folds to a constant is credited
//! with its size-and-latency cost (scaled by how often its block runs
//! relative to the entry) and its own users are visited in turn. A branch or
//! switch that resolves credits the blocks that become dead.

use crate::analysis::{BlockFrequencyInfo, ControlFlowGraph, Cost, CostKind, CostModel};
use crate::ir::fold;
use crate::ir::{
    BlockId, Constant, DefUse, FuncId, Function, InstId, InstKind, Module, Operand, ValueId,
};
use crate::solver::Solver;
use indexmap::IndexMap;
use rustc_hash::FxHashSet;
use tracing::debug;

/// Per-function analyses shared by every estimate for that function.
#[derive(Debug)]
pub struct FunctionAnalyses {
    pub cfg: ControlFlowGraph,
    pub bfi: BlockFrequencyInfo,
    pub def_use: DefUse,
}

impl FunctionAnalyses {
    pub fn compute(func: &Function) -> Self {
        Self {
            cfg: ControlFlowGraph::build(func),
            bfi: BlockFrequencyInfo::compute(func),
            def_use: func.def_use(),
        }
    }
}

/// Values already known to be constant during one estimate.
///
/// Bindings are append-only: binding a value twice keeps the first constant.
#[derive(Debug, Default, Clone)]
pub struct KnownConstants {
    bindings: IndexMap<ValueId, Constant>,
}

impl KnownConstants {
    /// Bind `value` unless it already is; returns the binding's position.
    fn bind(&mut self, value: ValueId, c: Constant) -> usize {
        let entry = self.bindings.entry(value);
        let index = entry.index();
        entry.or_insert(c);
        index
    }

    fn binding(&self, index: usize) -> Option<(ValueId, &Constant)> {
        self.bindings.get_index(index).map(|(v, c)| (*v, c))
    }

    pub fn get(&self, value: ValueId) -> Option<&Constant> {
        self.bindings.get(&value)
    }

    pub fn contains(&self, value: ValueId) -> bool {
        self.bindings.contains_key(&value)
    }

    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }
}

pub struct InstCostVisitor<'a> {
    module: &'a Module,
    func: FuncId,
    f: &'a Function,
    solver: &'a dyn Solver,
    cost_model: &'a dyn CostModel,
    analyses: &'a FunctionAnalyses,
    known: KnownConstants,
    /// Position in `known` of the binding currently being propagated.
    last_visited: usize,
}

impl<'a> InstCostVisitor<'a> {
    pub fn new(
        module: &'a Module,
        func: FuncId,
        solver: &'a dyn Solver,
        cost_model: &'a dyn CostModel,
        analyses: &'a FunctionAnalyses,
    ) -> Self {
        Self {
            module,
            func,
            f: module.function(func),
            solver,
            cost_model,
            analyses,
            known: KnownConstants::default(),
            last_visited: 0,
        }
    }

    pub fn known_constants(&self) -> &KnownConstants {
        &self.known
    }

    fn is_executable(&self, block: BlockId) -> bool {
        self.solver.is_block_executable(self.func, block)
    }

    fn cost_of(&self, inst: InstId) -> Cost {
        self.cost_model
            .instruction_cost(self.f, inst, CostKind::SizeAndLatency)
            .unwrap_or(0)
    }

    /// Frequency weight of `block`, clamped to the cost range.
    fn weight(&self, block: BlockId) -> Cost {
        Cost::try_from(self.analyses.bfi.weight(block)).unwrap_or(Cost::MAX)
    }

    fn last(&self) -> Option<(ValueId, Constant)> {
        self.known
            .binding(self.last_visited)
            .map(|(v, c)| (v, c.clone()))
    }

    /// Bonus for `used` (an operand of `user`) being the constant `c`.
    pub fn user_bonus(&mut self, user: InstId, used: ValueId, c: Constant) -> Cost {
        self.last_visited = self.known.bind(used, c);

        match &self.f.inst(user).kind {
            InstKind::Switch { .. } => return self.estimate_switch(user),
            InstKind::CondBr { .. } => return self.estimate_branch(user),
            _ => {}
        }

        let Some(folded) = self.fold(user) else {
            return 0;
        };
        let value = ValueId::Inst(user);
        self.known.bind(value, folded.clone());

        let parent = self.f.inst(user).parent;
        let weight = self.weight(parent);
        if weight == 0 {
            return 0;
        }
        let mut bonus = weight.saturating_mul(self.cost_of(user));
        debug!(
            "FnSpecialization:     Bonus {} for user {}",
            bonus,
            self.f.value_name(value)
        );

        let analyses = self.analyses;
        for &next in analyses.def_use.users(value) {
            if self.is_executable(self.f.inst(next).parent) {
                bonus = bonus.saturating_add(self.user_bonus(next, value, folded.clone()));
            }
        }
        bonus
    }

    fn estimate_switch(&mut self, user: InstId) -> Cost {
        let data = self.f.inst(user);
        let InstKind::Switch { cond, default, cases } = &data.kind else {
            return 0;
        };
        let Some((last, c)) = self.last() else {
            return 0;
        };
        if !cond.is_value(last) {
            return 0;
        }
        let taken = cases
            .iter()
            .find(|(k, _)| *k == c)
            .map_or(*default, |(_, bb)| *bb);
        // Case targets other than the taken one die with it, as long as this
        // switch is their only way in.
        let mut worklist = Vec::new();
        for &(_, bb) in cases {
            if bb == taken
                || !self.is_executable(bb)
                || self.analyses.cfg.unique_predecessor(bb) != Some(data.parent)
                || worklist.contains(&bb)
            {
                continue;
            }
            worklist.push(bb);
        }
        self.estimate_basic_blocks(worklist)
    }

    fn estimate_branch(&mut self, user: InstId) -> Cost {
        let data = self.f.inst(user);
        let InstKind::CondBr {
            cond,
            if_true,
            if_false,
        } = &data.kind
        else {
            return 0;
        };
        let Some((last, c)) = self.last() else {
            return 0;
        };
        if !cond.is_value(last) {
            return 0;
        }
        let dead = if c.is_one_value() { *if_false } else { *if_true };
        let mut worklist = Vec::new();
        if self.is_executable(dead) && self.analyses.cfg.unique_predecessor(dead) == Some(data.parent)
        {
            worklist.push(dead);
        }
        self.estimate_basic_blocks(worklist)
    }

    /// Weighted cost of the blocks in `worklist` and of every executable
    /// successor they dominate through a single edge.
    fn estimate_basic_blocks(&self, mut worklist: Vec<BlockId>) -> Cost {
        let mut bonus: Cost = 0;
        let mut seen = FxHashSet::default();
        while let Some(bb) = worklist.pop() {
            if !seen.insert(bb) {
                continue;
            }
            let weight = self.weight(bb);
            if weight == 0 {
                continue;
            }
            for &inst in &self.f.block(bb).insts {
                if matches!(self.f.inst(inst).kind, InstKind::SsaCopy { .. }) {
                    continue;
                }
                if self.known.contains(ValueId::Inst(inst)) {
                    continue;
                }
                bonus = bonus.saturating_add(weight.saturating_mul(self.cost_of(inst)));
                debug!(
                    "FnSpecialization:     Bonus {} after user {}",
                    bonus,
                    self.f.value_name(ValueId::Inst(inst))
                );
            }
            for &succ in self.analyses.cfg.succs(bb) {
                if self.is_executable(succ) && self.analyses.cfg.unique_predecessor(succ) == Some(bb) {
                    worklist.push(succ);
                }
            }
        }
        bonus
    }

    fn constant_for(&self, op: &Operand) -> Option<Constant> {
        match op {
            Operand::Const(c) => Some(c.clone()),
            Operand::Value(v) => self.known.get(*v).cloned(),
        }
    }

    /// Fold `user` given the binding being propagated.
    fn fold(&self, user: InstId) -> Option<Constant> {
        let (last, c) = self.last()?;
        match &self.f.inst(user).kind {
            InstKind::Load { ty, .. } => {
                if c == Constant::Null {
                    return None;
                }
                fold::fold_load(self.module, ty, &c)
            }
            InstKind::Gep {
                source_ty,
                ptr,
                indices,
            } => {
                let base = self.constant_for(ptr)?;
                let indices = indices
                    .iter()
                    .map(|i| self.constant_for(i))
                    .collect::<Option<Vec<_>>>()?;
                fold::fold_gep(self.module, source_ty, &base, &indices)
            }
            InstKind::Select {
                cond,
                if_true,
                if_false,
            } => {
                if !cond.is_value(last) {
                    return None;
                }
                self.constant_for(if c.is_zero_value() { if_false } else { if_true })
            }
            InstKind::Cast { op, to, .. } => fold::fold_cast(*op, &c, to),
            InstKind::Unary { op, .. } => fold::fold_unary(*op, &c),
            InstKind::Cmp { pred, lhs, rhs } => {
                let swap = rhs.is_value(last);
                let other = self.constant_for(if swap { lhs } else { rhs })?;
                if swap {
                    fold::fold_cmp(*pred, &other, &c)
                } else {
                    fold::fold_cmp(*pred, &c, &other)
                }
            }
            InstKind::Binary { op, lhs, rhs } => {
                let swap = rhs.is_value(last);
                let other = self.constant_for(if swap { lhs } else { rhs })?;
                if swap {
                    fold::fold_binary(*op, &other, &c)
                } else {
                    fold::fold_binary(*op, &c, &other)
                }
            }
            _ => None,
        }
    }
}
