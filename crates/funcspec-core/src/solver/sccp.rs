//! Sparse conditional constant propagation over a whole module.
//!
//! Values and blocks start out unknown/dead. Marking a block executable queues
//! its instructions; a value that moves down the lattice queues its users; a
//! branch whose condition resolves only makes the taken edges feasible. Calls
//! to argument-tracked functions merge the actual arguments into the callee's
//! formals, and returns of tracked functions flow back to every direct caller.
//!
//! State is keyed by `(FuncId, ValueId)` so the module can be mutated (new
//! clones, redirected calls) between solves without invalidating it.

use super::lattice::{merge_fields, LatticeValue};
use super::Solver;
use crate::ir::fold;
use crate::ir::{
    BlockId, CallInst, CallSiteRef, Constant, DefUse, FuncId, Function, InstData, InstId,
    InstKind, Module, Operand, Type, ValueId,
};
use crate::specializer::ArgInfo;
use rustc_hash::{FxHashMap, FxHashSet};
use std::collections::VecDeque;
use tracing::{debug, trace};

#[derive(Debug, Default)]
pub struct SccpSolver {
    /// Scalar lattice values.
    values: FxHashMap<(FuncId, ValueId), LatticeValue>,
    /// Per-field lattice values of struct-typed values.
    fields: FxHashMap<(FuncId, ValueId), Vec<LatticeValue>>,
    executable: FxHashSet<(FuncId, BlockId)>,
    feasible_edges: FxHashSet<(FuncId, BlockId, BlockId)>,
    arg_tracked: FxHashSet<FuncId>,
    ret_tracked: FxHashSet<FuncId>,
    ret_vals: FxHashMap<FuncId, LatticeValue>,
    struct_ret_vals: FxHashMap<FuncId, Vec<LatticeValue>>,
    block_worklist: VecDeque<(FuncId, BlockId)>,
    inst_worklist: VecDeque<(FuncId, InstId)>,
    // Rebuilt at the start of every solve.
    def_use: FxHashMap<FuncId, DefUse>,
    callers: FxHashMap<FuncId, Vec<CallSiteRef>>,
}

fn constant_fields(c: &Constant, len: usize) -> Vec<LatticeValue> {
    match c {
        Constant::Aggregate { elems, .. } => elems
            .iter()
            .map(|e| {
                if e.is_undef_or_poison() {
                    LatticeValue::Overdefined
                } else {
                    LatticeValue::Constant(e.clone())
                }
            })
            .collect(),
        _ => vec![LatticeValue::Overdefined; len],
    }
}

impl SccpSolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_return_tracked(&self, func: FuncId) -> bool {
        self.ret_tracked.contains(&func)
    }

    /// Executable blocks of `func`, in block order.
    pub fn executable_blocks(&self, func: FuncId) -> Vec<BlockId> {
        let mut blocks: Vec<BlockId> = self
            .executable
            .iter()
            .filter(|(f, _)| *f == func)
            .map(|(_, b)| *b)
            .collect();
        blocks.sort();
        blocks
    }

    fn value_state(&self, func: FuncId, value: ValueId) -> LatticeValue {
        if matches!(value, ValueId::Arg(_)) && !self.arg_tracked.contains(&func) {
            return LatticeValue::Overdefined;
        }
        self.values.get(&(func, value)).cloned().unwrap_or_default()
    }

    fn operand_state(&self, func: FuncId, op: &Operand) -> LatticeValue {
        match op {
            Operand::Const(c) if c.is_undef_or_poison() => LatticeValue::Overdefined,
            Operand::Const(c) => LatticeValue::Constant(c.clone()),
            Operand::Value(v) => self.value_state(func, *v),
        }
    }

    fn operand_fields(&self, func: FuncId, op: &Operand, len: usize) -> Vec<LatticeValue> {
        match op {
            Operand::Const(c) => constant_fields(c, len),
            Operand::Value(ValueId::Arg(_)) if !self.arg_tracked.contains(&func) => {
                vec![LatticeValue::Overdefined; len]
            }
            Operand::Value(v) => {
                let mut fields = self.fields.get(&(func, *v)).cloned().unwrap_or_default();
                fields.resize(len.max(fields.len()), LatticeValue::Unknown);
                fields
            }
        }
    }

    fn push_users(&mut self, module: &Module, func: FuncId, value: ValueId) {
        let Some(f) = module.get_function(func) else {
            return;
        };
        let du = self.def_use.entry(func).or_insert_with(|| f.def_use());
        for &user in du.users(value) {
            self.inst_worklist.push_back((func, user));
        }
    }

    fn update(&mut self, module: &Module, func: FuncId, value: ValueId, new: LatticeValue) {
        let slot = self.values.entry((func, value)).or_default();
        if slot.merge_in(&new) {
            trace!("SCCP: {} {:?} -> {}", func, value, slot);
            self.push_users(module, func, value);
        }
    }

    fn update_fields(
        &mut self,
        module: &Module,
        func: FuncId,
        value: ValueId,
        new: Vec<LatticeValue>,
    ) {
        let slot = self.fields.entry((func, value)).or_default();
        if merge_fields(slot, &new) {
            trace!("SCCP: {} {:?} -> {:?}", func, value, slot);
            self.push_users(module, func, value);
        }
    }

    fn mark_overdefined(&mut self, module: &Module, func: FuncId, value: ValueId, ty: &Type) {
        if ty.is_struct() {
            let fields = vec![LatticeValue::Overdefined; ty.struct_len()];
            self.update_fields(module, func, value, fields);
        } else {
            self.update(module, func, value, LatticeValue::Overdefined);
        }
    }

    fn mark_edge(&mut self, module: &Module, func: FuncId, from: BlockId, to: BlockId) {
        if !self.feasible_edges.insert((func, from, to)) {
            return;
        }
        if self.mark_block_executable(func, to) {
            return;
        }
        // Already live: only its phis see the new incoming edge.
        let Some(f) = module.get_function(func) else {
            return;
        };
        for &inst in &f.block(to).insts {
            if matches!(f.inst(inst).kind, InstKind::Phi { .. }) {
                self.inst_worklist.push_back((func, inst));
            }
        }
    }

    fn collect_callers(module: &Module) -> FxHashMap<FuncId, Vec<CallSiteRef>> {
        let mut callers: FxHashMap<FuncId, Vec<CallSiteRef>> = FxHashMap::default();
        for (caller, f) in module.functions() {
            for inst in f.instructions() {
                if let Some(callee) = f.inst(inst).kind.as_call().and_then(CallInst::called_function)
                {
                    callers
                        .entry(callee)
                        .or_default()
                        .push(CallSiteRef { caller, inst });
                }
            }
        }
        callers
    }

    fn solve(&mut self, module: &Module) {
        self.def_use.clear();
        self.callers = Self::collect_callers(module);
        let mut visited = 0usize;
        loop {
            if let Some((func, inst)) = self.inst_worklist.pop_front() {
                visited += 1;
                self.visit_inst(module, func, inst);
                continue;
            }
            if let Some((func, block)) = self.block_worklist.pop_front() {
                let Some(f) = module.get_function(func) else {
                    continue;
                };
                if block.index() < f.blocks.len() {
                    for &inst in &f.block(block).insts {
                        self.inst_worklist.push_back((func, inst));
                    }
                }
                continue;
            }
            break;
        }
        debug!("SCCP: fixpoint reached after {} instruction visits", visited);
    }

    fn visit_inst(&mut self, module: &Module, func: FuncId, id: InstId) {
        let Some(f) = module.get_function(func) else {
            return;
        };
        let data = f.inst(id);
        if !self.executable.contains(&(func, data.parent)) {
            return;
        }
        let value = ValueId::Inst(id);
        match &data.kind {
            InstKind::Br { target } => self.mark_edge(module, func, data.parent, *target),
            InstKind::CondBr {
                cond,
                if_true,
                if_false,
            } => match self.operand_state(func, cond) {
                LatticeValue::Unknown => {}
                LatticeValue::Constant(c) if c.as_u64().is_some() => {
                    let target = if c.as_u64() != Some(0) {
                        *if_true
                    } else {
                        *if_false
                    };
                    self.mark_edge(module, func, data.parent, target);
                }
                _ => {
                    self.mark_edge(module, func, data.parent, *if_true);
                    self.mark_edge(module, func, data.parent, *if_false);
                }
            },
            InstKind::Switch {
                cond,
                default,
                cases,
            } => match self.operand_state(func, cond) {
                LatticeValue::Unknown => {}
                LatticeValue::Constant(c) => {
                    let target = cases
                        .iter()
                        .find(|(k, _)| *k == c)
                        .map_or(*default, |(_, bb)| *bb);
                    self.mark_edge(module, func, data.parent, target);
                }
                LatticeValue::Overdefined => {
                    for succ in data.kind.successors() {
                        self.mark_edge(module, func, data.parent, succ);
                    }
                }
            },
            InstKind::Ret { value: Some(op) } => {
                if self.ret_tracked.contains(&func) {
                    self.visit_return(func, f, op);
                }
            }
            InstKind::Ret { value: None } | InstKind::Unreachable | InstKind::Store { .. } => {}
            InstKind::Call(call) => self.visit_call_inst(module, func, id, call, &data.ty),
            InstKind::Invoke {
                call,
                normal,
                unwind,
            } => {
                self.visit_call_inst(module, func, id, call, &data.ty);
                self.mark_edge(module, func, data.parent, *normal);
                self.mark_edge(module, func, data.parent, *unwind);
            }
            _ if data.ty.is_struct() => {
                let fields = self.struct_result(module, func, data);
                self.update_fields(module, func, value, fields);
            }
            _ => {
                let state = self.scalar_result(module, func, f, data);
                self.update(module, func, value, state);
            }
        }
    }

    fn visit_return(&mut self, func: FuncId, f: &Function, op: &Operand) {
        let changed = if f.ret_ty.is_struct() {
            let fields = self.operand_fields(func, op, f.ret_ty.struct_len());
            merge_fields(self.struct_ret_vals.entry(func).or_default(), &fields)
        } else {
            let state = self.operand_state(func, op);
            self.ret_vals.entry(func).or_default().merge_in(&state)
        };
        if changed {
            if let Some(sites) = self.callers.get(&func) {
                for site in sites {
                    self.inst_worklist.push_back((site.caller, site.inst));
                }
            }
        }
    }

    fn visit_call_inst(
        &mut self,
        module: &Module,
        func: FuncId,
        id: InstId,
        call: &CallInst,
        ty: &Type,
    ) {
        let callee = call
            .called_function()
            .filter(|&g| module.get_function(g).is_some_and(|g| !g.is_declaration()));

        if let Some(g) = callee.filter(|g| self.arg_tracked.contains(g)) {
            self.mark_block_executable(g, BlockId::ENTRY);
            for (i, param) in module.function(g).params.iter().enumerate() {
                let formal = ValueId::Arg(i as u32);
                let actual = call.args.get(i);
                if param.ty.is_struct() {
                    let len = param.ty.struct_len();
                    let fields = match actual {
                        Some(a) => self.operand_fields(func, a, len),
                        None => vec![LatticeValue::Overdefined; len],
                    };
                    self.update_fields(module, g, formal, fields);
                } else {
                    let state = match actual {
                        Some(a) => self.operand_state(func, a),
                        None => LatticeValue::Overdefined,
                    };
                    self.update(module, g, formal, state);
                }
            }
        }

        if ty.is_void() {
            return;
        }
        let result = ValueId::Inst(id);
        match callee.filter(|g| self.ret_tracked.contains(g)) {
            Some(g) if ty.is_struct() => {
                let mut fields = self.struct_ret_vals.get(&g).cloned().unwrap_or_default();
                fields.resize(ty.struct_len(), LatticeValue::Unknown);
                self.update_fields(module, func, result, fields);
            }
            Some(g) => {
                let state = self.ret_vals.get(&g).cloned().unwrap_or_default();
                self.update(module, func, result, state);
            }
            None => self.mark_overdefined(module, func, result, ty),
        }
    }

    fn fold1(
        &self,
        func: FuncId,
        op: &Operand,
        folder: impl FnOnce(&Constant) -> Option<Constant>,
    ) -> LatticeValue {
        match self.operand_state(func, op) {
            LatticeValue::Constant(c) => folder(&c).map_or(LatticeValue::Overdefined, LatticeValue::Constant),
            other => other,
        }
    }

    fn fold2(
        &self,
        func: FuncId,
        lhs: &Operand,
        rhs: &Operand,
        folder: impl FnOnce(&Constant, &Constant) -> Option<Constant>,
    ) -> LatticeValue {
        match (self.operand_state(func, lhs), self.operand_state(func, rhs)) {
            (LatticeValue::Overdefined, _) | (_, LatticeValue::Overdefined) => {
                LatticeValue::Overdefined
            }
            (LatticeValue::Constant(a), LatticeValue::Constant(b)) => {
                folder(&a, &b).map_or(LatticeValue::Overdefined, LatticeValue::Constant)
            }
            _ => LatticeValue::Unknown,
        }
    }

    fn scalar_result(
        &self,
        module: &Module,
        func: FuncId,
        f: &Function,
        data: &InstData,
    ) -> LatticeValue {
        match &data.kind {
            InstKind::Load { volatile: true, .. } | InstKind::Alloca { .. } => {
                LatticeValue::Overdefined
            }
            InstKind::Load { ty, ptr, .. } => self.fold1(func, ptr, |c| fold::fold_load(module, ty, c)),
            InstKind::Gep {
                source_ty,
                ptr,
                indices,
            } => {
                let mut consts = Vec::with_capacity(indices.len() + 1);
                for op in std::iter::once(ptr).chain(indices) {
                    match self.operand_state(func, op) {
                        LatticeValue::Constant(c) => consts.push(c),
                        other => return other,
                    }
                }
                let (base, idx) = consts.split_at(1);
                fold::fold_gep(module, source_ty, &base[0], idx)
                    .map_or(LatticeValue::Overdefined, LatticeValue::Constant)
            }
            InstKind::Binary { op, lhs, rhs } => {
                self.fold2(func, lhs, rhs, |a, b| fold::fold_binary(*op, a, b))
            }
            InstKind::Cmp { pred, lhs, rhs } => {
                self.fold2(func, lhs, rhs, |a, b| fold::fold_cmp(*pred, a, b))
            }
            InstKind::Unary { op, operand } => self.fold1(func, operand, |c| fold::fold_unary(*op, c)),
            InstKind::Cast { op, value, to } => self.fold1(func, value, |c| fold::fold_cast(*op, c, to)),
            InstKind::Select {
                cond,
                if_true,
                if_false,
            } => match self.operand_state(func, cond) {
                LatticeValue::Unknown => LatticeValue::Unknown,
                LatticeValue::Constant(c) if c.as_u64().is_some() => {
                    if c.as_u64() != Some(0) {
                        self.operand_state(func, if_true)
                    } else {
                        self.operand_state(func, if_false)
                    }
                }
                _ => self
                    .operand_state(func, if_true)
                    .merge(&self.operand_state(func, if_false)),
            },
            InstKind::ExtractValue { aggregate, index } => match aggregate {
                Operand::Const(c) => fold::fold_extract_value(c, *index)
                    .map_or(LatticeValue::Overdefined, LatticeValue::Constant),
                Operand::Value(_) => {
                    let len = f.operand_type(aggregate).struct_len();
                    self.operand_fields(func, aggregate, len)
                        .get(*index as usize)
                        .cloned()
                        .unwrap_or(LatticeValue::Overdefined)
                }
            },
            InstKind::Phi { incoming } => {
                let mut acc = LatticeValue::Unknown;
                for (pred, op) in incoming {
                    if self.feasible_edges.contains(&(func, *pred, data.parent)) {
                        acc = acc.merge(&self.operand_state(func, op));
                    }
                }
                acc
            }
            InstKind::SsaCopy { value } => self.operand_state(func, value),
            _ => LatticeValue::Overdefined,
        }
    }

    fn struct_result(
        &self,
        module: &Module,
        func: FuncId,
        data: &InstData,
    ) -> Vec<LatticeValue> {
        let len = data.ty.struct_len();
        let overdefined = || vec![LatticeValue::Overdefined; len];
        match &data.kind {
            InstKind::Load {
                ty,
                ptr,
                volatile: false,
            } => match self.operand_state(func, ptr) {
                LatticeValue::Unknown => vec![LatticeValue::Unknown; len],
                LatticeValue::Constant(c) => fold::fold_load(module, ty, &c)
                    .map_or_else(overdefined, |agg| constant_fields(&agg, len)),
                LatticeValue::Overdefined => overdefined(),
            },
            InstKind::Select {
                cond,
                if_true,
                if_false,
            } => match self.operand_state(func, cond) {
                LatticeValue::Unknown => vec![LatticeValue::Unknown; len],
                LatticeValue::Constant(c) if c.as_u64().is_some() => {
                    let chosen = if c.as_u64() != Some(0) {
                        if_true
                    } else {
                        if_false
                    };
                    self.operand_fields(func, chosen, len)
                }
                _ => {
                    let mut fields = self.operand_fields(func, if_true, len);
                    merge_fields(&mut fields, &self.operand_fields(func, if_false, len));
                    fields
                }
            },
            InstKind::Phi { incoming } => {
                let mut fields = vec![LatticeValue::Unknown; len];
                for (pred, op) in incoming {
                    if self.feasible_edges.contains(&(func, *pred, data.parent)) {
                        merge_fields(&mut fields, &self.operand_fields(func, op, len));
                    }
                }
                fields
            }
            InstKind::SsaCopy { value } => self.operand_fields(func, value, len),
            _ => overdefined(),
        }
    }

    /// Force unknown branch conditions and call results in executable blocks
    /// of `funcs` to overdefined. Returns whether anything changed.
    fn resolve_undefs(&mut self, module: &Module, funcs: &[FuncId]) -> bool {
        let mut changed = false;
        for &func in funcs {
            let Some(f) = module.get_function(func) else {
                continue;
            };
            for block in f.block_ids() {
                if !self.executable.contains(&(func, block)) {
                    continue;
                }
                for &inst in &f.block(block).insts {
                    let data = f.inst(inst);
                    match &data.kind {
                        InstKind::CondBr {
                            cond: Operand::Value(v),
                            ..
                        }
                        | InstKind::Switch {
                            cond: Operand::Value(v),
                            ..
                        } => {
                            if self.value_state(func, *v).is_unknown() {
                                debug!("SCCP: resolving undefined condition in {}", f.name);
                                self.update(module, func, *v, LatticeValue::Overdefined);
                                changed = true;
                            }
                        }
                        InstKind::Call(_) | InstKind::Invoke { .. } if !data.ty.is_void() => {
                            let value = ValueId::Inst(inst);
                            let unknown = if data.ty.is_struct() {
                                self.fields
                                    .get(&(func, value))
                                    .map_or(true, |fs| fs.iter().any(LatticeValue::is_unknown))
                            } else {
                                self.value_state(func, value).is_unknown()
                            };
                            if unknown {
                                self.mark_overdefined(module, func, value, &data.ty);
                                changed = true;
                            }
                        }
                        _ => {}
                    }
                }
            }
        }
        changed
    }
}

impl Solver for SccpSolver {
    fn is_block_executable(&self, func: FuncId, block: BlockId) -> bool {
        self.executable.contains(&(func, block))
    }

    fn lattice_value_for(&self, func: FuncId, value: ValueId) -> LatticeValue {
        self.value_state(func, value)
    }

    fn struct_lattice_value_for(&self, func: FuncId, value: ValueId) -> Vec<LatticeValue> {
        self.fields.get(&(func, value)).cloned().unwrap_or_default()
    }

    fn constant_or_null(&self, func: FuncId, value: ValueId) -> Option<Constant> {
        if let Some(fields) = self.fields.get(&(func, value)) {
            let elems = fields
                .iter()
                .map(|f| f.as_constant().cloned())
                .collect::<Option<Vec<Constant>>>()?;
            if elems.is_empty() {
                return None;
            }
            let ty = Type::Struct(elems.iter().map(Constant::ty).collect());
            return Some(Constant::Aggregate { ty, elems });
        }
        self.value_state(func, value).as_constant().cloned()
    }

    fn is_argument_tracked_function(&self, func: FuncId) -> bool {
        self.arg_tracked.contains(&func)
    }

    fn add_argument_tracked_function(&mut self, func: FuncId) {
        self.arg_tracked.insert(func);
    }

    fn add_tracked_function(&mut self, func: FuncId) {
        self.ret_tracked.insert(func);
    }

    fn set_lattice_value_for_specialization_arguments(
        &mut self,
        module: &Module,
        clone: FuncId,
        original: FuncId,
        args: &[ArgInfo],
    ) {
        let Some(f) = module.get_function(clone) else {
            return;
        };
        for (i, param) in f.params.iter().enumerate() {
            let formal = ValueId::Arg(i as u32);
            let bound = args.iter().find(|a| a.formal == i as u32);
            if param.ty.is_struct() {
                let len = param.ty.struct_len();
                let fields = match bound {
                    Some(a) => constant_fields(&a.actual, len),
                    None if self.arg_tracked.contains(&original) => {
                        let mut fields = self.struct_lattice_value_for(original, formal);
                        fields.resize(len, LatticeValue::Unknown);
                        fields
                    }
                    None => vec![LatticeValue::Overdefined; len],
                };
                self.fields.insert((clone, formal), fields);
            } else {
                let state = match bound {
                    Some(a) => LatticeValue::Constant(a.actual.clone()),
                    None => self.lattice_value_for(original, formal),
                };
                self.values.insert((clone, formal), state);
            }
        }
    }

    fn mark_block_executable(&mut self, func: FuncId, block: BlockId) -> bool {
        if self.executable.insert((func, block)) {
            trace!("SCCP: marking {} of {} executable", block, func);
            self.block_worklist.push_back((func, block));
            true
        } else {
            false
        }
    }

    fn mark_function_unreachable(&mut self, func: FuncId) {
        self.executable.retain(|(f, _)| *f != func);
        self.feasible_edges.retain(|(f, _, _)| *f != func);
    }

    fn reset_lattice_value_for(&mut self, func: FuncId, value: ValueId) {
        self.values.remove(&(func, value));
        self.fields.remove(&(func, value));
        if let ValueId::Inst(inst) = value {
            self.inst_worklist.push_back((func, inst));
        }
    }

    fn solve_while_resolved_undefs_in(&mut self, module: &Module, funcs: &[FuncId]) {
        loop {
            self.solve(module);
            if !self.resolve_undefs(module, funcs) {
                break;
            }
        }
    }

    fn solve_while_resolved_undefs(&mut self, module: &Module) {
        let funcs = module.function_ids();
        self.solve_while_resolved_undefs_in(module, &funcs);
    }

    fn tracked_ret_val(&self, func: FuncId) -> Option<LatticeValue> {
        self.ret_tracked
            .contains(&func)
            .then(|| self.ret_vals.get(&func).cloned().unwrap_or_default())
    }

    fn is_struct_lattice_constant(&self, func: FuncId) -> bool {
        self.struct_ret_vals
            .get(&func)
            .is_some_and(|fields| !fields.is_empty() && fields.iter().all(LatticeValue::is_constant))
    }

    fn visit_call(&mut self, site: CallSiteRef) {
        self.inst_worklist.push_back((site.caller, site.inst));
    }
}
