//! Instruction cost model and per-function code metrics.

use crate::ir::{CallAttrs, CastOp, FnAttrs, Function, InstId, InstKind, Module};

/// Opaque, comparable cost unit. Scores built from it are signed.
pub type Cost = i64;

/// What an instruction cost should measure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CostKind {
    /// Encoded size only.
    CodeSize,
    /// A blend of size and execution latency.
    SizeAndLatency,
}

/// Per-instruction cost oracle.
///
/// `None` means the cost cannot be determined; anything summed from an
/// invalid cost is invalid as well.
pub trait CostModel {
    fn instruction_cost(&self, func: &Function, inst: InstId, kind: CostKind) -> Option<Cost>;
}

/// Flat costs roughly in line with a generic scalar target.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultCostModel;

impl DefaultCostModel {
    const DIV_LATENCY: Cost = 4;
}

impl CostModel for DefaultCostModel {
    fn instruction_cost(&self, func: &Function, inst: InstId, kind: CostKind) -> Option<Cost> {
        let cost = match &func.inst(inst).kind {
            InstKind::Phi { .. }
            | InstKind::SsaCopy { .. }
            | InstKind::Br { .. }
            | InstKind::Unreachable => 0,
            InstKind::Cast {
                op: CastOp::BitCast | CastOp::PtrToInt | CastOp::IntToPtr,
                ..
            } => 0,
            InstKind::Cast { .. } => 1,
            InstKind::Binary { op, .. } if op.is_division() => match kind {
                CostKind::CodeSize => 1,
                CostKind::SizeAndLatency => Self::DIV_LATENCY,
            },
            InstKind::Binary { .. } | InstKind::Unary { .. } => 1,
            InstKind::Gep { indices, .. } => {
                if indices.iter().all(|i| i.as_const().is_some()) {
                    0
                } else {
                    1
                }
            }
            InstKind::Call(call) | InstKind::Invoke { call, .. } => 1 + call.args.len() as Cost,
            InstKind::Switch { .. } => 2,
            InstKind::Alloca { .. }
            | InstKind::Load { .. }
            | InstKind::Store { .. }
            | InstKind::Cmp { .. }
            | InstKind::Select { .. }
            | InstKind::ExtractValue { .. }
            | InstKind::CondBr { .. }
            | InstKind::Ret { .. } => 1,
        };
        Some(cost)
    }
}

/// Size summary of one function body.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CodeMetrics {
    /// Sum of code-size costs; `None` if any instruction had an invalid cost.
    pub num_insts: Option<Cost>,
    /// The body contains something that must not be duplicated.
    pub not_duplicatable: bool,
    pub num_blocks: usize,
    pub num_calls: usize,
}

impl CodeMetrics {
    pub fn analyze(module: &Module, func: &Function, model: &dyn CostModel) -> Self {
        let mut metrics = CodeMetrics {
            num_insts: Some(0),
            num_blocks: func.blocks.len(),
            ..CodeMetrics::default()
        };
        for inst in func.instructions() {
            metrics.num_insts = match (
                metrics.num_insts,
                model.instruction_cost(func, inst, CostKind::CodeSize),
            ) {
                (Some(total), Some(cost)) => Some(total + cost),
                _ => None,
            };
            if let Some(call) = func.inst(inst).kind.as_call() {
                metrics.num_calls += 1;
                let callee_no_dup = call
                    .called_function()
                    .and_then(|f| module.get_function(f))
                    .is_some_and(|f| f.attrs.contains(FnAttrs::NO_DUPLICATE));
                if call.attrs.contains(CallAttrs::NO_DUPLICATE) || callee_no_dup {
                    metrics.not_duplicatable = true;
                }
            }
        }
        metrics
    }
}
