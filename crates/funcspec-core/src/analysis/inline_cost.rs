//! Inline cost estimation for a call site and a known target.
//!
//! The specializer only asks one question: if an indirect call were turned
//! into a direct call to `callee`, how attractive would inlining it be?

use super::cost::{Cost, CostKind, CostModel, DefaultCostModel};
use crate::ir::{CallInst, FnAttrs, Function};

/// Outcome of an inline cost query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InlineCost {
    /// The callee must always be inlined.
    Always,
    /// The callee can never be inlined.
    Never,
    /// Inlining is profitable when `cost < threshold`.
    Variable { cost: Cost, threshold: Cost },
}

impl InlineCost {
    pub fn is_always(&self) -> bool {
        matches!(self, InlineCost::Always)
    }

    pub fn is_variable(&self) -> bool {
        matches!(self, InlineCost::Variable { .. })
    }

    /// How far under the threshold the cost is; zero unless variable.
    pub fn cost_delta(&self) -> Cost {
        match self {
            InlineCost::Variable { cost, threshold } => threshold - cost,
            _ => 0,
        }
    }
}

/// Thresholds an inline query is evaluated against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InlineParams {
    pub default_threshold: Cost,
    /// Extra threshold granted when the call being considered is indirect.
    pub indirect_call_threshold: Cost,
}

impl Default for InlineParams {
    fn default() -> Self {
        Self {
            default_threshold: 225,
            indirect_call_threshold: 100,
        }
    }
}

pub trait InlineCostEstimator {
    fn inline_cost(
        &self,
        caller: &Function,
        call: &CallInst,
        callee: &Function,
        params: &InlineParams,
    ) -> InlineCost;
}

/// Size-driven estimator: every instruction of the callee costs
/// `cost_per_inst` times its code size, minus what removing the call saves.
#[derive(Debug, Clone, Copy)]
pub struct DefaultInlineEstimator {
    pub cost_per_inst: Cost,
    /// Saved by not emitting the call sequence.
    pub call_penalty: Cost,
    /// Saved per argument that no longer has to be passed.
    pub arg_benefit: Cost,
}

impl Default for DefaultInlineEstimator {
    fn default() -> Self {
        Self {
            cost_per_inst: 5,
            call_penalty: 25,
            arg_benefit: 5,
        }
    }
}

impl InlineCostEstimator for DefaultInlineEstimator {
    fn inline_cost(
        &self,
        _caller: &Function,
        call: &CallInst,
        callee: &Function,
        params: &InlineParams,
    ) -> InlineCost {
        if callee.is_declaration() || callee.attrs.contains(FnAttrs::NO_INLINE) {
            return InlineCost::Never;
        }
        if callee.attrs.contains(FnAttrs::ALWAYS_INLINE) {
            return InlineCost::Always;
        }
        let model = DefaultCostModel;
        let mut size: Cost = 0;
        for inst in callee.instructions() {
            match model.instruction_cost(callee, inst, CostKind::CodeSize) {
                Some(c) => size += c,
                None => return InlineCost::Never,
            }
        }
        let cost = size * self.cost_per_inst
            - self.call_penalty
            - self.arg_benefit * call.args.len() as Cost;
        InlineCost::Variable {
            cost,
            threshold: params.default_threshold,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{Constant, FnType, Operand, Type};

    fn leaf(attrs: FnAttrs) -> Function {
        let mut f = Function::new("leaf", vec![], Type::Void);
        f.attrs = attrs;
        let entry = f.add_block("entry");
        f.append_inst(
            entry,
            crate::ir::InstKind::Ret { value: None },
            Type::Void,
            None,
        );
        f
    }

    fn call() -> CallInst {
        CallInst::new(
            Operand::Const(Constant::Null),
            vec![],
            FnType::new(vec![], Type::Void),
        )
    }

    #[test]
    fn test_attributes_decide_before_size() {
        let caller = leaf(FnAttrs::empty());
        let params = InlineParams::default();
        let est = DefaultInlineEstimator::default();
        assert!(est
            .inline_cost(&caller, &call(), &leaf(FnAttrs::ALWAYS_INLINE), &params)
            .is_always());
        assert_eq!(
            est.inline_cost(&caller, &call(), &leaf(FnAttrs::NO_INLINE), &params),
            InlineCost::Never
        );
    }

    #[test]
    fn test_small_callee_has_positive_delta() {
        let caller = leaf(FnAttrs::empty());
        let params = InlineParams::default();
        let ic = DefaultInlineEstimator::default().inline_cost(
            &caller,
            &call(),
            &leaf(FnAttrs::empty()),
            &params,
        );
        // one `ret` (5) minus the call penalty (25)
        assert_eq!(
            ic,
            InlineCost::Variable {
                cost: -20,
                threshold: 225
            }
        );
        assert_eq!(ic.cost_delta(), 245);
        assert_eq!(InlineCost::Never.cost_delta(), 0);
    }
}
