//! Program analyses consumed by the specializer.
//!
//! None of these mutate the IR. The dependency chain is:
//!
//! ```text
//! CFG (needs only the function body)
//!  └─> Dominance + loop nesting (needs CFG)
//!       └─> Block frequency (needs loop nesting, or profile counts)
//!
//! Cost model / code metrics (independent)
//! Inline cost (uses the cost model)
//! ```

pub mod cfg;
pub mod cost;
pub mod dominance;
pub mod frequency;
pub mod inline_cost;

pub use cfg::ControlFlowGraph;
pub use cost::{CodeMetrics, Cost, CostKind, CostModel, DefaultCostModel};
pub use dominance::{DominatorTree, LoopNesting};
pub use frequency::BlockFrequencyInfo;
pub use inline_cost::{
    DefaultInlineEstimator, InlineCost, InlineCostEstimator, InlineParams,
};
