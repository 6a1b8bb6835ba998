//! Specialization signatures and candidates.

use crate::analysis::Cost;
use crate::ir::{CallSiteRef, Constant, FuncId};
use serde::Serialize;

/// One formal argument bound to a constant.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct ArgInfo {
    /// Position of the formal parameter.
    pub formal: u32,
    pub actual: Constant,
}

impl ArgInfo {
    pub fn new(formal: u32, actual: Constant) -> Self {
        Self { formal, actual }
    }
}

/// The set of bindings that defines one specialization.
///
/// Bindings are kept sorted by formal position, so two signatures built from
/// the same pairs in any order compare and hash equal.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize)]
pub struct SpecSig {
    args: Vec<ArgInfo>,
}

impl SpecSig {
    pub fn new(mut args: Vec<ArgInfo>) -> Self {
        args.sort_by_key(|a| a.formal);
        args.dedup_by_key(|a| a.formal);
        Self { args }
    }

    pub fn args(&self) -> &[ArgInfo] {
        &self.args
    }

    pub fn is_empty(&self) -> bool {
        self.args.is_empty()
    }

    pub fn len(&self) -> usize {
        self.args.len()
    }

    /// The constant bound to `formal`, if any.
    pub fn binding(&self, formal: u32) -> Option<&Constant> {
        self.args
            .iter()
            .find(|a| a.formal == formal)
            .map(|a| &a.actual)
    }
}

/// A specialization candidate for one function.
#[derive(Debug, Clone, Serialize)]
pub struct Spec {
    /// The function to clone.
    pub func: FuncId,
    pub sig: SpecSig,
    /// Estimated benefit minus the cost of cloning; higher is better.
    pub score: Cost,
    /// Call sites to redirect to the clone once it exists.
    pub call_sites: Vec<CallSiteRef>,
    pub clone: Option<FuncId>,
}

impl Spec {
    pub fn new(func: FuncId, sig: SpecSig, score: Cost) -> Self {
        Self {
            func,
            sig,
            score,
            call_sites: Vec::new(),
            clone: None,
        }
    }
}
