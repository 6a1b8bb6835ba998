//! Def-use chains for one function.

use super::function::Function;
use super::inst::ValueId;
use super::InstId;
use rustc_hash::FxHashMap;

/// Users of every value in a function, in instruction order.
///
/// An instruction that uses the same value through several operands is
/// listed once.
#[derive(Debug, Default, Clone)]
pub struct DefUse {
    users: FxHashMap<ValueId, Vec<InstId>>,
}

impl DefUse {
    pub fn compute(func: &Function) -> Self {
        let mut users: FxHashMap<ValueId, Vec<InstId>> = FxHashMap::default();
        for id in func.instructions() {
            for op in func.inst(id).kind.operands() {
                if let Some(value) = op.as_value() {
                    let list = users.entry(value).or_default();
                    if list.last() != Some(&id) {
                        list.push(id);
                    }
                }
            }
        }
        Self { users }
    }

    pub fn users(&self, value: ValueId) -> &[InstId] {
        self.users.get(&value).map(|v| v.as_slice()).unwrap_or(&[])
    }

    pub fn has_users(&self, value: ValueId) -> bool {
        !self.users(value).is_empty()
    }
}
