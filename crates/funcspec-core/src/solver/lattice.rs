//! The constant-propagation lattice.

use crate::ir::Constant;
use std::fmt;

/// The solver's current belief about one scalar value.
///
/// Values only ever move down the lattice: `Unknown` -> `Constant` ->
/// `Overdefined`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub enum LatticeValue {
    /// Nothing is known yet; the value may still turn out to be anything.
    #[default]
    Unknown,
    /// The value is exactly this constant.
    Constant(Constant),
    /// The value can take more than one value at run time.
    Overdefined,
}

impl LatticeValue {
    pub fn is_unknown(&self) -> bool {
        matches!(self, LatticeValue::Unknown)
    }

    pub fn is_constant(&self) -> bool {
        matches!(self, LatticeValue::Constant(_))
    }

    pub fn is_overdefined(&self) -> bool {
        matches!(self, LatticeValue::Overdefined)
    }

    pub fn as_constant(&self) -> Option<&Constant> {
        match self {
            LatticeValue::Constant(c) => Some(c),
            _ => None,
        }
    }

    /// Least upper bound of two lattice values.
    pub fn merge(&self, other: &LatticeValue) -> LatticeValue {
        match (self, other) {
            (LatticeValue::Unknown, x) | (x, LatticeValue::Unknown) => x.clone(),
            (LatticeValue::Constant(a), LatticeValue::Constant(b)) if a == b => self.clone(),
            _ => LatticeValue::Overdefined,
        }
    }

    /// Merge `other` into `self`, returning whether `self` changed.
    pub fn merge_in(&mut self, other: &LatticeValue) -> bool {
        let merged = self.merge(other);
        if merged != *self {
            *self = merged;
            true
        } else {
            false
        }
    }
}

impl fmt::Display for LatticeValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LatticeValue::Unknown => write!(f, "unknown"),
            LatticeValue::Constant(c) => write!(f, "constant {:?}", c),
            LatticeValue::Overdefined => write!(f, "overdefined"),
        }
    }
}

/// Merge a field-wise lattice into `dst`, growing it if needed. Returns
/// whether anything changed.
pub fn merge_fields(dst: &mut Vec<LatticeValue>, src: &[LatticeValue]) -> bool {
    if dst.len() < src.len() {
        dst.resize(src.len(), LatticeValue::Unknown);
    }
    let mut changed = false;
    for (d, s) in dst.iter_mut().zip(src) {
        changed |= d.merge_in(s);
    }
    changed
}
