//! Compile-time constants.

use super::types::Type;
use super::{FuncId, GlobalId};
use serde::{Deserialize, Serialize};

/// A compile-time-known value.
///
/// Constants are hashable and compare structurally, so a set of argument
/// bindings can be used directly as a map key. Floats are stored as their bit
/// pattern for that reason.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Constant {
    /// Integer of `bits` width; `value` is kept masked to the width.
    Int { bits: u8, value: u64 },
    /// Bit pattern of a 64-bit float.
    Float(u64),
    /// The null pointer.
    Null,
    Undef(Type),
    Poison(Type),
    /// Address of a function.
    Function(FuncId),
    /// Address of a global, or of an element inside it reached through `path`.
    GlobalAddr { global: GlobalId, path: Vec<u32> },
    /// Struct or array literal.
    Aggregate { ty: Type, elems: Vec<Constant> },
}

impl Constant {
    pub fn int(bits: u8, value: i64) -> Self {
        Constant::Int {
            bits,
            value: mask(bits, value as u64),
        }
    }

    pub fn i32(value: i32) -> Self {
        Self::int(32, i64::from(value))
    }

    pub fn i64(value: i64) -> Self {
        Self::int(64, value)
    }

    pub fn bool(value: bool) -> Self {
        Self::int(1, i64::from(value))
    }

    pub fn float(value: f64) -> Self {
        Constant::Float(value.to_bits())
    }

    pub fn global(global: GlobalId) -> Self {
        Constant::GlobalAddr {
            global,
            path: Vec::new(),
        }
    }

    pub fn ty(&self) -> Type {
        match self {
            Constant::Int { bits, .. } => Type::Int(*bits),
            Constant::Float(_) => Type::Float,
            Constant::Null | Constant::Function(_) | Constant::GlobalAddr { .. } => Type::Ptr,
            Constant::Undef(ty) | Constant::Poison(ty) => ty.clone(),
            Constant::Aggregate { ty, .. } => ty.clone(),
        }
    }

    /// Zero-extended integer value.
    pub fn as_u64(&self) -> Option<u64> {
        match self {
            Constant::Int { value, .. } => Some(*value),
            _ => None,
        }
    }

    /// Sign-extended integer value.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Constant::Int { bits, value } => Some(sign_extend(*bits, *value)),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Constant::Float(bits) => Some(f64::from_bits(*bits)),
            _ => None,
        }
    }

    pub fn as_function(&self) -> Option<FuncId> {
        match self {
            Constant::Function(func) => Some(*func),
            _ => None,
        }
    }

    /// True for the all-zero value of any type.
    pub fn is_zero_value(&self) -> bool {
        match self {
            Constant::Int { value, .. } => *value == 0,
            Constant::Float(bits) => *bits == 0,
            Constant::Null => true,
            Constant::Aggregate { elems, .. } => elems.iter().all(Constant::is_zero_value),
            _ => false,
        }
    }

    pub fn is_one_value(&self) -> bool {
        matches!(self, Constant::Int { value: 1, .. })
    }

    pub fn is_poison(&self) -> bool {
        matches!(self, Constant::Poison(_))
    }

    pub fn is_undef_or_poison(&self) -> bool {
        matches!(self, Constant::Undef(_) | Constant::Poison(_))
    }

    /// The global a pointer constant is derived from, if any.
    pub fn underlying_global(&self) -> Option<GlobalId> {
        match self {
            Constant::GlobalAddr { global, .. } => Some(*global),
            _ => None,
        }
    }

    /// Whether this constant mentions the address of `func` anywhere inside it.
    pub fn references_function(&self, func: FuncId) -> bool {
        match self {
            Constant::Function(f) => *f == func,
            Constant::Aggregate { elems, .. } => elems.iter().any(|e| e.references_function(func)),
            _ => false,
        }
    }

    /// Replace every mention of `func` with `with`. Returns whether anything changed.
    pub fn replace_function(&mut self, func: FuncId, with: &Constant) -> bool {
        match self {
            Constant::Function(f) if *f == func => {
                *self = with.clone();
                true
            }
            Constant::Aggregate { elems, .. } => {
                let mut changed = false;
                for elem in elems {
                    changed |= elem.replace_function(func, with);
                }
                changed
            }
            _ => false,
        }
    }
}

/// Truncate `value` to its low `bits` bits.
pub(crate) fn mask(bits: u8, value: u64) -> u64 {
    if bits >= 64 {
        value
    } else {
        value & ((1u64 << bits) - 1)
    }
}

/// Interpret the low `bits` bits of `value` as a two's complement integer.
pub(crate) fn sign_extend(bits: u8, value: u64) -> i64 {
    if bits == 0 {
        return 0;
    }
    if bits >= 64 {
        return value as i64;
    }
    let shift = 64 - u32::from(bits);
    ((value << shift) as i64) >> shift
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_int_is_masked_to_width() {
        let c = Constant::int(8, -1);
        assert_eq!(c.as_u64(), Some(0xff));
        assert_eq!(c.as_i64(), Some(-1));
        assert_eq!(Constant::bool(true).as_u64(), Some(1));
    }

    #[test]
    fn test_constants_compare_structurally() {
        assert_eq!(Constant::i32(10), Constant::int(32, 10));
        assert_ne!(Constant::i32(10), Constant::i64(10));
        assert_eq!(Constant::float(1.5), Constant::float(1.5));
        assert!(Constant::global(GlobalId(0)) != Constant::global(GlobalId(1)));
    }

    #[test]
    fn test_zero_and_one_values() {
        assert!(Constant::Null.is_zero_value());
        assert!(Constant::bool(false).is_zero_value());
        assert!(Constant::bool(true).is_one_value());
        assert!(!Constant::Function(FuncId(0)).is_zero_value());
    }

    #[test]
    fn test_replace_function_inside_aggregate() {
        let mut c = Constant::Aggregate {
            ty: Type::Struct(vec![Type::Ptr, Type::I32]),
            elems: vec![Constant::Function(FuncId(3)), Constant::i32(1)],
        };
        assert!(c.references_function(FuncId(3)));
        assert!(c.replace_function(FuncId(3), &Constant::Poison(Type::Ptr)));
        assert!(!c.references_function(FuncId(3)));
    }
}
