//! Value types.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The type of an IR value.
///
/// Pointers are opaque: every pointer has type [`Type::Ptr`], so pointer casts
/// between pointer types never change the type of a value.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Type {
    Void,
    /// Integer of the given bit width (1..=64).
    Int(u8),
    /// 64-bit IEEE float.
    Float,
    Ptr,
    Struct(Vec<Type>),
    Array(Box<Type>, u32),
}

impl Type {
    pub const I1: Type = Type::Int(1);
    pub const I8: Type = Type::Int(8);
    pub const I32: Type = Type::Int(32);
    pub const I64: Type = Type::Int(64);

    pub fn is_void(&self) -> bool {
        matches!(self, Type::Void)
    }

    pub fn is_integer(&self) -> bool {
        matches!(self, Type::Int(_))
    }

    pub fn is_float(&self) -> bool {
        matches!(self, Type::Float)
    }

    pub fn is_pointer(&self) -> bool {
        matches!(self, Type::Ptr)
    }

    pub fn is_struct(&self) -> bool {
        matches!(self, Type::Struct(_))
    }

    pub fn is_aggregate(&self) -> bool {
        matches!(self, Type::Struct(_) | Type::Array(..))
    }

    /// Bit width for integer types.
    pub fn int_bits(&self) -> Option<u8> {
        match self {
            Type::Int(bits) => Some(*bits),
            _ => None,
        }
    }

    /// Number of struct fields; zero for every other type.
    pub fn struct_len(&self) -> usize {
        match self {
            Type::Struct(fields) => fields.len(),
            _ => 0,
        }
    }

    /// The type reached by indexing into an aggregate.
    pub fn element_type(&self, index: u64) -> Option<&Type> {
        match self {
            Type::Struct(fields) => fields.get(usize::try_from(index).ok()?),
            Type::Array(elem, len) if index < u64::from(*len) => Some(elem),
            _ => None,
        }
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Type::Void => write!(f, "void"),
            Type::Int(bits) => write!(f, "i{}", bits),
            Type::Float => write!(f, "double"),
            Type::Ptr => write!(f, "ptr"),
            Type::Struct(fields) => {
                write!(f, "{{ ")?;
                for (i, field) in fields.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", field)?;
                }
                write!(f, " }}")
            }
            Type::Array(elem, len) => write!(f, "[{} x {}]", len, elem),
        }
    }
}

/// Signature of a function or of a call.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FnType {
    pub params: Vec<Type>,
    pub ret: Type,
}

impl FnType {
    pub fn new(params: Vec<Type>, ret: Type) -> Self {
        Self { params, ret }
    }
}

impl fmt::Display for FnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (", self.ret)?;
        for (i, param) in self.params.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", param)?;
        }
        write!(f, ")")
    }
}
