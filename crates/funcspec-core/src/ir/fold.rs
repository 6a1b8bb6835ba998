//! Constant folding over [`Constant`] operands.
//!
//! Shared by the SCCP solver and by the specialization cost visitor. Every
//! folder returns `None` when the result is not a simple constant: undefined
//! operations (division by zero, over-wide shifts), undef or poison inputs,
//! and pointer arithmetic that leaves a known object.

use super::constant::{mask, sign_extend, Constant};
use super::inst::{BinaryOp, CastOp, CmpPredicate, UnaryOp};
use super::module::Module;
use super::types::Type;

pub fn fold_binary(op: BinaryOp, lhs: &Constant, rhs: &Constant) -> Option<Constant> {
    match (lhs, rhs) {
        (Constant::Int { bits, value: a }, Constant::Int { bits: rb, value: b }) if bits == rb => {
            fold_int_binary(op, *bits, *a, *b)
        }
        (Constant::Float(a), Constant::Float(b)) => {
            let (a, b) = (f64::from_bits(*a), f64::from_bits(*b));
            let result = match op {
                BinaryOp::FAdd => a + b,
                BinaryOp::FSub => a - b,
                BinaryOp::FMul => a * b,
                BinaryOp::FDiv => a / b,
                BinaryOp::FRem => a % b,
                _ => return None,
            };
            Some(Constant::float(result))
        }
        _ => None,
    }
}

fn fold_int_binary(op: BinaryOp, bits: u8, a: u64, b: u64) -> Option<Constant> {
    let sa = sign_extend(bits, a);
    let sb = sign_extend(bits, b);
    let signed_min = sign_extend(bits, 1u64 << (bits.clamp(1, 64) - 1));
    let raw = match op {
        BinaryOp::Add => a.wrapping_add(b),
        BinaryOp::Sub => a.wrapping_sub(b),
        BinaryOp::Mul => a.wrapping_mul(b),
        BinaryOp::UDiv => a.checked_div(b)?,
        BinaryOp::URem => a.checked_rem(b)?,
        BinaryOp::SDiv | BinaryOp::SRem => {
            if sb == 0 || (sa == signed_min && sb == -1) {
                return None;
            }
            let r = if op == BinaryOp::SDiv { sa / sb } else { sa % sb };
            r as u64
        }
        BinaryOp::Shl | BinaryOp::LShr | BinaryOp::AShr => {
            if b >= u64::from(bits) {
                return None;
            }
            match op {
                BinaryOp::Shl => a << b,
                BinaryOp::LShr => a >> b,
                _ => (sa >> b) as u64,
            }
        }
        BinaryOp::And => a & b,
        BinaryOp::Or => a | b,
        BinaryOp::Xor => a ^ b,
        _ => return None,
    };
    Some(Constant::Int {
        bits,
        value: mask(bits, raw),
    })
}

pub fn fold_unary(op: UnaryOp, operand: &Constant) -> Option<Constant> {
    match (op, operand) {
        (UnaryOp::FNeg, Constant::Float(bits)) => Some(Constant::float(-f64::from_bits(*bits))),
        _ => None,
    }
}

pub fn fold_cmp(pred: CmpPredicate, lhs: &Constant, rhs: &Constant) -> Option<Constant> {
    use CmpPredicate::*;
    let result = match (lhs, rhs) {
        (Constant::Int { bits, value: a }, Constant::Int { bits: rb, value: b }) if bits == rb => {
            let (sa, sb) = (sign_extend(*bits, *a), sign_extend(*bits, *b));
            match pred {
                Eq => a == b,
                Ne => a != b,
                Ugt => a > b,
                Uge => a >= b,
                Ult => a < b,
                Ule => a <= b,
                Sgt => sa > sb,
                Sge => sa >= sb,
                Slt => sa < sb,
                Sle => sa <= sb,
                _ => return None,
            }
        }
        (Constant::Float(a), Constant::Float(b)) => {
            let (a, b) = (f64::from_bits(*a), f64::from_bits(*b));
            match pred {
                FOeq => a == b,
                FOne => !a.is_nan() && !b.is_nan() && a != b,
                FOgt => a > b,
                FOge => a >= b,
                FOlt => a < b,
                FOle => a <= b,
                _ => return None,
            }
        }
        _ => {
            let equal = pointers_equal(lhs, rhs)?;
            match pred {
                Eq => equal,
                Ne => !equal,
                _ => return None,
            }
        }
    };
    Some(Constant::bool(result))
}

/// Equality of two pointer constants when it is decidable.
fn pointers_equal(lhs: &Constant, rhs: &Constant) -> Option<bool> {
    let is_object = |c: &Constant| matches!(c, Constant::Function(_) | Constant::GlobalAddr { .. });
    match (lhs, rhs) {
        (Constant::Null, Constant::Null) => Some(true),
        (Constant::Null, other) | (other, Constant::Null) if is_object(other) => Some(false),
        (Constant::Function(a), Constant::Function(b)) => Some(a == b),
        (Constant::GlobalAddr { .. }, Constant::GlobalAddr { .. }) => Some(lhs == rhs),
        (Constant::Function(_), Constant::GlobalAddr { .. })
        | (Constant::GlobalAddr { .. }, Constant::Function(_)) => Some(false),
        _ => None,
    }
}

pub fn fold_cast(op: CastOp, value: &Constant, to: &Type) -> Option<Constant> {
    match (op, value, to) {
        (CastOp::Trunc, Constant::Int { bits, value }, Type::Int(to_bits)) if to_bits < bits => {
            Some(Constant::Int {
                bits: *to_bits,
                value: mask(*to_bits, *value),
            })
        }
        (CastOp::ZExt, Constant::Int { bits, value }, Type::Int(to_bits)) if to_bits > bits => {
            Some(Constant::Int {
                bits: *to_bits,
                value: *value,
            })
        }
        (CastOp::SExt, Constant::Int { bits, value }, Type::Int(to_bits)) if to_bits > bits => {
            Some(Constant::int(*to_bits, sign_extend(*bits, *value)))
        }
        (CastOp::BitCast, c, to) if c.ty() == *to && !c.is_undef_or_poison() => Some(c.clone()),
        (CastOp::SIToFP, Constant::Int { bits, value }, Type::Float) => {
            Some(Constant::float(sign_extend(*bits, *value) as f64))
        }
        (CastOp::FPToSI, Constant::Float(fbits), Type::Int(to_bits)) => {
            let f = f64::from_bits(*fbits).trunc();
            let min = sign_extend(*to_bits, 1u64 << ((*to_bits).clamp(1, 64) - 1)) as f64;
            if f.is_nan() || f < min || f >= -min {
                return None;
            }
            Some(Constant::int(*to_bits, f as i64))
        }
        (CastOp::PtrToInt, Constant::Null, Type::Int(to_bits)) => Some(Constant::int(*to_bits, 0)),
        (CastOp::IntToPtr, Constant::Int { value: 0, .. }, Type::Ptr) => Some(Constant::Null),
        _ => None,
    }
}

pub fn fold_extract_value(aggregate: &Constant, index: u32) -> Option<Constant> {
    match aggregate {
        Constant::Aggregate { elems, .. } => elems.get(index as usize).cloned(),
        _ => None,
    }
}

/// Fold an address computation rooted at a global.
///
/// The first index must be zero: stepping over whole objects leaves the
/// global, and such addresses are not representable as constants.
pub fn fold_gep(
    module: &Module,
    source_ty: &Type,
    base: &Constant,
    indices: &[Constant],
) -> Option<Constant> {
    let (first, rest) = indices.split_first()?;
    if first.as_u64()? != 0 {
        return None;
    }
    match base {
        Constant::Null if rest.iter().all(Constant::is_zero_value) => Some(Constant::Null),
        Constant::GlobalAddr { global, path } => {
            // Walk the pointee type starting from where `path` already points.
            let mut ty = module.global(*global).ty.clone();
            for &step in path {
                ty = ty.element_type(u64::from(step))?.clone();
            }
            if *source_ty != ty {
                return None;
            }
            let mut new_path = path.clone();
            for idx in rest {
                let step = idx.as_u64()?;
                ty = ty.element_type(step)?.clone();
                new_path.push(u32::try_from(step).ok()?);
            }
            Some(Constant::GlobalAddr {
                global: *global,
                path: new_path,
            })
        }
        _ => None,
    }
}

/// Load a value of type `ty` from a constant address inside a read-only global.
pub fn fold_load(module: &Module, ty: &Type, ptr: &Constant) -> Option<Constant> {
    let Constant::GlobalAddr { global, path } = ptr else {
        return None;
    };
    let global = module.global(*global);
    if !global.is_constant {
        return None;
    }
    let mut value = global.initializer.as_ref()?;
    for &step in path {
        match value {
            Constant::Aggregate { elems, .. } => value = elems.get(step as usize)?,
            _ => return None,
        }
    }
    (value.ty() == *ty && !value.is_undef_or_poison()).then(|| value.clone())
}
