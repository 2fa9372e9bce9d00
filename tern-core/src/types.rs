//! Core type system for Tern.
//!
//! Types are deliberately few: 64-bit integers, doubles, booleans, typed
//! pointers and `void` for functions without a result. `Unknown` only
//! exists while the analyzer is still working; it also acts as a poison
//! value so one error does not cascade into many.

use std::fmt;

use crate::ast::{BinaryOp, UnaryOp};

/// Size in bytes of every value; all Tern values occupy one machine word.
pub const WORD_SIZE: i64 = 8;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Type {
    Int,
    Float,
    Bool,
    Ptr(Box<Type>),
    Void,
    Unknown,
}

impl Type {
    pub fn ptr(pointee: Type) -> Type {
        Type::Ptr(Box::new(pointee))
    }

    pub fn is_void(&self) -> bool {
        matches!(self, Type::Void)
    }

    pub fn is_pointer(&self) -> bool {
        matches!(self, Type::Ptr(_))
    }

    /// Pointee of a pointer type.
    pub fn pointee(&self) -> Option<&Type> {
        match self {
            Type::Ptr(inner) => Some(inner),
            _ => None,
        }
    }

    /// Whether the type, or any type nested inside it, is still `Unknown`.
    pub fn contains_unknown(&self) -> bool {
        match self {
            Type::Unknown => true,
            Type::Ptr(inner) => inner.contains_unknown(),
            _ => false,
        }
    }

    /// Whether a value of this type can be stored in a variable.
    pub fn is_storable(&self) -> bool {
        !matches!(self, Type::Void | Type::Unknown)
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Type::Int => f.write_str("int"),
            Type::Float => f.write_str("float"),
            Type::Bool => f.write_str("bool"),
            Type::Ptr(inner) => write!(f, "ptr[{inner}]"),
            Type::Void => f.write_str("void"),
            Type::Unknown => f.write_str("{unknown}"),
        }
    }
}

/// Result type of a binary operator applied to operands of the given types.
///
/// This is the operator/operand table of the language. There is no implicit
/// numeric widening: `int + float` is rejected and must be written with an
/// explicit `to_float` conversion.
///
/// Returns `None` when the combination is not allowed. Callers are expected
/// to have filtered out `Unknown` operands already.
pub fn binary_result(op: BinaryOp, lhs: &Type, rhs: &Type) -> Option<Type> {
    use Type::*;

    match op {
        BinaryOp::Add => match (lhs, rhs) {
            (Int, Int) => Some(Int),
            (Float, Float) => Some(Float),
            (Ptr(_), Int) => Some(lhs.clone()),
            (Int, Ptr(_)) => Some(rhs.clone()),
            _ => None,
        },
        BinaryOp::Sub => match (lhs, rhs) {
            (Int, Int) => Some(Int),
            (Float, Float) => Some(Float),
            (Ptr(_), Int) => Some(lhs.clone()),
            (Ptr(a), Ptr(b)) if a == b => Some(Int),
            _ => None,
        },
        BinaryOp::Mul | BinaryOp::Div => match (lhs, rhs) {
            (Int, Int) => Some(Int),
            (Float, Float) => Some(Float),
            _ => None,
        },
        BinaryOp::Rem => match (lhs, rhs) {
            (Int, Int) => Some(Int),
            _ => None,
        },
        BinaryOp::Eq | BinaryOp::Ne => match (lhs, rhs) {
            (Int, Int) | (Float, Float) | (Bool, Bool) => Some(Bool),
            (Ptr(a), Ptr(b)) if a == b => Some(Bool),
            _ => None,
        },
        BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge => match (lhs, rhs) {
            (Int, Int) | (Float, Float) | (Bool, Bool) => Some(Bool),
            _ => None,
        },
        BinaryOp::And | BinaryOp::Or => match (lhs, rhs) {
            (Bool, Bool) => Some(Bool),
            _ => None,
        },
    }
}

/// Result type of `-x` and `not x`. Dereference and address-of depend on
/// the operand expression, not only its type, and are handled by the
/// analyzer.
pub fn unary_result(op: UnaryOp, operand: &Type) -> Option<Type> {
    match (op, operand) {
        (UnaryOp::Neg, Type::Int) => Some(Type::Int),
        (UnaryOp::Neg, Type::Float) => Some(Type::Float),
        (UnaryOp::Not, Type::Bool) => Some(Type::Bool),
        (UnaryOp::Deref, Type::Ptr(inner)) => Some((**inner).clone()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn arithmetic_requires_matching_numeric_types() {
        assert_eq!(binary_result(BinaryOp::Add, &Type::Int, &Type::Int), Some(Type::Int));
        assert_eq!(
            binary_result(BinaryOp::Div, &Type::Float, &Type::Float),
            Some(Type::Float)
        );
        assert_eq!(binary_result(BinaryOp::Add, &Type::Int, &Type::Float), None);
        assert_eq!(binary_result(BinaryOp::Rem, &Type::Float, &Type::Float), None);
        assert_eq!(binary_result(BinaryOp::Mul, &Type::Bool, &Type::Bool), None);
    }

    #[test]
    fn pointer_arithmetic_uses_integer_offsets() {
        let p = Type::ptr(Type::Int);
        assert_eq!(binary_result(BinaryOp::Add, &p, &Type::Int), Some(p.clone()));
        assert_eq!(binary_result(BinaryOp::Add, &Type::Int, &p), Some(p.clone()));
        assert_eq!(binary_result(BinaryOp::Sub, &p, &Type::Int), Some(p.clone()));
        assert_eq!(binary_result(BinaryOp::Sub, &p, &p), Some(Type::Int));
        assert_eq!(binary_result(BinaryOp::Sub, &Type::Int, &p), None);
        assert_eq!(binary_result(BinaryOp::Add, &p, &p), None);
        assert_eq!(binary_result(BinaryOp::Mul, &p, &Type::Int), None);
    }

    #[test]
    fn comparisons_and_logic_produce_bool() {
        assert_eq!(binary_result(BinaryOp::Lt, &Type::Float, &Type::Float), Some(Type::Bool));
        assert_eq!(binary_result(BinaryOp::Ge, &Type::Bool, &Type::Bool), Some(Type::Bool));
        assert_eq!(binary_result(BinaryOp::Lt, &Type::Int, &Type::Float), None);
        assert_eq!(binary_result(BinaryOp::And, &Type::Bool, &Type::Bool), Some(Type::Bool));
        assert_eq!(binary_result(BinaryOp::Or, &Type::Int, &Type::Int), None);
        let p = Type::ptr(Type::Float);
        assert_eq!(binary_result(BinaryOp::Eq, &p, &p), Some(Type::Bool));
        assert_eq!(binary_result(BinaryOp::Lt, &p, &p), None);
    }

    #[test]
    fn unary_operators() {
        assert_eq!(unary_result(UnaryOp::Neg, &Type::Float), Some(Type::Float));
        assert_eq!(unary_result(UnaryOp::Not, &Type::Int), None);
        assert_eq!(
            unary_result(UnaryOp::Deref, &Type::ptr(Type::Bool)),
            Some(Type::Bool)
        );
        assert_eq!(unary_result(UnaryOp::Deref, &Type::Int), None);
    }

    #[test]
    fn displays_nested_pointer_types() {
        assert_eq!(Type::ptr(Type::ptr(Type::Int)).to_string(), "ptr[ptr[int]]");
        assert!(Type::ptr(Type::Unknown).contains_unknown());
        assert!(!Type::Void.is_storable());
    }
}
