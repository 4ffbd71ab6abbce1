//! Expression-type folding (spec §4.2 "Expressions", "Operators and type
//! rules").
//!
//! The grammar has no operator precedence: an expression is folded
//! strictly left to right, and the compiler tracks a single running type
//! as it goes, erroring the moment an operator disagrees with it. This
//! module is that fold's rule table, kept separate from the recursive
//! descent in `parser.rs` so the rules read as a table rather than being
//! buried in control flow.

use crate::ast::{BinOp, UnaryOp};
use ria_core::ValueType;

#[derive(Debug, Clone)]
pub struct TypeError(pub String);

pub fn fold_binop(op: BinOp, lhs: ValueType, rhs: ValueType) -> Result<ValueType, TypeError> {
    use BinOp::*;
    use ValueType::*;
    match op {
        Add => match (lhs, rhs) {
            (Str, Str) => Ok(Str),
            (Int, Int) => Ok(Int),
            _ => Err(mismatch("+", lhs, rhs)),
        },
        Sub => match (lhs, rhs) {
            (Int, Int) => Ok(Int),
            _ => Err(mismatch("-", lhs, rhs)),
        },
        Or => match (lhs, rhs) {
            (Bool, Bool) => Ok(Bool),
            _ => Err(mismatch("||", lhs, rhs)),
        },
        And => match (lhs, rhs) {
            (Bool, Bool) => Ok(Bool),
            _ => Err(mismatch("&&", lhs, rhs)),
        },
        Mul | Div | Rem | BAnd | BOr | Xor => match (lhs, rhs) {
            (Int, Int) => Ok(Int),
            _ => Err(mismatch(op_symbol(op), lhs, rhs)),
        },
        Lt | Gt | Le | Ge | Eq | NotEq => match (lhs, rhs) {
            (Int, Int) | (Str, Str) => Ok(Bool),
            _ => Err(mismatch(op_symbol(op), lhs, rhs)),
        },
    }
}

pub fn fold_unop(op: UnaryOp, operand: ValueType) -> Result<ValueType, TypeError> {
    use UnaryOp::*;
    use ValueType::*;
    match (op, operand) {
        (Neg, Int) => Ok(Int),
        (BitNot, Int) => Ok(Int),
        (Not, Bool) => Ok(Bool),
        (Neg, t) => Err(TypeError(format!("unary '-' requires int, found {t}"))),
        (BitNot, t) => Err(TypeError(format!("unary '~' requires int, found {t}"))),
        (Not, t) => Err(TypeError(format!("unary '!' requires boolean, found {t}"))),
    }
}

fn op_symbol(op: BinOp) -> &'static str {
    use BinOp::*;
    match op {
        Add => "+",
        Sub => "-",
        Mul => "*",
        Div => "/",
        Rem => "%",
        BAnd => "&",
        BOr => "|",
        Xor => "^",
        Lt => "<",
        Gt => ">",
        Le => "<=",
        Ge => ">=",
        Eq => "==",
        NotEq => "!=",
        And => "&&",
        Or => "||",
    }
}

fn mismatch(op: &str, lhs: ValueType, rhs: ValueType) -> TypeError {
    TypeError(format!(
        "operator '{op}' does not accept operand types {lhs} and {rhs}"
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn string_plus_is_concatenation() {
        assert!(matches!(fold_binop(BinOp::Add, ValueType::Str, ValueType::Str), Ok(ValueType::Str)));
    }

    #[test]
    fn mixed_types_are_rejected() {
        assert!(fold_binop(BinOp::Add, ValueType::Int, ValueType::Str).is_err());
    }

    #[test]
    fn bool_or_requires_both_bool() {
        assert!(matches!(fold_binop(BinOp::Or, ValueType::Bool, ValueType::Bool), Ok(ValueType::Bool)));
        assert!(fold_binop(BinOp::Or, ValueType::Int, ValueType::Int).is_err());
    }
}
