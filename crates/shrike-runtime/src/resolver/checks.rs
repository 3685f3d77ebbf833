//! Expression type checks
//!
//! Each check returns `(result_type, compatible, narrowing)`. An
//! incompatible check makes the caller log an error and fall back to an
//! `any`-typed pseudo-result so resolution keeps going.

use super::Resolver;
use crate::token::TokenKind;
use crate::types::{intersect, unify, LoxType};

/// Outcome of a typing rule
pub(crate) struct CheckResult {
    pub(crate) ty: LoxType,
    pub(crate) compatible: bool,
    pub(crate) narrowing: bool,
}

impl CheckResult {
    fn ok(ty: LoxType) -> Self {
        Self {
            ty,
            compatible: true,
            narrowing: false,
        }
    }

    fn fail() -> Self {
        Self {
            ty: LoxType::Any,
            compatible: false,
            narrowing: false,
        }
    }
}

impl Resolver {
    /// Arithmetic, comparison and equality operators
    pub(crate) fn check_binary(
        &self,
        op: TokenKind,
        left: &LoxType,
        right: &LoxType,
    ) -> CheckResult {
        match op {
            TokenKind::EqualEqual | TokenKind::BangEqual => CheckResult::ok(LoxType::Boolean),
            TokenKind::Less
            | TokenKind::LessEqual
            | TokenKind::Greater
            | TokenKind::GreaterEqual => {
                if (left.is_numeric() && right.is_numeric())
                    || (matches!(left, LoxType::String) && matches!(right, LoxType::String))
                    || left.is_any()
                    || right.is_any()
                {
                    CheckResult::ok(LoxType::Boolean)
                } else {
                    CheckResult::fail()
                }
            }
            TokenKind::Plus => {
                // String `+` is concatenation; mixed string/number is not.
                if matches!(left, LoxType::String) && matches!(right, LoxType::String) {
                    CheckResult::ok(LoxType::String)
                } else {
                    self.check_numeric_pair(left, right)
                }
            }
            TokenKind::Minus | TokenKind::Star | TokenKind::Slash | TokenKind::StarStar => {
                self.check_numeric_pair(left, right)
            }
            TokenKind::Percent => {
                self.check_numeric_pair(left, right)
            }
            _ => CheckResult::fail(),
        }
    }

    /// Numeric pair with integer→floating promotion
    pub(crate) fn check_numeric_pair(&self, left: &LoxType, right: &LoxType) -> CheckResult {
        if left.is_any() || right.is_any() {
            return CheckResult::ok(LoxType::Any);
        }
        if !left.is_numeric() || !right.is_numeric() {
            return CheckResult::fail();
        }
        if matches!(left, LoxType::Floating) || matches!(right, LoxType::Floating) {
            CheckResult::ok(LoxType::Floating)
        } else {
            CheckResult::ok(LoxType::Integer)
        }
    }

    /// Unary minus and logical not
    pub(crate) fn check_unary(&self, op: TokenKind, operand: &LoxType) -> CheckResult {
        match op {
            TokenKind::Minus => {
                if operand.is_numeric() {
                    CheckResult::ok(operand.clone())
                } else {
                    CheckResult::fail()
                }
            }
            TokenKind::Bang => CheckResult::ok(LoxType::Boolean),
            _ => CheckResult::fail(),
        }
    }

    /// `++` / `--`: the target must be numeric
    pub(crate) fn check_step(&self, operand: &LoxType) -> CheckResult {
        if operand.is_numeric() {
            CheckResult::ok(operand.clone())
        } else {
            CheckResult::fail()
        }
    }

    /// Assignment compatibility; `narrowing` reports the reverse direction
    /// fitting (a floating value forced into an integer slot)
    pub(crate) fn check_assignment(&self, target: &LoxType, value: &LoxType) -> CheckResult {
        if unify(target, value) {
            CheckResult::ok(target.clone())
        } else {
            CheckResult {
                ty: LoxType::Any,
                compatible: false,
                narrowing: unify(value, target),
            }
        }
    }

    /// `and`/`or` yield one of their operands
    pub(crate) fn check_logical(&self, left: &LoxType, right: &LoxType) -> CheckResult {
        CheckResult::ok(intersect(left, right))
    }

    /// A condition must be compatible with boolean
    pub(crate) fn check_condition(&self, cond: &LoxType) -> bool {
        unify(&LoxType::Boolean, cond)
    }
}
