// Formula evaluator - executes expression ASTs against a cell lookup

use crate::cell::CellValue;
use crate::error::FormulaError;
use crate::position::Position;

use super::parser::{Expr, Op, UnaryOp};

/// Source of cell values for formula evaluation.
///
/// `Sheet` implements this by resolving positions through its cell store.
/// The unit type implements it as an always-empty source so standalone
/// formulas can be evaluated without a sheet.
pub trait CellLookup {
    /// The value at `pos`, or `None` if nothing was ever written there.
    fn value_at(&self, pos: Position) -> Option<CellValue>;
}

impl CellLookup for () {
    fn value_at(&self, _pos: Position) -> Option<CellValue> {
        None
    }
}

/// Evaluate an expression.
///
/// Errors are values: the first error produced by a subexpression wins,
/// evaluating left to right, and propagates unchanged.
pub(crate) fn evaluate<L: CellLookup>(expr: &Expr, lookup: &L) -> Result<f64, FormulaError> {
    match expr {
        Expr::Number(n) => Ok(*n),
        Expr::Ref(pos) => ref_value(*pos, lookup),
        Expr::Unary { op: UnaryOp::Plus, operand } => evaluate(operand, lookup),
        Expr::Unary { op: UnaryOp::Minus, operand } => Ok(-evaluate(operand, lookup)?),
        Expr::BinaryOp { op, left, right } => {
            let l = evaluate(left, lookup)?;
            let r = evaluate(right, lookup)?;
            let result = match op {
                Op::Add => l + r,
                Op::Sub => l - r,
                Op::Mul => l * r,
                Op::Div => l / r,
            };
            // Division by zero and overflow both surface here as NaN or
            // infinity.
            if result.is_finite() {
                Ok(result)
            } else {
                Err(FormulaError::Arithmetic)
            }
        }
    }
}

/// Read one referenced cell as a number.
///
/// Absent cells and empty text read as zero. Text converts when the whole
/// string parses as a finite number; anything else is `#VALUE!`.
fn ref_value<L: CellLookup>(pos: Position, lookup: &L) -> Result<f64, FormulaError> {
    if !pos.is_valid() {
        return Err(FormulaError::Ref);
    }
    match lookup.value_at(pos) {
        None => Ok(0.0),
        Some(CellValue::Number(n)) => Ok(n),
        Some(CellValue::Text(s)) => {
            if s.is_empty() {
                return Ok(0.0);
            }
            match s.parse::<f64>() {
                Ok(n) if n.is_finite() => Ok(n),
                _ => Err(FormulaError::Value),
            }
        }
        Some(CellValue::Error(e)) => Err(e),
    }
}
