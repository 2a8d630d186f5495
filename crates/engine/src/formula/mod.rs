// Formula parsing and evaluation

pub mod eval;
pub mod parser;

use crate::error::{FormulaError, ParseError};
use crate::position::Position;

use eval::CellLookup;
use parser::Expr;

/// A parsed formula: the expression behind a cell's `=` sigil.
#[derive(Debug, Clone, PartialEq)]
pub struct Formula {
    expr: Expr,
    referenced: Vec<Position>,
}

/// Parse expression text (without the leading `=`) into a formula.
pub fn parse_formula(expression: &str) -> Result<Formula, ParseError> {
    let expr = parser::parse(expression)?;
    let referenced = parser::referenced_cells(&expr);
    Ok(Formula { expr, referenced })
}

impl Formula {
    /// Evaluate against a value source. Runtime failures come back as
    /// [`FormulaError`] values; this never panics.
    pub fn evaluate<L: CellLookup>(&self, lookup: &L) -> Result<f64, FormulaError> {
        eval::evaluate(&self.expr, lookup)
    }

    /// Canonical text of the expression: no whitespace, minimal parentheses.
    pub fn expression(&self) -> String {
        parser::format_expr(&self.expr)
    }

    /// Positions this formula reads, de-duplicated, in row-major order.
    pub fn referenced_cells(&self) -> &[Position] {
        &self.referenced
    }
}
