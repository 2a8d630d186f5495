//! Error model.
//!
//! Failures come in two families. [`ParseError`] and [`SheetError`] are
//! returned as `Result::Err` and abort the operation that raised them. A
//! [`FormulaError`] is a *value* a formula evaluates to: it is stored and
//! printed like any other cell value and never unwinds through the API.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::position::Position;

/// Runtime error a formula can evaluate to. Renders as `#KIND!`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FormulaError {
    /// The arithmetic produced a non-finite result.
    Arithmetic,
    /// A reference points outside the sheet's coordinate space.
    Ref,
    /// A referenced cell holds text that is not a complete number.
    Value,
}

impl std::fmt::Display for FormulaError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            FormulaError::Arithmetic => "ARITHM",
            FormulaError::Ref => "REF",
            FormulaError::Value => "VALUE",
        };
        write!(f, "#{name}!")
    }
}

/// Why expression text failed to parse.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("unexpected character '{0}'")]
    UnexpectedChar(char),

    #[error("invalid number literal '{0}'")]
    InvalidNumber(String),

    #[error("'{0}' is not a valid cell reference")]
    InvalidReference(String),

    #[error("unexpected end of expression")]
    UnexpectedEnd,

    #[error("expected closing parenthesis")]
    UnclosedParen,

    #[error("unexpected trailing input after expression")]
    TrailingInput,

    #[error("unexpected token")]
    UnexpectedToken,
}

/// Failure of a sheet operation.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum SheetError {
    #[error("position ({}, {}) is outside the sheet", .0.row, .0.col)]
    InvalidPosition(Position),

    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error("setting {0} would create a circular reference")]
    CircularDependency(Position),
}
