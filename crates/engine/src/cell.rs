use std::cell::RefCell;

use serde::{Deserialize, Serialize};

use crate::error::{FormulaError, ParseError};
use crate::formula::eval::CellLookup;
use crate::formula::{self, Formula};
use crate::position::Position;

/// Leading character marking a formula.
pub const FORMULA_SIGIL: char = '=';
/// Leading character protecting literal text from value conversion.
pub const ESCAPE_SIGIL: char = '\'';

/// What a cell's content evaluates to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum CellValue {
    Number(f64),
    Text(String),
    Error(FormulaError),
}

impl CellValue {
    /// Render for value output: integral numbers without a trailing
    /// fraction, text verbatim, errors as `#KIND!`.
    pub fn to_text(&self) -> String {
        match self {
            CellValue::Number(n) => {
                if n.fract() == 0.0 && n.abs() < 1e15 {
                    format!("{}", *n as i64)
                } else {
                    format!("{n}")
                }
            }
            CellValue::Text(s) => s.clone(),
            CellValue::Error(e) => e.to_string(),
        }
    }
}

#[derive(Debug, Clone)]
enum Content {
    Empty,
    Text(String),
    Formula {
        formula: Formula,
        cache: RefCell<Option<CellValue>>,
    },
}

/// One cell of the sheet: empty, literal text, or a formula with a memoized
/// value.
///
/// Cells never reference each other. Edges between them are kept by the
/// sheet as position sets, and formula evaluation reaches peer cells through
/// a [`CellLookup`] passed in at the call site.
#[derive(Debug, Clone)]
pub struct Cell {
    content: Content,
}

impl Cell {
    /// Classify raw input text and build the cell.
    ///
    /// `=`-prefixed text longer than the sigil itself is parsed as a
    /// formula; a bare `=` and everything else is stored verbatim as text.
    pub fn new(text: &str) -> Result<Self, ParseError> {
        let content = if text.is_empty() {
            Content::Empty
        } else if let Some(expression) = text.strip_prefix(FORMULA_SIGIL) {
            if expression.is_empty() {
                Content::Text(text.to_string())
            } else {
                Content::Formula {
                    formula: formula::parse_formula(expression)?,
                    cache: RefCell::new(None),
                }
            }
        } else {
            Content::Text(text.to_string())
        };
        Ok(Self { content })
    }

    /// An empty placeholder cell.
    pub(crate) fn empty() -> Self {
        Self { content: Content::Empty }
    }

    /// True for cells with no content (including materialized placeholders).
    pub fn is_empty(&self) -> bool {
        matches!(self.content, Content::Empty)
    }

    /// The user-visible text: raw for literal cells, `=` plus the canonical
    /// expression for formulas, `""` for empty cells.
    pub fn text(&self) -> String {
        match &self.content {
            Content::Empty => String::new(),
            Content::Text(s) => s.clone(),
            Content::Formula { formula, .. } => {
                format!("{FORMULA_SIGIL}{}", formula.expression())
            }
        }
    }

    /// The cell's value.
    ///
    /// Formula results are memoized until [`Cell::invalidate_cache`] runs;
    /// the sheet passes itself as the lookup.
    pub fn value<L: CellLookup>(&self, lookup: &L) -> CellValue {
        match &self.content {
            Content::Empty => CellValue::Number(0.0),
            Content::Text(s) => text_value(s),
            Content::Formula { formula, cache } => {
                if let Some(cached) = cache.borrow().clone() {
                    return cached;
                }
                let value = match formula.evaluate(lookup) {
                    Ok(n) => CellValue::Number(n),
                    Err(e) => CellValue::Error(e),
                };
                *cache.borrow_mut() = Some(value.clone());
                value
            }
        }
    }

    /// Positions this cell's formula reads; empty for non-formula cells.
    pub fn referenced_cells(&self) -> &[Position] {
        match &self.content {
            Content::Formula { formula, .. } => formula.referenced_cells(),
            _ => &[],
        }
    }

    /// Drop the memoized formula value. No-op for other kinds. Cascading to
    /// dependents is the sheet's job, not the cell's.
    pub(crate) fn invalidate_cache(&self) {
        if let Content::Formula { cache, .. } = &self.content {
            *cache.borrow_mut() = None;
        }
    }
}

/// Value conversion for literal text: strip the escape sigil, promote a
/// complete numeric parse to `Number`, otherwise keep the text as-is.
fn text_value(raw: &str) -> CellValue {
    if let Some(rest) = raw.strip_prefix(ESCAPE_SIGIL) {
        return CellValue::Text(rest.to_string());
    }
    match raw.parse::<f64>() {
        Ok(n) if n.is_finite() => CellValue::Number(n),
        _ => CellValue::Text(raw.to_string()),
    }
}
